use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::approval::{ActorId, ApprovalRequest, ApproverCapacity, RequestId};
use crate::errors::DomainError;

/// One of the two interchangeable second-line approver roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondLineRole {
    HrManager,
    AdministrationManager,
}

impl SecondLineRole {
    pub const ALL: [SecondLineRole; 2] = [Self::HrManager, Self::AdministrationManager];

    pub fn capacity(self) -> ApproverCapacity {
        match self {
            Self::HrManager => ApproverCapacity::HrManager,
            Self::AdministrationManager => ApproverCapacity::AdministrationManager,
        }
    }
}

impl FromStr for SecondLineRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_key(value).as_str() {
            "hr_manager" | "hr" => Ok(Self::HrManager),
            "administration_manager" | "admin_manager" => Ok(Self::AdministrationManager),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown second-line role `{other}` (expected hr_manager|administration_manager)"
            ))),
        }
    }
}

/// Roles that can be granted to an actor. Relationship capabilities
/// (designated approver, request subject) are derived from the request instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    HrManager,
    AdministrationManager,
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_key(value).as_str() {
            "administrator" | "admin" => Ok(Self::Administrator),
            "hr_manager" | "hr" => Ok(Self::HrManager),
            "administration_manager" | "admin_manager" => Ok(Self::AdministrationManager),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown role `{other}` (expected administrator|hr_manager|administration_manager)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "role", rename_all = "snake_case")]
pub enum Capability {
    /// Supersedes every ordinary guard.
    Administrator,
    FirstLineApprover,
    SecondLine(SecondLineRole),
    RequestSubject,
}

impl Capability {
    pub fn capacity(self) -> Option<ApproverCapacity> {
        match self {
            Self::Administrator => Some(ApproverCapacity::Administrator),
            Self::FirstLineApprover => Some(ApproverCapacity::FirstLine),
            Self::SecondLine(role) => Some(role.capacity()),
            Self::RequestSubject => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Administrator => f.write_str("administrator"),
            Self::FirstLineApprover => f.write_str("first_line_approver"),
            Self::SecondLine(SecondLineRole::HrManager) => f.write_str("hr_manager"),
            Self::SecondLine(SecondLineRole::AdministrationManager) => {
                f.write_str("administration_manager")
            }
            Self::RequestSubject => f.write_str("request_subject"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityContext {
    pub request_id: RequestId,
    pub subject: ActorId,
    pub designated_approver: Option<ActorId>,
}

impl CapabilityContext {
    pub fn for_request(request: &ApprovalRequest) -> Self {
        Self {
            request_id: request.id.clone(),
            subject: request.subject.clone(),
            designated_approver: request.designated_approver.clone(),
        }
    }
}

pub trait CapabilityResolver: Send + Sync {
    fn has_capability(
        &self,
        actor: &ActorId,
        capability: Capability,
        context: &CapabilityContext,
    ) -> bool;

    /// Union check: returns the first capability in `candidates` the actor holds.
    fn first_held(
        &self,
        actor: &ActorId,
        candidates: &[Capability],
        context: &CapabilityContext,
    ) -> Option<Capability> {
        candidates.iter().copied().find(|capability| self.has_capability(actor, *capability, context))
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticCapabilityResolver {
    grants: HashMap<String, HashSet<Role>>,
}

impl StaticCapabilityResolver {
    pub fn new(grants: impl IntoIterator<Item = (ActorId, Vec<Role>)>) -> Self {
        let mut resolver = Self::default();
        for (actor, roles) in grants {
            for role in roles {
                resolver.grant(&actor, role);
            }
        }
        resolver
    }

    pub fn from_config(roles: &BTreeMap<String, Vec<Role>>) -> Self {
        Self::new(roles.iter().map(|(actor, roles)| (ActorId(actor.clone()), roles.clone())))
    }

    pub fn grant(&mut self, actor: &ActorId, role: Role) {
        self.grants.entry(normalize_key(&actor.0)).or_default().insert(role);
    }

    fn holds_role(&self, actor: &ActorId, role: Role) -> bool {
        self.grants.get(&normalize_key(&actor.0)).is_some_and(|roles| roles.contains(&role))
    }
}

impl CapabilityResolver for StaticCapabilityResolver {
    fn has_capability(
        &self,
        actor: &ActorId,
        capability: Capability,
        context: &CapabilityContext,
    ) -> bool {
        match capability {
            Capability::Administrator => self.holds_role(actor, Role::Administrator),
            Capability::FirstLineApprover => context
                .designated_approver
                .as_ref()
                .is_some_and(|approver| same_actor(approver, actor)),
            Capability::SecondLine(SecondLineRole::HrManager) => {
                self.holds_role(actor, Role::HrManager)
            }
            Capability::SecondLine(SecondLineRole::AdministrationManager) => {
                self.holds_role(actor, Role::AdministrationManager)
            }
            Capability::RequestSubject => same_actor(&context.subject, actor),
        }
    }
}

fn same_actor(left: &ActorId, right: &ActorId) -> bool {
    normalize_key(&left.0) == normalize_key(&right.0)
}

fn normalize_key(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

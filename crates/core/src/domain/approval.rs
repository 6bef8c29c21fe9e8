use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Leave,
    OutcomeMapping,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::OutcomeMapping => "outcome_mapping",
        }
    }
}

impl FromStr for RequestKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leave" => Ok(Self::Leave),
            "outcome_mapping" | "clo_plo_mapping" => Ok(Self::OutcomeMapping),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown request kind `{other}` (expected leave|outcome_mapping)"
            ))),
        }
    }
}

/// Lifecycle of a request. `Submitted` is the only initial state; the last
/// three are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Submitted,
    FirstApproved,
    FinallyApproved,
    Refused,
    Cancelled,
}

impl RequestState {
    pub const ALL: [RequestState; 5] = [
        Self::Submitted,
        Self::FirstApproved,
        Self::FinallyApproved,
        Self::Refused,
        Self::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FinallyApproved | Self::Refused | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::FirstApproved => "first_approved",
            Self::FinallyApproved => "finally_approved",
            Self::Refused => "refused",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestState {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|state| state.as_str() == value.trim()).ok_or_else(|| {
            DomainError::InvariantViolation(format!("unknown request state `{value}`"))
        })
    }
}

/// The authority an approver acted under when a slot was filled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverCapacity {
    FirstLine,
    HrManager,
    AdministrationManager,
    Administrator,
}

impl ApproverCapacity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstLine => "first_line",
            Self::HrManager => "hr_manager",
            Self::AdministrationManager => "administration_manager",
            Self::Administrator => "administrator",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FirstLine => "Team Manager",
            Self::HrManager => "HR Manager",
            Self::AdministrationManager => "Administration Manager",
            Self::Administrator => "Administrator",
        }
    }
}

impl FromStr for ApproverCapacity {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "first_line" => Ok(Self::FirstLine),
            "hr_manager" => Ok(Self::HrManager),
            "administration_manager" => Ok(Self::AdministrationManager),
            "administrator" => Ok(Self::Administrator),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown approver capacity `{other}`"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverSlot {
    pub actor: ActorId,
    pub capacity: ApproverCapacity,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    /// Employee whose leave it is, or the owner of the mapping record.
    pub subject: ActorId,
    pub designated_approver: Option<ActorId>,
    pub state: RequestState,
    pub first_approver: Option<ApproverSlot>,
    pub second_approver: Option<ApproverSlot>,
    pub refusal_reason: Option<String>,
    pub starts_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn new(
        id: RequestId,
        kind: RequestKind,
        subject: ActorId,
        designated_approver: Option<ActorId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            subject,
            designated_approver,
            state: RequestState::Submitted,
            first_approver: None,
            second_approver: None,
            refusal_reason: None,
            starts_on: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn starting_on(mut self, starts_on: NaiveDate) -> Self {
        self.starts_on = Some(starts_on);
        self
    }
}

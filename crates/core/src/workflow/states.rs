use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, SecondLineRole};
use crate::domain::approval::{ApprovalRequest, RequestState};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WorkflowCommand {
    FirstApprove,
    /// `as_role` lets an actor holding both second-line roles pick the one recorded.
    SecondApprove { as_role: Option<SecondLineRole> },
    Refuse { reason: Option<String> },
    Cancel,
}

impl WorkflowCommand {
    pub fn kind(&self) -> WorkflowCommandKind {
        match self {
            Self::FirstApprove => WorkflowCommandKind::FirstApprove,
            Self::SecondApprove { .. } => WorkflowCommandKind::SecondApprove,
            Self::Refuse { .. } => WorkflowCommandKind::Refuse,
            Self::Cancel => WorkflowCommandKind::Cancel,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowCommandKind {
    FirstApprove,
    SecondApprove,
    Refuse,
    Cancel,
}

impl WorkflowCommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstApprove => "first_approve",
            Self::SecondApprove => "second_approve",
            Self::Refuse => "refuse",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for WorkflowCommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side effects the caller performs once the transition has been persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    NotifySecondLineApprovers,
    RunPostApprovalHook,
    NotifySubject,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: RequestState,
    pub to: RequestState,
    pub command: WorkflowCommandKind,
    /// Capability that authorized the transition.
    pub authority: Capability,
    pub note: String,
    pub actions: Vec<WorkflowAction>,
    pub request: ApprovalRequest,
}

pub mod machine;
pub mod service;
pub mod states;

pub use machine::{ApprovalStateMachine, WorkflowError, WorkflowPolicy};
pub use service::{ApprovalService, InMemoryRequestStore, RequestStore};
pub use states::{Transition, WorkflowAction, WorkflowCommand, WorkflowCommandKind};

pub mod attainment;
pub mod audit;
pub mod capability;
pub mod config;
pub mod domain;
pub mod errors;
pub mod hooks;
pub mod workflow;

pub use attainment::{
    attainment_percentage, pass_rate, question_attainment, rollup::rollup, score_percentage,
    weighted_attainment, AttainmentReport, AttainmentTargets, MappingStrength, RollupInput,
};
pub use audit::{AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use capability::{
    Capability, CapabilityContext, CapabilityResolver, Role, SecondLineRole,
    StaticCapabilityResolver,
};
pub use domain::approval::{
    ActorId, ApprovalRequest, ApproverCapacity, ApproverSlot, RequestId, RequestKind, RequestState,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use hooks::{InMemoryPostApprovalHook, PostApprovalHook};
pub use workflow::{
    ApprovalService, ApprovalStateMachine, InMemoryRequestStore, RequestStore, Transition,
    WorkflowCommand, WorkflowError, WorkflowPolicy,
};

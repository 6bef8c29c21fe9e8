pub mod approval;

pub use approval::{
    ActorId, ApprovalRequest, ApproverCapacity, ApproverSlot, RequestId, RequestKind, RequestState,
};

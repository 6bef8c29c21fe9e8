use std::sync::{Arc, Mutex};

use crate::domain::approval::{ApprovalRequest, RequestId};

/// Work that depends on a final approval, such as recomputing outcome attainment
/// once a CLO-PLO mapping is approved. Invoked once per successful final approval,
/// after the transition has been persisted.
pub trait PostApprovalHook: Send + Sync {
    fn on_finally_approved(&self, request: &ApprovalRequest);
}

#[derive(Clone, Default)]
pub struct InMemoryPostApprovalHook {
    approved: Arc<Mutex<Vec<RequestId>>>,
}

impl InMemoryPostApprovalHook {
    pub fn approved(&self) -> Vec<RequestId> {
        match self.approved.lock() {
            Ok(approved) => approved.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl PostApprovalHook for InMemoryPostApprovalHook {
    fn on_finally_approved(&self, request: &ApprovalRequest) {
        match self.approved.lock() {
            Ok(mut approved) => approved.push(request.id.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.id.clone()),
        }
    }
}

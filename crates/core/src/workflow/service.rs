use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditOutcome, AuditSink};
use crate::capability::{CapabilityResolver, SecondLineRole};
use crate::domain::approval::{ActorId, ApprovalRequest, RequestId, RequestState};
use crate::errors::{ApplicationError, DomainError};
use crate::hooks::PostApprovalHook;
use crate::workflow::machine::ApprovalStateMachine;
use crate::workflow::states::{Transition, WorkflowAction, WorkflowCommand};

/// Persistence collaborator. Each write carries the request's audit note and
/// must store both or neither. `save_transition` only writes when the stored
/// state still equals `expected`, otherwise it reports
/// [`ApplicationError::Conflict`].
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn load(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, ApplicationError>;
    async fn insert(
        &self,
        request: &ApprovalRequest,
        note: &AuditEvent,
    ) -> Result<(), ApplicationError>;
    async fn save_transition(
        &self,
        request: &ApprovalRequest,
        expected: RequestState,
        note: &AuditEvent,
    ) -> Result<(), ApplicationError>;
}

#[derive(Default)]
pub struct InMemoryRequestStore {
    state: RwLock<StoredRequests>,
}

#[derive(Default)]
struct StoredRequests {
    requests: HashMap<String, ApprovalRequest>,
    notes: Vec<AuditEvent>,
}

impl InMemoryRequestStore {
    /// Committed notes for one request, oldest first.
    pub async fn notes_for(&self, id: &RequestId) -> Vec<String> {
        let state = self.state.read().await;
        state
            .notes
            .iter()
            .filter(|note| &note.request_id == id)
            .map(|note| note.note.clone())
            .collect()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn load(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, ApplicationError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn insert(
        &self,
        request: &ApprovalRequest,
        note: &AuditEvent,
    ) -> Result<(), ApplicationError> {
        let mut state = self.state.write().await;
        if state.requests.contains_key(&request.id.0) {
            return Err(ApplicationError::Persistence(format!(
                "request `{}` already exists",
                request.id
            )));
        }
        state.requests.insert(request.id.0.clone(), request.clone());
        state.notes.push(note.clone());
        Ok(())
    }

    async fn save_transition(
        &self,
        request: &ApprovalRequest,
        expected: RequestState,
        note: &AuditEvent,
    ) -> Result<(), ApplicationError> {
        let mut state = self.state.write().await;
        match state.requests.get(&request.id.0) {
            Some(stored) if stored.state == expected => {
                state.requests.insert(request.id.0.clone(), request.clone());
                state.notes.push(note.clone());
                Ok(())
            }
            Some(_) => Err(ApplicationError::Conflict {
                request_id: request.id.0.clone(),
                expected: expected.as_str().to_owned(),
            }),
            None => Err(ApplicationError::NotFound(request.id.0.clone())),
        }
    }
}

/// Runs workflow commands against a store. Accepted transitions are written
/// together with their note through the store; refused attempts change nothing
/// and go to the audit sink.
pub struct ApprovalService<S, C, A, H> {
    store: S,
    machine: ApprovalStateMachine<C>,
    audit: A,
    hook: H,
}

impl<S, C, A, H> ApprovalService<S, C, A, H>
where
    S: RequestStore,
    C: CapabilityResolver,
    A: AuditSink,
    H: PostApprovalHook,
{
    pub fn new(store: S, machine: ApprovalStateMachine<C>, audit: A, hook: H) -> Self {
        Self { store, machine, audit, hook }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn submit(
        &self,
        request: ApprovalRequest,
        correlation_id: &str,
    ) -> Result<ApprovalRequest, ApplicationError> {
        if request.state != RequestState::Submitted {
            return Err(DomainError::InvariantViolation(format!(
                "new requests must start in `submitted`, got `{}`",
                request.state
            ))
            .into());
        }

        let note = AuditEvent::new(
            request.id.clone(),
            correlation_id,
            "workflow.submitted",
            request.subject.0.clone(),
            AuditOutcome::Success,
            format!("Submitted by {}", request.subject),
        )
        .with_metadata("kind", request.kind.as_str());
        self.store.insert(&request, &note).await?;

        info!(
            event_name = "workflow.submitted",
            correlation_id,
            request_id = %request.id,
            kind = request.kind.as_str(),
            "approval request submitted"
        );

        Ok(request)
    }

    pub async fn first_approve(
        &self,
        id: &RequestId,
        actor: &ActorId,
        correlation_id: &str,
    ) -> Result<Transition, ApplicationError> {
        self.execute(id, WorkflowCommand::FirstApprove, actor, correlation_id).await
    }

    pub async fn second_approve(
        &self,
        id: &RequestId,
        actor: &ActorId,
        as_role: Option<SecondLineRole>,
        correlation_id: &str,
    ) -> Result<Transition, ApplicationError> {
        self.execute(id, WorkflowCommand::SecondApprove { as_role }, actor, correlation_id).await
    }

    pub async fn refuse(
        &self,
        id: &RequestId,
        actor: &ActorId,
        reason: Option<String>,
        correlation_id: &str,
    ) -> Result<Transition, ApplicationError> {
        self.execute(id, WorkflowCommand::Refuse { reason }, actor, correlation_id).await
    }

    pub async fn cancel(
        &self,
        id: &RequestId,
        actor: &ActorId,
        correlation_id: &str,
    ) -> Result<Transition, ApplicationError> {
        self.execute(id, WorkflowCommand::Cancel, actor, correlation_id).await
    }

    /// Load, transition, then persist the new state and its note in one store
    /// write guarded by the prior state. Follow-up actions run only after that
    /// write succeeded.
    pub async fn execute(
        &self,
        id: &RequestId,
        command: WorkflowCommand,
        actor: &ActorId,
        correlation_id: &str,
    ) -> Result<Transition, ApplicationError> {
        let request =
            self.store.load(id).await?.ok_or_else(|| ApplicationError::NotFound(id.0.clone()))?;

        let transition = match self.machine.apply(&request, &command, actor, Utc::now()) {
            Ok(transition) => transition,
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(
                        id.clone(),
                        correlation_id,
                        "workflow.transition_rejected",
                        actor.0.clone(),
                        AuditOutcome::Rejected,
                        error.to_string(),
                    )
                    .with_metadata("command", command.kind().as_str())
                    .with_metadata("state", request.state.as_str()),
                );
                warn!(
                    event_name = "workflow.transition_rejected",
                    correlation_id,
                    request_id = %id,
                    actor = %actor,
                    error = %error,
                    "approval transition rejected"
                );
                return Err(error.into());
            }
        };

        let note = AuditEvent::new(
            id.clone(),
            correlation_id,
            "workflow.transition_applied",
            actor.0.clone(),
            AuditOutcome::Success,
            transition.note.clone(),
        )
        .with_metadata("from", transition.from.as_str())
        .with_metadata("to", transition.to.as_str())
        .with_metadata("command", transition.command.as_str())
        .with_metadata("authority", transition.authority.to_string());
        self.store.save_transition(&transition.request, transition.from, &note).await?;

        info!(
            event_name = "workflow.transition_applied",
            correlation_id,
            request_id = %id,
            actor = %actor,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            "approval transition applied"
        );

        for action in &transition.actions {
            self.run_action(*action, &transition.request, correlation_id);
        }

        Ok(transition)
    }

    fn run_action(&self, action: WorkflowAction, request: &ApprovalRequest, correlation_id: &str) {
        match action {
            WorkflowAction::RunPostApprovalHook => self.hook.on_finally_approved(request),
            WorkflowAction::NotifySecondLineApprovers => info!(
                event_name = "workflow.notify",
                correlation_id,
                request_id = %request.id,
                audience = "second_line_approvers",
                "request awaits second-line approval"
            ),
            WorkflowAction::NotifySubject => info!(
                event_name = "workflow.notify",
                correlation_id,
                request_id = %request.id,
                audience = "subject",
                subject = %request.subject,
                state = request.state.as_str(),
                "request outcome ready for its subject"
            ),
        }
    }
}

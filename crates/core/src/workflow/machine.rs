use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capability::{Capability, CapabilityContext, CapabilityResolver, SecondLineRole};
use crate::domain::approval::{
    ActorId, ApprovalRequest, ApproverCapacity, ApproverSlot, RequestState,
};
use crate::workflow::states::{Transition, WorkflowAction, WorkflowCommand, WorkflowCommandKind};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("cannot {command} a request in state `{state}`")]
    InvalidState { state: RequestState, command: WorkflowCommandKind },
    #[error(
        "actor `{actor}` may not {command} a request in state `{state}` (requires one of: {})",
        render_capabilities(.required)
    )]
    PermissionDenied {
        actor: ActorId,
        state: RequestState,
        command: WorkflowCommandKind,
        required: Vec<Capability>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    /// Preference used when an actor holds both second-line roles and names neither.
    pub second_line_order: Vec<SecondLineRole>,
    pub allow_past_cancellation: bool,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            second_line_order: vec![SecondLineRole::HrManager, SecondLineRole::AdministrationManager],
            allow_past_cancellation: false,
        }
    }
}

impl WorkflowPolicy {
    fn second_line_candidates(&self) -> Vec<Capability> {
        let mut ordered = self.second_line_order.clone();
        for role in SecondLineRole::ALL {
            if !ordered.contains(&role) {
                ordered.push(role);
            }
        }
        ordered.into_iter().map(Capability::SecondLine).collect()
    }
}

/// Role-gated transitions over [`ApprovalRequest`].
///
/// Every command checks, in order: the state precondition, the administrator
/// override, then the command's ordinary guard. The input request is never
/// mutated; the updated copy travels in the returned [`Transition`].
pub struct ApprovalStateMachine<C> {
    resolver: C,
    policy: WorkflowPolicy,
}

impl<C> ApprovalStateMachine<C>
where
    C: CapabilityResolver,
{
    pub fn new(resolver: C, policy: WorkflowPolicy) -> Self {
        Self { resolver, policy }
    }

    pub fn resolver(&self) -> &C {
        &self.resolver
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    pub fn first_approve(
        &self,
        request: &ApprovalRequest,
        actor: &ActorId,
        at: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        self.apply(request, &WorkflowCommand::FirstApprove, actor, at)
    }

    pub fn second_approve(
        &self,
        request: &ApprovalRequest,
        actor: &ActorId,
        as_role: Option<SecondLineRole>,
        at: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        self.apply(request, &WorkflowCommand::SecondApprove { as_role }, actor, at)
    }

    pub fn refuse(
        &self,
        request: &ApprovalRequest,
        actor: &ActorId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        self.apply(request, &WorkflowCommand::Refuse { reason }, actor, at)
    }

    pub fn cancel(
        &self,
        request: &ApprovalRequest,
        actor: &ActorId,
        at: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        self.apply(request, &WorkflowCommand::Cancel, actor, at)
    }

    pub fn apply(
        &self,
        request: &ApprovalRequest,
        command: &WorkflowCommand,
        actor: &ActorId,
        at: DateTime<Utc>,
    ) -> Result<Transition, WorkflowError> {
        use RequestState::{Cancelled, FinallyApproved, FirstApproved, Refused, Submitted};

        let from = request.state;
        let kind = command.kind();
        let context = CapabilityContext::for_request(request);
        let mut next = request.clone();

        let (to, authority, note, actions) = match command {
            WorkflowCommand::FirstApprove => {
                require_state(from, &[Submitted], kind)?;
                let authority =
                    self.authorize(actor, from, kind, &[Capability::FirstLineApprover], &context)?;
                let capacity = authority.capacity().unwrap_or(ApproverCapacity::FirstLine);
                next.first_approver =
                    Some(ApproverSlot { actor: actor.clone(), capacity, recorded_at: at });
                (
                    FirstApproved,
                    authority,
                    format!("First approval ({}): {actor}", capacity.label()),
                    vec![WorkflowAction::NotifySecondLineApprovers],
                )
            }
            WorkflowCommand::SecondApprove { as_role } => {
                require_state(from, &[FirstApproved], kind)?;
                let candidates = match as_role {
                    Some(role) => vec![Capability::SecondLine(*role)],
                    None => self.policy.second_line_candidates(),
                };
                let authority = self.authorize(actor, from, kind, &candidates, &context)?;
                let capacity = authority.capacity().unwrap_or(ApproverCapacity::Administrator);
                next.second_approver =
                    Some(ApproverSlot { actor: actor.clone(), capacity, recorded_at: at });
                (
                    FinallyApproved,
                    authority,
                    format!("Final approval ({}): {actor}", capacity.label()),
                    vec![WorkflowAction::RunPostApprovalHook, WorkflowAction::NotifySubject],
                )
            }
            WorkflowCommand::Refuse { reason } => {
                if from.is_terminal() {
                    return Err(WorkflowError::InvalidState { state: from, command: kind });
                }
                let candidates = match from {
                    Submitted => vec![Capability::FirstLineApprover],
                    _ => self.policy.second_line_candidates(),
                };
                let authority = self.authorize(actor, from, kind, &candidates, &context)?;
                next.first_approver = None;
                next.second_approver = None;
                next.refusal_reason = reason.clone();
                let note = match reason {
                    Some(reason) => format!("Refused by {actor}: {reason}"),
                    None => format!("Refused by {actor}"),
                };
                (Refused, authority, note, vec![WorkflowAction::NotifySubject])
            }
            WorkflowCommand::Cancel => {
                require_state(from, &[Submitted, FirstApproved], kind)?;
                let authority =
                    self.authorize(actor, from, kind, &[Capability::RequestSubject], &context)?;
                let already_started =
                    request.starts_on.is_some_and(|starts_on| starts_on < at.date_naive());
                if authority == Capability::RequestSubject
                    && already_started
                    && !self.policy.allow_past_cancellation
                {
                    return Err(WorkflowError::PermissionDenied {
                        actor: actor.clone(),
                        state: from,
                        command: kind,
                        required: vec![Capability::Administrator],
                    });
                }
                (Cancelled, authority, format!("Cancelled by {actor}"), Vec::new())
            }
        };

        next.state = to;
        next.updated_at = at;

        Ok(Transition { from, to, command: kind, authority, note, actions, request: next })
    }

    fn authorize(
        &self,
        actor: &ActorId,
        state: RequestState,
        command: WorkflowCommandKind,
        candidates: &[Capability],
        context: &CapabilityContext,
    ) -> Result<Capability, WorkflowError> {
        if self.resolver.has_capability(actor, Capability::Administrator, context) {
            return Ok(Capability::Administrator);
        }

        self.resolver.first_held(actor, candidates, context).ok_or_else(|| {
            WorkflowError::PermissionDenied {
                actor: actor.clone(),
                state,
                command,
                required: candidates.to_vec(),
            }
        })
    }
}

fn require_state(
    current: RequestState,
    allowed: &[RequestState],
    command: WorkflowCommandKind,
) -> Result<(), WorkflowError> {
    if allowed.contains(&current) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidState { state: current, command })
    }
}

fn render_capabilities(capabilities: &[Capability]) -> String {
    capabilities.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::{ApprovalStateMachine, WorkflowError, WorkflowPolicy};
    use crate::capability::{Capability, Role, SecondLineRole, StaticCapabilityResolver};
    use crate::domain::approval::{
        ActorId, ApprovalRequest, ApproverCapacity, RequestId, RequestKind, RequestState,
    };
    use crate::workflow::states::{WorkflowAction, WorkflowCommand, WorkflowCommandKind};

    fn actor(id: &str) -> ActorId {
        ActorId(id.to_owned())
    }

    fn machine() -> ApprovalStateMachine<StaticCapabilityResolver> {
        machine_with_policy(WorkflowPolicy::default())
    }

    fn machine_with_policy(policy: WorkflowPolicy) -> ApprovalStateMachine<StaticCapabilityResolver> {
        let resolver = StaticCapabilityResolver::new([
            (actor("hr-b"), vec![Role::HrManager]),
            (actor("adm-m"), vec![Role::AdministrationManager]),
            (actor("both"), vec![Role::HrManager, Role::AdministrationManager]),
            (actor("root"), vec![Role::Administrator]),
        ]);
        ApprovalStateMachine::new(resolver, policy)
    }

    fn submitted() -> ApprovalRequest {
        ApprovalRequest::new(
            RequestId("LV-100".to_owned()),
            RequestKind::Leave,
            actor("emp-a"),
            Some(actor("mgr-a")),
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid timestamp"),
        )
    }

    fn first_approved() -> ApprovalRequest {
        machine()
            .first_approve(&submitted(), &actor("mgr-a"), Utc::now())
            .expect("designated approver can first-approve")
            .request
    }

    #[test]
    fn full_approval_scenario_records_both_slots() {
        let machine = machine();
        let request = submitted();

        let first = machine
            .first_approve(&request, &actor("mgr-a"), Utc::now())
            .expect("first approval succeeds");
        assert_eq!(first.to, RequestState::FirstApproved);
        assert_eq!(first.actions, vec![WorkflowAction::NotifySecondLineApprovers]);
        let slot = first.request.first_approver.as_ref().expect("first slot populated");
        assert_eq!(slot.actor, actor("mgr-a"));
        assert_eq!(slot.capacity, ApproverCapacity::FirstLine);
        assert_eq!(first.note, "First approval (Team Manager): mgr-a");

        let second = machine
            .second_approve(&first.request, &actor("adm-m"), None, Utc::now())
            .expect("administration manager can give final approval");
        assert_eq!(second.to, RequestState::FinallyApproved);
        let slot = second.request.second_approver.as_ref().expect("second slot populated");
        assert_eq!(slot.actor, actor("adm-m"));
        assert_eq!(slot.capacity, ApproverCapacity::AdministrationManager);
        assert!(second.actions.contains(&WorkflowAction::RunPostApprovalHook));
        assert_eq!(second.note, "Final approval (Administration Manager): adm-m");
    }

    #[test]
    fn input_request_is_not_mutated() {
        let request = submitted();
        let _ = machine().first_approve(&request, &actor("mgr-a"), Utc::now()).expect("approve");

        assert_eq!(request.state, RequestState::Submitted);
        assert!(request.first_approver.is_none());
    }

    #[test]
    fn first_approve_requires_submitted_state() {
        let error = machine()
            .first_approve(&first_approved(), &actor("mgr-a"), Utc::now())
            .expect_err("cannot first-approve twice");

        assert_eq!(
            error,
            WorkflowError::InvalidState {
                state: RequestState::FirstApproved,
                command: WorkflowCommandKind::FirstApprove,
            }
        );
    }

    #[test]
    fn first_approve_rejects_non_designated_actor() {
        let error = machine()
            .first_approve(&submitted(), &actor("hr-b"), Utc::now())
            .expect_err("hr manager is not the designated approver");

        assert!(matches!(
            error,
            WorkflowError::PermissionDenied { ref required, .. }
                if required == &vec![Capability::FirstLineApprover]
        ));
    }

    #[test]
    fn second_approve_accepts_either_role() {
        let machine = machine();
        let request = first_approved();

        for (approver, capacity) in [
            ("hr-b", ApproverCapacity::HrManager),
            ("adm-m", ApproverCapacity::AdministrationManager),
        ] {
            let transition = machine
                .second_approve(&request, &actor(approver), None, Utc::now())
                .expect("either second-line role suffices");
            assert_eq!(
                transition.request.second_approver.map(|slot| slot.capacity),
                Some(capacity)
            );
        }
    }

    #[test]
    fn second_approve_fails_without_either_role_even_in_correct_state() {
        let error = machine()
            .second_approve(&first_approved(), &actor("emp-c"), None, Utc::now())
            .expect_err("actor holds neither role");

        assert!(matches!(
            error,
            WorkflowError::PermissionDenied {
                state: RequestState::FirstApproved,
                command: WorkflowCommandKind::SecondApprove,
                ..
            }
        ));
    }

    #[test]
    fn second_approve_is_not_available_from_submitted() {
        let error = machine()
            .second_approve(&submitted(), &actor("hr-b"), None, Utc::now())
            .expect_err("first approval must come first");

        assert!(matches!(error, WorkflowError::InvalidState { state: RequestState::Submitted, .. }));
    }

    #[test]
    fn designated_role_is_recorded_for_dual_role_holders() {
        let machine = machine();
        let request = first_approved();

        let default_pick = machine
            .second_approve(&request, &actor("both"), None, Utc::now())
            .expect("dual holder approves");
        let designated = machine
            .second_approve(
                &request,
                &actor("both"),
                Some(SecondLineRole::AdministrationManager),
                Utc::now(),
            )
            .expect("dual holder designates a role");

        assert_eq!(
            default_pick.request.second_approver.map(|slot| slot.capacity),
            Some(ApproverCapacity::HrManager)
        );
        assert_eq!(
            designated.request.second_approver.map(|slot| slot.capacity),
            Some(ApproverCapacity::AdministrationManager)
        );
    }

    #[test]
    fn designating_an_unheld_role_is_denied() {
        let error = machine()
            .second_approve(
                &first_approved(),
                &actor("hr-b"),
                Some(SecondLineRole::AdministrationManager),
                Utc::now(),
            )
            .expect_err("hr manager cannot act as administration manager");

        assert!(matches!(error, WorkflowError::PermissionDenied { .. }));
    }

    #[test]
    fn second_line_candidates_list_each_role_once_in_configured_order() {
        let partial = WorkflowPolicy {
            second_line_order: vec![SecondLineRole::AdministrationManager],
            allow_past_cancellation: false,
        };
        assert_eq!(
            partial.second_line_candidates(),
            vec![
                Capability::SecondLine(SecondLineRole::AdministrationManager),
                Capability::SecondLine(SecondLineRole::HrManager),
            ]
        );
        assert_eq!(
            WorkflowPolicy::default().second_line_candidates(),
            vec![
                Capability::SecondLine(SecondLineRole::HrManager),
                Capability::SecondLine(SecondLineRole::AdministrationManager),
            ]
        );
    }

    #[test]
    fn configured_order_changes_default_pick() {
        let machine = machine_with_policy(WorkflowPolicy {
            second_line_order: vec![SecondLineRole::AdministrationManager],
            allow_past_cancellation: false,
        });

        let transition = machine
            .second_approve(&first_approved(), &actor("both"), None, Utc::now())
            .expect("dual holder approves");
        assert_eq!(
            transition.request.second_approver.map(|slot| slot.capacity),
            Some(ApproverCapacity::AdministrationManager)
        );

        let hr_only = machine
            .second_approve(&first_approved(), &actor("hr-b"), None, Utc::now())
            .expect("roles missing from the order are still accepted");
        assert_eq!(
            hr_only.request.second_approver.map(|slot| slot.capacity),
            Some(ApproverCapacity::HrManager)
        );
    }

    #[test]
    fn administrator_override_applies_to_every_transition() {
        let machine = machine();
        let admin = actor("root");

        let first = machine.first_approve(&submitted(), &admin, Utc::now()).expect("admin first");
        assert_eq!(first.authority, Capability::Administrator);
        assert_eq!(
            first.request.first_approver.as_ref().map(|slot| slot.capacity),
            Some(ApproverCapacity::Administrator)
        );

        let second =
            machine.second_approve(&first.request, &admin, None, Utc::now()).expect("admin second");
        assert_eq!(second.authority, Capability::Administrator);

        let cancelled = machine.cancel(&submitted(), &admin, Utc::now()).expect("admin cancel");
        assert_eq!(cancelled.to, RequestState::Cancelled);
    }

    #[test]
    fn administrator_override_does_not_bypass_state_checks() {
        let error = machine()
            .second_approve(&submitted(), &actor("root"), None, Utc::now())
            .expect_err("state precondition still applies");

        assert!(matches!(error, WorkflowError::InvalidState { .. }));
    }

    #[test]
    fn refuse_from_any_non_terminal_state_clears_slots() {
        let machine = machine();

        let from_submitted = machine
            .refuse(&submitted(), &actor("mgr-a"), Some("team coverage".to_owned()), Utc::now())
            .expect("first-line approver refuses");
        assert_eq!(from_submitted.to, RequestState::Refused);
        assert_eq!(from_submitted.request.refusal_reason.as_deref(), Some("team coverage"));
        assert_eq!(from_submitted.note, "Refused by mgr-a: team coverage");

        let from_first = machine
            .refuse(&first_approved(), &actor("hr-b"), None, Utc::now())
            .expect("second-line approver refuses");
        assert_eq!(from_first.to, RequestState::Refused);
        assert!(from_first.request.first_approver.is_none());
        assert!(from_first.request.second_approver.is_none());
    }

    #[test]
    fn refuse_guard_follows_current_state() {
        let machine = machine();

        let error = machine
            .refuse(&first_approved(), &actor("mgr-a"), None, Utc::now())
            .expect_err("first-line approver cannot refuse after first approval");
        assert!(matches!(error, WorkflowError::PermissionDenied { .. }));

        let error = machine
            .refuse(&submitted(), &actor("hr-b"), None, Utc::now())
            .expect_err("second-line role cannot refuse a submitted request");
        assert!(matches!(error, WorkflowError::PermissionDenied { .. }));
    }

    #[test]
    fn terminal_states_reject_every_command() {
        let machine = machine();
        let mut refused = submitted();
        refused.state = RequestState::Refused;
        let mut approved = first_approved();
        approved.state = RequestState::FinallyApproved;

        for request in [refused, approved] {
            let commands = [
                WorkflowCommand::FirstApprove,
                WorkflowCommand::SecondApprove { as_role: None },
                WorkflowCommand::Refuse { reason: None },
                WorkflowCommand::Cancel,
            ];
            for command in commands {
                let error = machine
                    .apply(&request, &command, &actor("root"), Utc::now())
                    .expect_err("terminal state has no outgoing transitions");
                assert!(matches!(error, WorkflowError::InvalidState { .. }));
            }
        }
    }

    #[test]
    fn subject_cancels_then_approval_is_invalid() {
        let machine = machine();

        let cancelled =
            machine.cancel(&submitted(), &actor("emp-a"), Utc::now()).expect("subject cancels");
        assert_eq!(cancelled.to, RequestState::Cancelled);
        assert_eq!(cancelled.authority, Capability::RequestSubject);

        let error = machine
            .first_approve(&cancelled.request, &actor("mgr-a"), Utc::now())
            .expect_err("cancelled request cannot be approved");
        assert_eq!(
            error,
            WorkflowError::InvalidState {
                state: RequestState::Cancelled,
                command: WorkflowCommandKind::FirstApprove,
            }
        );
    }

    #[test]
    fn subject_cancels_a_first_approved_request() {
        let machine = machine();

        let cancelled = machine
            .cancel(&first_approved(), &actor("emp-a"), Utc::now())
            .expect("subject cancels before the final decision");
        assert_eq!(cancelled.from, RequestState::FirstApproved);
        assert_eq!(cancelled.to, RequestState::Cancelled);
        assert_eq!(cancelled.request.state, RequestState::Cancelled);
        assert_eq!(cancelled.authority, Capability::RequestSubject);

        let error = machine
            .second_approve(&cancelled.request, &actor("hr-b"), None, Utc::now())
            .expect_err("cancelled request cannot be finally approved");
        assert_eq!(
            error,
            WorkflowError::InvalidState {
                state: RequestState::Cancelled,
                command: WorkflowCommandKind::SecondApprove,
            }
        );
    }

    #[test]
    fn approvers_cannot_cancel_someone_elses_request() {
        let error = machine()
            .cancel(&first_approved(), &actor("mgr-a"), Utc::now())
            .expect_err("cancel is reserved for the subject");

        assert!(matches!(
            error,
            WorkflowError::PermissionDenied { ref required, .. }
                if required == &vec![Capability::RequestSubject]
        ));
    }

    #[test]
    fn past_dated_leave_cancellation_needs_admin_unless_allowed() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).single().expect("valid timestamp");
        let started = submitted()
            .starting_on(NaiveDate::from_ymd_opt(2026, 5, 1).expect("valid date"));

        let error = machine()
            .cancel(&started, &actor("emp-a"), now)
            .expect_err("subject cannot cancel a leave already started");
        assert!(matches!(
            error,
            WorkflowError::PermissionDenied { ref required, .. }
                if required == &vec![Capability::Administrator]
        ));

        machine().cancel(&started, &actor("root"), now).expect("admin may cancel");

        let lenient = machine_with_policy(WorkflowPolicy {
            allow_past_cancellation: true,
            ..WorkflowPolicy::default()
        });
        lenient.cancel(&started, &actor("emp-a"), now).expect("policy allows past cancellation");

        let upcoming = submitted().starting_on((now + Duration::days(3)).date_naive());
        machine().cancel(&upcoming, &actor("emp-a"), now).expect("future leave is cancellable");
    }

    #[test]
    fn repeating_a_command_never_double_applies() {
        let machine = machine();
        let at = Utc::now();

        let once = machine.first_approve(&submitted(), &actor("mgr-a"), at).expect("first call");
        let twice = machine.first_approve(&once.request, &actor("mgr-a"), at);
        assert!(matches!(twice, Err(WorkflowError::InvalidState { .. })));

        let refused = machine.refuse(&submitted(), &actor("mgr-a"), None, at).expect("refuse");
        let again = machine.refuse(&refused.request, &actor("mgr-a"), None, at);
        assert!(matches!(again, Err(WorkflowError::InvalidState { .. })));
    }

    #[test]
    fn permission_error_message_lists_required_capabilities() {
        let error = machine()
            .second_approve(&first_approved(), &actor("emp-c"), None, Utc::now())
            .expect_err("denied");

        assert_eq!(
            error.to_string(),
            "actor `emp-c` may not second_approve a request in state `first_approved` \
             (requires one of: hr_manager, administration_manager)"
        );
    }
}

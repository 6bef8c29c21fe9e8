use clap::Args;
use serde_json::json;
use signoff_core::capability::SecondLineRole;
use signoff_core::config::AppConfig;
use signoff_core::domain::approval::{ActorId, RequestId};

use crate::commands::{
    approval_service, block_on, new_correlation_id, open_pool, persist_rejections,
    CommandFailure, CommandResult,
};

#[derive(Debug, Clone, Args)]
pub struct TransitionArgs {
    #[arg(long, help = "Request to act on")]
    pub id: String,
    #[arg(long, help = "Actor performing the transition")]
    pub actor: String,
}

#[derive(Debug, Clone)]
pub enum TransitionRequest {
    FirstApprove,
    SecondApprove { as_role: Option<String> },
    Refuse { reason: Option<String> },
    Cancel,
}

impl TransitionRequest {
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::FirstApprove => "first-approve",
            Self::SecondApprove { .. } => "second-approve",
            Self::Refuse { .. } => "refuse",
            Self::Cancel => "cancel",
        }
    }
}

pub fn run(config: &AppConfig, args: TransitionArgs, request: TransitionRequest) -> CommandResult {
    let command = request.command_name();
    let correlation_id = new_correlation_id();

    let as_role = match &request {
        TransitionRequest::SecondApprove { as_role: Some(raw) } => {
            match raw.parse::<SecondLineRole>() {
                Ok(role) => Some(role),
                Err(error) => {
                    return CommandFailure::invalid_input(error.to_string())
                        .into_correlated_result(command, &correlation_id)
                }
            }
        }
        _ => None,
    };

    let id = RequestId(args.id);
    let actor = ActorId(args.actor);

    let result = block_on(async {
        let pool = open_pool(config).await?;
        let (service, audit) = approval_service(config, &pool);
        let outcome = match request {
            TransitionRequest::FirstApprove => {
                service.first_approve(&id, &actor, &correlation_id).await
            }
            TransitionRequest::SecondApprove { .. } => {
                service.second_approve(&id, &actor, as_role, &correlation_id).await
            }
            TransitionRequest::Refuse { reason } => {
                service.refuse(&id, &actor, reason, &correlation_id).await
            }
            TransitionRequest::Cancel => service.cancel(&id, &actor, &correlation_id).await,
        };
        persist_rejections(&pool, &audit, &correlation_id).await;
        pool.close().await;
        Ok::<_, CommandFailure>(outcome?)
    });

    match result {
        Ok(transition) => CommandResult::success_with_data(
            command,
            transition.note.clone(),
            Some(json!({
                "correlation_id": correlation_id,
                "from": transition.from,
                "to": transition.to,
                "authority": transition.authority.to_string(),
                "actions": transition.actions,
                "request": transition.request,
            })),
        ),
        Err(failure) => failure.into_correlated_result(command, &correlation_id),
    }
}

use chrono::{NaiveDate, Utc};
use clap::Args;
use serde_json::json;
use signoff_core::config::AppConfig;
use signoff_core::domain::approval::{ActorId, ApprovalRequest, RequestId, RequestKind};

use crate::commands::{
    approval_service, block_on, new_correlation_id, open_pool, CommandFailure, CommandResult,
};

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    #[arg(long, help = "Identifier of the new request")]
    pub id: String,
    #[arg(long, default_value = "leave", help = "Request kind: leave | outcome_mapping")]
    pub kind: String,
    #[arg(long, help = "Employee or record owner the request belongs to")]
    pub subject: String,
    #[arg(long, help = "Designated first-line approver")]
    pub approver: Option<String>,
    #[arg(long, help = "Leave start date (YYYY-MM-DD)")]
    pub starts_on: Option<String>,
}

pub fn run(config: &AppConfig, args: SubmitArgs) -> CommandResult {
    let correlation_id = new_correlation_id();
    let request = match build_request(args) {
        Ok(request) => request,
        Err(failure) => return failure.into_correlated_result("submit", &correlation_id),
    };

    let result = block_on(async {
        let pool = open_pool(config).await?;
        let (service, _) = approval_service(config, &pool);
        let submitted = service.submit(request, &correlation_id).await;
        pool.close().await;
        Ok::<_, CommandFailure>(submitted?)
    });

    match result {
        Ok(request) => CommandResult::success_with_data(
            "submit",
            format!("request `{}` submitted", request.id),
            Some(json!({ "correlation_id": correlation_id, "request": request })),
        ),
        Err(failure) => failure.into_correlated_result("submit", &correlation_id),
    }
}

fn build_request(args: SubmitArgs) -> Result<ApprovalRequest, CommandFailure> {
    if args.id.trim().is_empty() || args.subject.trim().is_empty() {
        return Err(CommandFailure::invalid_input("--id and --subject must not be empty"));
    }

    let kind = args
        .kind
        .parse::<RequestKind>()
        .map_err(|error| CommandFailure::invalid_input(error.to_string()))?;

    let mut request = ApprovalRequest::new(
        RequestId(args.id),
        kind,
        ActorId(args.subject),
        args.approver.filter(|approver| !approver.trim().is_empty()).map(ActorId),
        Utc::now(),
    );

    if let Some(raw) = args.starts_on {
        let starts_on = raw.parse::<NaiveDate>().map_err(|error| {
            CommandFailure::invalid_input(format!("invalid --starts-on `{raw}`: {error}"))
        })?;
        request = request.starting_on(starts_on);
    }

    Ok(request)
}

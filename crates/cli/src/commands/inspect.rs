use clap::Args;
use serde_json::json;
use signoff_core::config::AppConfig;
use signoff_core::domain::approval::{RequestId, RequestState};
use signoff_db::{SqlAuditRepository, SqlRequestRepository};

use crate::commands::{block_on, open_pool, CommandFailure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct ShowArgs {
    #[arg(long, help = "Request to display")]
    pub id: String,
}

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    #[arg(long, help = "Only list requests in this state")]
    pub state: Option<String>,
    #[arg(long, default_value_t = 50, help = "Maximum number of requests to return")]
    pub limit: u32,
}

/// Current request state plus its audit trail.
pub fn show(config: &AppConfig, args: ShowArgs) -> CommandResult {
    let id = RequestId(args.id);

    let result = block_on(async {
        let pool = open_pool(config).await?;
        let request = SqlRequestRepository::new(pool.clone())
            .find_by_id(&id)
            .await
            .map_err(|error| CommandFailure::new("db_persistence", error.to_string(), 4))?
            .ok_or_else(|| {
                CommandFailure::new("not_found", format!("request `{id}` was not found"), 8)
            })?;
        let events = SqlAuditRepository::new(pool.clone())
            .list_for_request(&id)
            .await
            .map_err(|error| CommandFailure::new("db_persistence", error.to_string(), 4))?;
        pool.close().await;
        Ok::<_, CommandFailure>((request, events))
    });

    match result {
        Ok((request, events)) => CommandResult::success_with_data(
            "show",
            format!("request `{}` is {}", request.id, request.state),
            Some(json!({ "request": request, "audit": events })),
        ),
        Err(failure) => failure.into_result("show"),
    }
}

pub fn list(config: &AppConfig, args: ListArgs) -> CommandResult {
    let state = match args.state.as_deref().map(str::parse::<RequestState>).transpose() {
        Ok(state) => state,
        Err(error) => return CommandFailure::invalid_input(error.to_string()).into_result("list"),
    };

    let result = block_on(async {
        let pool = open_pool(config).await?;
        let requests = SqlRequestRepository::new(pool.clone())
            .list_by_state(state, args.limit.max(1))
            .await
            .map_err(|error| CommandFailure::new("db_persistence", error.to_string(), 4))?;
        pool.close().await;
        Ok::<_, CommandFailure>(requests)
    });

    match result {
        Ok(requests) => CommandResult::success_with_data(
            "list",
            format!("{} request(s)", requests.len()),
            Some(json!({ "requests": requests })),
        ),
        Err(failure) => failure.into_result("list"),
    }
}

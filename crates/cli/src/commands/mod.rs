pub mod attainment;
pub mod inspect;
pub mod migrate;
pub mod submit;
pub mod transition;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;
use signoff_core::audit::InMemoryAuditSink;
use signoff_core::capability::StaticCapabilityResolver;
use signoff_core::config::AppConfig;
use signoff_core::domain::approval::ApprovalRequest;
use signoff_core::errors::{ApplicationError, DomainError, InterfaceError};
use signoff_core::hooks::PostApprovalHook;
use signoff_core::workflow::{ApprovalService, ApprovalStateMachine, WorkflowError};
use signoff_db::{connection, migrations, DbPool, SqlAuditRepository, SqlRequestRepository};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            hint: None,
            correlation_id: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            hint: None,
            correlation_id: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn from_failure(command: &str, failure: CommandFailure, correlation_id: Option<&str>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(failure.error_class.to_string()),
            message: failure.message,
            hint: failure.hint.map(str::to_string),
            correlation_id: correlation_id.map(str::to_string),
            data: None,
        };
        Self { exit_code: failure.exit_code, output: serialize_payload(payload) }
    }
}

/// Error class, message and exit code of a failed command. Workflow failures
/// also carry a user-safe hint.
#[derive(Debug)]
pub struct CommandFailure {
    pub error_class: &'static str,
    pub message: String,
    pub exit_code: u8,
    pub hint: Option<&'static str>,
}

impl CommandFailure {
    pub fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code, hint: None }
    }

    fn with_hint(mut self, hint: &'static str) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn into_result(self, command: &str) -> CommandResult {
        CommandResult::from_failure(command, self, None)
    }

    pub fn into_correlated_result(self, command: &str, correlation_id: &str) -> CommandResult {
        CommandResult::from_failure(command, self, Some(correlation_id))
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new("invalid_input", message, 10)
    }
}

impl From<ApplicationError> for CommandFailure {
    fn from(error: ApplicationError) -> Self {
        let message = error.to_string();
        let hint = InterfaceError::from(&error).user_message();
        let failure = match error {
            ApplicationError::Domain(DomainError::Workflow(WorkflowError::InvalidState {
                ..
            })) => Self::new("invalid_state", message, 6),
            ApplicationError::Domain(DomainError::Workflow(WorkflowError::PermissionDenied {
                ..
            })) => Self::new("permission_denied", message, 7),
            ApplicationError::Domain(DomainError::InvariantViolation(_)) => {
                Self::invalid_input(message)
            }
            ApplicationError::NotFound(_) => Self::new("not_found", message, 8),
            ApplicationError::Conflict { .. } => Self::new("conflict", message, 9),
            ApplicationError::Persistence(_) => Self::new("db_persistence", message, 4),
            ApplicationError::Configuration(_) => Self::new("config_validation", message, 2),
        };
        failure.with_hint(hint)
    }
}

/// Runs `work` on a fresh current-thread runtime.
pub fn block_on<T, F>(work: F) -> Result<T, CommandFailure>
where
    F: Future<Output = Result<T, CommandFailure>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandFailure::new(
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        },
    )?;
    runtime.block_on(work)
}

/// Connects with the configured settings and brings the schema up to date.
pub async fn open_pool(config: &AppConfig) -> Result<DbPool, CommandFailure> {
    let pool = connection::connect_from_config(&config.database)
        .await
        .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), 4))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| CommandFailure::new("migration", error.to_string(), 5))?;
    Ok(pool)
}

pub type CliApprovalService = ApprovalService<
    SqlRequestRepository,
    StaticCapabilityResolver,
    InMemoryAuditSink,
    LoggingPostApprovalHook,
>;

/// Logs final approvals; downstream recomputation is triggered from the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingPostApprovalHook;

impl PostApprovalHook for LoggingPostApprovalHook {
    fn on_finally_approved(&self, request: &ApprovalRequest) {
        info!(
            event_name = "workflow.post_approval",
            request_id = %request.id,
            kind = request.kind.as_str(),
            "request finally approved"
        );
    }
}

/// Service wired to SQLite and the configured role grants. Applied transitions
/// are written with their note by the repository; refused attempts collect in
/// the returned sink until [`persist_rejections`] writes them.
pub fn approval_service(config: &AppConfig, pool: &DbPool) -> (CliApprovalService, InMemoryAuditSink) {
    let resolver = StaticCapabilityResolver::from_config(&config.roles.grants);
    let machine = ApprovalStateMachine::new(resolver, config.workflow.policy());
    let audit = InMemoryAuditSink::default();
    let service = ApprovalService::new(
        SqlRequestRepository::new(pool.clone()),
        machine,
        audit.clone(),
        LoggingPostApprovalHook,
    );
    (service, audit)
}

/// Best effort: a refused attempt changed nothing, so failing to record it
/// must not replace the refusal the caller sees.
pub async fn persist_rejections(pool: &DbPool, audit: &InMemoryAuditSink, correlation_id: &str) {
    let events = audit.events();
    if events.is_empty() {
        return;
    }

    if let Err(error) = SqlAuditRepository::new(pool.clone()).append_all(&events).await {
        warn!(
            event_name = "audit.persist_failed",
            correlation_id,
            dropped = events.len(),
            error = %error,
            "failed to record refused attempts"
        );
    }
}

pub fn new_correlation_id() -> String {
    format!("cli-{}", uuid::Uuid::new_v4())
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use signoff_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use tracing::Level;

use commands::attainment::AttainmentArgs;
use commands::inspect::{ListArgs, ShowArgs};
use commands::submit::SubmitArgs;
use commands::transition::{TransitionArgs, TransitionRequest};
use commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "signoff",
    about = "Two-level approval workflow and outcome attainment CLI",
    long_about = "Submit and move leave / CLO-PLO mapping requests through first-line and second-line approval, inspect their audit trail, and compute CLO/PLO/PEO attainment.",
    after_help = "Examples:\n  signoff submit --id LV-1 --subject emp-1 --approver mgr-1\n  signoff first-approve --id LV-1 --actor mgr-1\n  signoff second-approve --id LV-1 --actor hr-1 --as-role hr_manager\n  signoff attainment --input scores.json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to signoff.toml or config/signoff.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Create a request in the submitted state")]
    Submit(SubmitArgs),
    #[command(about = "Record the first-line approval")]
    FirstApprove(TransitionArgs),
    #[command(about = "Record the second-line (final) approval")]
    SecondApprove {
        #[command(flatten)]
        target: TransitionArgs,
        #[arg(long, help = "Second-line role to act in: hr_manager | administration_manager")]
        as_role: Option<String>,
    },
    #[command(about = "Refuse a submitted or first-approved request")]
    Refuse {
        #[command(flatten)]
        target: TransitionArgs,
        #[arg(long, help = "Reason recorded with the refusal")]
        reason: Option<String>,
    },
    #[command(about = "Cancel a submitted or first-approved request")]
    Cancel(TransitionArgs),
    #[command(about = "Show a request and its audit trail")]
    Show(ShowArgs),
    #[command(about = "List requests, optionally filtered by state")]
    List(ListArgs),
    #[command(about = "Compute CLO/PLO/PEO attainment from a JSON input file")]
    Attainment(AttainmentArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Migrate => "migrate",
            Self::Submit(_) => "submit",
            Self::FirstApprove(_) => "first-approve",
            Self::SecondApprove { .. } => "second-approve",
            Self::Refuse { .. } => "refuse",
            Self::Cancel(_) => "cancel",
            Self::Show(_) => "show",
            Self::List(_) => "list",
            Self::Attainment(_) => "attainment",
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let result = execute(cli);

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn execute(cli: Cli) -> CommandResult {
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                cli.command.name(),
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config.logging);

    dispatch(&config, cli.command)
}

fn dispatch(config: &AppConfig, command: Command) -> CommandResult {
    match command {
        Command::Migrate => commands::migrate::run(config),
        Command::Submit(args) => commands::submit::run(config, args),
        Command::FirstApprove(target) => {
            commands::transition::run(config, target, TransitionRequest::FirstApprove)
        }
        Command::SecondApprove { target, as_role } => {
            commands::transition::run(config, target, TransitionRequest::SecondApprove { as_role })
        }
        Command::Refuse { target, reason } => {
            commands::transition::run(config, target, TransitionRequest::Refuse { reason })
        }
        Command::Cancel(target) => {
            commands::transition::run(config, target, TransitionRequest::Cancel)
        }
        Command::Show(args) => commands::inspect::show(config, args),
        Command::List(args) => commands::inspect::list(config, args),
        Command::Attainment(args) => commands::attainment::run(config, args),
    }
}

/// Logs go to stderr so stdout carries only the JSON command outcome.
pub fn init_logging(logging: &LoggingConfig) {
    let level = log_level(&logging.level);

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when commands run inside tests.
    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

/// Unknown levels fall back to `info`.
fn log_level(raw: &str) -> Level {
    raw.trim().parse::<Level>().unwrap_or(Level::INFO)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tracing::Level;

    use super::{log_level, Cli, Command};

    #[test]
    fn log_levels_parse_case_insensitively_and_default_to_info() {
        assert_eq!(log_level("WARN"), Level::WARN);
        assert_eq!(log_level(" debug "), Level::DEBUG);
        assert_eq!(log_level("trace"), Level::TRACE);
        assert_eq!(log_level("verbose"), Level::INFO);
    }

    #[test]
    fn second_approve_parses_role_and_target() {
        let cli = Cli::try_parse_from([
            "signoff",
            "second-approve",
            "--id",
            "LV-1",
            "--actor",
            "hr-1",
            "--as-role",
            "hr_manager",
        ])
        .expect("valid arguments");

        match cli.command {
            Command::SecondApprove { target, as_role } => {
                assert_eq!(target.id, "LV-1");
                assert_eq!(target.actor, "hr-1");
                assert_eq!(as_role.as_deref(), Some("hr_manager"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_config_flag_is_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from(["signoff", "list", "--state", "submitted", "--config", "x.toml"])
            .expect("valid arguments");
        assert_eq!(cli.config.as_deref().and_then(|path| path.to_str()), Some("x.toml"));
        assert_eq!(cli.command.name(), "list");
    }

    #[test]
    fn cancel_help_covers_first_approved_requests() {
        let help = <Cli as clap::CommandFactory>::command()
            .find_subcommand("cancel")
            .and_then(|command| command.get_about().map(ToString::to_string))
            .unwrap_or_default();
        assert_eq!(help, "Cancel a submitted or first-approved request");
    }

    #[test]
    fn cancel_requires_an_actor() {
        assert!(Cli::try_parse_from(["signoff", "cancel", "--id", "LV-1"]).is_err());
    }
}

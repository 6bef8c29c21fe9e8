use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use serde_json::json;
use signoff_core::attainment::{rollup::rollup, RollupInput};
use signoff_core::config::AppConfig;
use tracing::info;

use crate::commands::{CommandFailure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct AttainmentArgs {
    #[arg(long, help = "JSON file with clo_scores, clo_plo and plo_peo entries")]
    pub input: PathBuf,
}

/// CLO -> PLO -> PEO rollup against the configured targets. Needs no database.
pub fn run(config: &AppConfig, args: AttainmentArgs) -> CommandResult {
    let input = match read_input(&args.input) {
        Ok(input) => input,
        Err(failure) => return failure.into_result("attainment"),
    };

    let targets = config.attainment.targets();
    let report = rollup(&input, &targets);
    let unmet = report
        .clos
        .iter()
        .chain(&report.plos)
        .chain(&report.peos)
        .filter(|outcome| !outcome.met)
        .count();

    info!(
        event_name = "attainment.rollup",
        clos = report.clos.len(),
        plos = report.plos.len(),
        peos = report.peos.len(),
        unmet,
        "computed outcome attainment"
    );

    CommandResult::success_with_data(
        "attainment",
        format!(
            "{} CLO(s), {} PLO(s), {} PEO(s); {unmet} below target",
            report.clos.len(),
            report.plos.len(),
            report.peos.len()
        ),
        Some(json!({ "targets": targets, "report": report })),
    )
}

fn read_input(path: &Path) -> Result<RollupInput, CommandFailure> {
    let raw = fs::read_to_string(path).map_err(|error| {
        CommandFailure::invalid_input(format!("could not read `{}`: {error}", path.display()))
    })?;
    serde_json::from_str::<RollupInput>(&raw).map_err(|error| {
        CommandFailure::invalid_input(format!("could not parse `{}`: {error}", path.display()))
    })
}

use signoff_core::config::AppConfig;

use crate::commands::{block_on, open_pool, CommandFailure, CommandResult};

pub fn run(config: &AppConfig) -> CommandResult {
    let result = block_on(async {
        let pool = open_pool(config).await?;
        pool.close().await;
        Ok::<(), CommandFailure>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure.into_result("migrate"),
    }
}

//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `checkout_core` linkage with a deterministic probe.
//! - Optionally dump every order of an existing database file as JSON.
//!
//! Usage: `checkout_cli [DB_PATH]`. Set `CHECKOUT_LOG_DIR` (absolute path)
//! and optionally `CHECKOUT_LOG_LEVEL` to enable file logging.

use checkout_core::db::open_db;
use checkout_core::{
    default_log_level, init_logging, OrderRepository, SqliteOrderRepository,
};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var("CHECKOUT_LOG_DIR") {
        let level = std::env::var("CHECKOUT_LOG_LEVEL")
            .unwrap_or_else(|_| default_log_level().to_string());
        if let Err(err) = init_logging(&level, &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    println!("checkout_core ping={}", checkout_core::ping());
    println!("checkout_core version={}", checkout_core::core_version());

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };

    match dump_orders(Path::new(&db_path)) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("event=cli_dump module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Renders every stored order as pretty JSON.
///
/// The file must already exist; `open_db` would otherwise create it.
fn dump_orders(db_path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    if !db_path.is_file() {
        return Err(format!("database file `{}` does not exist", db_path.display()).into());
    }

    let conn = open_db(db_path)?;
    let repo = SqliteOrderRepository::try_new(&conn)?;
    let orders = repo.find_all()?;
    Ok(serde_json::to_string_pretty(&orders)?)
}

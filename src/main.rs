use std::path::Path;
use std::process::ExitCode;

use finance_tracker::config::Config;
use finance_tracker::finance::FinanceService;
use finance_tracker::{api, db};

#[rocket::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    config.logging.init();

    if let Err(err) = run(config).await {
        tracing::error!(error = %err, "server stopped");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.database.path != ":memory:" {
        if let Some(dir) = Path::new(&config.database.path).parent() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let pool = db::init_pool(&config.database)?;
    if config.database.seed_default_categories {
        let conn = pool.get()?;
        FinanceService::new(&conn).seed_default_categories()?;
    }

    tracing::info!(
        address = %config.server.address,
        port = config.server.port,
        database = %config.database.path,
        "starting finance tracker"
    );
    let _ = api::build(&config, pool).launch().await?;
    Ok(())
}

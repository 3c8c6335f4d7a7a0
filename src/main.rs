pub mod models {
    pub mod records;
}

pub mod cli;
pub mod config;
pub mod db {
    pub mod aggregate;
    pub mod factory;
    pub mod models;
    pub mod schema;
    pub mod source;
}
pub mod engine {
    pub mod alerts;
    pub mod bucket;
    pub mod energy;
    pub mod segment;
}
pub mod env_file;
pub mod error;
pub mod schema;
pub mod store;
pub mod utils;
pub mod services {
    pub mod alerts;
    pub mod energy;
    pub mod job;
    pub mod program_history;
    pub mod runner;
    pub mod sensor_stats;
    pub mod utilization;
}

use crate::cli::{Cli, Command, USAGE};
use crate::config::Config;
use crate::db::aggregate::PgAggregateStore;
use crate::db::factory::PgStoreFactory;
use crate::services::job::{JobContext, JobKind, JobReport, JobStatus};
use crate::services::runner;
use chrono::Utc;
use log::{error, info};

pub fn run(command: Command) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (sensor={}, session_gap={}s, program_var={}, alarm_var={}, motors={}, run_migrations={})",
        cfg.sensor.name,
        cfg.session_gap_secs,
        cfg.program_variable_id,
        cfg.alarm_variable_id,
        cfg.energy_motors.iter().map(|m| m.name.as_str()).collect::<Vec<_>>().join(","),
        cfg.run_migrations
    );

    // 2) Apply pending aggregation schema migrations
    if cfg.run_migrations {
        PgAggregateStore::connect(&cfg.aggregate_database_url)?.apply_migrations()?;
    }

    // 3) Dispatch; every job opens its own connections through the factory
    let factory = PgStoreFactory::from_config(&cfg);
    let ctx = JobContext {
        config: &cfg,
        now: Utc::now(),
    };
    let reports = match command {
        Command::Job(job, selection) => runner::run_jobs(&factory, &ctx, &[job], &selection),
        Command::All(selection) => runner::run_jobs(&factory, &ctx, &JobKind::ALL, &selection),
        Command::Daily => {
            let today = cfg.runner_today.unwrap_or_else(|| ctx.now.date_naive());
            runner::run_daily(&factory, &ctx, today)?
        }
        Command::Status => {
            for mark in runner::data_status(&factory)? {
                info!(
                    "{}: {} .. {} ({} rows, updated {})",
                    mark.table_name,
                    mark.first_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
                    mark.last_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
                    mark.record_count,
                    mark.last_updated.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
                );
            }
            Vec::new()
        }
    };

    check_reports(&reports)
}

fn check_reports(reports: &[JobReport]) -> Result<(), String> {
    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.status == JobStatus::Failed)
        .map(|r| r.job.name())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} job(s) failed: {}", failed.len(), failed.join(", ")))
    }
}

fn main() {
    let cli: Cli = match cli::parse_args(std::env::args_os().skip(1)) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("fatal: {}\n\n{}", err, USAGE);
            std::process::exit(1);
        }
    };
    let loaded_env = match env_file::load(cli.env_file) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "machine-etl {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

use std::process::ExitCode;

use anyhow::{Context, Result};
use config::{Config, Settings};
use env_logger::Env;
use log::{debug, error, info, warn};

use crate::cli::Cli;
use crate::net_utils::privilege;

mod cli;
mod config;
mod core;
mod model;
mod net_utils;
mod testfile;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let filter = match cli.debug {
        true => "debug",
        false => "info",
    };
    env_logger::init_from_env(Env::default().default_filter_or(filter));
    info!(
        "{} v{} IP Connectivity Checker",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let privileged = privilege::has_raw_socket_privilege();
    if !privileged {
        warn!("Not running as root: low local ports are rejected and UDP tests cannot detect ICMP errors");
    }

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let settings = Settings::resolve(&cli, config)?;
    debug!("{settings:?}");
    info!("Running tests for host '{}'", settings.host);

    let mut definitions = testfile::load(&settings.tests, &settings.host)
        .with_context(|| format!("Failed to load tests from {}", settings.tests.display()))?;
    if !privileged {
        for definition in &definitions {
            definition.check_unprivileged()?;
        }
    }

    let summary = core::run(settings.run_context(privileged), &mut definitions).await?;

    for definition in definitions.iter().filter(|d| d.attempt) {
        match definition.passed() {
            true => info!("{definition}"),
            false => error!("{definition}"),
        }
        // 単一のテストでも拒否の理由はSubTestにしか残らない
        for sub_test in definition
            .sub_tests
            .iter()
            .filter(|s| s.sub_ref.is_some() || s.refused())
        {
            debug!("  {sub_test}");
        }
    }
    info!(
        "== {} of {} tests passed ==",
        summary.passed, summary.attempted
    );

    if let Some(output) = &settings.output {
        testfile::write(output, &definitions)
            .with_context(|| format!("Failed to write results to {}", output.display()))?;
        info!("Results written to {}", output.display());
    }

    Ok(match summary.all_passed() {
        true => ExitCode::SUCCESS,
        false => ExitCode::FAILURE,
    })
}

//! `socwatch`: battery state-of-charge monitor for Sunsynk inverter fleets.
//!
//! Entry point: CLI parsing, configuration, tracing, and dispatch to the
//! monitoring loop or one of the one-shot commands.

mod cli;
mod error;
mod logging;
mod sink;

use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

use chrono::Local;
use clap::Parser;
use tabled::{Table, Tabled, settings::Style};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use socwatch_config::{Config, ConfigError};
use socwatch_core::{FleetState, Monitor, RetentionSweep, SheetsPublisher};

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::sink::Sink;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let path = socwatch_config::config_path(cli.global.config.as_deref());
    let cfg = socwatch_config::load_config(&path).map_err(config_error(&path))?;

    if let Err(e) = std::fs::create_dir_all(&cfg.log_dir) {
        eprintln!("cannot create log directory {}: {e}", cfg.log_dir.display());
    }
    let _log_guard = logging::init(cli.global.verbose, &cfg.log_dir);
    debug!(config = %path.display(), command = ?cli.command, "dispatching command");

    match cli.command {
        Command::Run => {
            let monitor = build_monitor(&cfg, &path, publishing_sink(&cfg, &path)?)?;
            run_until_shutdown(&monitor).await;
            Ok(())
        }
        Command::Once => {
            let monitor = build_monitor(&cfg, &path, publishing_sink(&cfg, &path)?)?;
            once(&monitor).await
        }
        Command::Discover => {
            let monitor = build_monitor(&cfg, &path, Sink::Disabled)?;
            discover(&monitor).await
        }
        Command::Sweep => {
            let sweep = RetentionSweep::new(socwatch_config::retention_rules(&cfg));
            let report = sweep.sweep(SystemTime::now());
            print_output(&format!(
                "removed {} expired file(s), {} failure(s)",
                report.removed, report.failed
            ));
            Ok(())
        }
    }
}

fn config_error(path: &Path) -> impl Fn(ConfigError) -> CliError + '_ {
    move |source| CliError::Config {
        path: path.display().to_string(),
        source,
    }
}

fn publishing_sink(cfg: &Config, path: &Path) -> Result<Sink, CliError> {
    match socwatch_config::sheets_config(cfg).map_err(config_error(path))? {
        Some(sheets) => Ok(Sink::Sheets(SheetsPublisher::new(sheets)?)),
        None => {
            warn!("sheets publishing disabled");
            Ok(Sink::Disabled)
        }
    }
}

fn build_monitor(cfg: &Config, path: &Path, sink: Sink) -> Result<Monitor<Sink>, CliError> {
    let sites = socwatch_config::load_sites(&cfg.sites_file).map_err(config_error(path))?;
    if sites.is_empty() {
        return Err(CliError::NoSites {
            path: cfg.sites_file.display().to_string(),
        });
    }
    info!(sites = sites.len(), "loaded site list");

    let monitor_config = socwatch_config::monitor_config(cfg, sites).map_err(config_error(path))?;
    Ok(Monitor::new(monitor_config, sink)?)
}

// ── Commands ─────────────────────────────────────────────────────────

async fn run_until_shutdown(monitor: &Monitor<Sink>) {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        trigger.cancel();
    });

    monitor.run(cancel).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn once(monitor: &Monitor<Sink>) -> Result<(), CliError> {
    let now = Local::now().naive_local();
    let mut state = monitor.restore(now);
    let report = monitor.tick(&mut state, now).await?;

    print_output(&format!(
        "fetched {} site(s), analysed {}, published: {}",
        report.fetched,
        report.analysed,
        if report.published { "yes" } else { "no" }
    ));
    Ok(())
}

async fn discover(monitor: &Monitor<Sink>) -> Result<(), CliError> {
    let now = Local::now().naive_local();
    let mut state = None;
    monitor.refresh(&mut state, now).await;

    let Some(state) = state else {
        return Err(CliError::Api {
            message: "discovery returned no sites".into(),
        });
    };
    print_output(&render_validations(&state));
    Ok(())
}

// ── Output ───────────────────────────────────────────────────────────

#[derive(Tabled)]
struct ValidationRow {
    #[tabled(rename = "Site")]
    site: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Inverter")]
    inverter: String,
    #[tabled(rename = "Type")]
    kind: String,
}

fn render_validations(state: &FleetState) -> String {
    let rows: Vec<ValidationRow> = state
        .validations
        .iter()
        .map(|(name, v)| ValidationRow {
            site: name.clone(),
            id: v.site_id.to_string(),
            status: if v.is_valid() {
                "valid".into()
            } else if v.exists {
                "no eligible inverter".into()
            } else {
                "not found".into()
            },
            inverter: v.inverter_sn.clone().unwrap_or_else(|| "-".into()),
            kind: v.inverter_type.clone().unwrap_or_else(|| "-".into()),
        })
        .collect();

    format!(
        "{}\n{} of {} configured site(s) valid, {} site(s) upstream",
        Table::new(rows).with(Style::rounded()),
        state.valid_count(),
        state.validations.len(),
        state.snapshot.len()
    )
}

fn print_output(output: &str) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

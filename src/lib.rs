// SST compliance diagnosis
// Main library entry point

pub mod api;
pub mod catalog;
pub mod config;
pub mod contact;
pub mod engine;
pub mod flow;
pub mod models;
pub mod risk;
pub mod tui;
pub mod utils;

use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Initialize logging system with dual format (JSON + human-readable)
fn init_logging(with_stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = utils::path_resolver::resolve_log_folder()?;
    std::fs::create_dir_all(&log_dir)?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");

    // JSON log file for structured parsing
    let json_log_file = log_dir.join(format!("diagnostico-{}.log", timestamp));

    // Human-readable log file (.txt)
    let txt_log_file = log_dir.join(format!("diagnostico-{}.txt", timestamp));

    // stdout is only chained outside the TUI; raw-mode output would corrupt the screen.
    let mut dispatch = fern::Dispatch::new().level(log::LevelFilter::Debug);

    if with_stdout {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    out.finish(format_args!("{}", human_line(&message.to_string(), record)));
                })
                .chain(std::io::stdout()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                        utils::logging::active_run().as_deref(),
                    );
                    out.finish(format_args!("{}\n", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    out.finish(format_args!("{}\n", human_line(&message.to_string(), record)));
                })
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch.apply()?;

    log::info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}

fn human_line(message: &str, record: &log::Record<'_>) -> String {
    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let (phase, step, cleaned_message) = utils::logging::parse_log_metadata(message);
    utils::logging::format_human_readable_log(
        &timestamp_local.to_string(),
        record.level(),
        record.target(),
        &cleaned_message,
        phase.as_deref(),
        step.as_deref(),
    )
}

fn load_settings(config_path: Option<PathBuf>) -> anyhow::Result<(config::AppConfig, Arc<catalog::Catalog>)> {
    let path = config_path.unwrap_or_else(utils::path_resolver::default_config_file);
    info!(
        "[PHASE: initialization] [STEP: config] Configuration file: {:?}",
        path
    );
    let (cfg, catalog) = config::load_all(Some(Path::new(&path)))?;
    info!(
        "[PHASE: initialization] [STEP: config] API base URL: {}",
        cfg.api_base_url
    );
    Ok((cfg, Arc::new(catalog)))
}

/// Interactive terminal wizard.
pub fn run_tui(config_path: Option<PathBuf>) {
    // Initialize logging (no stdout to avoid corrupting the TUI)
    if let Err(e) = init_logging(false) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        "[PHASE: initialization] Diagnosis wizard starting at {}",
        chrono::Utc::now()
    );

    let (cfg, catalog) = match load_settings(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("[PHASE: initialization] [STEP: config] {:?}", e);
            eprintln!("Diagnóstico error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = tui::run(&cfg, catalog) {
        error!("[PHASE: tui] [STEP: fatal] TUI exited with error: {:?}", e);
        eprintln!("Diagnóstico error: {}", e);
    }
}

/// Non-interactive TUI smoke mode (for automated checks).
/// Renders a single frame and exits.
pub fn run_tui_smoke(target: Option<String>, config_path: Option<PathBuf>) {
    // Initialize logging (no stdout to avoid corrupting the terminal)
    if let Err(e) = init_logging(false) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        "[PHASE: initialization] TUI smoke starting at {}",
        chrono::Utc::now()
    );

    let result = load_settings(config_path).and_then(|(cfg, catalog)| {
        let target = target.as_deref().unwrap_or("welcome");
        tui::smoke(&cfg, catalog, target)
    });
    if let Err(e) = result {
        error!(
            "[PHASE: tui] [STEP: smoke] TUI smoke exited with error: {:?}",
            e
        );
        eprintln!("Diagnóstico error: {:#}", e);
        std::process::exit(1);
    }
}

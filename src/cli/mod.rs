mod serve;
mod servers;
mod sync;

use anyhow::Result;
use console::style;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::settings::{Settings, parse_log_level};
use crate::core::terminal::{self, print_error, print_warn};

fn print_help() {
    terminal::print_banner();

    println!(" {}", style("Commands").bold().underlined());
    for (name, about) in [
        ("serve", "Run the API, live channel and task runner"),
        ("sync", "Reconcile the fleet config file into the database"),
        ("servers", "List registered servers"),
        ("help", "Show this message"),
    ] {
        println!("   {:<10} {}", style(name).cyan().bold(), style(about).dim());
    }

    println!("\n {}", style("Options").bold().underlined());
    for (flag, about) in [
        ("--api-host <host>", "Listen address (default 127.0.0.1)"),
        ("--api-port <port>", "Listen port (default 8000)"),
        ("--data-dir <dir>", "Database and config directory"),
        ("--config <file>", "Fleet config file (default <data-dir>/config.json)"),
        ("--metrics-interval <secs>", "Live metrics push interval (default 5)"),
        ("--log-capacity <n>", "Command log entries kept per server (default 500)"),
        ("--queue-capacity <n>", "Task queue depth (default 1024)"),
        ("--log-level <level>", "trace, debug, info, warn or error"),
    ] {
        println!("   {:<28} {}", style(flag).green(), style(about).dim());
    }

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("switchboard").green()
    );
}

/// Applies every recognised `--flag value` pair on top of `settings`.
/// Unparseable values keep the previous setting; unknown flags are skipped.
pub(crate) fn parse_settings_flags(args: &[String], start: usize, mut settings: Settings) -> Settings {
    let mut i = start;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--api-host", Some(v)) => {
                settings.api_host = v.clone();
                i += 2;
            }
            ("--api-port", Some(v)) => {
                settings.api_port = v.parse().unwrap_or(settings.api_port);
                i += 2;
            }
            ("--data-dir", Some(v)) => {
                settings.data_dir = PathBuf::from(v);
                i += 2;
            }
            ("--config", Some(v)) => {
                settings.config_path = Some(PathBuf::from(v));
                i += 2;
            }
            ("--metrics-interval", Some(v)) => {
                if let Ok(secs) = v.parse::<u64>()
                    && secs > 0
                {
                    settings.metrics_interval = Duration::from_secs(secs);
                }
                i += 2;
            }
            ("--log-capacity", Some(v)) => {
                settings.command_log_capacity = v.parse().unwrap_or(settings.command_log_capacity);
                i += 2;
            }
            ("--queue-capacity", Some(v)) => {
                settings.task_queue_capacity = v.parse().unwrap_or(settings.task_queue_capacity);
                i += 2;
            }
            ("--log-level", Some(v)) => {
                match parse_log_level(v) {
                    Some(level) => settings.log_level = level,
                    None => print_warn(&format!("Unknown log level '{}', keeping {}", v, settings.log_level)),
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    settings
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let settings = parse_settings_flags(&args, 2, Settings::default());
    match args[1].as_str() {
        "serve" => serve::run_serve(settings).await,
        "sync" => sync::run_sync(&settings).await,
        "servers" => servers::run_list(&settings).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        cmd => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}

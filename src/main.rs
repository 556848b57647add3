mod config;
mod demo;
mod error;
mod event;
mod github;
mod model;
mod notify;
mod reconcile;
mod timer;
mod tracker;
mod tui;
mod watch;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::demo::{DemoApi, demo_config};
use crate::github::GithubApi;
use crate::tui::Dashboard;
use crate::watch::WatchList;

#[derive(Parser, Debug, Clone)]
#[command(name = "prowatch", version, about = "TUI review dashboard for GitHub pull requests")]
struct CliArgs {
    /// Path to a config file (default: ~/.config/prowatch/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run against scripted fake data (no GitHub token required).
    #[arg(long)]
    demo: bool,

    /// Append tracing output to this file (stdout belongs to the TUI).
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Disable OS notifications on ready-to-merge transitions.
    #[arg(long)]
    no_notifications: bool,
}

fn init_tracing(log_file: Option<&PathBuf>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .unwrap_or_else(|e| {
                    eprintln!("cannot open log file {}: {e}", path.display());
                    std::process::exit(1);
                });
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::sink)
                .init();
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();
    init_tracing(args.log_file.as_ref());

    let (tx, rx) = mpsc::unbounded_channel();

    if args.demo {
        tokio::spawn(WatchList::new(DemoApi::new(), demo_config(), tx).run());
    } else {
        let config = config::load(args.config.as_deref()).unwrap_or_else(|e| {
            eprintln!("{e}");
            eprintln!();
            eprintln!("{}", config::sample());
            std::process::exit(1);
        });
        let token = config.token().unwrap_or_else(|e| {
            eprintln!("{e}");
            std::process::exit(1);
        });
        let api = GithubApi::new(&token).unwrap_or_else(|e| {
            eprintln!("{e}");
            std::process::exit(1);
        });
        tokio::spawn(WatchList::new(api, config, tx).run());
    }

    if let Err(e) = tui::run(rx, Dashboard::new(), !args.no_notifications) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

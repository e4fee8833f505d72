//! Headless shell for shopbell.
//! Watches an HTML snapshot of a seller console as if it were the live page
//! and prints bridge traffic to stdout, one console line per report.

mod paths;

use std::io::{self, BufRead};
use std::panic::{self, Location};
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use shopbell_core::bridge::ConsoleBridge;
use shopbell_core::document::FileDocument;
use shopbell_core::platform::AppPaths;
use shopbell_core::protocol::parse_console_line;
use shopbell_core::report::panic_message;
use shopbell_core::{Adapter, Config, HostEvent};

use crate::paths::HeadlessPaths;

#[derive(Parser)]
#[command(
    name = "shopbell",
    version,
    about = "Unread-message monitor for seller-console pages"
)]
struct Cli {
    /// Use this config file instead of the per-user one
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one platform adapter against an HTML file until Ctrl-C
    Watch {
        /// Platform key from the config, e.g. doudian
        platform: String,
        /// HTML snapshot of the page, re-read on every tick
        page: PathBuf,
    },
    /// List configured platforms
    Platforms,
    /// Decode bridge console lines from stdin
    Decode,
}

fn main() {
    env_logger::init();
    log_panics();

    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Route panic reports through the logger. Panics raised by page or bridge
/// code are caught per tick and must not dump a report to stderr each time.
fn log_panics() {
    panic::set_hook(Box::new(|info| {
        error!(
            "{}",
            panic_line(&panic_message(info.payload()), info.location())
        );
    }));
}

fn panic_line(message: &str, location: Option<&Location<'_>>) -> String {
    match location {
        Some(location) => format!(
            "panicked at {}:{}: {}",
            location.file(),
            location.line(),
            message
        ),
        None => format!("panicked: {message}"),
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = HeadlessPaths::with_config(cli.config);

    match cli.command {
        Commands::Watch { platform, page } => watch(&paths, &platform, page),
        Commands::Platforms => list_platforms(&paths),
        Commands::Decode => decode(io::stdin().lock()),
    }
}

fn load_config(paths: &HeadlessPaths) -> Result<Config> {
    Config::load_with(paths)
        .with_context(|| format!("loading config from {}", paths.config_path().display()))
}

fn watch(paths: &HeadlessPaths, platform: &str, page: PathBuf) -> Result<()> {
    let config = load_config(paths)?;
    let platform_config = config.platform(platform)?;
    if !platform_config.enabled {
        bail!("platform '{platform}' is disabled in the config");
    }
    if !page.exists() {
        warn!("page {} does not exist yet; ticks will be skipped", page.display());
    }
    if let Some(url) = &platform_config.chat_url {
        info!("watching {} ({}) as {}", platform_config.name, url, page.display());
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("received signal, stopping adapter");
            running.store(false, Ordering::SeqCst);
        })
        .context("setting Ctrl-C handler")?;
    }

    // One page, one adapter, one single-threaded event loop.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("building runtime")?;

    runtime.block_on(async {
        let adapter = Adapter::start(
            platform,
            platform_config,
            Arc::new(FileDocument::new(page)),
            Arc::new(ConsoleBridge::stdout()),
        )?;

        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        adapter.stop();
        let status = adapter.status();
        info!(
            "adapter stopped after {} ticks ({} delivered, {} dropped)",
            status.message_ticks, status.reports_delivered, status.reports_dropped
        );
        Ok::<(), anyhow::Error>(())
    })
}

fn list_platforms(paths: &HeadlessPaths) -> Result<()> {
    let config = load_config(paths)?;
    for (key, platform) in &config.platforms {
        let state = if platform.enabled { "" } else { " (disabled)" };
        println!(
            "{key}\t{}{state}\t{} selectors\t{}",
            platform.name,
            platform.message_selectors.len(),
            platform.chat_url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn decode(input: impl BufRead) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        match parse_console_line(&line) {
            Some(Ok(event)) => println!("{}", describe(&event)),
            Some(Err(e)) => warn!("undecodable bridge line: {e}"),
            None => {}
        }
    }
    Ok(())
}

/// One-line human summary of a host event.
fn describe(event: &HostEvent) -> String {
    match event {
        HostEvent::CurrentUser(identity) => format!(
            "currentuser: {} / {} (user {}, mall {})",
            identity.user_name, identity.mall_name, identity.user_id, identity.mall_id
        ),
        HostEvent::NewMessage(state) if state.has_new_message() => {
            format!("newmessage: {} unread", state.new_message_count())
        }
        HostEvent::NewMessage(_) => "newmessage: no unread".to_string(),
        HostEvent::Other { kind, payload } => format!("{kind}: {payload}"),
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

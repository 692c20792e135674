//! OLED bridge entry point.
//!
//! ```text
//! oled-bridge                      Run the bridge (events on stdin)
//! oled-bridge send "textxy:0,0,Hi" Send one raw command and exit
//! oled-bridge search <query>       Search the web, show the summary
//! oled-bridge --config <path>      Load a custom config TOML
//! oled-bridge --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use oled_core::{Display, SerialConnector, Supervisor, WireCommand, escape_newlines};
use oled_bridge::config::BridgeConfig;
use oled_bridge::search::{SearchClient, format_for_display};
use oled_bridge::service::{BridgeService, shutdown_display};
use oled_bridge::session::LogSurface;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "oled-bridge", about = "Serial OLED display bridge")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "oled-bridge.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Handle session events read as JSON lines from stdin (default).
    Run,
    /// Send one wire command, e.g. `clear` or `textxy:10,10,Hi`.
    Send { raw: String },
    /// Search the web and show the summary on the display.
    Search { query: Vec<String> },
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&BridgeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(cli));
    // Stdin is read on a blocking thread that only returns on input.
    runtime.shutdown_background();
    result
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = BridgeConfig::load(&cli.config);
    config.apply_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("oled-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("serial port: {} @ {} baud", config.serial.port, config.serial.baud_rate);
    info!("display: {}x{}", config.display.width, config.display.height);

    // Parse before touching the device so typos fail fast.
    let command = match cli.command.unwrap_or(Command::Run) {
        Command::Send { raw } => Some(Mode::Send(raw.parse::<WireCommand>()?)),
        Command::Search { query } => Some(Mode::Search(query.join(" "))),
        Command::Run => None,
    };

    let (handle, supervisor) =
        Supervisor::spawn(config.to_supervisor_config(), Arc::new(SerialConnector)).await?;
    let display = Display::new(handle.clone(), config.display.width, config.display.height);

    match command {
        Some(Mode::Send(wire)) => {
            display.send(wire).await?;
            info!("command delivered");
            shutdown_display(&handle).await;
        }
        Some(Mode::Search(query)) => {
            let client = SearchClient::new(&config.search);
            let text = format_for_display(&client.search(&query).await);
            println!("{text}");
            display.show_multiline(&escape_newlines(&text)).await?;
            shutdown_display(&handle).await;
        }
        None => {
            let service = BridgeService::new(config);
            let stop = service.stop_handle();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Ctrl-C received, shutting down");
                stop.store(false, Ordering::SeqCst);
            });

            let stdin = BufReader::new(tokio::io::stdin());
            service.run(display, LogSurface, stdin).await?;
        }
    }

    if let Err(e) = supervisor.await {
        error!("display supervisor task failed: {e}");
    }
    Ok(())
}

enum Mode {
    Send(WireCommand),
    Search(String),
}

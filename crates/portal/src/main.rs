//! skyportal
//!
//! Command-line front end: lists attached portals and sends commands to
//! one of them.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use common::{create_portal_bridge, setup_logging};
use portal::config::{PortalConfig, expand_path};
use portal::usb::{RusbTransport, spawn_portal_worker};
use portal::{PortalClient, SessionHandle};
use protocol::{PortalCommands, format_hex};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "skyportal")]
#[command(author, version, about = "Find and drive USB toy portals")]
#[command(long_about = "
Finds USB toy portals attached to this machine, opens them and sends
command frames. The product-specific command prefix is added
automatically.

EXAMPLES:
    # List attached portals
    skyportal list

    # Light the first portal red
    skyportal color 255 0 0

    # Send raw command bytes to the second portal
    skyportal send --index 1 0x41 0x01

    # Read a status report
    skyportal status --log-level debug

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/skyportal/portal.toml
    3. /etc/skyportal/portal.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached portals
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Open a portal and run the activation handshake
    Activate {
        /// Portal index (defaults to the configured index)
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Turn a portal off
    Deactivate {
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Set the portal light colour
    Color {
        #[arg(short, long)]
        index: Option<usize>,
        red: u8,
        green: u8,
        blue: u8,
    },

    /// Send raw command bytes (hex, e.g. 0x41 01)
    Send {
        #[arg(short, long)]
        index: Option<usize>,
        #[arg(value_parser = parse_hex_byte, required = true)]
        bytes: Vec<u8>,
    },

    /// Request and print one status report
    Status {
        #[arg(short, long)]
        index: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = PortalConfig::default();
        let path = PortalConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        PortalConfig::load(Some(expand_path(path))).context("Failed to load configuration")?
    } else {
        PortalConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.general.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("skyportal v{}", env!("CARGO_PKG_VERSION"));

    let registry = config.registry().context("Invalid registry configuration")?;

    // All USB I/O happens on the worker thread
    let (bridge, worker) = create_portal_bridge();
    let worker_handle = spawn_portal_worker(
        worker,
        RusbTransport::new,
        registry,
        Box::new(PortalCommands),
        config.session_settings(),
    )
    .context("Failed to spawn USB worker thread")?;

    let client = PortalClient::new(bridge, config.operation_timeout());
    let command = args.command.unwrap_or(Command::List { json: false });
    let result = run_command(&client, &config, command).await;

    info!("Shutting down USB subsystem...");
    if let Err(e) = client.shutdown().await {
        // The worker may already be gone if the libusb context failed
        info!("USB worker already stopped: {}", e);
    }
    match worker_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("USB worker failed: {}", e);
            if result.is_ok() {
                return Err(anyhow!("USB subsystem unavailable: {}", e));
            }
        }
        Err(e) => error!("USB worker thread panicked: {:?}", e),
    }

    result
}

async fn run_command(client: &PortalClient, config: &PortalConfig, command: Command) -> Result<()> {
    let commands = PortalCommands;

    match command {
        Command::List { json } => list_portals(client, json).await,

        Command::Activate { index } => {
            let Some(session) = open_portal(client, index.unwrap_or(config.usb.index)).await? else {
                return Ok(());
            };
            println!("Portal activated.");
            close_portal(client, session).await
        }

        Command::Deactivate { index } => {
            with_portal(client, index.unwrap_or(config.usb.index), commands.deactivate()).await
        }

        Command::Color {
            index,
            red,
            green,
            blue,
        } => {
            with_portal(
                client,
                index.unwrap_or(config.usb.index),
                commands.color(red, green, blue),
            )
            .await
        }

        Command::Send { index, bytes } => {
            with_portal(client, index.unwrap_or(config.usb.index), bytes).await
        }

        Command::Status { index } => {
            let Some(session) = open_portal(client, index.unwrap_or(config.usb.index)).await? else {
                return Ok(());
            };
            let result = async {
                client
                    .send(&session, &commands.status())
                    .await
                    .context("Failed to send status request")?;
                client.read(&session).await.context("Failed to read status report")
            }
            .await;

            close_portal(client, session).await?;
            println!("{}", format_hex(&result?));
            Ok(())
        }
    }
}

/// List portals and exit
async fn list_portals(client: &PortalClient, json: bool) -> Result<()> {
    let portals = client.list().await.context("Failed to list portals")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&portals)?);
        return Ok(());
    }

    if portals.is_empty() {
        println!("No portals found.");
    } else {
        println!("Found {} portal(s):\n", portals.len());
        for portal in portals {
            println!(
                "  [{}] {:04x}:{:04x} - {}",
                portal.index,
                portal.vendor_id,
                portal.product_id,
                portal.product_name.as_deref().unwrap_or("Unknown Product")
            );
            println!(
                "      Bus {:03} Device {:03} in={:#04x} out={:#04x} prefix=[{}]{}",
                portal.bus_number,
                portal.device_address,
                portal.params.input_endpoint,
                portal.params.output_endpoint,
                format_hex(&portal.params.command_prefix),
                if portal.params.using_defaults {
                    " (defaults)"
                } else {
                    ""
                }
            );
            println!();
        }
    }

    Ok(())
}

/// Find and open the portal at `index`; prints and returns `None` if absent
async fn open_portal(client: &PortalClient, index: usize) -> Result<Option<SessionHandle>> {
    let Some(portal) = client.find(index).await.context("Failed to search for portals")? else {
        println!("No portal found at index {}.", index);
        return Ok(None);
    };

    let session = client
        .open(&portal)
        .await
        .with_context(|| format!("Failed to open portal {}", index))?;
    Ok(Some(session))
}

async fn close_portal(client: &PortalClient, session: SessionHandle) -> Result<()> {
    client.close(session).await.context("Failed to close portal")
}

/// Open a portal, send one command and close it again
async fn with_portal(client: &PortalClient, index: usize, payload: Vec<u8>) -> Result<()> {
    let Some(session) = open_portal(client, index).await? else {
        return Ok(());
    };

    let sent = client
        .send(&session, &payload)
        .await
        .context("Failed to send command");
    close_portal(client, session).await?;
    sent
}

/// Parse one byte given as hex (`0x1f` or `1f`)
fn parse_hex_byte(s: &str) -> Result<u8, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|_| format!("'{}' is not a hex byte", s))
}

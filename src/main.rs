use anyhow::Context;
use clap::{Parser, Subcommand};
use gesturelink_lib::bus::{ipc, BusRequest};
use gesturelink_lib::config::{self, Config};
use gesturelink_lib::panel::{self, IpcStatusSource, PanelView};
use std::path::PathBuf;
use std::time::Duration;

/// How long the CLI waits for the daemon
const IPC_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(name = "gesturelink")]
#[command(about = "Control a chat-agent web UI with webcam hand gestures")]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ~/.gesturelink/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: page watcher, agents and IPC socket
    Run {
        /// Also print the control panel in this terminal
        #[arg(long)]
        panel: bool,
    },

    /// Show gesture control status from the running daemon
    Status {
        /// Keep polling and print every change
        #[arg(short, long)]
        watch: bool,
    },

    /// Turn gesture control on or off on the active page
    Toggle,

    /// Configuration file commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path
    Path,
    /// Write the default configuration (keeps an existing file unless --force)
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::get_config_path);

    match cli.command {
        Commands::Run { panel } => {
            gesturelink_lib::init_logging();
            let config = config::load_or_default(Some(&config_path));
            gesturelink_lib::run_daemon(config, panel).await
        }
        Commands::Status { watch } => {
            let config = config::load_from_path(&config_path)?;
            status(&config, watch).await
        }
        Commands::Toggle => {
            let config = config::load_from_path(&config_path)?;
            let status =
                ipc::send_request(&config.panel.socket_path(), BusRequest::ToggleGesture, IPC_TIMEOUT)
                    .await?;
            println!("{}", PanelView::from(&status));
            Ok(())
        }
        Commands::Config { action } => config_command(action, &config_path),
    }
}

async fn status(config: &Config, watch: bool) -> anyhow::Result<()> {
    let socket = config.panel.socket_path();

    if !watch {
        let status = ipc::send_request(&socket, BusRequest::GetStatus, IPC_TIMEOUT).await?;
        println!("{}", PanelView::from(&status));
        return Ok(());
    }

    println!("{}\n", panel::gesture_guide(&config.commands));
    let source = IpcStatusSource::new(socket, IPC_TIMEOUT);
    let mut last: Option<PanelView> = None;
    panel::poll(&source, config.panel.poll_interval(), move |view| {
        if last.as_ref() != Some(&view) {
            println!("{}", view);
            last = Some(view);
        }
    })
    .await;
    Ok(())
}

fn config_command(action: ConfigAction, path: &std::path::Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config::save_to_path(&Config::default(), path)?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Show => {
            let config = config::load_from_path(path)?;
            let json = serde_json::to_string_pretty(&config).context("Failed to serialise config")?;
            println!("{}", json);
        }
    }
    Ok(())
}

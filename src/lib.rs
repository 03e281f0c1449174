//! gesturelink - hand-gesture control for browser chat agents
//!
//! Watches the webcam through a hand-landmark detector, turns poses into
//! debounced gestures and types the mapped command into the chat page of
//! the active browser tab.

pub mod agent;
pub mod bus;
pub mod capture;
pub mod cdp;
pub mod config;
pub mod gesture;
pub mod injector;
pub mod pages;
pub mod panel;
pub mod session;

use anyhow::Context;
use bus::Coordinator;
use capture::SidecarBackend;
use config::Config;
use pages::{AgentTemplate, CdpConnector, PageMatcher, PageWatcher};
use std::sync::Arc;
use std::time::Duration;

/// Set up logging to stdout and `~/.gesturelink/logs/gesturelink.log`
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() {
    use tracing_subscriber::prelude::*;

    /// Format timestamps using the system's local time via chrono
    struct LocalTimer;
    impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
        fn format_time(
            &self,
            w: &mut tracing_subscriber::fmt::format::Writer<'_>,
        ) -> std::fmt::Result {
            write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        }
    }

    let log_dir = config::get_config_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("gesturelink.log"))
        .ok();

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    if let Some(file) = log_file {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_timer(LocalTimer)
            .with_ansi(false);
        let stdout_layer = tracing_subscriber::fmt::layer().with_timer(LocalTimer);
        tracing_subscriber::registry()
            .with(filter())
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_timer(LocalTimer)
            .init();
    }
}

/// Run the daemon until Ctrl-C
///
/// Starts the IPC socket and the page watcher; with `show_panel` the status
/// is also printed here whenever it changes.
pub async fn run_daemon(config: Config, show_panel: bool) -> anyhow::Result<()> {
    tracing::info!("gesturelink {} starting", env!("CARGO_PKG_VERSION"));

    let coordinator = Arc::new(Coordinator::new());

    let socket_path = config.panel.socket_path();
    let listener = bus::ipc::bind(&socket_path)?;
    tokio::spawn(bus::ipc::serve(listener, coordinator.clone()));

    let matcher = PageMatcher::new(&config.browser.page_match)
        .with_context(|| format!("Invalid page match pattern {:?}", config.browser.page_match))?;
    let watcher = PageWatcher::new(
        coordinator.clone(),
        Arc::new(SidecarBackend::new(config.detector.clone())),
        Arc::new(CdpConnector),
        matcher,
        AgentTemplate {
            commands: config.commands.clone(),
            gestures: config.gestures.clone(),
            injector: config.injector.clone(),
        },
    );
    tokio::spawn(watcher.run(
        config.browser.cdp_endpoint.clone(),
        Duration::from_millis(config.browser.scan_interval_ms),
    ));

    if show_panel {
        println!("{}", panel::gesture_guide(&config.commands));
        let coordinator = coordinator.clone();
        let interval = config.panel.poll_interval();
        tokio::spawn(async move {
            let mut last: Option<panel::PanelView> = None;
            panel::poll(coordinator.as_ref(), interval, move |view| {
                if last.as_ref() != Some(&view) {
                    println!("{}", view);
                    last = Some(view);
                }
            })
            .await;
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::debug!("Could not remove {}: {}", socket_path.display(), e);
    }
    Ok(())
}

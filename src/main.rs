use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod actions;
mod app;
mod config;
mod console;
mod control;
mod detect;
mod driver;
mod error;
mod keys;
mod monitor;
mod operator;
mod passive;
mod payload;
mod queue;
mod targets;
mod tmux;
mod transcript;

#[cfg(test)]
mod testing;

use actions::Action;
use app::App;
use config::Config;
use console::ConsoleChannel;
use control::{Command, Controller};
use driver::InputDriver;
use monitor::ActiveMonitor;
use operator::{OperatorChannel, Presence};
use passive::PassiveMonitor;
use queue::DeliveryQueue;
use targets::TargetRegistry;
use tmux::TmuxClient;

/// How often the target list in the console is refreshed
const TARGET_REFRESH: Duration = Duration::from_secs(2);

/// The console owns the terminal, so logs go to a file
fn init_logging() -> Result<()> {
    let dir = config::data_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join("relay.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let (config, config_path) = Config::load()?;
    match &config_path {
        Some(path) => tracing::info!(path = %path.display(), "config loaded"),
        None => tracing::info!("no config file, using defaults"),
    }

    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    let client = TmuxClient::new(&config.tmux);
    if !client.is_server_running() {
        let _ = tx.send(Action::Error(
            "tmux server not running; targets appear once it starts".to_string(),
        ));
    }

    let driver = InputDriver::new(Arc::new(client), config.driver.timing());
    let targets = Arc::new(TargetRegistry::new(driver, config.labels.clone()));
    let queue = Arc::new(DeliveryQueue::new());
    let active = Arc::new(ActiveMonitor::new());
    let presence = Arc::new(Presence::default());
    let channel: Arc<dyn OperatorChannel> = Arc::new(ConsoleChannel::new(tx.clone()));

    let controller = Arc::new(Controller::new(
        &config,
        targets.clone(),
        queue.clone(),
        channel.clone(),
        active.clone(),
        presence.clone(),
        transcript::default_root(),
    ));

    let shutdown = CancellationToken::new();

    if config.passive.enabled {
        let passive = PassiveMonitor::new(
            &config.passive,
            config.monitor.thresholds(),
            targets.clone(),
            channel.clone(),
            active.clone(),
            presence.clone(),
        );
        tokio::spawn(passive.run(shutdown.child_token()));
    }

    // Commands run one at a time, in the order they were typed
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let worker = controller.clone();
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            worker.execute(cmd).await;
        }
    });

    // Initialize terminal
    let mut terminal = ratatui::init();

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind == KeyEventKind::Press {
                        let _ = input_tx.send(Action::KeyPress(key));
                    }
                }
            }
        }
    });

    // Spawn target poller
    let scan_tx = tx.clone();
    let scanner = targets.clone();
    let scan_stop = shutdown.child_token();
    tokio::spawn(async move {
        loop {
            let found = scanner.scan().await;
            if scan_tx.send(Action::TargetsUpdated(found)).is_err() {
                break;
            }
            tokio::select! {
                _ = scan_stop.cancelled() => break,
                _ = tokio::time::sleep(TARGET_REFRESH) => {}
            }
        }
    });

    // Create app state
    let mut app = App::new();

    // Main event loop
    let result = loop {
        // Render
        terminal.draw(|f| app.render(f))?;

        // Process any pending actions from the app
        for pending_action in app.take_pending_actions() {
            match pending_action {
                Action::Execute(cmd) => {
                    if cmd_tx.send(cmd).is_err() {
                        app.notice = Some("command worker stopped".to_string());
                    }
                }
                Action::CopyLatest => {
                    let Some(text) = app.latest_message().map(str::to_string) else {
                        app.notice = Some("nothing to copy".to_string());
                        continue;
                    };
                    match arboard::Clipboard::new() {
                        Ok(mut clipboard) => {
                            if let Err(e) = clipboard.set_text(text) {
                                app.notice = Some(format!("Clipboard error: {}", e));
                            } else {
                                app.notice = Some("Message copied to clipboard!".to_string());
                            }
                        }
                        Err(e) => {
                            app.notice = Some(format!("Clipboard error: {}", e));
                        }
                    }
                }
                _ => {}
            }
        }

        // Handle events from channel
        tokio::select! {
            Some(action) = rx.recv() => {
                match app.handle_action(action) {
                    Ok(should_quit) => {
                        if should_quit {
                            break Ok(());
                        }
                    }
                    Err(e) => {
                        break Err(e);
                    }
                }
            }
        }
    };

    shutdown.cancel();
    active.stop().await;
    tracing::info!(pending = queue.len(), "shutting down");

    // Restore terminal
    ratatui::restore();
    result
}

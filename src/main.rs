use anyhow::{Result, anyhow};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mosheng::api::{ApiClient, AuthSignal};
use mosheng::app::App;
use mosheng::config::Config;
use mosheng::handler;
use mosheng::tui::{self, EventHandler, Tui};
use mosheng::ui;

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_logging()?;

    let config = Config::load().unwrap_or_else(|err| {
        warn!(error = %err, "could not read config, using defaults");
        Config::new()
    });

    let (api, mut auth_rx) =
        ApiClient::new(config.resolved_api_url(), config.access_token.clone());

    let mut app = App::new(config, api);
    app.bootstrap().await;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = run(&mut terminal, &mut app, &mut events, &mut auth_rx).await;

    tui::restore()?;
    app.shutdown();
    result
}

async fn run(
    terminal: &mut Tui,
    app: &mut App,
    events: &mut EventHandler,
    auth_rx: &mut mpsc::UnboundedReceiver<AuthSignal>,
) -> Result<()> {
    info!("mosheng starting");

    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            Some(event) = events.next() => handler::handle_event(app, event).await?,
            Some(AuthSignal::SessionExpired) = auth_rx.recv() => app.handle_auth_signal(),
        }

        if app.should_quit {
            break;
        }
    }

    info!("mosheng shutting down");
    Ok(())
}

/// Log to a file under the platform data directory; the terminal itself
/// belongs to the TUI.
fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = dirs::data_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?
        .join("mosheng");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "mosheng.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mosheng=info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

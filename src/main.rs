use anyhow::{Context, Result};
use murmur::integration::{MurmurConfig, Orchestrator, OrchestratorEvent, OrchestratorHandle};
use murmur::session::{ChatSession, ConnectionStatus};
use murmur::speech::ConsoleVoice;
use murmur::transport::StdioConnector;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Placeholder accepted by the server for anonymous read-only logins
const ANONYMOUS_CREDENTIAL: &str = "SCHMOOPIIE";

const CREDENTIAL_ENV: &str = "MURMUR_CREDENTIAL";

/// Upper bound on how long stdin may keep the session open
const INPUT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting Murmur chat reader");

    let config = match std::env::args().nth(1) {
        Some(path) => MurmurConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => MurmurConfig::default(),
    };
    debug!("Config: {:?}", config);

    let session = ChatSession::new(StdioConnector::stdin());
    let status_worker = spawn_status_logger(&session);

    let (orchestrator, handle) = Orchestrator::new(&config, ConsoleVoice::stdout)?;
    let dispatcher = orchestrator.start()?;

    handle.register(config.source_name.clone(), session.clone())?;
    // Replies come back in command order, so the source is merged before login
    if !handle.has_source(config.source_name.as_str())? {
        anyhow::bail!("Source '{}' was not registered", config.source_name);
    }

    let credential =
        std::env::var(CREDENTIAL_ENV).unwrap_or_else(|_| ANONYMOUS_CREDENTIAL.to_string());
    session.log_in(&config.identity, &credential)?;
    if let Some(channel) = &config.channel {
        session.join(channel)?;
    }

    if !session.wait_transport_closed(INPUT_TIMEOUT) {
        warn!("Input still open after {:?}, stopping", INPUT_TIMEOUT);
    }
    session.complete();

    wait_until_drained(&handle)?;

    handle.shutdown()?;
    if dispatcher.join().is_err() {
        warn!("Dispatcher thread panicked");
    }
    if status_worker.join().is_err() {
        warn!("Status thread panicked");
    }

    info!("Murmur stopped");
    Ok(())
}

/// Log connection status changes until the session stream ends
fn spawn_status_logger(session: &ChatSession) -> thread::JoinHandle<()> {
    let messages = session.messages();
    thread::spawn(move || {
        let mut status = ConnectionStatus::new();
        status.begin_login();
        for message in messages.iter() {
            if status.apply(&message) {
                info!(
                    "Status: authorized={} authorizing={} channel={:?}",
                    status.authorized, status.authorizing, status.last_connection
                );
            }
        }
    })
}

/// Wait until every source is gone and playback is idle
fn wait_until_drained(handle: &OrchestratorHandle) -> Result<()> {
    loop {
        while let Some(event) = handle.try_recv_event() {
            log_event(&event);
        }

        let status = handle.status()?;
        if status.sources.is_empty() && status.is_idle() {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn log_event(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::Speaking(utterance) => {
            debug!("Speaking {} from {}", utterance.id, utterance.speaker)
        }
        other => debug!("Event: {:?}", other),
    }
}

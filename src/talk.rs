use std::time::Duration;

use tokio::sync::oneshot;

use crate::audio::CpalHost;
use crate::config::Config;
use crate::error::Result;
use crate::net::websocket::WsConnector;
use crate::session::VoiceSession;
use crate::session::status::{LogStatus, SessionStatus, StatusSink};
use crate::transcript::TranscriptTurn;

/// Prints sealed turns to stdout and logs everything else.
struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn report(&self, status: &SessionStatus) {
        LogStatus.report(status);
    }

    fn turn_sealed(&self, turn: &TranscriptTurn) {
        println!("{:>5}: {}", turn.speaker, turn.text.trim());
    }
}

/// Live conversation: microphone -> remote model -> speakers, until Ctrl+C
/// or the remote ends the session.
pub async fn run_talk(config: Config, idle_timeout: Option<Duration>) -> Result<()> {
    tracing::info!("starting session with {}", config.session.url);

    let connector = WsConnector::new(&config.session);
    let mut session = VoiceSession::new(CpalHost, connector, config, Box::new(ConsoleStatus));
    session.set_watchdog(idle_timeout);
    session.start().await?;

    // Set up Ctrl+C handler
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received Ctrl+C, shutting down...");
        let _ = shutdown_tx.send(());
    });

    session
        .run(async {
            let _ = shutdown_rx.await;
        })
        .await;

    tracing::info!(
        "session ended after {} turn(s)",
        session.transcript().history().len()
    );
    Ok(())
}

//! Session continuity: reconnect forever, resuming when possible.

use qqbot_core::{Connector, Credentials, InboundEvent, ResumeToken};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    config::GatewayConfig,
    connection::{CloseReason, Connection, ConnectionState},
};

/// Observable gateway status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStatus {
    /// State of the current connection.
    pub state: ConnectionState,
    /// Connection attempts so far, including the current one.
    pub attempts: u64,
    /// Token the current connection started from.
    pub resumed_from: Option<ResumeToken>,
}

/// Owns at most one [`Connection`] at a time and replaces it whenever it
/// closes, carrying the resume token across.
pub struct SessionManager<C>
where
    C: Connector,
{
    connector: C,
    url: String,
    credentials: Credentials,
    config: GatewayConfig,
    status: watch::Sender<GatewayStatus>,
}

impl<C> SessionManager<C>
where
    C: Connector + 'static,
{
    /// Create a new session manager.
    #[must_use]
    pub fn new(
        connector: C,
        url: impl Into<String>,
        credentials: Credentials,
        config: GatewayConfig,
    ) -> Self {
        Self {
            connector,
            url: url.into(),
            credentials,
            config,
            status: watch::channel(GatewayStatus::default()).0,
        }
    }

    /// Subscribe to status updates.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<GatewayStatus> {
        self.status.subscribe()
    }

    /// Run the reconnect loop on a background task.
    ///
    /// Events arrive on the returned stream in wire order. Dropping the
    /// stream closes the current connection and stops the loop.
    #[must_use]
    pub fn spawn(self) -> (ReceiverStream<InboundEvent>, JoinHandle<()>) {
        // Single slot: the reader waits until the previous event was taken.
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move { self.run(tx).await });
        (ReceiverStream::new(rx), handle)
    }

    /// Reconnect loop.
    ///
    /// Returns once `events` loses its receiver. An idle connection notices
    /// this without waiting for the next frame.
    pub async fn run(&self, events: mpsc::Sender<InboundEvent>) {
        let mut resume: Option<ResumeToken> = None;

        loop {
            if events.is_closed() {
                info!("Event stream dropped, stopping gateway session");
                return;
            }

            self.status.send_modify(|status| {
                status.attempts += 1;
                status.resumed_from.clone_from(&resume);
            });

            let closed = Connection::new(
                &self.connector,
                &self.url,
                &self.credentials,
                &self.config,
                &self.status,
            )
            .run(resume.take(), &events)
            .await;

            match (&closed.reason, &closed.resume) {
                (CloseReason::ConsumerGone, _) => {
                    info!("Event stream dropped, stopping gateway session");
                    return;
                }
                (_, Some(token)) => {
                    info!(
                        session_id = %token.session_id,
                        sequence = token.sequence,
                        "Reconnecting with resume"
                    );
                }
                (_, None) => warn!("Reconnecting with a fresh session"),
            }
            resume = closed.resume;

            if !self.config.reconnect_delay.is_zero() {
                tokio::time::sleep(self.config.reconnect_delay).await;
            }
        }
    }
}

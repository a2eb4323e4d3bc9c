//! Connection state machine for a single gateway socket.
//!
//! `AwaitingHello -> Identifying | Resuming -> Ready -> Degraded -> Closed`.
//!
//! Once `Ready`, a heartbeat sender and a frame reader run as two tasks. The
//! heartbeat sender owns the write half and the reader owns the read half,
//! so the socket never sees concurrent writers. The first task to finish
//! closes the connection; the other is aborted and awaited before
//! [`Connection::run`] returns.

use std::time::Duration;

use qqbot_core::{
    Connector, Credentials, FrameSink, FrameSource, InboundEvent, Opcode, ResumeToken,
    SessionIdentity,
    event::{READY, RESUMED},
    traits::TransportError,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    config::GatewayConfig,
    protocol::{self, Hello, Ready},
    session::GatewayStatus,
};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Socket open, waiting for the server's hello.
    #[default]
    AwaitingHello,
    /// Identify sent, waiting for `READY`.
    Identifying,
    /// Resume sent.
    Resuming,
    /// Heartbeat and reader running.
    Ready,
    /// Server asked for a reconnect; tearing down.
    Degraded,
    /// Terminal for this instance.
    Closed,
}

/// Connection error.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Expected hello, got opcode {0}")]
    ExpectedHello(u8),
    #[error("Invalid heartbeat interval: {0}ms")]
    InvalidHeartbeatInterval(u64),
    #[error("Unexpected event during handshake: {0}")]
    UnexpectedEvent(String),
    #[error("Connection activity failed: {0}")]
    Task(String),
}

/// Why a connection closed.
#[derive(Debug)]
pub enum CloseReason {
    /// The handshake never completed.
    Handshake(ConnectionError),
    /// The server sent a reconnect request.
    ReconnectRequested,
    /// The socket failed after the handshake.
    Transport(ConnectionError),
    /// The event receiver was dropped.
    ConsumerGone,
}

/// Result of a finished connection.
#[derive(Debug)]
pub struct Closed {
    /// Why the connection ended.
    pub reason: CloseReason,
    /// Present when the session saw at least one sequence number.
    pub resume: Option<ResumeToken>,
}

/// Outcome of one of the two `Ready` activities.
enum Activity {
    Heartbeat(ConnectionError),
    Reader(CloseReason),
}

/// One gateway socket, from hello to close.
pub struct Connection<'a> {
    connector: &'a dyn Connector,
    url: &'a str,
    credentials: &'a Credentials,
    config: &'a GatewayConfig,
    status: &'a watch::Sender<GatewayStatus>,
    state: ConnectionState,
}

impl<'a> Connection<'a> {
    /// Create a connection. Nothing happens until [`Connection::run`].
    #[must_use]
    pub fn new(
        connector: &'a dyn Connector,
        url: &'a str,
        credentials: &'a Credentials,
        config: &'a GatewayConfig,
        status: &'a watch::Sender<GatewayStatus>,
    ) -> Self {
        Self {
            connector,
            url,
            credentials,
            config,
            status,
            state: ConnectionState::AwaitingHello,
        }
    }

    /// Drive the connection to completion.
    ///
    /// Resumes when `resume` is given, identifies otherwise. Forwarded events
    /// go to `events`, whose capacity bounds how far the reader runs ahead of
    /// the consumer.
    pub async fn run(
        mut self,
        resume: Option<ResumeToken>,
        events: &mpsc::Sender<InboundEvent>,
    ) -> Closed {
        self.transition(ConnectionState::AwaitingHello);

        let (mut sink, mut source) = match self.connector.connect(self.url).await {
            Ok(halves) => halves,
            Err(e) => return self.close(CloseReason::Handshake(e.into()), None),
        };

        let period = match await_hello(source.as_mut()).await {
            Ok(period) => period,
            Err(e) => return self.close(CloseReason::Handshake(e), None),
        };

        let identity = if let Some(token) = resume {
            self.transition(ConnectionState::Resuming);
            if let Err(e) = self.resume(sink.as_mut(), &token).await {
                return self.close(CloseReason::Handshake(e), None);
            }
            SessionIdentity::from(token)
        } else {
            self.transition(ConnectionState::Identifying);
            match self.identify(sink.as_mut(), source.as_mut()).await {
                Ok(identity) => identity,
                Err(e) => return self.close(CloseReason::Handshake(e), None),
            }
        };

        self.transition(ConnectionState::Ready);
        info!(
            session_id = identity.session_id(),
            sequence = ?identity.sequence(),
            heartbeat_ms = period.as_millis(),
            "Gateway session ready"
        );

        let (reason, identity) = self
            .serve(sink, source, identity, period, events.clone())
            .await;
        let resume = identity.resume_token();
        self.close(reason, resume)
    }

    async fn identify(
        &self,
        sink: &mut dyn FrameSink,
        source: &mut dyn FrameSource,
    ) -> Result<SessionIdentity, ConnectionError> {
        info!(shard = %self.config.shard, intents = self.config.intents.bits(), "Identify");
        let frame = protocol::identify(
            self.credentials.authorization(),
            self.config.intents,
            self.config.shard,
        )?;
        sink.send(frame).await?;

        loop {
            let event = InboundEvent::decode(&source.receive().await?)?;
            match event.opcode() {
                Opcode::Dispatch => {}
                Opcode::HeartbeatAck => continue,
                _ => {
                    return Err(ConnectionError::UnexpectedEvent(format!(
                        "opcode {}",
                        event.op
                    )));
                }
            }

            if event.event_type() != Some(READY) {
                return Err(ConnectionError::UnexpectedEvent(
                    event.t.unwrap_or_else(|| "<untyped dispatch>".to_string()),
                ));
            }

            let sequence = event.s;
            let ready: Ready = serde_json::from_value(event.d)?;
            let mut identity = SessionIdentity::new(ready.session_id);
            if let Some(sequence) = sequence {
                identity.observe(sequence);
            }
            return Ok(identity);
        }
    }

    async fn resume(
        &self,
        sink: &mut dyn FrameSink,
        token: &ResumeToken,
    ) -> Result<(), ConnectionError> {
        info!(session_id = %token.session_id, sequence = token.sequence, "Resume");
        let frame = protocol::resume(self.credentials.authorization(), token)?;
        sink.send(frame).await?;
        Ok(())
    }

    async fn serve(
        &mut self,
        sink: Box<dyn FrameSink>,
        source: Box<dyn FrameSource>,
        identity: SessionIdentity,
        period: Duration,
        events: mpsc::Sender<InboundEvent>,
    ) -> (CloseReason, SessionIdentity) {
        let (identity_tx, identity_rx) = watch::channel(identity);

        let mut activities = JoinSet::new();
        activities.spawn(send_heartbeats(sink, identity_rx.clone(), period));
        activities.spawn(read_frames(source, identity_tx, events));

        let reason = match activities.join_next().await {
            Some(Ok(Activity::Heartbeat(e))) => CloseReason::Transport(e),
            Some(Ok(Activity::Reader(reason))) => reason,
            Some(Err(e)) => CloseReason::Transport(ConnectionError::Task(e.to_string())),
            None => CloseReason::Transport(TransportError::Closed.into()),
        };

        if matches!(reason, CloseReason::ReconnectRequested) {
            self.transition(ConnectionState::Degraded);
        }

        // Both activities must be gone before the socket is considered closed.
        activities.shutdown().await;

        let identity = identity_rx.borrow().clone();
        (reason, identity)
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(from = ?self.state, to = ?next, "Connection state");
        self.state = next;
        self.status.send_modify(|status| status.state = next);
    }

    fn close(mut self, reason: CloseReason, resume: Option<ResumeToken>) -> Closed {
        match &reason {
            CloseReason::Handshake(e) => warn!(error = %e, "Gateway handshake failed"),
            CloseReason::ReconnectRequested => info!(?resume, "Gateway connection degraded"),
            CloseReason::Transport(e) => warn!(error = %e, ?resume, "Gateway connection lost"),
            CloseReason::ConsumerGone => info!("Event consumer dropped, closing"),
        }
        self.transition(ConnectionState::Closed);
        Closed { reason, resume }
    }
}

async fn await_hello(source: &mut dyn FrameSource) -> Result<Duration, ConnectionError> {
    let event = InboundEvent::decode(&source.receive().await?)?;
    if event.opcode() != Opcode::Hello {
        return Err(ConnectionError::ExpectedHello(event.op));
    }

    let hello: Hello = serde_json::from_value(event.d)?;
    if hello.heartbeat_interval == 0 {
        return Err(ConnectionError::InvalidHeartbeatInterval(0));
    }
    Ok(Duration::from_millis(hello.heartbeat_interval))
}

async fn send_heartbeats(
    mut sink: Box<dyn FrameSink>,
    identity: watch::Receiver<SessionIdentity>,
    period: Duration,
) -> Activity {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let sequence = identity.borrow().sequence();
        let sent = match protocol::heartbeat(sequence) {
            Ok(frame) => sink.send(frame).await.map_err(ConnectionError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            return Activity::Heartbeat(e);
        }
        debug!(?sequence, "Heartbeat sent");
    }
}

async fn read_frames(
    mut source: Box<dyn FrameSource>,
    identity: watch::Sender<SessionIdentity>,
    events: mpsc::Sender<InboundEvent>,
) -> Activity {
    let commit = |sequence: Option<u64>| {
        if let Some(sequence) = sequence {
            identity.send_if_modified(|identity| identity.observe(sequence));
        }
    };

    loop {
        let received = tokio::select! {
            received = source.receive() => received,
            () = events.closed() => return Activity::Reader(CloseReason::ConsumerGone),
        };
        let text = match received {
            Ok(text) => text,
            Err(e) => return Activity::Reader(CloseReason::Transport(e.into())),
        };
        let event = match InboundEvent::decode(&text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                continue;
            }
        };

        let sequence = event.s;
        match event.opcode() {
            Opcode::HeartbeatAck => debug!("Heartbeat acknowledged"),
            Opcode::Dispatch if event.event_type() == Some(RESUMED) => {
                info!(?sequence, "Session resumed");
            }
            Opcode::Reconnect => {
                info!(?sequence, "Gateway requested reconnect");
                commit(sequence);
                return Activity::Reader(CloseReason::ReconnectRequested);
            }
            _ => {
                // Blocks while the previous event is still in the slot.
                if events.send(event).await.is_err() {
                    return Activity::Reader(CloseReason::ConsumerGone);
                }
            }
        }
        // Committed only after handoff so an event lost to teardown is replayed.
        commit(sequence);
    }
}

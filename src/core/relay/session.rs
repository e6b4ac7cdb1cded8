//! Relay session supervisor.
//!
//! A session connects to the Live API, runs its flows, and tears
//! everything down as soon as any one of them returns:
//!
//! ```text
//! CONNECTING -> ACTIVE -> CLOSING_NORMAL -> CLOSED
//!                      \-> CLOSING_ERROR  -/
//! ```
//!
//! Cancellation is cooperative and group-scoped: one token is shared by every
//! flow, and cancelling it (externally or because a flow ended) stops them all.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::flows::{self, Downstream, FlowKind};
use super::queue::{DEFAULT_UPSTREAM_CAPACITY, OutboundQueue, upstream_queue};
use super::transport::{ClientNotice, InboundSource, OutboundSink};
use super::{RelayError, RelayResult};
use crate::core::audio::PcmFormat;
use crate::core::live::{ConversationConfig, LiveConnector, LiveSender};
use crate::core::tools::ToolRegistry;

/// Lifecycle state of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    ClosingNormal,
    ClosingError,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::ClosingNormal => write!(f, "closing_normal"),
            SessionState::ClosingError => write!(f, "closing_error"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Per-session relay settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Assistant whose tools serve this session's tool calls
    pub assistant: String,
    /// Upstream queue capacity
    pub upstream_capacity: usize,
    /// Format used to pace delivery when a frame carries no rate
    pub playback_format: PcmFormat,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            assistant: String::new(),
            upstream_capacity: DEFAULT_UPSTREAM_CAPACITY,
            playback_format: PcmFormat::PLAYBACK,
        }
    }
}

/// One client conversation relayed to the Live API.
pub struct RelaySession {
    id: Uuid,
    connector: Arc<dyn LiveConnector>,
    registry: Arc<ToolRegistry>,
    conversation: Arc<ConversationConfig>,
    settings: RelaySettings,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    text_input: Option<mpsc::Receiver<String>>,
}

impl RelaySession {
    pub fn new(
        connector: Arc<dyn LiveConnector>,
        registry: Arc<ToolRegistry>,
        conversation: Arc<ConversationConfig>,
        settings: RelaySettings,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            id: Uuid::new_v4(),
            connector,
            registry,
            conversation,
            settings,
            cancel: CancellationToken::new(),
            state,
            text_input: None,
        }
    }

    /// Also forward typed lines from `lines` as user turns.
    pub fn with_text_input(mut self, lines: mpsc::Receiver<String>) -> Self {
        self.text_input = Some(lines);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token that cancels the whole session when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Watch the session's lifecycle state.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SessionState) {
        tracing::debug!(session_id = %self.id, state = %next, "Session state");
        self.state.send_replace(next);
    }

    /// Run the session to completion.
    ///
    /// `source` may be absent for sessions without inbound audio. Returns
    /// `Ok` on normal completion or cancellation. The sink is closed on every
    /// exit path, after a `model_error` notice if the session failed.
    pub async fn run(
        mut self,
        source: Option<Box<dyn InboundSource>>,
        sink: Arc<dyn OutboundSink>,
    ) -> RelayResult<()> {
        let session_id = self.id;
        self.transition(SessionState::Connecting);

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            connected = self.connector.connect(&self.conversation) => Some(connected),
        };

        let (sender, receiver) = match connected {
            None => {
                tracing::info!(%session_id, "Session cancelled before connecting");
                self.transition(SessionState::ClosingNormal);
                close_sink(&sink).await;
                self.transition(SessionState::Closed);
                return Ok(());
            }
            Some(Err(e)) => {
                let err = RelayError::from(e);
                tracing::error!(%session_id, "Failed to connect to Live API: {}", err);
                self.transition(SessionState::ClosingError);
                report_error(&sink, &err).await;
                close_sink(&sink).await;
                self.transition(SessionState::Closed);
                return Err(err);
            }
            Some(Ok(halves)) => halves,
        };

        let sender: Arc<dyn LiveSender> = Arc::from(sender);
        let outbound = Arc::new(OutboundQueue::new());
        let (upstream_tx, upstream_rx) = upstream_queue(self.settings.upstream_capacity);

        let mut tasks: JoinSet<(FlowKind, RelayResult<()>)> = JoinSet::new();

        // Without a source the producer half stays here so the sender just idles.
        let idle_producer = match source {
            Some(source) => {
                let cancel = self.cancel.clone();
                tasks.spawn(async move {
                    let result = flows::inbound_collector(source, upstream_tx, cancel).await;
                    (FlowKind::InboundCollector, result)
                });
                None
            }
            None => Some(upstream_tx),
        };

        {
            let sender = sender.clone();
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let result = flows::upstream_sender(sender, upstream_rx, cancel).await;
                (FlowKind::UpstreamSender, result)
            });
        }

        {
            let downstream = Downstream {
                receiver,
                sender: sender.clone(),
                outbound: outbound.clone(),
                sink: sink.clone(),
                registry: self.registry.clone(),
                assistant: self.settings.assistant.clone(),
                interruption: self.conversation.interruption,
            };
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let result = downstream.run(cancel).await;
                (FlowKind::DownstreamReceiver, result)
            });
        }

        {
            let outbound = outbound.clone();
            let sink = sink.clone();
            let playback = self.settings.playback_format;
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let result = flows::outbound_dispatcher(outbound, sink, playback, cancel).await;
                (FlowKind::OutboundDispatcher, result)
            });
        }

        if let Some(lines) = self.text_input.take() {
            let sender = sender.clone();
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let result = flows::text_sender(sender, lines, cancel).await;
                (FlowKind::TextSender, result)
            });
        }

        self.transition(SessionState::Active);
        tracing::info!(%session_id, assistant = %self.settings.assistant, "Relay session active");

        // The first flow to finish decides how the session closes.
        let mut failure = match tasks.join_next().await {
            Some(Ok((kind, Ok(())))) => {
                if self.cancel.is_cancelled() {
                    tracing::info!(%session_id, flow = %kind, "Session cancelled");
                } else {
                    tracing::info!(%session_id, flow = %kind, "Flow finished, closing session");
                }
                None
            }
            Some(Ok((kind, Err(e)))) => {
                tracing::error!(%session_id, flow = %kind, "Flow failed: {}", e);
                Some(e)
            }
            Some(Err(e)) => Some(RelayError::Task(e.to_string())),
            None => None,
        };

        self.transition(if failure.is_some() {
            SessionState::ClosingError
        } else {
            SessionState::ClosingNormal
        });
        self.cancel.cancel();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((kind, Err(e))) => {
                    tracing::debug!(%session_id, flow = %kind, "Flow failed during teardown: {}", e);
                }
                Err(e) => {
                    tracing::warn!(%session_id, "Flow task failed during teardown: {}", e);
                    failure.get_or_insert(RelayError::Task(e.to_string()));
                }
            }
        }
        drop(idle_producer);

        if let Some(err) = &failure {
            report_error(&sink, err).await;
        }
        if let Err(e) = sender.close().await {
            tracing::debug!(%session_id, "Failed to close Live session: {}", e);
        }
        close_sink(&sink).await;
        outbound.flush();

        self.transition(SessionState::Closed);
        tracing::info!(%session_id, "Relay session closed");

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn report_error(sink: &Arc<dyn OutboundSink>, err: &RelayError) {
    if let Err(e) = sink.notify(ClientNotice::ModelError(err.to_string())).await {
        tracing::debug!("Could not deliver error notice: {}", e);
    }
}

async fn close_sink(sink: &Arc<dyn OutboundSink>) {
    if let Err(e) = sink.close().await {
        tracing::debug!("Failed to close client transport: {}", e);
    }
}

//! The concurrent flows of a relay session.
//!
//! Each flow races its suspension points against the session's cancellation
//! token and returns `Ok(())` when cancelled. A flow returning, for any
//! reason, ends the whole session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::queue::{OutboundQueue, UpstreamConsumer, UpstreamProducer};
use super::transport::{ClientNotice, InboundSource, OutboundSink};
use super::RelayResult;
use crate::core::audio::{MediaType, PcmFormat};
use crate::core::live::{
    FunctionCall, InterruptionPolicy, LiveReceiver, LiveSender, ResponseUnit, TurnSignal,
};
use crate::core::tools::ToolRegistry;

/// Identifies a flow in logs and session outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    InboundCollector,
    UpstreamSender,
    DownstreamReceiver,
    OutboundDispatcher,
    TextSender,
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlowKind::InboundCollector => "inbound_collector",
            FlowKind::UpstreamSender => "upstream_sender",
            FlowKind::DownstreamReceiver => "downstream_receiver",
            FlowKind::OutboundDispatcher => "outbound_dispatcher",
            FlowKind::TextSender => "text_sender",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Inbound Audio Collector
// =============================================================================

/// Move client audio onto the upstream queue, suspending while it is full.
pub async fn inbound_collector(
    mut source: Box<dyn InboundSource>,
    upstream: UpstreamProducer,
    cancel: CancellationToken,
) -> RelayResult<()> {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            next = source.next_frame() => next?,
        };

        let Some(frame) = next else {
            tracing::debug!("Inbound transport closed");
            return Ok(());
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            sent = upstream.send(frame) => {
                if sent.is_err() {
                    // Upstream sender is gone; the session is already closing.
                    return Ok(());
                }
            }
        }
    }
}

// =============================================================================
// Upstream Sender
// =============================================================================

/// Forward queued frames to the remote stream, one at a time, in order.
pub async fn upstream_sender(
    sender: Arc<dyn LiveSender>,
    mut upstream: UpstreamConsumer,
    cancel: CancellationToken,
) -> RelayResult<()> {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = upstream.recv() => match frame {
                Some(frame) => frame,
                None => return Ok(()),
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            sent = sender.send_realtime_input(&frame) => sent?,
        }
    }
}

// =============================================================================
// Typed Text Sender
// =============================================================================

/// Forward typed lines as complete user turns.
///
/// An empty line is sent as `"."`. Closing the line channel leaves the
/// session running on audio alone.
pub async fn text_sender(
    sender: Arc<dyn LiveSender>,
    mut lines: mpsc::Receiver<String>,
    cancel: CancellationToken,
) -> RelayResult<()> {
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            line = lines.recv() => line,
        };

        let Some(line) = line else {
            tracing::debug!("Text input closed");
            cancel.cancelled().await;
            return Ok(());
        };

        let text = match line.trim() {
            "" => ".",
            text => text,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            sent = sender.send_client_text(text) => sent?,
        }
    }
}

// =============================================================================
// Downstream Receiver + Tool Dispatcher
// =============================================================================

/// Everything the downstream receiver touches.
pub struct Downstream {
    pub receiver: Box<dyn LiveReceiver>,
    pub sender: Arc<dyn LiveSender>,
    pub outbound: Arc<OutboundQueue>,
    pub sink: Arc<dyn OutboundSink>,
    pub registry: Arc<ToolRegistry>,
    pub assistant: String,
    pub interruption: InterruptionPolicy,
}

impl Downstream {
    /// Consume response units until the remote stream closes.
    pub async fn run(mut self, cancel: CancellationToken) -> RelayResult<()> {
        loop {
            let unit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                unit = self.receiver.next_unit() => unit?,
            };

            let Some(unit) = unit else {
                tracing::info!("Remote stream closed");
                return Ok(());
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                handled = self.handle_unit(unit) => handled?,
            }
        }
    }

    async fn handle_unit(&mut self, unit: ResponseUnit) -> RelayResult<()> {
        match unit {
            ResponseUnit::Audio(frame) => self.outbound.push(frame),
            ResponseUnit::Text(fragment) => {
                if let Err(e) = self.sink.text(&fragment).await {
                    tracing::debug!("Dropping model text: {}", e);
                }
            }
            ResponseUnit::ToolCall(calls) => self.dispatch_tools(calls).await?,
            ResponseUnit::Control(signal) => self.on_signal(signal),
        }
        Ok(())
    }

    fn on_signal(&self, signal: TurnSignal) {
        let flush = match signal {
            TurnSignal::Interrupted => true,
            TurnSignal::TurnComplete => self.interruption.flush_on_turn_complete,
        };
        if flush {
            let dropped = self.outbound.flush();
            tracing::debug!(%signal, dropped, "Flushed outbound audio");
        } else {
            tracing::debug!(%signal, "Turn signal");
        }
    }

    /// Run every call in arrival order, then answer with one batch.
    async fn dispatch_tools(&mut self, calls: Vec<FunctionCall>) -> RelayResult<()> {
        let mut responses = Vec::with_capacity(calls.len());
        for call in &calls {
            self.activity(format!("TOOL called - {}", call.name)).await;
            let response = self.registry.dispatch(&self.assistant, call).await;
            self.activity(format!("TOOL response - {}", response.response))
                .await;
            responses.push(response);
        }
        self.sender.send_tool_response(responses).await?;
        Ok(())
    }

    async fn activity(&mut self, message: String) {
        if let Err(e) = self
            .sink
            .notify(ClientNotice::AssistantActivity(message))
            .await
        {
            tracing::debug!("Failed to send assistant activity: {}", e);
        }
    }
}

// =============================================================================
// Outbound Audio Dispatcher
// =============================================================================

/// Deliver agent audio to the client, pacing push transports at playback speed.
pub async fn outbound_dispatcher(
    outbound: Arc<OutboundQueue>,
    sink: Arc<dyn OutboundSink>,
    playback: PcmFormat,
    cancel: CancellationToken,
) -> RelayResult<()> {
    loop {
        let (epoch, frame) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            popped = outbound.pop() => popped,
        };

        if !outbound.is_current(epoch) {
            tracing::trace!("Skipping audio voided by flush");
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            delivered = sink.deliver(&frame) => delivered?,
        }

        if sink.paced() {
            let format = match frame.media_type() {
                MediaType::Pcm { rate: Some(rate) } => PcmFormat {
                    sample_rate: rate,
                    ..playback
                },
                MediaType::Pcm { rate: None } => playback,
            };
            let pause = format.playback_duration(frame.len());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::AudioFrame;
    use crate::core::live::{FunctionResponse, LiveResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct NullSender;

    #[async_trait]
    impl LiveSender for NullSender {
        async fn send_realtime_input(&self, _frame: &AudioFrame) -> LiveResult<()> {
            Ok(())
        }
        async fn send_tool_response(&self, _responses: Vec<FunctionResponse>) -> LiveResult<()> {
            Ok(())
        }
        async fn send_client_text(&self, _text: &str) -> LiveResult<()> {
            Ok(())
        }
        async fn close(&self) -> LiveResult<()> {
            Ok(())
        }
    }

    struct ScriptedReceiver(VecDeque<ResponseUnit>);

    #[async_trait]
    impl LiveReceiver for ScriptedReceiver {
        async fn next_unit(&mut self) -> LiveResult<Option<ResponseUnit>> {
            Ok(self.0.pop_front())
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OutboundSink for CollectingSink {
        async fn deliver(&self, _frame: &AudioFrame) -> RelayResult<()> {
            Ok(())
        }
        fn paced(&self) -> bool {
            false
        }
        async fn notify(&self, _notice: ClientNotice) -> RelayResult<()> {
            Ok(())
        }
        async fn text(&self, fragment: &str) -> RelayResult<()> {
            self.texts.lock().push(fragment.to_string());
            Ok(())
        }
        async fn close(&self) -> RelayResult<()> {
            Ok(())
        }
    }

    fn downstream(
        units: Vec<ResponseUnit>,
        flush_on_turn_complete: bool,
    ) -> (Downstream, Arc<OutboundQueue>, Arc<CollectingSink>) {
        let outbound = Arc::new(OutboundQueue::new());
        let sink = Arc::new(CollectingSink::default());
        let flow = Downstream {
            receiver: Box::new(ScriptedReceiver(units.into())),
            sender: Arc::new(NullSender),
            outbound: outbound.clone(),
            sink: sink.clone(),
            registry: Arc::new(ToolRegistry::new()),
            assistant: "test".to_string(),
            interruption: InterruptionPolicy {
                flush_on_turn_complete,
            },
        };
        (flow, outbound, sink)
    }

    #[tokio::test]
    async fn test_audio_goes_to_outbound_queue() {
        let (flow, outbound, _) = downstream(
            vec![
                ResponseUnit::Audio(AudioFrame::pcm(vec![1u8; 4])),
                ResponseUnit::Audio(AudioFrame::pcm(vec![2u8; 4])),
            ],
            true,
        );
        flow.run(CancellationToken::new()).await.unwrap();
        assert_eq!(outbound.len(), 2);
    }

    #[tokio::test]
    async fn test_turn_complete_respects_policy() {
        let units = vec![
            ResponseUnit::Audio(AudioFrame::pcm(vec![1u8; 4])),
            ResponseUnit::Control(TurnSignal::TurnComplete),
        ];

        let (flow, outbound, _) = downstream(units.clone(), false);
        flow.run(CancellationToken::new()).await.unwrap();
        assert_eq!(outbound.len(), 1);

        let (flow, outbound, _) = downstream(units, true);
        flow.run(CancellationToken::new()).await.unwrap();
        assert!(outbound.is_empty());
    }

    #[tokio::test]
    async fn test_text_goes_to_sink() {
        let (flow, _, sink) = downstream(vec![ResponseUnit::Text("hi".to_string())], true);
        flow.run(CancellationToken::new()).await.unwrap();
        assert_eq!(*sink.texts.lock(), vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_collector_returns_ok() {
        struct Silent;

        #[async_trait]
        impl InboundSource for Silent {
            async fn next_frame(&mut self) -> RelayResult<Option<AudioFrame>> {
                std::future::pending().await
            }
        }

        let (tx, _rx) = super::super::queue::upstream_queue(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(inbound_collector(Box::new(Silent), tx, cancel).await.is_ok());
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_downstream_future_is_send() {
        let (flow, _, _) = downstream(Vec::new(), true);
        let fut = flow.run(CancellationToken::new());
        assert_send(&fut);
    }

    #[test]
    fn test_flow_kind_display() {
        assert_eq!(FlowKind::OutboundDispatcher.to_string(), "outbound_dispatcher");
    }
}

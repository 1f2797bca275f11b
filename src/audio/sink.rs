use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc;

use crate::audio::{error::SinkError, pipeline::EncodedStream, player::PlayerMessage};

/// Canal de voz al que se conecta el sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Estado reportado por el sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Idle,
    Playing,
    Buffering,
    Paused,
    Error,
}

/// State change of the resource started with `generation`.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkEvent {
    pub generation: u64,
    pub state: SinkState,
    pub detail: Option<String>,
}

impl SinkEvent {
    pub fn new(generation: u64, state: SinkState) -> Self {
        Self {
            generation,
            state,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Entrega eventos del sink al player, en orden con sus comandos.
#[derive(Clone)]
pub struct SinkEventSender {
    tx: mpsc::UnboundedSender<PlayerMessage>,
}

impl SinkEventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<PlayerMessage>) -> Self {
        Self { tx }
    }

    /// Returns `false` once the player is gone.
    pub fn send(&self, event: SinkEvent) -> bool {
        self.tx.send(PlayerMessage::Sink(event)).is_ok()
    }
}

/// Capacidad de salida de audio: binds to a destination.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn bind(
        &self,
        destination: Destination,
        events: SinkEventSender,
    ) -> Result<Box<dyn SinkBinding>, SinkError>;
}

/// A bound sink. Consumes one encoded stream at a time.
#[async_trait]
pub trait SinkBinding: Send {
    /// Replace whatever is playing with `stream`. Events for it carry `generation`.
    async fn play(&mut self, stream: EncodedStream, generation: u64) -> Result<(), SinkError>;

    async fn stop(&mut self);

    async fn pause(&mut self) -> Result<(), SinkError>;

    async fn unpause(&mut self) -> Result<(), SinkError>;

    async fn unbind(&mut self);
}

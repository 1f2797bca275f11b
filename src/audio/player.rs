//! Player de una sesión de voz.
//!
//! One task owns every piece of session state: the queue, the playback
//! clock, the sink binding and the running pipeline. Commands from
//! [`AudioPlayer`] handles and events from the sink travel through the same
//! channel, so they are applied one at a time and in arrival order.
//!
//! Every started pipeline gets a new generation number. Sink events carry
//! the generation they belong to, and events for anything but the current
//! generation are dropped.

use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::{
    audio::{
        clock::PlaybackClock,
        effects::AudioFilter,
        error::PlayerError,
        item::{format_timestamp, CustomAudio, PlayableItem, Track, TrackDuration, TranscodeOptions},
        pipeline::PipelineHandle,
        queue::MusicQueue,
        radio::RadioStation,
        sink::{Destination, Sink, SinkBinding, SinkEvent, SinkEventSender, SinkState},
        transcode::Transcoder,
    },
    config::PlayerConfig,
    sources::{ResolvedTrack, SourceResolver},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Buffering,
    Playing,
    Paused,
}

/// Dónde terminó un item encolado
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    PlayingNow,
    /// 1-based position in the queue.
    Queued { position: usize },
}

/// Opciones de `/play`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayRequest {
    pub filters: Vec<AudioFilter>,
    pub force_play_next: bool,
    pub volume_percent: Option<u16>,
}

/// Resultado de encolar un item resuelto
#[derive(Debug, Clone, PartialEq)]
pub struct PlayReport {
    pub title: String,
    pub duration: TrackDuration,
    pub thumbnail: Option<String>,
    pub placement: Placement,
}

/// Foto del estado de la sesión.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub connection: ConnectionState,
    pub state: PlaybackState,
    pub now_playing: Option<PlayableItem>,
    pub queue: Vec<PlayableItem>,
    pub elapsed: Option<Duration>,
    /// Finite part only; see `queue_has_live`.
    pub queue_end_time: Option<Duration>,
    /// A live item waits in the queue, so the queue never actually ends.
    pub queue_has_live: bool,
}

impl PlayerSnapshot {
    pub fn is_playing(&self) -> bool {
        self.now_playing.is_some() && self.state != PlaybackState::Paused
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }
}

type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Command {
    Connect(Destination, Reply<Result<(), PlayerError>>),
    Disconnect(Reply<bool>),
    Enqueue {
        items: Vec<PlayableItem>,
        force_play_next: bool,
        reply: Reply<Result<Vec<Placement>, PlayerError>>,
    },
    Skip(Reply<Result<(), PlayerError>>),
    Pause(Reply<Result<(), PlayerError>>),
    Resume(Reply<Result<(), PlayerError>>),
    Seek(Duration, Reply<Result<(), PlayerError>>),
    Shuffle(Reply<usize>),
    Clear(Reply<usize>),
    Remove(usize, Reply<Option<PlayableItem>>),
    Snapshot(Reply<PlayerSnapshot>),
}

/// Mensajes que procesa la tarea del player.
pub(crate) enum PlayerMessage {
    Command(Command),
    Sink(SinkEvent),
    Shutdown,
}

struct Mailbox {
    tx: mpsc::UnboundedSender<PlayerMessage>,
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        let _ = self.tx.send(PlayerMessage::Shutdown);
    }
}

/// Handle al player de una sesión. Cheap to clone; the session shuts down
/// (disconnecting if needed) when the last clone is dropped.
#[derive(Clone)]
pub struct AudioPlayer {
    mailbox: Arc<Mailbox>,
    resolver: Arc<dyn SourceResolver>,
}

impl AudioPlayer {
    pub fn spawn(
        config: PlayerConfig,
        sink: Arc<dyn Sink>,
        transcoder: Arc<dyn Transcoder>,
        resolver: Arc<dyn SourceResolver>,
        span: Span,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = PlayerSession::new(config, sink, transcoder, SinkEventSender::new(tx.clone()));
        tokio::spawn(session.run(rx).instrument(span));

        Self {
            mailbox: Arc::new(Mailbox { tx }),
            resolver,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, PlayerError> {
        let (reply, response) = oneshot::channel();
        self.mailbox
            .tx
            .send(PlayerMessage::Command(build(reply)))
            .map_err(|_| PlayerError::Closed)?;
        response.await.map_err(|_| PlayerError::Closed)
    }

    /// Conecta al canal. Connecting again to the same channel is a no-op;
    /// a different channel replaces the current connection.
    pub async fn connect(&self, destination: Destination) -> Result<(), PlayerError> {
        self.request(|reply| Command::Connect(destination, reply)).await?
    }

    /// Desconecta. The queue is kept. Returns `false` if there was nothing to
    /// disconnect.
    pub async fn disconnect(&self) -> Result<bool, PlayerError> {
        self.request(Command::Disconnect).await
    }

    /// Vacía la cola y desconecta. Returns how many queued items were dropped.
    pub async fn shutdown(&self) -> Result<usize, PlayerError> {
        let cleared = self.clear().await?;
        self.disconnect().await?;
        info!("🛑 Player apagado ({} canciones descartadas)", cleared);
        Ok(cleared)
    }

    /// Plays `item` right away when nothing is playing, otherwise queues it
    /// (at the front with `force_play_next`).
    pub async fn enqueue_or_play(&self, item: PlayableItem, force_play_next: bool) -> Result<Placement, PlayerError> {
        self.enqueue_many(vec![item], force_play_next)
            .await?
            .into_iter()
            .next()
            .ok_or(PlayerError::InvalidOperation("nothing was enqueued"))
    }

    /// Encola varios items de una vez, keeping their relative order.
    pub async fn enqueue_many(
        &self,
        items: Vec<PlayableItem>,
        force_play_next: bool,
    ) -> Result<Vec<Placement>, PlayerError> {
        self.request(|reply| Command::Enqueue {
            items,
            force_play_next,
            reply,
        })
        .await?
    }

    /// Resuelve la consulta y encola todo lo que devuelva.
    pub async fn play(&self, query: &str, request: PlayRequest) -> Result<Vec<PlayReport>, PlayerError> {
        let resolved = self.resolver.resolve(query).await.map_err(|e| {
            warn!("⚠️ No se pudo resolver '{}': {}", query, e);
            PlayerError::ResolveFailure(e.to_string())
        })?;
        if resolved.is_empty() {
            return Err(PlayerError::ResolveFailure(format!("no results for '{}'", query)));
        }

        let items: Vec<PlayableItem> = resolved
            .into_iter()
            .map(|track| track_item(track, &request))
            .collect();
        let summaries: Vec<(String, TrackDuration, Option<String>)> = items
            .iter()
            .map(|item| (item.title().to_string(), item.duration(), item.thumbnail().map(str::to_string)))
            .collect();

        let placements = self.enqueue_many(items, request.force_play_next).await?;
        Ok(summaries
            .into_iter()
            .zip(placements)
            .map(|((title, duration, thumbnail), placement)| PlayReport {
                title,
                duration,
                thumbnail,
                placement,
            })
            .collect())
    }

    /// Reproduce un archivo o URL que ffmpeg abre directamente.
    pub async fn play_custom(
        &self,
        locator: impl Into<String>,
        title: impl Into<String>,
        duration: TrackDuration,
        force_play_next: bool,
        volume_percent: Option<u16>,
    ) -> Result<Placement, PlayerError> {
        let item = PlayableItem::CustomAudio(CustomAudio {
            locator: locator.into(),
            title: title.into(),
            duration,
            options: TranscodeOptions::default().with_volume(volume_percent),
        });
        self.enqueue_or_play(item, force_play_next).await
    }

    pub async fn play_radio(&self, station: RadioStation, force_play_next: bool) -> Result<Placement, PlayerError> {
        self.enqueue_or_play(station.to_item(), force_play_next).await
    }

    /// Corta el item actual; the queue advances as if it had ended.
    pub async fn skip(&self) -> Result<(), PlayerError> {
        self.request(Command::Skip).await?
    }

    pub async fn pause(&self) -> Result<(), PlayerError> {
        self.request(Command::Pause).await?
    }

    pub async fn resume(&self) -> Result<(), PlayerError> {
        self.request(Command::Resume).await?
    }

    /// Salta a `position` del item actual.
    pub async fn seek(&self, position: Duration) -> Result<(), PlayerError> {
        self.request(|reply| Command::Seek(position, reply)).await?
    }

    /// Returns how many queued items were shuffled.
    pub async fn shuffle(&self) -> Result<usize, PlayerError> {
        self.request(Command::Shuffle).await
    }

    /// Returns how many queued items were dropped.
    pub async fn clear(&self) -> Result<usize, PlayerError> {
        self.request(Command::Clear).await
    }

    /// Quita el item en la posición 1-based.
    pub async fn remove(&self, position: usize) -> Result<Option<PlayableItem>, PlayerError> {
        self.request(|reply| Command::Remove(position, reply)).await
    }

    pub async fn snapshot(&self) -> Result<PlayerSnapshot, PlayerError> {
        self.request(Command::Snapshot).await
    }

    pub async fn queue_snapshot(&self) -> Result<Vec<PlayableItem>, PlayerError> {
        Ok(self.snapshot().await?.queue)
    }

    pub async fn now_playing(&self) -> Result<Option<PlayableItem>, PlayerError> {
        Ok(self.snapshot().await?.now_playing)
    }

    pub async fn elapsed(&self) -> Result<Option<Duration>, PlayerError> {
        Ok(self.snapshot().await?.elapsed)
    }

    /// Tiempo hasta que termina la cola. `None` while nothing is playing or
    /// the current item is live.
    pub async fn queue_end_time(&self) -> Result<Option<Duration>, PlayerError> {
        Ok(self.snapshot().await?.queue_end_time)
    }
}

fn track_item(track: ResolvedTrack, request: &PlayRequest) -> PlayableItem {
    PlayableItem::Track(Track {
        id: track.id,
        title: track.title,
        duration: track.duration,
        thumbnail: track.thumbnail,
        options: TranscodeOptions::default()
            .with_filters(request.filters.clone())
            .with_volume(request.volume_percent)
            .with_trim(track.trim.start, track.trim.end),
    })
}

const NOT_CONNECTED: PlayerError = PlayerError::InvalidOperation("not connected to a voice channel");
const NOTHING_PLAYING: PlayerError = PlayerError::InvalidOperation("nothing is playing");

/// Estado de la sesión, owned by the player task.
struct PlayerSession {
    sink: Arc<dyn Sink>,
    transcoder: Arc<dyn Transcoder>,
    events: SinkEventSender,

    connection: ConnectionState,
    destination: Option<Destination>,
    binding: Option<Box<dyn SinkBinding>>,

    state: PlaybackState,
    now_playing: Option<PlayableItem>,
    queue: MusicQueue,
    clock: PlaybackClock,
    generation: u64,
    pipeline: Option<PipelineHandle>,
}

impl PlayerSession {
    fn new(config: PlayerConfig, sink: Arc<dyn Sink>, transcoder: Arc<dyn Transcoder>, events: SinkEventSender) -> Self {
        Self {
            sink,
            transcoder,
            events,
            connection: ConnectionState::Disconnected,
            destination: None,
            binding: None,
            state: PlaybackState::Idle,
            now_playing: None,
            queue: MusicQueue::new(config.max_queue_size),
            clock: PlaybackClock::new(),
            generation: 0,
            pipeline: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PlayerMessage>) {
        info!("🎛️ Player iniciado");
        while let Some(message) = rx.recv().await {
            match message {
                PlayerMessage::Command(command) => self.handle_command(command).await,
                PlayerMessage::Sink(event) => self.on_sink_event(event).await,
                PlayerMessage::Shutdown => break,
            }
        }

        self.disconnect().await;
        info!("🛑 Player detenido");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(destination, reply) => {
                let _ = reply.send(self.connect(destination).await);
            }
            Command::Disconnect(reply) => {
                let _ = reply.send(self.disconnect().await);
            }
            Command::Enqueue {
                items,
                force_play_next,
                reply,
            } => {
                let _ = reply.send(self.enqueue(items, force_play_next).await);
            }
            Command::Skip(reply) => {
                let _ = reply.send(self.skip().await);
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.pause().await);
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.resume().await);
            }
            Command::Seek(position, reply) => {
                let _ = reply.send(self.seek(position).await);
            }
            Command::Shuffle(reply) => {
                self.queue.shuffle();
                let _ = reply.send(self.queue.len());
            }
            Command::Clear(reply) => {
                let cleared = self.queue.len();
                self.queue.clear();
                let _ = reply.send(cleared);
            }
            Command::Remove(position, reply) => {
                let _ = reply.send(self.queue.remove_at(position));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn connect(&mut self, destination: Destination) -> Result<(), PlayerError> {
        if self.connection == ConnectionState::Connected {
            if self.destination == Some(destination) {
                debug!("Ya conectado a {:?}", destination.channel_id);
                return Ok(());
            }
            self.disconnect().await;
        }

        info!("🔌 Conectando a canal {}", destination.channel_id);
        self.connection = ConnectionState::Connecting;
        match self.sink.bind(destination, self.events.clone()).await {
            Ok(binding) => {
                self.binding = Some(binding);
                self.destination = Some(destination);
                self.connection = ConnectionState::Connected;
                info!("✅ Conectado a canal {}", destination.channel_id);

                // La cola sobrevive a una desconexión previa.
                if self.now_playing.is_none() && !self.queue.is_empty() {
                    self.advance().await;
                }
                Ok(())
            }
            Err(e) => {
                error!("❌ No se pudo conectar al canal {}: {}", destination.channel_id, e);
                self.connection = ConnectionState::Disconnected;
                Err(e.into())
            }
        }
    }

    async fn disconnect(&mut self) -> bool {
        if self.connection != ConnectionState::Connected {
            debug!("Desconexión ignorada: no hay conexión");
            return false;
        }

        self.generation += 1;
        self.stop_playback();
        if let Some(mut binding) = self.binding.take() {
            binding.unbind().await;
        }
        self.destination = None;
        self.connection = ConnectionState::Disconnected;
        info!("👋 Desconectado, {} item(s) siguen en cola", self.queue.len());
        true
    }

    async fn enqueue(&mut self, items: Vec<PlayableItem>, force_play_next: bool) -> Result<Vec<Placement>, PlayerError> {
        if self.connection != ConnectionState::Connected {
            return Err(NOT_CONNECTED);
        }

        let mut rest = items.into_iter();
        let first = if self.now_playing.is_none() { rest.next() } else { None };
        let rest: Vec<PlayableItem> = rest.collect();

        if rest.len() > self.queue.remaining_capacity() {
            warn!("⚠️ Cola llena, rechazando {} item(s)", rest.len());
            return Err(PlayerError::InvalidOperation("the queue is full"));
        }

        let mut placements = Vec::with_capacity(rest.len() + 1);
        if force_play_next {
            let count = rest.len();
            for item in rest.into_iter().rev() {
                self.queue
                    .push_front(item)
                    .map_err(|_| PlayerError::InvalidOperation("the queue is full"))?;
            }
            placements.extend((1..=count).map(|position| Placement::Queued { position }));
        } else {
            for item in rest {
                let position = self
                    .queue
                    .push_back(item)
                    .map_err(|_| PlayerError::InvalidOperation("the queue is full"))?;
                placements.push(Placement::Queued { position });
            }
        }

        if let Some(item) = first {
            if let Err(e) = self.start_now(item).await {
                self.advance().await;
                return Err(e);
            }
            placements.insert(0, Placement::PlayingNow);
        }

        Ok(placements)
    }

    /// Transcodifica `item` y lo entrega al sink bajo una nueva generación.
    async fn start_now(&mut self, item: PlayableItem) -> Result<(), PlayerError> {
        let Some(binding) = self.binding.as_mut() else {
            return Err(NOT_CONNECTED);
        };

        let pipeline = match self.transcoder.open(&item).await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!("❌ No se pudo iniciar {}: {}", item.title(), e);
                return Err(e.into());
            }
        };

        self.generation += 1;
        let handle = pipeline.handle();
        if let Err(e) = binding.play(pipeline.into_stream(), self.generation).await {
            error!("❌ El sink rechazó {}: {}", item.title(), e);
            handle.terminate();
            return Err(PlayerError::PipelineFailure(e.to_string()));
        }

        info!("🎵 Reproduciendo: {} [{}]", item.title(), item.duration());
        self.pipeline = Some(handle);
        self.now_playing = Some(item);
        self.state = PlaybackState::Idle;
        Ok(())
    }

    /// Arranca el siguiente item de la cola, skipping items that fail to start.
    async fn advance(&mut self) {
        if self.binding.is_none() {
            return;
        }

        while let Some(next) = self.queue.pop_front() {
            match self.start_now(next).await {
                Ok(()) => return,
                Err(e) => warn!("⚠️ Saltando item que no pudo iniciar: {}", e),
            }
        }
        info!("📭 Cola terminada");
    }

    fn stop_playback(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.terminate();
        }
        if self.clock.is_started() {
            self.clock.end();
        }
        self.now_playing = None;
        self.state = PlaybackState::Idle;
    }

    async fn on_sink_event(&mut self, event: SinkEvent) {
        if event.generation != self.generation || self.now_playing.is_none() {
            debug!(
                "Evento {:?} ignorado (generación {}, actual {})",
                event.state, event.generation, self.generation
            );
            return;
        }

        match event.state {
            SinkState::Playing => {
                if !self.clock.is_started() {
                    let offset = self
                        .now_playing
                        .as_ref()
                        .filter(|item| !item.is_live())
                        .and_then(|item| item.options().trim_start)
                        .unwrap_or_default();
                    self.clock.start(offset);
                    // Paused before the sink got going; resume() picks the clock up.
                    if self.state == PlaybackState::Paused {
                        self.clock.pause();
                    }
                }
                if self.state != PlaybackState::Paused {
                    self.state = PlaybackState::Playing;
                }
            }
            SinkState::Buffering => self.state = PlaybackState::Buffering,
            SinkState::Paused => {
                if self.state != PlaybackState::Paused {
                    self.state = PlaybackState::Paused;
                    if self.clock.is_started() && !self.clock.is_paused() {
                        self.clock.pause();
                    }
                }
            }
            SinkState::Idle => self.on_track_end(None).await,
            SinkState::Error => {
                let detail = event.detail.unwrap_or_else(|| "unknown sink error".into());
                self.on_track_end(Some(detail)).await;
            }
        }
    }

    async fn on_track_end(&mut self, failure: Option<String>) {
        let title = self
            .now_playing
            .as_ref()
            .map(|item| item.title().to_string())
            .unwrap_or_default();

        match failure {
            Some(reason) => warn!("⚠️ Falló la reproducción de {}: {}", title, reason),
            None if self.state == PlaybackState::Buffering => {
                warn!("⚠️ {} terminó mientras cargaba", title)
            }
            None => info!("⏹️ Terminó: {}", title),
        }

        self.stop_playback();
        self.advance().await;
    }

    async fn skip(&mut self) -> Result<(), PlayerError> {
        let Some(current) = &self.now_playing else {
            return Err(NOTHING_PLAYING);
        };
        info!("⏭️ Saltando: {}", current.title());

        if let Some(pipeline) = &self.pipeline {
            pipeline.terminate();
        }
        if let Some(binding) = self.binding.as_mut() {
            binding.stop().await;
        }
        self.state = PlaybackState::Idle;
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), PlayerError> {
        if self.now_playing.is_none() {
            return Err(NOTHING_PLAYING);
        }
        if self.state == PlaybackState::Paused {
            info!("Ya está en pausa");
            return Err(PlayerError::InvalidOperation("already paused"));
        }

        let binding = self.binding.as_mut().ok_or(NOT_CONNECTED)?;
        binding
            .pause()
            .await
            .map_err(|e| PlayerError::PipelineFailure(e.to_string()))?;

        if self.clock.is_started() {
            self.clock.pause();
        }
        self.state = PlaybackState::Paused;
        info!("⏸️ Pausado");
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), PlayerError> {
        if self.state != PlaybackState::Paused {
            info!("No está en pausa");
            return Err(PlayerError::InvalidOperation("not paused"));
        }

        let binding = self.binding.as_mut().ok_or(NOT_CONNECTED)?;
        binding
            .unpause()
            .await
            .map_err(|e| PlayerError::PipelineFailure(e.to_string()))?;

        if self.clock.is_paused() {
            self.clock.resume();
        }
        self.state = PlaybackState::Playing;
        info!("▶️ Reanudado");
        Ok(())
    }

    async fn seek(&mut self, position: Duration) -> Result<(), PlayerError> {
        let Some(mut item) = self.now_playing.take() else {
            return Err(NOTHING_PLAYING);
        };
        if let Err(e) = check_seekable(&item, position) {
            self.now_playing = Some(item);
            return Err(e);
        }

        if self.clock.is_started() {
            self.clock.end();
        }
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.terminate();
        }
        // Invalida eventos tardíos del pipeline anterior.
        self.generation += 1;
        item.options_mut().trim_start = Some(position);

        match self.start_now(item).await {
            Ok(()) => {
                self.clock.set(position);
                info!("⏩ Seek a {}", format_timestamp(position));
                Ok(())
            }
            Err(e) => {
                self.state = PlaybackState::Idle;
                self.advance().await;
                Err(e)
            }
        }
    }

    fn elapsed(&self) -> Option<Duration> {
        if self.clock.is_started() {
            self.clock.elapsed()
        } else {
            None
        }
    }

    fn queue_end_time(&self) -> Option<Duration> {
        let remaining = self.now_playing.as_ref()?.duration().finite()?;
        let elapsed = self.elapsed().unwrap_or_default();
        Some(self.queue.total_finite_duration() + remaining.saturating_sub(elapsed))
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            connection: self.connection,
            state: self.state,
            now_playing: self.now_playing.clone(),
            queue: self.queue.snapshot(),
            elapsed: self.elapsed(),
            queue_end_time: self.queue_end_time(),
            queue_has_live: self.queue.has_unbounded(),
        }
    }
}

fn check_seekable(item: &PlayableItem, position: Duration) -> Result<(), PlayerError> {
    match item.duration() {
        TrackDuration::Unbounded => Err(PlayerError::InvalidOperation("live streams cannot seek")),
        TrackDuration::Finite(duration) if position >= duration => {
            Err(PlayerError::InvalidOperation("position is past the end of the track"))
        }
        TrackDuration::Finite(_) => Ok(()),
    }
}

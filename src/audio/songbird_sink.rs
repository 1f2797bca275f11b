//! Sink sobre songbird.
//!
//! Each pipeline is handed to songbird as a live DCA input (length-prefixed
//! Opus frames), so the driver passes our frames through instead of
//! re-encoding them. Track events are forwarded to the player tagged with
//! the pipeline generation.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{AsyncAdapterStream, AsyncMediaSource, AudioStream, Input, LiveInput},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    io::{self, SeekFrom},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use symphonia::core::io::MediaSource;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tracing::{debug, error, info, warn};

use crate::audio::{
    error::SinkError,
    pipeline::{EncodedStream, CHANNELS, FRAME_SIZE, SAMPLE_RATE},
    sink::{Destination, Sink, SinkBinding, SinkEvent, SinkEventSender, SinkState},
};

const ADAPTER_BUFFER: usize = 64 * 1024;

pub struct SongbirdSink {
    manager: Arc<Songbird>,
    connect_timeout: Duration,
}

impl SongbirdSink {
    pub fn new(manager: Arc<Songbird>, connect_timeout: Duration) -> Self {
        Self {
            manager,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Sink for SongbirdSink {
    async fn bind(
        &self,
        destination: Destination,
        events: SinkEventSender,
    ) -> Result<Box<dyn SinkBinding>, SinkError> {
        let guild_id = destination.guild_id;
        let join = self.manager.join(guild_id, destination.channel_id);

        let call = match tokio::time::timeout(self.connect_timeout, join).await {
            Ok(Ok(call)) => call,
            Ok(Err(e)) => {
                error!("Error al obtener handler de voz: {:?}", e);
                let _ = self.manager.remove(guild_id).await;
                return Err(SinkError::Rejected(e.to_string()));
            }
            Err(_) => {
                let _ = self.manager.remove(guild_id).await;
                return Err(SinkError::Timeout(self.connect_timeout));
            }
        };

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);
        Ok(Box::new(SongbirdBinding {
            manager: self.manager.clone(),
            guild_id,
            call,
            events,
            current: None,
        }))
    }
}

struct SongbirdBinding {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    events: SinkEventSender,
    current: Option<TrackHandle>,
}

#[async_trait]
impl SinkBinding for SongbirdBinding {
    async fn play(&mut self, stream: EncodedStream, generation: u64) -> Result<(), SinkError> {
        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(dca_input(stream))
        };

        let forwarded = [
            (TrackEvent::Preparing, SinkState::Buffering),
            (TrackEvent::Play, SinkState::Playing),
            (TrackEvent::Pause, SinkState::Paused),
            (TrackEvent::End, SinkState::Idle),
            (TrackEvent::Error, SinkState::Error),
        ];
        for (event, state) in forwarded {
            handle
                .add_event(
                    Event::Track(event),
                    TrackEventForwarder {
                        generation,
                        state,
                        events: self.events.clone(),
                    },
                )
                .map_err(|e| SinkError::Playback(format!("Error al agregar event handler: {}", e)))?;
        }

        // The track may have started before the handlers were attached.
        if let Ok(info) = handle.get_info().await {
            if matches!(info.playing, PlayMode::Play) {
                self.events.send(SinkEvent::new(generation, SinkState::Playing));
            }
        }

        self.current = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(track) = self.current.take() {
            let _ = track.stop();
        }
    }

    async fn pause(&mut self) -> Result<(), SinkError> {
        let track = self
            .current
            .as_ref()
            .ok_or_else(|| SinkError::Playback("no track loaded".into()))?;
        track.pause().map_err(|e| SinkError::Playback(e.to_string()))
    }

    async fn unpause(&mut self) -> Result<(), SinkError> {
        let track = self
            .current
            .as_ref()
            .ok_or_else(|| SinkError::Playback("no track loaded".into()))?;
        track.play().map_err(|e| SinkError::Playback(e.to_string()))
    }

    async fn unbind(&mut self) {
        self.stop().await;
        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("Error al salir del canal de voz: {:?}", e);
        }
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
    }
}

/// Reenvía un evento de track de songbird al player.
struct TrackEventForwarder {
    generation: u64,
    state: SinkState,
    events: SinkEventSender,
}

#[async_trait]
impl VoiceEventHandler for TrackEventForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut event = SinkEvent::new(self.generation, self.state);

        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    event = event.with_detail(format!("{:?}", e));
                }
            }
        }

        if self.events.send(event) {
            None
        } else {
            debug!("Player cerrado, cancelando handler de eventos");
            Some(Event::Cancel)
        }
    }
}

fn dca_input(stream: EncodedStream) -> Input {
    let source: Box<dyn AsyncMediaSource> = Box::new(DcaSource::new(stream));
    let adapter: Box<dyn MediaSource> = Box::new(AsyncAdapterStream::new(source, ADAPTER_BUFFER));

    Input::Live(
        LiveInput::Raw(AudioStream {
            input: adapter,
            hint: None,
        }),
        None,
    )
}

fn dca_header() -> Bytes {
    let metadata = serde_json::json!({
        "dca": {
            "version": 1,
            "tool": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "url": null,
                "author": null,
            },
        },
        "opus": {
            "mode": "music",
            "sample_rate": SAMPLE_RATE,
            "frame_size": FRAME_SIZE,
            "abr": null,
            "vbr": true,
            "channels": CHANNELS,
        },
        "info": null,
        "origin": null,
        "extra": null,
    })
    .to_string();

    let mut header = BytesMut::with_capacity(8 + metadata.len());
    header.put_slice(b"DCA1");
    header.put_i32_le(metadata.len() as i32);
    header.put_slice(metadata.as_bytes());
    header.freeze()
}

/// Adaptador de paquetes Opus a un flujo de bytes DCA.
struct DcaSource {
    stream: Mutex<EncodedStream>,
    pending: Bytes,
    position: u64,
}

impl DcaSource {
    fn new(stream: EncodedStream) -> Self {
        Self {
            stream: Mutex::new(stream),
            pending: dca_header(),
            position: 0,
        }
    }
}

fn dca_frame(packet: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(2 + packet.len());
    frame.put_i16_le(packet.len() as i16);
    frame.put_slice(packet);
    frame.freeze()
}

impl AsyncRead for DcaSource {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending.split_to(n));
                this.position += n as u64;
                return Poll::Ready(Ok(()));
            }

            match Pin::new(this.stream.get_mut()).poll_next(cx) {
                Poll::Ready(Some(Ok(packet))) => this.pending = dca_frame(&packet),
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, e.to_string())))
                }
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncSeek for DcaSource {
    fn start_seek(self: Pin<&mut Self>, _position: SeekFrom) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "live pipeline is not seekable"))
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.position))
    }
}

#[async_trait]
impl AsyncMediaSource for DcaSource {
    fn is_seekable(&self) -> bool {
        false
    }

    async fn byte_len(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pipeline::tests::fake_pipeline;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn dca_stream_is_header_then_length_prefixed_frames() {
        let (pipeline, tx, _counters) = fake_pipeline();
        let mut source = DcaSource::new(pipeline.into_stream());

        tx.send_async(Ok(Bytes::from_static(b"abc"))).await.unwrap();
        tx.send_async(Ok(Bytes::from_static(b"de"))).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        source.read_to_end(&mut out).await.unwrap();

        assert_eq!(&out[..4], b"DCA1");
        let json_len = i32::from_le_bytes([out[4], out[5], out[6], out[7]]) as usize;
        let metadata: serde_json::Value = serde_json::from_slice(&out[8..8 + json_len]).unwrap();
        assert_eq!(metadata["opus"]["sample_rate"], 48000);
        assert_eq!(metadata["opus"]["channels"], 2);

        let frames = &out[8 + json_len..];
        assert_eq!(frames, &[3, 0, b'a', b'b', b'c', 2, 0, b'd', b'e'][..]);
    }

    #[tokio::test]
    async fn pipeline_error_surfaces_as_io_error() {
        let (pipeline, tx, counters) = fake_pipeline();
        let mut source = DcaSource::new(pipeline.into_stream());
        tx.send_async(Err(crate::audio::error::PipelineError::Encoder("bad".into())))
            .await
            .unwrap();

        let mut out = Vec::new();
        assert!(source.read_to_end(&mut out).await.is_err());
        assert!(counters
            .iter()
            .all(|c| c.load(std::sync::atomic::Ordering::SeqCst) == 1));
    }
}

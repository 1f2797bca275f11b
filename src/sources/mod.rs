//! Fuentes de audio.
//!
//! A [`SourceResolver`] turns a user query (video URL, playlist URL or free
//! text) into track metadata; a [`SourceProvider`] opens the raw byte stream
//! of a resolved track when the player is ready to transcode it.

pub mod sponsorblock;
pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncRead;

pub use sponsorblock::SponsorBlockClient;
pub use ytdlp::{YtDlpProvider, YtDlpResolver};

/// Flujo de bytes del audio sin transcodificar, leído por el stdin de ffmpeg
pub type SourceReader = Box<dyn AsyncRead + Send + Unpin>;

/// Portion of a track worth playing, after cutting sponsor/intro/outro segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimWindow {
    pub start: Option<Duration>,
    pub end: Option<Duration>,
}

/// Metadatos de un track resuelto
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub id: String,
    pub title: String,
    pub duration: Duration,
    pub thumbnail: Option<String>,
    pub trim: TrimWindow,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Every track the query names: a whole playlist, a single video, or the
    /// best search hit. An empty result means nothing matched.
    async fn resolve(&self, query: &str) -> Result<Vec<ResolvedTrack>>;
}

#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn open_source(&self, id: &str) -> Result<SourceReader>;
}

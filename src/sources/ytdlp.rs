use anyhow::{Context as _, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{
    io,
    pin::Pin,
    process::Stdio,
    sync::LazyLock,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, ReadBuf},
    process::{Child, ChildStdout, Command},
};
use tracing::{debug, info, warn};

use crate::audio::item::TrackDuration;

use super::{
    sponsorblock::SponsorBlockClient, ResolvedTrack, SourceProvider, SourceReader, SourceResolver,
    TrimWindow,
};

/// Playlist directa: `youtube.com/playlist?list=...`
static PLAYLIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?youtube\.com/playlist\?list=((PL|FL|UU|LL|RD|OL)[a-zA-Z0-9_-]*)$")
        .expect("playlist regex")
});

/// Video dentro de una playlist.
static PLAYLIST_VIDEO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?:https?:)?//)?((?:www|m)\.)?(youtube\.com|youtu\.be)(/(?:[\w-]+\?v=|embed/|v/)?)([\w-]+)[?&]list=((PL|FL|UU|LL|RD|OL)[a-zA-Z0-9_-]*)(&index=[0-9]+)+$",
    )
    .expect("playlist video regex")
});

static VIDEO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:https?:)?//)?((?:www|m)\.)?(youtube\.com|youtu\.be)(/(?:[\w-]+\?v=|embed/|v/)?)([\w-]+)(\S+)?$")
        .expect("video regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Playlist,
    Video,
    Search,
}

/// Clasifica la consulta del usuario
pub fn classify(query: &str) -> QueryKind {
    let query = query.trim();
    if PLAYLIST_RE.is_match(query) || PLAYLIST_VIDEO_RE.is_match(query) {
        QueryKind::Playlist
    } else if VIDEO_RE.is_match(query) {
        QueryKind::Video
    } else {
        QueryKind::Search
    }
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// Una línea de `yt-dlp --dump-json`.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    #[serde(default)]
    is_live: Option<bool>,
}

impl YtDlpEntry {
    fn into_resolved(self) -> Option<ResolvedTrack> {
        if self.is_live == Some(true) {
            warn!("⚠️ Ignorando transmisión en vivo: {}", self.id);
            return None;
        }
        let Some(duration) = self
            .duration
            .and_then(|secs| TrackDuration::from_secs_f64(secs).finite())
            .filter(|d| !d.is_zero())
        else {
            warn!("⚠️ Ignorando entrada sin duración: {}", self.id);
            return None;
        };

        let thumbnail = self
            .thumbnail
            .or_else(|| self.thumbnails.into_iter().last().map(|t| t.url));

        Some(ResolvedTrack {
            title: self.title.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            duration,
            thumbnail,
            trim: TrimWindow::default(),
        })
    }
}

fn parse_entries(stdout: &str) -> Vec<ResolvedTrack> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => entry.into_resolved(),
            Err(e) => {
                warn!("⚠️ Línea de yt-dlp inválida: {}", e);
                None
            }
        })
        .collect()
}

pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// Resuelve consultas con yt-dlp.
pub struct YtDlpResolver {
    ytdlp_path: String,
    playlist_limit: usize,
    sponsorblock: Option<SponsorBlockClient>,
}

impl YtDlpResolver {
    pub fn new(ytdlp_path: impl Into<String>, playlist_limit: usize, sponsorblock: Option<SponsorBlockClient>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            playlist_limit,
            sponsorblock,
        }
    }

    async fn dump_json(&self, args: &[String]) -> Result<Vec<ResolvedTrack>> {
        debug!("yt-dlp {}", args.join(" "));
        let output = Command::new(&self.ytdlp_path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("no se pudo ejecutar {}", self.ytdlp_path))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp falló: {}", error.trim());
        }

        Ok(parse_entries(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn resolve_playlist(&self, url: &str) -> Result<Vec<ResolvedTrack>> {
        self.dump_json(&[
            "--dump-json".into(),
            "--flat-playlist".into(),
            "--playlist-end".into(),
            self.playlist_limit.to_string(),
            "--quiet".into(),
            "--no-warnings".into(),
            url.into(),
        ])
        .await
    }

    async fn resolve_single(&self, target: String) -> Result<Vec<ResolvedTrack>> {
        self.dump_json(&[
            "--dump-json".into(),
            "--no-playlist".into(),
            "--skip-download".into(),
            "--quiet".into(),
            "--no-warnings".into(),
            target,
        ])
        .await
    }

    async fn apply_trim(&self, tracks: &mut [ResolvedTrack]) {
        let Some(sponsorblock) = &self.sponsorblock else {
            return;
        };
        let windows =
            futures::future::join_all(tracks.iter().map(|t| sponsorblock.trim_window(&t.id, t.duration))).await;
        for (track, window) in tracks.iter_mut().zip(windows) {
            track.trim = window;
        }
    }
}

#[async_trait]
impl SourceResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Vec<ResolvedTrack>> {
        let query = query.trim();
        info!("🔍 Resolviendo: {}", query);

        let mut kind = classify(query);
        let mut tracks = Vec::new();

        if kind == QueryKind::Playlist {
            match self.resolve_playlist(query).await {
                Ok(found) if !found.is_empty() => tracks = found,
                Ok(_) => warn!("Playlist vacía, continuando como video: {}", query),
                Err(e) => warn!("No se pudo leer la playlist {}: {}, continuando como video", query, e),
            }
            if tracks.is_empty() {
                kind = if VIDEO_RE.is_match(query) { QueryKind::Video } else { QueryKind::Search };
            }
        }

        match kind {
            QueryKind::Playlist => {}
            QueryKind::Video => tracks = self.resolve_single(query.to_string()).await?,
            QueryKind::Search => tracks = self.resolve_single(format!("ytsearch1:{}", query)).await?,
        }

        self.apply_trim(&mut tracks).await;
        info!("✅ {} track(s) para: {}", tracks.len(), query);
        Ok(tracks)
    }
}

/// Abre el audio de un video como stream de bytes.
pub struct YtDlpProvider {
    ytdlp_path: String,
}

impl YtDlpProvider {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
        }
    }
}

#[async_trait]
impl SourceProvider for YtDlpProvider {
    async fn open_source(&self, id: &str) -> Result<SourceReader> {
        let mut child = Command::new(&self.ytdlp_path)
            .args(["-f", "bestaudio", "-o", "-", "--quiet", "--no-warnings", "--no-playlist"])
            .arg(watch_url(id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("no se pudo ejecutar {}", self.ytdlp_path))?;

        let stdout = child.stdout.take().context("yt-dlp sin stdout")?;
        debug!("📥 Descargando audio de {}", id);
        Ok(Box::new(ChildReader { _child: child, stdout }))
    }
}

/// Stdout de un proceso hijo; dropping it kills the process.
struct ChildReader {
    _child: Child,
    stdout: ChildStdout,
}

impl AsyncRead for ChildReader {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

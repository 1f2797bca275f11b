use anyhow::Result;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::TrimWindow;

const API_URL: &str = "https://sponsor.ajay.app/api/skipSegments";

/// Categorías que se recortan.
pub const CATEGORIES: [&str; 7] = [
    "sponsor",
    "intro",
    "outro",
    "interaction",
    "selfpromo",
    "music_offtopic",
    "preview",
];

/// User-submitted segments are imprecise; anything this close to an edge counts as touching it.
const MAX_DEVIATION: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Segment {
    /// `[start, end]` en segundos
    pub segment: [f64; 2],
    #[serde(default)]
    pub category: String,
}

impl Segment {
    /// `None` when either edge is not a representable duration.
    fn bounds(&self) -> Option<(Duration, Duration)> {
        Some((seconds(self.segment[0])?, seconds(self.segment[1])?))
    }
}

/// Negative seconds clamp to zero; NaN and overflow are rejected.
fn seconds(value: f64) -> Option<Duration> {
    let value = if value < 0.0 { 0.0 } else { value };
    Duration::try_from_secs_f64(value).ok()
}

/// Cliente de la API de SponsorBlock.
#[derive(Clone)]
pub struct SponsorBlockClient {
    http: reqwest::Client,
    base_url: String,
}

impl SponsorBlockClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: API_URL.to_string(),
        }
    }

    /// Segmentos conocidos del video. A 404 means nobody submitted any.
    pub async fn segments(&self, video_id: &str) -> Result<Vec<Segment>> {
        let categories = serde_json::to_string(&CATEGORIES)?;
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("videoID", video_id), ("categories", categories.as_str())])
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            info!("No hay segmentos de SponsorBlock para: {}", video_id);
            return Ok(Vec::new());
        }

        let segments = response.error_for_status()?.json::<Vec<Segment>>().await?;
        debug!("SponsorBlock devolvió {} segmentos para {}", segments.len(), video_id);
        Ok(segments)
    }

    /// Ventana de reproducción para el video. Lookup failures mean no trimming.
    pub async fn trim_window(&self, video_id: &str, duration: Duration) -> TrimWindow {
        match self.segments(video_id).await {
            Ok(segments) => trim_window_from(&segments, duration),
            Err(e) => {
                warn!("⚠️ SponsorBlock falló para {}: {}", video_id, e);
                TrimWindow::default()
            }
        }
    }
}

/// Skips a leading segment that starts at the very beginning and stops
/// before a trailing one that runs to the very end. Segments in the middle
/// are left alone.
pub fn trim_window_from(segments: &[Segment], duration: Duration) -> TrimWindow {
    let usable: Vec<(Duration, Duration)> = segments.iter().filter_map(Segment::bounds).collect();
    let leading = usable.iter().find(|(start, _)| *start < MAX_DEVIATION);
    let trailing = usable
        .iter()
        .find(|(_, end)| *end > duration.saturating_sub(MAX_DEVIATION));

    let window = TrimWindow {
        start: leading.map(|(_, end)| *end),
        end: trailing.map(|(start, _)| *start),
    };
    debug!("Ventana SponsorBlock: {:?}", window);
    window
}

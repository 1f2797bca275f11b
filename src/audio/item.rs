use std::fmt;
use std::time::Duration;

use crate::audio::effects::AudioFilter;

/// Duración de un item: finite, or unbounded for live streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackDuration {
    Finite(Duration),
    Unbounded,
}

impl TrackDuration {
    /// Seconds reported by an external source. Anything that is not a
    /// representable non-negative duration counts as unbounded.
    pub fn from_secs_f64(secs: f64) -> Self {
        match Duration::try_from_secs_f64(secs) {
            Ok(d) => TrackDuration::Finite(d),
            Err(_) => TrackDuration::Unbounded,
        }
    }

    pub fn finite(self) -> Option<Duration> {
        match self {
            TrackDuration::Finite(d) => Some(d),
            TrackDuration::Unbounded => None,
        }
    }

    pub fn is_unbounded(self) -> bool {
        matches!(self, TrackDuration::Unbounded)
    }
}

impl fmt::Display for TrackDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackDuration::Finite(d) => f.write_str(&format_timestamp(*d)),
            TrackDuration::Unbounded => f.write_str("∞"),
        }
    }
}

/// Formatea como `HH:MM:SS`, dropping sub-second precision.
pub fn format_timestamp(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Opciones del transcoder para un item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscodeOptions {
    pub filters: Vec<AudioFilter>,
    pub trim_start: Option<Duration>,
    pub trim_end: Option<Duration>,
    pub volume_percent: Option<u16>,
}

impl TranscodeOptions {
    pub fn with_filters(mut self, filters: Vec<AudioFilter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_volume(mut self, volume_percent: Option<u16>) -> Self {
        self.volume_percent = volume_percent;
        self
    }

    pub fn with_trim(mut self, start: Option<Duration>, end: Option<Duration>) -> Self {
        self.trim_start = start;
        self.trim_end = end;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Stable identifier handed to the source provider.
    pub id: String,
    pub title: String,
    pub duration: Duration,
    pub thumbnail: Option<String>,
    pub options: TranscodeOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomAudio {
    /// File path or URL, opened by ffmpeg itself.
    pub locator: String,
    pub title: String,
    pub duration: TrackDuration,
    pub options: TranscodeOptions,
}

/// Unidad que puede ir en la cola
#[derive(Debug, Clone, PartialEq)]
pub enum PlayableItem {
    Track(Track),
    CustomAudio(CustomAudio),
}

impl PlayableItem {
    pub fn title(&self) -> &str {
        match self {
            PlayableItem::Track(track) => &track.title,
            PlayableItem::CustomAudio(custom) => &custom.title,
        }
    }

    pub fn duration(&self) -> TrackDuration {
        match self {
            PlayableItem::Track(track) => TrackDuration::Finite(track.duration),
            PlayableItem::CustomAudio(custom) => custom.duration,
        }
    }

    pub fn thumbnail(&self) -> Option<&str> {
        match self {
            PlayableItem::Track(track) => track.thumbnail.as_deref(),
            PlayableItem::CustomAudio(_) => None,
        }
    }

    pub fn options(&self) -> &TranscodeOptions {
        match self {
            PlayableItem::Track(track) => &track.options,
            PlayableItem::CustomAudio(custom) => &custom.options,
        }
    }

    pub fn options_mut(&mut self) -> &mut TranscodeOptions {
        match self {
            PlayableItem::Track(track) => &mut track.options,
            PlayableItem::CustomAudio(custom) => &mut custom.options,
        }
    }

    /// Live items start immediately and ignore any trim window.
    pub fn is_live(&self) -> bool {
        self.duration().is_unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_zero_padded() {
        assert_eq!(format_timestamp(Duration::ZERO), "00:00:00");
        assert_eq!(format_timestamp(Duration::from_secs(75)), "00:01:15");
        assert_eq!(format_timestamp(Duration::from_secs_f64(3725.9)), "01:02:05");
    }

    #[test]
    fn non_finite_seconds_become_unbounded() {
        assert_eq!(TrackDuration::from_secs_f64(f64::INFINITY), TrackDuration::Unbounded);
        assert_eq!(TrackDuration::from_secs_f64(-1.0), TrackDuration::Unbounded);
        assert_eq!(TrackDuration::from_secs_f64(f64::NAN), TrackDuration::Unbounded);
        assert_eq!(TrackDuration::from_secs_f64(1e30), TrackDuration::Unbounded);
        assert_eq!(
            TrackDuration::from_secs_f64(12.0),
            TrackDuration::Finite(Duration::from_secs(12))
        );
    }

    #[test]
    fn custom_audio_with_unbounded_duration_is_live() {
        let radio = PlayableItem::CustomAudio(CustomAudio {
            locator: "https://stream.example/live".into(),
            title: "Live".into(),
            duration: TrackDuration::Unbounded,
            options: TranscodeOptions::default(),
        });
        assert!(radio.is_live());
        assert_eq!(radio.duration().to_string(), "∞");
    }
}

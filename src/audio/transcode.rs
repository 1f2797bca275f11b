use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::audio::{
    effects::filter_graph,
    error::PipelineError,
    item::{format_timestamp, PlayableItem, TranscodeOptions},
    pipeline::{Pipeline, CHANNELS, SAMPLE_RATE},
};
use crate::config::TranscodeConfig;
use crate::sources::SourceProvider;

/// Convierte un item en un pipeline listo para el sink.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn open(&self, item: &PlayableItem) -> Result<Pipeline, PipelineError>;
}

/// De dónde lee ffmpeg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfmpegInput<'a> {
    /// Piped source on stdin.
    Stdin,
    /// Path or URL that ffmpeg opens itself.
    Locator(&'a str),
}

/// Argumentos de ffmpeg para un item.
///
/// Live inputs never get a trim window and always start at `00:00:00`.
pub fn build_ffmpeg_args(input: FfmpegInput<'_>, options: &TranscodeOptions, live: bool) -> Vec<String> {
    let mut args: Vec<String> = vec!["-analyzeduration".into(), "0".into(), "-loglevel".into(), "error".into()];

    args.push("-i".into());
    args.push(match input {
        FfmpegInput::Stdin => "-".to_string(),
        FfmpegInput::Locator(locator) => locator.to_string(),
    });

    args.extend([
        "-f".to_string(),
        "s16le".to_string(),
        "-ar".to_string(),
        SAMPLE_RATE.to_string(),
        "-ac".to_string(),
        CHANNELS.to_string(),
    ]);

    if let Some(graph) = filter_graph(&options.filters, options.volume_percent) {
        info!("🎛️ Filtros: {}", graph);
        args.push("-af".into());
        args.push(graph);
    }

    if live {
        args.push("-ss".into());
        args.push(format_timestamp(Duration::ZERO));
    } else {
        let start = options.trim_start.filter(|s| !s.is_zero());
        if let Some(start) = start {
            args.push("-ss".into());
            args.push(format_timestamp(start));
        }
        if let Some(end) = options.trim_end.filter(|e| !e.is_zero() && Some(*e) > start) {
            args.push("-to".into());
            args.push(format_timestamp(end));
        }
    }

    args.push("pipe:1".into());
    args
}

pub struct FfmpegTranscoder {
    config: TranscodeConfig,
    sources: Arc<dyn SourceProvider>,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscodeConfig, sources: Arc<dyn SourceProvider>) -> Self {
        Self { config, sources }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn open(&self, item: &PlayableItem) -> Result<Pipeline, PipelineError> {
        let (args, source) = match item {
            PlayableItem::Track(track) => {
                let reader = self
                    .sources
                    .open_source(&track.id)
                    .await
                    .map_err(|e| PipelineError::Source {
                        id: track.id.clone(),
                        reason: e.to_string(),
                    })?;
                (build_ffmpeg_args(FfmpegInput::Stdin, &track.options, false), Some(reader))
            }
            PlayableItem::CustomAudio(custom) => (
                build_ffmpeg_args(
                    FfmpegInput::Locator(&custom.locator),
                    &custom.options,
                    item.is_live(),
                ),
                None,
            ),
        };

        info!("🎵 Transcodificando: {}", item.title());
        Pipeline::spawn(
            &self.config.ffmpeg_path,
            &args,
            source,
            self.config.buffer_frames,
            self.config.opus_bitrate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::effects::AudioFilter;
    use pretty_assertions::assert_eq;

    fn joined(args: Vec<String>) -> String {
        args.join(" ")
    }

    #[test]
    fn plain_track_requests_raw_pcm_from_stdin() {
        let args = build_ffmpeg_args(FfmpegInput::Stdin, &TranscodeOptions::default(), false);
        assert_eq!(
            joined(args),
            "-analyzeduration 0 -loglevel error -i - -f s16le -ar 48000 -ac 2 pipe:1"
        );
    }

    #[test]
    fn filters_volume_and_trim_window() {
        let options = TranscodeOptions::default()
            .with_filters(vec![AudioFilter::Nightcore, AudioFilter::Audio8D])
            .with_volume(Some(80))
            .with_trim(Some(Duration::from_secs(12)), Some(Duration::from_secs(200)));

        let args = build_ffmpeg_args(FfmpegInput::Stdin, &options, false);
        assert_eq!(
            joined(args),
            "-analyzeduration 0 -loglevel error -i - -f s16le -ar 48000 -ac 2 \
             -af atempo=1.06,asetrate=48000*1.25,apulsator=hz=0.09,volume=0.80 \
             -ss 00:00:12 -to 00:03:20 pipe:1"
        );
    }

    #[test]
    fn zero_trim_values_are_left_out() {
        let options = TranscodeOptions::default().with_trim(Some(Duration::ZERO), Some(Duration::ZERO));
        let args = build_ffmpeg_args(FfmpegInput::Stdin, &options, false);
        assert!(!args.contains(&"-ss".to_string()));
        assert!(!args.contains(&"-to".to_string()));
    }

    #[test]
    fn end_before_start_is_ignored() {
        let options = TranscodeOptions::default()
            .with_trim(Some(Duration::from_secs(100)), Some(Duration::from_secs(50)));
        let args = joined(build_ffmpeg_args(FfmpegInput::Stdin, &options, false));
        assert!(args.contains("-ss 00:01:40"));
        assert!(!args.contains("-to"));
    }

    #[test]
    fn live_locator_starts_at_zero_without_trim() {
        let options = TranscodeOptions::default()
            .with_trim(Some(Duration::from_secs(30)), Some(Duration::from_secs(60)));
        let args = build_ffmpeg_args(FfmpegInput::Locator("https://stream.m-1.fm/m1/aacp64"), &options, true);
        assert_eq!(
            joined(args),
            "-analyzeduration 0 -loglevel error -i https://stream.m-1.fm/m1/aacp64 \
             -f s16le -ar 48000 -ac 2 -ss 00:00:00 pipe:1"
        );
    }
}

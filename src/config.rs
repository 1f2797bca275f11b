use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Procesos externos
    pub ffmpeg_path: String,
    pub ytdlp_path: String,

    // Audio
    pub voice_connect_timeout_secs: u64,
    pub pipeline_buffer_frames: usize,
    pub opus_bitrate: i32,
    pub max_queue_size: usize,

    // Fuentes
    pub enable_sponsorblock: bool,
    pub playlist_limit: usize,
}

/// Configuración de cada player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    pub max_queue_size: usize,
}

/// Configuración del pipeline ffmpeg → Opus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeConfig {
    pub ffmpeg_path: String,
    /// Opus frames buffered between the encoder and the sink.
    pub buffer_frames: usize,
    pub opus_bitrate: i32,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Procesos externos
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),

            // Audio
            voice_connect_timeout_secs: std::env::var("VOICE_CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            pipeline_buffer_frames: std::env::var("PIPELINE_BUFFER_FRAMES")
                .unwrap_or_else(|_| "64".to_string()) // ~1.3s de audio
                .parse()?,
            opus_bitrate: std::env::var("OPUS_BITRATE")
                .unwrap_or_else(|_| "96000".to_string()) // 96kbps (Discord default)
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            // Fuentes
            enable_sponsorblock: std::env::var("ENABLE_SPONSORBLOCK")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            playlist_limit: std::env::var("PLAYLIST_LIMIT")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Opus bitrate must be between 8kbps and 510kbps
    /// - The voice connection timeout must be at least one second
    /// - Queue, buffer and playlist limits must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN is empty");
        }

        if self.opus_bitrate > 510000 {
            anyhow::bail!("Opus bitrate cannot exceed 510kbps, got: {}", self.opus_bitrate);
        }

        if self.opus_bitrate < 8000 {
            anyhow::bail!("Opus bitrate too low, minimum 8kbps, got: {}", self.opus_bitrate);
        }

        if self.voice_connect_timeout_secs == 0 {
            anyhow::bail!("Voice connect timeout must be at least 1 second");
        }

        if self.pipeline_buffer_frames == 0 {
            anyhow::bail!("Pipeline buffer must hold at least one frame");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.playlist_limit == 0 {
            anyhow::bail!("Playlist limit must be greater than 0");
        }

        Ok(())
    }

    pub fn voice_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.voice_connect_timeout_secs)
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            max_queue_size: self.max_queue_size,
        }
    }

    pub fn transcode_config(&self) -> TranscodeConfig {
        TranscodeConfig {
            ffmpeg_path: self.ffmpeg_path.clone(),
            buffer_frames: self.pipeline_buffer_frames,
            opus_bitrate: self.opus_bitrate,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Leaves out the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: Guild {}\n  \
            Tools: ffmpeg={}, yt-dlp={}\n  \
            Audio: {}kbps, {} frame buffer, {}s connect timeout\n  \
            Limits: {} queue, {} playlist items\n  \
            Features: SponsorBlock={}",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.ffmpeg_path,
            self.ytdlp_path,
            self.opus_bitrate / 1000,
            self.pipeline_buffer_frames,
            self.voice_connect_timeout_secs,
            self.max_queue_size,
            self.playlist_limit,
            self.enable_sponsorblock
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            ffmpeg_path: "ffmpeg".into(),
            ytdlp_path: "yt-dlp".into(),

            voice_connect_timeout_secs: 20,
            pipeline_buffer_frames: 64,
            opus_bitrate: 96000,
            max_queue_size: 1000,

            enable_sponsorblock: true,
            playlist_limit: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid() -> Config {
        Config {
            discord_token: "token".into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_are_valid_once_token_is_set() {
        assert!(Config::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = valid();
        config.opus_bitrate = 600_000;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.max_queue_size = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.voice_connect_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn derived_component_configs() {
        let config = valid();
        assert_eq!(config.player_config(), PlayerConfig { max_queue_size: 1000 });
        assert_eq!(
            config.transcode_config(),
            TranscodeConfig {
                ffmpeg_path: "ffmpeg".into(),
                buffer_frames: 64,
                opus_bitrate: 96000,
            }
        );
        assert_eq!(config.voice_connect_timeout(), Duration::from_secs(20));
        assert!(!config.summary().contains("token"));
    }
}

//! # Audio Module
//!
//! Playback core of the bot: one [`player::AudioPlayer`] per voice session.
//!
//! ## Architecture
//!
//! ### [`player`] - Session actor
//! - Owns the queue, the playback clock and the voice binding
//! - Applies commands and sink events one at a time, in arrival order
//! - Auto-advances the queue when a track ends or fails
//!
//! ### [`transcode`] and [`pipeline`] - Audio path
//! - source bytes → ffmpeg (s16le, 48kHz stereo) → Opus encoder → bounded channel
//! - Every stage is torn down exactly once, whichever way the stream ends
//!
//! ### [`sink`] and [`songbird_sink`] - Output
//! - `Sink` binds to a voice channel; a binding plays one encoded stream at a time
//! - The songbird implementation feeds our Opus frames to the driver as DCA
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Channels**: Stereo (2 channels)
//! - **Encoding**: Opus, 20ms frames, 96kbps by default

pub mod clock;
pub mod effects;
pub mod error;
pub mod item;
pub mod pipeline;
pub mod player;
pub mod queue;
pub mod radio;
pub mod sink;
pub mod songbird_sink;
pub mod transcode;

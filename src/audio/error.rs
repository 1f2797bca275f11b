use thiserror::Error;

/// Errores que el player devuelve a la capa de comandos.
///
/// Every failed transport command maps to one of these so the caller can
/// tell "nothing changed" apart from "action completed".
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlayerError {
    /// The sink bind timed out or was rejected; the session stays disconnected.
    #[error("voice connection failed: {0}")]
    ConnectionFailure(String),

    /// An external process or stream failed while starting a track.
    #[error("transcode pipeline failed: {0}")]
    PipelineFailure(String),

    /// The command makes no sense in the current state (seek with nothing playing, ...).
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// The query could not be turned into playable items.
    #[error("could not resolve query: {0}")]
    ResolveFailure(String),

    /// The player task is gone.
    #[error("player is shut down")]
    Closed,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open source {id}: {reason}")]
    Source { id: String, reason: String },

    #[error("pipeline io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("opus encoder error: {0}")]
    Encoder(String),

    #[error("pipeline stage {0} has no stdio handle")]
    MissingPipe(&'static str),

    #[error("{program} exited with {status}: {stderr}")]
    ProcessExit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

impl From<audiopus::Error> for PipelineError {
    fn from(err: audiopus::Error) -> Self {
        PipelineError::Encoder(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("voice connection timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("voice connection rejected: {0}")]
    Rejected(String),

    #[error("sink playback error: {0}")]
    Playback(String),
}

impl From<SinkError> for PlayerError {
    fn from(err: SinkError) -> Self {
        PlayerError::ConnectionFailure(err.to_string())
    }
}

impl From<PipelineError> for PlayerError {
    fn from(err: PipelineError) -> Self {
        PlayerError::PipelineFailure(err.to_string())
    }
}

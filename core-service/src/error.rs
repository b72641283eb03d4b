use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),
}

impl ServiceError {
    /// Stable machine code for the host bridge.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InitializationFailed(_) => "initialization_failed",
            ServiceError::Runtime(core_runtime::Error::CapabilityMissing { .. }) => {
                "capability_missing"
            }
            ServiceError::Runtime(_) => "runtime_error",
            ServiceError::Playback(err) => err.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

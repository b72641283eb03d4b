use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The remote side refused the request (device busy, connection denied).
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure is worth retrying by the caller.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            BridgeError::OperationFailed(_) => true,
            BridgeError::NotAvailable(_) | BridgeError::Rejected(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

//! Error taxonomy shared by the transform service, its clients and the batch tool.

pub type TransformResult<T> = Result<T, TransformError>;

#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    /// Rejected before any network call (wrong type, too large, missing field).
    #[error("{0}")]
    Validation(String),

    /// The provider credential is not configured.
    #[error("{0}")]
    Configuration(String),

    /// The fixed reference image could not be read.
    #[error("reference image unavailable: {0}")]
    ReferenceImage(String),

    /// The provider or the transform endpoint answered with an error.
    #[error("{message}")]
    Upstream {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The provider answered successfully but without an image payload.
    #[error("Failed to transform image")]
    MissingImage,

    /// Connect, timeout or body read failure.
    #[error("network error: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransformError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
            details: None,
        }
    }

    /// Status code the transform endpoint answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            _ => 500,
        }
    }

    /// The single message shown to the user.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

impl From<reqwest::Error> for TransformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {}", err))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

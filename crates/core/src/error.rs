/// Result alias that carries the custom [`SoundButtonError`] type.
pub type Result<T> = std::result::Result<T, SoundButtonError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SoundButtonError {
    /// The configuration was rejected at construction time.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    /// The clip never became playable, either because the engine reported a
    /// failure or because the load timeout elapsed first.
    #[error("clip `{url}` is unavailable: {reason}")]
    ClipUnavailable { url: String, reason: String },
    /// Transport call issued before the bound clip finished loading.
    #[error("clip `{url}` has not finished loading")]
    SessionNotReady { url: String },
    /// No live session is bound.
    #[error("audio session has been released")]
    SessionReleased,
    /// The engine refused to open a connection.
    #[error("audio engine error: {0}")]
    Engine(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration files that fail to parse.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl SoundButtonError {
    /// Creates an engine error from any message.
    pub fn engine<T: Into<String>>(msg: T) -> Self {
        Self::Engine(msg.into())
    }
}

/// Reasons a [`crate::ButtonConfig`] is refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("audio url must not be empty")]
    EmptyUrl,
    #[error("audio format must not be empty")]
    EmptyFormat,
    #[error("size must be a positive finite number, got {0}")]
    InvalidSize(f32),
    #[error("progress circle width {width} does not fit a button of size {size}")]
    InvalidStrokeWidth { width: f32, size: f32 },
    #[error("`{field}` must be a finite number of milliseconds >= 0, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },
    #[error("`{0}` is not a #rrggbb or #rrggbbaa color")]
    InvalidColor(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_convert_into_crate_error() {
        let err: SoundButtonError = ConfigurationError::EmptyUrl.into();
        assert!(matches!(err, SoundButtonError::Configuration(_)));
        assert_eq!(
            err.to_string(),
            "invalid configuration: audio url must not be empty"
        );
    }

    #[test]
    fn clip_unavailable_names_the_url() {
        let err = SoundButtonError::ClipUnavailable {
            url: "https://cdn.example/a.mp3".to_string(),
            reason: "timed out".to_string(),
        };
        assert!(format!("{err}").contains("a.mp3"));
    }
}

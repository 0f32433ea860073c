pub type CardpressResult<T> = Result<T, CardpressError>;

#[derive(thiserror::Error, Debug)]
pub enum CardpressError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Zero or negative output dimensions. The one condition that aborts a
    /// render before any fallback is attempted.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Template background could not be loaded. Always recovered with a
    /// placeholder fill; surfaces only when placeholder allocation fails.
    #[error("background unavailable: {0}")]
    BackgroundUnavailable(String),

    /// A field's image value could not be resolved or decoded. The field is
    /// skipped, the render continues.
    #[error("field asset unavailable: {0}")]
    FieldAssetUnavailable(String),

    #[error("font unavailable: {0}")]
    FontUnavailable(String),

    /// Every encoder in the fallback chain failed.
    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("render error: {0}")]
    Render(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CardpressError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_dimensions(msg: impl Into<String>) -> Self {
        Self::InvalidDimensions(msg.into())
    }

    pub fn background(msg: impl Into<String>) -> Self {
        Self::BackgroundUnavailable(msg.into())
    }

    pub fn field_asset(msg: impl Into<String>) -> Self {
        Self::FieldAssetUnavailable(msg.into())
    }

    pub fn font(msg: impl Into<String>) -> Self {
        Self::FontUnavailable(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::EncodingFailed(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }
}

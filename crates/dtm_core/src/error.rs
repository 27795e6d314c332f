use thiserror::Error;

/// Errors raised while validating domain objects at the JSON boundary.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("object has no string 'cumulocityType' discriminator")]
    MissingDiscriminator,

    #[error("payload does not match the '{cumulocity_type}' shape: {source}")]
    InvalidShape {
        cumulocity_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("smart function output must be null, an object or an array, got {found}")]
    UnexpectedOutput { found: &'static str },

    #[error("output element {index} is invalid: {reason}")]
    InvalidElement { index: usize, reason: Box<ModelError> },

    #[error("invalid manifest: {0}")]
    Manifest(#[source] serde_json::Error),

    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),
}

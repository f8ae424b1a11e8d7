use thiserror::Error;

/// Locating conversation elements in a page failed.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("document nesting exceeds {limit} levels")]
    TooDeep { limit: usize },
}

/// Converting a single message element failed.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("message nesting exceeds {limit} levels")]
    TooDeep { limit: usize },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("conversation discovery failed")]
    Discovery(#[from] DiscoveryError),
}

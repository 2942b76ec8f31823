//! Credential plumbing shared by event sources

pub mod secret;
pub mod token_cache;

pub use secret::SecretString;
pub use token_cache::{CachedToken, TokenCache, TokenError, TokenSource, DEFAULT_REFRESH_SKEW_SECS};

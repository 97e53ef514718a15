// Winner profile lookups.
//
// Two stages: resolve a chat username to an in-game name through an external
// resolution service, then enrich that name into a full profile from the
// game's public API. `LookupClient` runs either stage with retries and a
// deadline and always produces exactly one terminal `LookupEvent`.

mod client;
mod http;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use giveaway_core::protocol::Profile;

pub use client::{LookupClient, LookupTiming};
pub use http::HttpProfileLookup;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("no character named '{0}'")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no answer before the lookup deadline")]
    Deadline,

    #[error("profile lookups are not configured")]
    Disabled,
}

/// A source of winner profiles.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    /// Map a chat username to an in-game name. `Ok(None)` means the service
    /// has no record of the user; errors are worth retrying.
    async fn resolve_name(&self, username: &str) -> Result<Option<String>, LookupError>;

    /// Fetch the full profile for an in-game name. Once the character is
    /// identified, whatever is known by `deadline` is returned rather than
    /// an error.
    async fn fetch_profile(&self, name: &str, deadline: Instant) -> Result<Profile, LookupError>;
}

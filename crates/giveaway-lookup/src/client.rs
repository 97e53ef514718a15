// Lookup worker entry points used by the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use giveaway_core::config::Config;
use giveaway_core::protocol::{LookupEvent, LookupRequest};

use crate::{HttpProfileLookup, LookupError, ProfileLookup};

/// Slack between the enrichment soft deadline and the hard timeout.
const ENRICH_MARGIN: Duration = Duration::from_millis(500);

/// Deadlines for the two lookup stages. `enrich_timeout` is the hard limit
/// and matches the enrichment watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupTiming {
    pub resolve_timeout: Duration,
    pub enrich_timeout: Duration,
    pub retry_interval: Duration,
}

impl LookupTiming {
    /// Soft deadline handed to `fetch_profile`, early enough that a partial
    /// profile reaches the state machine before its watchdog fires.
    pub fn enrich_budget(&self) -> Duration {
        self.enrich_timeout
            .saturating_sub(ENRICH_MARGIN)
            .max(self.enrich_timeout / 2)
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            resolve_timeout: config.timers.lookup_timeout(),
            enrich_timeout: config.timers.watchdog(),
            retry_interval: Duration::from_millis(config.lookup.retry_interval_ms),
        }
    }
}

#[derive(Clone)]
pub enum LookupClient {
    Active(Arc<dyn ProfileLookup>),
    Disabled,
}

impl LookupClient {
    pub fn new(lookup: Arc<dyn ProfileLookup>) -> Self {
        LookupClient::Active(lookup)
    }

    /// HTTP lookups, or `Disabled` when neither service is configured.
    pub fn from_config(config: &Config) -> Result<Self, LookupError> {
        let lookup = &config.lookup;
        if lookup.profile_base_url.trim().is_empty() && lookup.resolve_url.is_none() {
            info!("profile lookups disabled");
            return Ok(LookupClient::Disabled);
        }
        Ok(LookupClient::Active(Arc::new(HttpProfileLookup::new(lookup)?)))
    }

    /// Carry out `request` and return its terminal event.
    pub async fn perform(
        &self,
        generation: u64,
        request: LookupRequest,
        timing: LookupTiming,
    ) -> LookupEvent {
        match request {
            LookupRequest::Resolve { username } => self.resolve(generation, username, timing).await,
            LookupRequest::Enrich { name } => self.enrich(generation, name, timing).await,
        }
    }

    async fn resolve(&self, generation: u64, username: String, timing: LookupTiming) -> LookupEvent {
        let LookupClient::Active(lookup) = self else {
            return LookupEvent::ResolveFailed {
                generation,
                reason: LookupError::Disabled.to_string(),
            };
        };

        let attempt = retry_resolve(lookup.as_ref(), &username, timing.retry_interval);
        match tokio::time::timeout(timing.resolve_timeout, attempt).await {
            Ok(Ok(Some(name))) => {
                info!(%username, %name, "username resolved");
                LookupEvent::Resolved {
                    generation,
                    username,
                    name,
                }
            }
            Ok(Ok(None)) => LookupEvent::NotFound {
                generation,
                username,
            },
            Ok(Err(e)) => LookupEvent::ResolveFailed {
                generation,
                reason: e.to_string(),
            },
            Err(_) => {
                warn!(%username, "name resolution gave no answer in time");
                LookupEvent::ResolveFailed {
                    generation,
                    reason: format!(
                        "no answer within {}s",
                        timing.resolve_timeout.as_secs_f32()
                    ),
                }
            }
        }
    }

    async fn enrich(&self, generation: u64, name: String, timing: LookupTiming) -> LookupEvent {
        let LookupClient::Active(lookup) = self else {
            return LookupEvent::ProfileFailed {
                generation,
                reason: LookupError::Disabled.to_string(),
            };
        };

        let deadline = Instant::now() + timing.enrich_budget();
        match tokio::time::timeout(timing.enrich_timeout, lookup.fetch_profile(&name, deadline)).await {
            Ok(Ok(profile)) => LookupEvent::ProfileReady {
                generation,
                profile,
            },
            Ok(Err(e)) => {
                warn!(%name, "profile fetch failed: {e}");
                LookupEvent::ProfileFailed {
                    generation,
                    reason: e.to_string(),
                }
            }
            Err(_) => LookupEvent::ProfileFailed {
                generation,
                reason: format!("no profile within {}s", timing.enrich_timeout.as_secs_f32()),
            },
        }
    }
}

/// Ask the resolution service until it gives a definite answer. Only
/// `Disabled` ends the retries early.
async fn retry_resolve(
    lookup: &dyn ProfileLookup,
    username: &str,
    retry_interval: Duration,
) -> Result<Option<String>, LookupError> {
    loop {
        match lookup.resolve_name(username).await {
            Ok(answer) => return Ok(answer),
            Err(LookupError::Disabled) => return Err(LookupError::Disabled),
            Err(e) => {
                debug!(%username, "resolution attempt failed, retrying: {e}");
                tokio::time::sleep(retry_interval).await;
            }
        }
    }
}

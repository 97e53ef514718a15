// HTTP implementation of `ProfileLookup`.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use giveaway_core::config::LookupConfig;
use giveaway_core::protocol::Profile;

use crate::{LookupError, ProfileLookup};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DATASOURCE: (&str, &str) = ("datasource", "tranquility");

/// Portrait sizes in order of preference.
const PORTRAIT_SIZES: [&str; 4] = ["px256x256", "px128x128", "px512x512", "px64x64"];

// ---------------------------------------------------------------------------
// HttpProfileLookup
// ---------------------------------------------------------------------------

pub struct HttpProfileLookup {
    http: reqwest::Client,
    resolve_url: Option<String>,
    base_url: String,
}

impl HttpProfileLookup {
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            resolve_url: config
                .resolve_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            base_url: config.profile_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value, LookupError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.get(&url).query(&[DATASOURCE]).send().await?;
        json_body(url, resp).await
    }

    async fn entity_name(&self, path: &str) -> Option<String> {
        match self.get_json(path).await {
            Ok(v) => v.get("name").and_then(Value::as_str).map(str::to_string),
            Err(e) => {
                warn!("profile detail {path} unavailable: {e}");
                None
            }
        }
    }

    /// Fill in affiliations and portrait, writing each field as soon as it
    /// arrives so an interrupted fetch keeps what it already has.
    async fn fill_details(&self, id: u64, profile: &mut Profile) {
        match self.get_json(&format!("/characters/{id}/")).await {
            Ok(details) => {
                if let Some(corp) = details.get("corporation_id").and_then(Value::as_u64) {
                    profile.corporation = self.entity_name(&format!("/corporations/{corp}/")).await;
                }
                if let Some(alliance) = details.get("alliance_id").and_then(Value::as_u64) {
                    profile.alliance = self.entity_name(&format!("/alliances/{alliance}/")).await;
                }
            }
            Err(e) => warn!(id, "character details unavailable: {e}"),
        }
        match self.get_json(&format!("/characters/{id}/portrait/")).await {
            Ok(portraits) => profile.portrait_url = portrait_url(&portraits),
            Err(e) => warn!(id, "portrait unavailable: {e}"),
        }
    }
}

#[async_trait]
impl ProfileLookup for HttpProfileLookup {
    async fn resolve_name(&self, username: &str) -> Result<Option<String>, LookupError> {
        let Some(template) = self.resolve_url.as_deref() else {
            return Err(LookupError::Disabled);
        };
        let url = resolve_request_url(template, username)?;
        debug!(%url, "querying name resolution service");

        let resp = self.http.get(url.clone()).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = resp.text().await?;
                extract_resolved_name(&body)
                    .map(Some)
                    .ok_or_else(|| LookupError::Malformed(format!("no name in response from {url}")))
            }
            status => Err(LookupError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn fetch_profile(&self, name: &str, deadline: Instant) -> Result<Profile, LookupError> {
        if self.base_url.is_empty() {
            return Err(LookupError::Disabled);
        }

        let url = format!("{}/universe/ids/", self.base_url);
        let request = async {
            let resp = self
                .http
                .post(&url)
                .query(&[DATASOURCE])
                .json(&[name])
                .send()
                .await?;
            json_body(url.clone(), resp).await
        };
        let ids = tokio::time::timeout_at(deadline, request)
            .await
            .map_err(|_| LookupError::Deadline)??;
        let (id, resolved) =
            first_character(&ids).ok_or_else(|| LookupError::NotFound(name.to_string()))?;

        let mut profile = Profile {
            name: resolved.unwrap_or_else(|| name.to_string()),
            character_id: Some(id),
            ..Profile::default()
        };

        // Everything past the id is best effort and shares what is left of
        // the deadline.
        if tokio::time::timeout_at(deadline, self.fill_details(id, &mut profile))
            .await
            .is_err()
        {
            warn!(id, "profile details cut short at the deadline");
        }

        debug!(?profile, "profile fetched");
        Ok(profile)
    }
}

async fn json_body(url: String, resp: reqwest::Response) -> Result<Value, LookupError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(LookupError::Status {
            url,
            status: status.as_u16(),
        });
    }
    resp.json::<Value>()
        .await
        .map_err(|e| LookupError::Malformed(format!("{url}: {e}")))
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Build the resolution request: `{twitch}` in the template is replaced by
/// the username, otherwise it is appended as a `twitch` query parameter.
pub(crate) fn resolve_request_url(template: &str, username: &str) -> Result<Url, LookupError> {
    let parse = |s: &str| Url::parse(s).map_err(|e| LookupError::Malformed(format!("{s}: {e}")));
    if template.contains("{twitch}") {
        return parse(&template.replace("{twitch}", username));
    }
    let mut url = parse(template)?;
    url.query_pairs_mut().append_pair("twitch", username);
    Ok(url)
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"\n]{2,40})""#).expect("quoted name pattern is valid"))
}

fn non_empty_str(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Pull the in-game name out of a resolution service response.
///
/// JSON objects are searched for `ign`, `character` or `name`; JSON arrays
/// use the first element's `ign` or `name`. A body that is not JSON falls
/// back to its first quoted string.
pub(crate) fn extract_resolved_name(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => ["ign", "character", "name"]
            .iter()
            .find_map(|k| non_empty_str(map.get(*k))),
        Ok(Value::Array(items)) => {
            let first = items.first()?;
            ["ign", "name"].iter().find_map(|k| non_empty_str(first.get(*k)))
        }
        Ok(_) => None,
        Err(_) => quoted_re().captures(body).map(|c| c[1].to_string()),
    }
}

/// The first character hit of a `/universe/ids/` response.
pub(crate) fn first_character(ids: &Value) -> Option<(u64, Option<String>)> {
    let hit = ids.get("characters")?.as_array()?.first()?;
    let id = hit.get("id")?.as_u64()?;
    Some((id, non_empty_str(hit.get("name"))))
}

pub(crate) fn portrait_url(portraits: &Value) -> Option<String> {
    PORTRAIT_SIZES
        .iter()
        .find_map(|size| non_empty_str(portraits.get(*size)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

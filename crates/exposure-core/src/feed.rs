//! Signed exposure feed download and parsing.
//!
//! The feed is served as a JSON envelope:
//!
//! ```json
//! { "payload": "<base64 feed document>", "signature": "<base64 ed25519 signature>" }
//! ```
//!
//! The signature covers the decoded payload bytes. Nothing inside the payload
//! is parsed until the signature validates against the configured key.
//!
//! The feed document is GeoJSON-shaped: every feature has `properties`
//! (`Key_Field` or `OBJECTID`, `fromTime_utc`, `toTime_utc`, optional `radius`
//! and `geohashFilter`) and a `geometry.coordinates` array.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::error::{ExposureError, Result};
use crate::store::FeedSource;
use crate::types::{SickFeed, SickReport};

/// The signed wrapper the feed is served in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Base64 of the feed document.
    pub payload: String,
    /// Base64 of the ed25519 signature over the decoded payload.
    pub signature: String,
}

#[derive(Debug, Deserialize)]
struct FeedDocument {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: FeatureProperties,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct FeatureProperties {
    #[serde(rename = "Key_Field", default)]
    key_field: Option<FeatureKey>,
    #[serde(rename = "OBJECTID", default)]
    object_id: Option<FeatureKey>,
    #[serde(rename = "fromTime_utc")]
    from_time_utc: i64,
    #[serde(rename = "toTime_utc")]
    to_time_utc: i64,
    #[serde(default)]
    radius: Option<f64>,
    #[serde(rename = "geohashFilter", default)]
    geohash_filter: Option<String>,
}

/// Report ids are published as numbers by some feeds and strings by others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureKey {
    Number(serde_json::Number),
    Text(String),
}

impl FeatureKey {
    fn into_id(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Geometry {
    #[serde(default)]
    coordinates: Vec<f64>,
}

/// Decode a base64 ed25519 public key.
///
/// # Errors
///
/// Returns [`ExposureError::FeedVerification`] if the key is not 32 valid bytes.
pub fn decode_verifying_key(key: &str) -> Result<VerifyingKey> {
    let bytes = BASE64
        .decode(key.trim())
        .map_err(|e| ExposureError::FeedVerification(format!("signing key is not base64: {e}")))?;
    let bytes = <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        ExposureError::FeedVerification(format!(
            "signing key must be 32 bytes, got {}",
            bytes.len()
        ))
    })?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| ExposureError::FeedVerification(format!("invalid signing key: {e}")))
}

/// Check the envelope signature and return the decoded payload.
///
/// # Errors
///
/// Returns [`ExposureError::FeedVerification`] if either field is not base64
/// or the signature does not match.
pub fn verify_envelope(envelope: &SignedEnvelope, key: &VerifyingKey) -> Result<Vec<u8>> {
    let payload = BASE64
        .decode(envelope.payload.trim())
        .map_err(|e| ExposureError::FeedVerification(format!("payload is not base64: {e}")))?;
    let signature = BASE64
        .decode(envelope.signature.trim())
        .map_err(|e| ExposureError::FeedVerification(format!("signature is not base64: {e}")))?;
    let signature = Signature::from_slice(&signature)
        .map_err(|e| ExposureError::FeedVerification(format!("malformed signature: {e}")))?;

    key.verify(&payload, &signature)
        .map_err(|_| ExposureError::FeedVerification("signature does not match payload".into()))?;
    Ok(payload)
}

/// Parse a verified feed document.
///
/// Features without an id are dropped with a warning.
///
/// # Errors
///
/// Returns [`ExposureError::FeedParse`] if the document is not a feed.
pub fn parse_feed(bytes: &[u8]) -> Result<SickFeed> {
    let document: FeedDocument =
        serde_json::from_slice(bytes).map_err(|e| ExposureError::FeedParse(e.to_string()))?;

    let mut reports = Vec::with_capacity(document.features.len());
    for (position, feature) in document.features.into_iter().enumerate() {
        let props = feature.properties;
        let Some(key) = props.key_field.or(props.object_id) else {
            warn!(position, "dropping feed feature without Key_Field/OBJECTID");
            continue;
        };
        reports.push(SickReport {
            source_id: key.into_id(),
            from_time_utc: props.from_time_utc,
            to_time_utc: props.to_time_utc,
            radius: props.radius,
            coordinates: feature.geometry.unwrap_or_default().coordinates,
            geohash_filter: props.geohash_filter.filter(|f| !f.is_empty()),
        });
    }
    Ok(SickFeed { reports })
}

/// Downloads the feed over HTTPS and verifies it before parsing.
///
/// Without a configured signing key every fetch fails verification, so the
/// geo check fails each run while the rest of the engine keeps working.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    key: Option<VerifyingKey>,
}

impl HttpFeedSource {
    /// Build a source from the fetch configuration.
    ///
    /// # Errors
    ///
    /// Fails if a signing key is set but invalid, or the HTTP client cannot
    /// be built. An empty key is accepted.
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let key = if config.signing_public_key.trim().is_empty() {
            warn!("no feed signing key configured; geo checks will fail verification");
            None
        } else {
            Some(decode_verifying_key(&config.signing_public_key)?)
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("exposure-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExposureError::FeedFetch(e.to_string()))?;
        Ok(Self { client, key })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_and_verify(&self, url: &str) -> Result<SickFeed> {
        let Some(key) = &self.key else {
            return Err(ExposureError::FeedVerification(
                "no signing key configured".into(),
            ));
        };
        if url.is_empty() {
            return Err(ExposureError::FeedFetch("no feed URL configured".into()));
        }
        debug!(url, "downloading exposure feed");

        let envelope: SignedEnvelope = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ExposureError::FeedFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| ExposureError::FeedParse(format!("invalid envelope: {e}")))?;

        let payload = verify_envelope(&envelope, key)?;
        let feed = parse_feed(&payload)?;
        debug!(reports = feed.reports.len(), "exposure feed verified");
        Ok(feed)
    }
}

/// A feed source returning a fixed feed, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFeedSource {
    feed: SickFeed,
}

impl StaticFeedSource {
    /// Always return `feed`.
    #[must_use]
    pub const fn new(feed: SickFeed) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    async fn fetch_and_verify(&self, _url: &str) -> Result<SickFeed> {
        Ok(self.feed.clone())
    }
}

//! The on-chain podping envelope: the `json` payload of a `custom_json`
//! operation, plus the surrounding operation metadata.

use serde::Serialize;

use crate::batch::Batch;
use crate::constants::{
    CURRENT_PODPING_VERSION, MAX_CUSTOM_JSON_BYTES, OPERATION_ID_PRODUCTION,
};
use crate::error::DomainError;
use crate::constants::NotificationReason;

/// The wire shape of a podping notification (spec §6: "Published
/// envelope").
///
/// Single-URL batches serialize `url`; multi-URL batches serialize
/// `urls`. `skip_serializing_if` keeps the unused field off the wire
/// entirely rather than emitting `null`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PodpingEnvelope {
    pub v: u8,
    pub num_urls: usize,
    pub r: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
}

impl PodpingEnvelope {
    /// Build an envelope from a sealed batch.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::EnvelopeTooLarge`] if the serialized
    /// envelope would exceed the chain's hard byte ceiling.
    pub fn from_batch(batch: &Batch, reason: NotificationReason) -> Result<Self, DomainError> {
        let urls = batch.urls();
        let envelope = if urls.len() == 1 {
            Self {
                v: CURRENT_PODPING_VERSION,
                num_urls: 1,
                r: reason as u8,
                url: Some(urls[0].clone()),
                urls: None,
            }
        } else {
            Self {
                v: CURRENT_PODPING_VERSION,
                num_urls: urls.len(),
                r: reason as u8,
                url: None,
                urls: Some(urls.to_vec()),
            }
        };

        let size = envelope.serialized_len();
        if size >= MAX_CUSTOM_JSON_BYTES {
            return Err(DomainError::EnvelopeTooLarge {
                actual: size,
                limit: MAX_CUSTOM_JSON_BYTES,
            });
        }
        Ok(envelope)
    }

    /// Byte size of the envelope once serialized to JSON.
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    /// The operation id this envelope should publish under. Callers pick
    /// production/livetest id elsewhere; this helper exists for the
    /// common production path.
    #[must_use]
    pub fn default_operation_id() -> &'static str {
        OPERATION_ID_PRODUCTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(seconds: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn single_url_batch_serializes_url_field() {
        let mut batch = Batch::new();
        batch.push("https://a.example/f.xml", at(0));
        let envelope = PodpingEnvelope::from_batch(&batch, NotificationReason::FeedUpdate)
            .expect("envelope construction failed");
        assert_eq!(envelope.num_urls, 1);
        assert_eq!(envelope.url.as_deref(), Some("https://a.example/f.xml"));
        assert!(envelope.urls.is_none());

        let json = serde_json::to_value(&envelope).expect("serialize failed");
        assert_eq!(json["v"], 2);
        assert_eq!(json["r"], 1);
        assert_eq!(json["url"], "https://a.example/f.xml");
        assert!(json.get("urls").is_none());
    }

    #[test]
    fn multi_url_batch_serializes_urls_field() {
        let mut batch = Batch::new();
        batch.push("A", at(0));
        batch.push("B", at(1));
        let envelope = PodpingEnvelope::from_batch(&batch, NotificationReason::FeedUpdate)
            .expect("envelope construction failed");
        assert_eq!(envelope.num_urls, 2);
        assert!(envelope.url.is_none());
        assert_eq!(envelope.urls, Some(vec!["A".to_string(), "B".to_string()]));
    }

    #[test]
    fn oversized_envelope_is_rejected() {
        let mut batch = Batch::new();
        for i in 0..90 {
            batch.push(format!("https://example.com/{}", "x".repeat(70) + &i.to_string()), at(0));
        }
        let result = PodpingEnvelope::from_batch(&batch, NotificationReason::FeedUpdate);
        assert!(result.is_err());
    }
}

//! Domain events for the shortener context.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shorturl_core::event::{DomainEvent, EventMetadata};
use shorturl_core::serializer::Serializer;

/// Emitted when a single URL is shortened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortUrlCreated {
    /// The short hash, also the entity id.
    pub hash: String,
    /// The URL the hash stands for.
    pub original_url: String,
}

impl ShortUrlCreated {
    /// Stable type name.
    pub const EVENT_TYPE: &'static str = "short_url.created";
}

/// Emitted when the URL behind a short hash passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortUrlVerified {
    /// The URL that was confirmed.
    pub url: String,
}

impl ShortUrlVerified {
    /// Stable type name.
    pub const EVENT_TYPE: &'static str = "short_url.verified";
}

/// Emitted when a set of URLs is shortened behind one hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancedUrlCreated {
    /// The short hash, also the entity id.
    pub hash: String,
    /// The URLs to balance between, in submission order.
    pub original_urls: Vec<String>,
}

impl LoadBalancedUrlCreated {
    /// Stable type name.
    pub const EVENT_TYPE: &'static str = "load_balanced_url.created";
}

/// Emitted when one URL of a load-balanced set passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancedUrlVerified {
    /// The URL that was confirmed.
    pub url: String,
}

impl LoadBalancedUrlVerified {
    /// Stable type name.
    pub const EVENT_TYPE: &'static str = "load_balanced_url.verified";
}

/// Event payload variants for the shortener context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlEventKind {
    /// A single URL was shortened.
    ShortUrlCreated(ShortUrlCreated),
    /// A single URL was verified.
    ShortUrlVerified(ShortUrlVerified),
    /// A set of URLs was shortened.
    LoadBalancedUrlCreated(LoadBalancedUrlCreated),
    /// One URL of a set was verified.
    LoadBalancedUrlVerified(LoadBalancedUrlVerified),
}

impl UrlEventKind {
    /// Stable type name of the variant.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ShortUrlCreated(_) => ShortUrlCreated::EVENT_TYPE,
            Self::ShortUrlVerified(_) => ShortUrlVerified::EVENT_TYPE,
            Self::LoadBalancedUrlCreated(_) => LoadBalancedUrlCreated::EVENT_TYPE,
            Self::LoadBalancedUrlVerified(_) => LoadBalancedUrlVerified::EVENT_TYPE,
        }
    }
}

impl From<ShortUrlCreated> for UrlEventKind {
    fn from(payload: ShortUrlCreated) -> Self {
        Self::ShortUrlCreated(payload)
    }
}

impl From<ShortUrlVerified> for UrlEventKind {
    fn from(payload: ShortUrlVerified) -> Self {
        Self::ShortUrlVerified(payload)
    }
}

impl From<LoadBalancedUrlCreated> for UrlEventKind {
    fn from(payload: LoadBalancedUrlCreated) -> Self {
        Self::LoadBalancedUrlCreated(payload)
    }
}

impl From<LoadBalancedUrlVerified> for UrlEventKind {
    fn from(payload: LoadBalancedUrlVerified) -> Self {
        Self::LoadBalancedUrlVerified(payload)
    }
}

/// Domain event envelope for the shortener context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: UrlEventKind,
}

impl UrlEvent {
    /// Creates an event of `entity_id` at `version`.
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        version: i64,
        happened_on: DateTime<Utc>,
        kind: impl Into<UrlEventKind>,
    ) -> Self {
        Self {
            metadata: EventMetadata::new(entity_id, version, happened_on),
            kind: kind.into(),
        }
    }
}

/// Wire shape of `data`: metadata fields side by side with the payload.
#[derive(Serialize)]
struct DataRef<'a, T> {
    #[serde(flatten)]
    metadata: &'a EventMetadata,
    #[serde(flatten)]
    payload: &'a T,
}

#[derive(Deserialize)]
struct Data<T> {
    #[serde(flatten)]
    metadata: EventMetadata,
    #[serde(flatten)]
    payload: T,
}

fn data<T: Serialize>(
    metadata: &EventMetadata,
    payload: &T,
) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(DataRef { metadata, payload })
}

fn decode<T>(data: serde_json::Value) -> Result<UrlEvent, serde_json::Error>
where
    T: DeserializeOwned + Into<UrlEventKind>,
{
    let data: Data<T> = serde_json::from_value(data)?;
    Ok(UrlEvent {
        metadata: data.metadata,
        kind: data.payload.into(),
    })
}

impl DomainEvent for UrlEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn to_data(&self) -> Result<serde_json::Value, serde_json::Error> {
        match &self.kind {
            UrlEventKind::ShortUrlCreated(p) => data(&self.metadata, p),
            UrlEventKind::ShortUrlVerified(p) => data(&self.metadata, p),
            UrlEventKind::LoadBalancedUrlCreated(p) => data(&self.metadata, p),
            UrlEventKind::LoadBalancedUrlVerified(p) => data(&self.metadata, p),
        }
    }
}

/// Serializer with every shortener event bound.
#[must_use]
pub fn serializer() -> Serializer<UrlEvent> {
    Serializer::new()
        .bind(ShortUrlCreated::EVENT_TYPE, decode::<ShortUrlCreated>)
        .bind(ShortUrlVerified::EVENT_TYPE, decode::<ShortUrlVerified>)
        .bind(
            LoadBalancedUrlCreated::EVENT_TYPE,
            decode::<LoadBalancedUrlCreated>,
        )
        .bind(
            LoadBalancedUrlVerified::EVENT_TYPE,
            decode::<LoadBalancedUrlVerified>,
        )
}

#[cfg(test)]
mod tests {
    use shorturl_core::error::SerializationError;
    use shorturl_test_support::fixed_time;

    use super::*;

    #[test]
    fn test_created_event_marshals_to_tagged_envelope() {
        // Arrange
        let event = UrlEvent::new(
            "cv6VxVdu",
            0,
            fixed_time(),
            ShortUrlCreated {
                hash: "cv6VxVdu".into(),
                original_url: "https://google.com".into(),
            },
        );

        // Act
        let bytes = serializer().marshal(&event).unwrap();

        // Assert
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "short_url.created");
        assert_eq!(json["data"]["entity_id"], "cv6VxVdu");
        assert_eq!(json["data"]["version"], 0);
        assert_eq!(json["data"]["hash"], "cv6VxVdu");
        assert_eq!(json["data"]["original_url"], "https://google.com");
    }

    #[test]
    fn test_every_kind_survives_the_wire() {
        let serializer = serializer();
        let events = [
            UrlEvent::new(
                "h",
                1,
                fixed_time(),
                ShortUrlVerified {
                    url: "https://a.example".into(),
                },
            ),
            UrlEvent::new(
                "l",
                0,
                fixed_time(),
                LoadBalancedUrlCreated {
                    hash: "l".into(),
                    original_urls: vec!["https://a.example".into(), "https://b.example".into()],
                },
            ),
            UrlEvent::new(
                "l",
                2,
                fixed_time(),
                LoadBalancedUrlVerified {
                    url: "https://b.example".into(),
                },
            ),
        ];

        for event in events {
            let bytes = serializer.marshal(&event).unwrap();
            assert_eq!(serializer.unmarshal(&bytes).unwrap(), event);
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serializer().unmarshal(br#"{"type":"short_url.deleted","data":{}}"#);

        assert!(matches!(
            result,
            Err(SerializationError::UnknownEventType(t)) if t == "short_url.deleted"
        ));
    }

    #[test]
    fn test_event_type_names_are_stable() {
        assert_eq!(ShortUrlCreated::EVENT_TYPE, "short_url.created");
        assert_eq!(ShortUrlVerified::EVENT_TYPE, "short_url.verified");
        assert_eq!(LoadBalancedUrlCreated::EVENT_TYPE, "load_balanced_url.created");
        assert_eq!(LoadBalancedUrlVerified::EVENT_TYPE, "load_balanced_url.verified");
    }

    #[test]
    fn test_serializer_binds_every_kind() {
        let serializer = serializer();

        for event_type in [
            ShortUrlCreated::EVENT_TYPE,
            ShortUrlVerified::EVENT_TYPE,
            LoadBalancedUrlCreated::EVENT_TYPE,
            LoadBalancedUrlVerified::EVENT_TYPE,
        ] {
            assert!(serializer.is_bound(event_type), "{event_type} is not bound");
        }
    }
}

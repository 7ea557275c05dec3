use std::collections::HashMap;

use derive_more::From;
use serde::Serialize;

use crate::context::ContextKeys;
use crate::timestamp::Timestamp;

/// Type alias for a map of user-defined trait names to values, attached to identify and
/// track events.
pub type Traits = HashMap<String, TraitValue>;

/// Possible values of a trait.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `f64`, and `bool` types.
#[derive(Debug, Clone, PartialEq, From, Serialize)]
#[serde(untagged)]
pub enum TraitValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
}

impl From<&str> for TraitValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// The kind of analytics event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Associates the anonymous tracker with known company/user keys.
    Identify,
    /// Records a named usage event against the current context.
    Track,
}

/// Company payload nested in an identify event.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyIdentify {
    /// Identifying keys for the company.
    pub keys: ContextKeys,
    /// Display name for the company.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// User-defined company traits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traits: Option<Traits>,
}

/// Body of an identify event: the keys identifying the user, plus optional traits and an
/// optional nested company.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyBody {
    /// Identifying keys for the user.
    pub keys: ContextKeys,
    /// Display name for the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// User-defined user traits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traits: Option<Traits>,
    /// Company this user belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanyIdentify>,
}

/// Body of a track event: the event name, the context it happened under, and optional
/// traits. Company/user default to the client's current context when left unset.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackBody {
    /// Name of the tracked event.
    pub event: String,
    /// Company key group; filled from the current context when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<ContextKeys>,
    /// User key group; filled from the current context when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ContextKeys>,
    /// User-defined event traits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traits: Option<Traits>,
}

/// Event-type-specific payload.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventBody {
    /// Payload of an [`EventType::Identify`] event.
    Identify(IdentifyBody),
    /// Payload of an [`EventType::Track`] event.
    Track(TrackBody),
}

/// An immutable record of one identify or track action, created at call time and sent
/// fire-and-forget to the event ingestion endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// API key identifying the environment; events carry the key in the body, not a header.
    pub api_key: String,
    /// Whether this is an identify or a track event.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Event-type-specific payload.
    pub body: EventBody,
    /// When the event was created.
    pub sent_at: Timestamp,
    /// Unique id of this event.
    pub tracker_event_id: String,
    /// Anonymous id correlating events before the user is identified.
    pub tracker_user_id: String,
}

impl Event {
    pub(crate) fn new(
        api_key: String,
        event_type: EventType,
        body: EventBody,
        tracker_user_id: String,
    ) -> Event {
        Event {
            api_key,
            event_type,
            body,
            sent_at: crate::timestamp::now(),
            tracker_event_id: uuid::Uuid::new_v4().to_string(),
            tracker_user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_event_serializes_to_wire_shape() {
        let body = IdentifyBody {
            keys: [("id".to_owned(), "user_1".to_owned())].into_iter().collect(),
            name: Some("Jamie".to_owned()),
            traits: Some([("plan".to_owned(), "pro".into())].into_iter().collect()),
            company: Some(CompanyIdentify {
                keys: [("id".to_owned(), "comp_1".to_owned())].into_iter().collect(),
                name: None,
                traits: None,
            }),
        };
        let event = Event::new(
            "api-key".to_owned(),
            EventType::Identify,
            EventBody::Identify(body),
            "anon-1".to_owned(),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["apiKey"], "api-key");
        assert_eq!(value["type"], "identify");
        assert_eq!(value["trackerUserId"], "anon-1");
        assert_eq!(value["body"]["keys"]["id"], "user_1");
        assert_eq!(value["body"]["company"]["keys"]["id"], "comp_1");
        assert_eq!(value["body"]["traits"]["plan"], "pro");
        assert!(value["sentAt"].is_string());
    }

    #[test]
    fn track_event_omits_absent_fields() {
        let event = Event::new(
            "api-key".to_owned(),
            EventType::Track,
            EventBody::Track(TrackBody {
                event: "query".to_owned(),
                ..TrackBody::default()
            }),
            "anon-1".to_owned(),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "track");
        assert_eq!(value["body"]["event"], "query");
        assert!(value["body"].get("company").is_none());
        assert!(value["body"].get("traits").is_none());
    }

    #[test]
    fn trait_values_convert_from_primitives() {
        let string: TraitValue = "pro".into();
        let number: TraitValue = 42.0.into();
        let boolean: TraitValue = true.into();

        assert_eq!(string, TraitValue::String("pro".to_owned()));
        assert_eq!(number, TraitValue::Number(42.0));
        assert_eq!(boolean, TraitValue::Boolean(true));
    }
}

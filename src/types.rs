use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A resume document as stored in `resume_json`.
///
/// The reconciler never looks inside; equality is structural JSON equality,
/// so documents rebuilt from a round trip still compare equal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeDocument(pub Value);

impl ResumeDocument {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// One entry of a chat transcript.
///
/// `resume` is the document the message was produced against (user turns) or
/// produced (assistant turns).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<ResumeDocument>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, resume: Option<ResumeDocument>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            resume,
        }
    }

    pub fn assistant(content: impl Into<String>, resume: Option<ResumeDocument>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            resume,
        }
    }
}

/// A persisted, named resume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resume {
    pub id: i64,
    pub name: String,
    pub resume_json: ResumeDocument,
    #[serde(default, with = "timestamp::option")]
    pub ttl: Option<OffsetDateTime>,
    #[serde(with = "timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "timestamp")]
    pub updated_at: OffsetDateTime,
}

impl Resume {
    /// Whether the server-side retention window has passed.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        matches!(self.ttl, Some(ttl) if ttl <= now)
    }
}

/// A named setting record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub id: i64,
    pub name: String,
    pub value: String,
    #[serde(with = "timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "timestamp")]
    pub updated_at: OffsetDateTime,
}

/// Server timestamps arrive as RFC 3339, or as naive ISO datetimes when the
/// database dropped the offset. Naive values are taken as UTC.
pub mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::FormatItem;
    use time::format_description::well_known::Rfc3339;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime};

    const NAIVE: &[FormatItem<'static>] = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
    );

    pub fn parse(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
        match OffsetDateTime::parse(raw, &Rfc3339) {
            Ok(value) => Ok(value),
            Err(err) => PrimitiveDateTime::parse(raw, NAIVE)
                .map(PrimitiveDateTime::assume_utc)
                .map_err(|_| err),
        }
    }

    pub fn serialize<S: Serializer>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<OffsetDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            time::serde::rfc3339::option::serialize(value, serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<OffsetDateTime>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => parse(&raw).map(Some).map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

// crates/types/src/timestamp.rs
//! Timestamp (de)serialization for the backend's job records.
//!
//! The backend writes `datetime.utcnow().isoformat()`, which carries no
//! offset. Naive values are read as UTC; offset-carrying RFC 3339 values are
//! accepted as well. Output is always RFC 3339 with a `Z` suffix.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Parse a naive or RFC 3339 timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => raw.parse::<NaiveDateTime>().map(|naive| naive.and_utc()),
    }
}

/// Format a timestamp the way every outgoing payload carries it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub mod utc {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .map_err(|e| D::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }
}

pub mod utc_option {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&super::format_timestamp(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => super::parse_timestamp(&raw)
                .map(Some)
                .map_err(|e| D::Error::custom(format!("invalid timestamp {raw:?}: {e}"))),
            None => Ok(None),
        }
    }
}

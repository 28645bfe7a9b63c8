//! Serde adapter for version timestamps.
//!
//! Timestamps are written as RFC 3339 in UTC. Documents written by older tools carry local
//! ISO-8601 timestamps without an offset; those are read back as local time.
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{s}'")))
}

fn parse(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}

//! Record model shared by every backend
//!
//! Records are plain JSON objects partitioned into a fixed set of collections.
//! Ordering is always lexical on a field's string form, which is why every
//! timestamp written by this crate is a fixed-width ISO-8601 string.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// One stored item: a JSON object carrying a string `id`
pub type Record = Map<String, Value>;

/// Field holding a record's identifier
pub const ID_FIELD: &str = "id";

/// Named partition of records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    /// Completed assessments, ordered by `timestamp`
    Assessments,
    /// The singleton user profile
    UserProfile,
    /// Usage sessions, ordered by `startTime`
    Sessions,
    /// Keyed user preferences
    Preferences,
}

impl Collection {
    /// Every collection, in schema order
    pub const ALL: [Collection; 4] = [
        Collection::Assessments,
        Collection::UserProfile,
        Collection::Sessions,
        Collection::Preferences,
    ];

    /// Stable collection name used in storage keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Assessments => "assessments",
            Collection::UserProfile => "userProfile",
            Collection::Sessions => "sessions",
            Collection::Preferences => "preferences",
        }
    }

    /// Field the collection is naturally ordered by, if any
    pub fn time_field(&self) -> Option<&'static str> {
        match self {
            Collection::Assessments => Some("timestamp"),
            Collection::Sessions => Some("startTime"),
            Collection::UserProfile | Collection::Preferences => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction for collection queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest key first
    Asc,
    /// Largest key first
    #[default]
    Desc,
}

/// Read the `id` of a record, if it has a string one
pub fn record_id(record: &Record) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// String form of a field used for ordering
///
/// Strings compare verbatim, other scalars by their JSON text, and a missing
/// or null field as the empty string. Comparison is never numeric, so `"9"`
/// sorts after `"10"`.
pub fn sort_key(record: &Record, field: &str) -> String {
    match record.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn compare_records(a: &Record, b: &Record, field: &str) -> Ordering {
    sort_key(a, field)
        .cmp(&sort_key(b, field))
        .then_with(|| record_id(a).unwrap_or_default().cmp(record_id(b).unwrap_or_default()))
}

/// Sort records lexically by `field`, ties broken by `id`
pub fn sort_records(records: &mut [Record], field: &str, order: SortOrder) {
    match order {
        SortOrder::Asc => records.sort_by(|a, b| compare_records(a, b, field)),
        SortOrder::Desc => records.sort_by(|a, b| compare_records(b, a, field)),
    }
}

/// Current time as an ISO-8601 UTC string with millisecond precision
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generate a record id
///
/// Base-36 milliseconds since the epoch followed by a base-36 random suffix.
/// Collisions are not expected within one client session; ids are not
/// unique across clients.
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    let random = uuid::Uuid::new_v4().as_u128() as u64;
    format!("{}{}", to_base36(millis), to_base36(u128::from(random)))
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if n == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_collection_names() {
        let names: Vec<&str> = Collection::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["assessments", "userProfile", "sessions", "preferences"]);
        assert_eq!(Collection::UserProfile.to_string(), "userProfile");
    }

    #[test]
    fn test_time_fields() {
        assert_eq!(Collection::Assessments.time_field(), Some("timestamp"));
        assert_eq!(Collection::Sessions.time_field(), Some("startTime"));
        assert_eq!(Collection::Preferences.time_field(), None);
    }

    #[test]
    fn test_sort_key_forms() {
        let r = record(json!({"s": "abc", "n": 42, "b": true, "z": null}));
        assert_eq!(sort_key(&r, "s"), "abc");
        assert_eq!(sort_key(&r, "n"), "42");
        assert_eq!(sort_key(&r, "b"), "true");
        assert_eq!(sort_key(&r, "z"), "");
        assert_eq!(sort_key(&r, "missing"), "");
    }

    #[test]
    fn test_sort_is_lexical_not_numeric() {
        let mut records = vec![
            record(json!({"id": "a", "score": 10})),
            record(json!({"id": "b", "score": 9})),
        ];

        sort_records(&mut records, "score", SortOrder::Desc);
        assert_eq!(record_id(&records[0]), Some("b"));

        // "2023-01-02" is lexically smaller than "2023-01-10"
        let mut dates = vec![
            record(json!({"id": "x", "timestamp": "2023-01-10"})),
            record(json!({"id": "y", "timestamp": "2023-01-02"})),
        ];
        sort_records(&mut dates, "timestamp", SortOrder::Asc);
        assert_eq!(record_id(&dates[0]), Some("y"));
        assert_eq!(record_id(&dates[1]), Some("x"));
    }

    #[test]
    fn test_sort_ties_follow_id() {
        let mut records = vec![
            record(json!({"id": "b", "k": "same"})),
            record(json!({"id": "a", "k": "same"})),
            record(json!({"id": "c", "k": "same"})),
        ];

        sort_records(&mut records, "k", SortOrder::Asc);
        let ids: Vec<_> = records.iter().filter_map(record_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        sort_records(&mut records, "k", SortOrder::Desc);
        let ids: Vec<_> = records.iter().filter_map(record_id).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_missing_field_sorts_first_ascending() {
        let mut records = vec![
            record(json!({"id": "1", "timestamp": "2024-01-01T00:00:00.000Z"})),
            record(json!({"id": "2"})),
        ];

        sort_records(&mut records, "timestamp", SortOrder::Asc);
        assert_eq!(record_id(&records[0]), Some("2"));
    }

    #[test]
    fn test_generate_id_shape() {
        let a = generate_id();
        let b = generate_id();

        assert_ne!(a, b);
        assert!(a.len() > 8);
        assert!(a.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_now_iso_is_fixed_width_utc() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }
}

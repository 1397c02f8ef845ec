//! History model types.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::probe::{Latency, ProbeResult};

/// One target's outcome within a round, keyed by target label.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundEntry {
    pub label: String,
    pub latency: Latency,
}

/// A sealed round: one entry per configured target, in target order.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundRecord {
    pub timestamp: DateTime<Utc>,
    pub entries: Vec<RoundEntry>,
}

impl RoundRecord {
    pub fn seal(timestamp: DateTime<Utc>, results: &[ProbeResult]) -> Self {
        let entries = results
            .iter()
            .map(|r| RoundEntry {
                label: r.target.label.clone(),
                latency: r.latency,
            })
            .collect();
        Self { timestamp, entries }
    }

    pub fn latency_of(&self, label: &str) -> Option<Latency> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.latency)
    }

    /// At least one target answered this round.
    pub fn any_ok(&self) -> bool {
        self.entries.iter().any(|e| e.latency.is_ok())
    }

    /// History key for this round.
    pub fn key(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Rounds in arrival order, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    records: VecDeque<RoundRecord>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RoundRecord> + ExactSizeIterator {
        self.records.iter()
    }

    pub fn oldest(&self) -> Option<&RoundRecord> {
        self.records.front()
    }

    pub fn latest(&self) -> Option<&RoundRecord> {
        self.records.back()
    }

    pub(crate) fn push(&mut self, record: RoundRecord) {
        self.records.push_back(record);
    }

    pub(crate) fn evict_oldest(&mut self) -> Option<RoundRecord> {
        self.records.pop_front()
    }
}

/// Parse a round timestamp from the history file.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Hand-edited or older files
    let formats = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    None
}

// The file is an object keyed by timestamp whose values are objects keyed by
// target label. Serde maps are walked in document order on both sides so
// arrival order survives a round trip.

struct EntriesRef<'a>(&'a [RoundEntry]);

impl Serialize for EntriesRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in self.0 {
            map.serialize_entry(&entry.label, &entry.latency)?;
        }
        map.end()
    }
}

impl Serialize for TimeSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for record in &self.records {
            map.serialize_entry(&record.key(), &EntriesRef(&record.entries))?;
        }
        map.end()
    }
}

struct Entries(Vec<RoundEntry>);

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Entries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of target latencies")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, latency)) = access.next_entry::<String, Latency>()? {
                    entries.push(RoundEntry { label, latency });
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl<'de> Deserialize<'de> for TimeSeries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SeriesVisitor;

        impl<'de> Visitor<'de> for SeriesVisitor {
            type Value = TimeSeries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of rounds keyed by timestamp")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut series = TimeSeries::new();
                while let Some((key, entries)) = access.next_entry::<String, Entries>()? {
                    let timestamp = parse_timestamp(&key)
                        .ok_or_else(|| de::Error::custom(format!("invalid round timestamp: {}", key)))?;
                    series.push(RoundRecord {
                        timestamp,
                        entries: entries.0,
                    });
                }
                Ok(series)
            }
        }

        deserializer.deserialize_map(SeriesVisitor)
    }
}

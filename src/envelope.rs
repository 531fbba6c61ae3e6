use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::value::RawValue;

/// Wire format version emitted in every envelope.
pub const WIRE_VERSION: &str = "0";

/// Envelope timestamp: ISO-8601 UTC with millisecond precision.
pub fn wire_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One entry of the data block: either an encoded JSON node or a raw
/// caller-supplied fragment spliced in verbatim.
pub enum DataEntry {
    Node(serde_json::Value),
    Raw(Box<RawValue>),
}

/// The `data` section of the envelope.
///
/// Usually a list of key/entry fields in insertion order; the
/// single-object payload shapes replace the whole block with one JSON
/// node or raw fragment instead.
pub enum DataBlock {
    Fields(Vec<(String, DataEntry)>),
    Whole(Box<RawValue>),
    Node(serde_json::Value),
}

impl DataBlock {
    pub fn empty() -> Self {
        DataBlock::Fields(Vec::new())
    }

    pub fn push_node(&mut self, key: impl Into<String>, node: serde_json::Value) {
        if let DataBlock::Fields(entries) = self {
            entries.push((key.into(), DataEntry::Node(node)));
        }
    }

    /// Splice a raw JSON fragment under `key`. An invalid fragment is
    /// demoted to a JSON string of its text rather than poisoning the
    /// line.
    pub fn push_raw(&mut self, key: impl Into<String>, fragment: &str) {
        if let DataBlock::Fields(entries) = self {
            entries.push((key.into(), raw_entry(fragment)));
        }
    }

    /// Replace the whole block with a raw fragment, for the
    /// single-object shapes. Falls back to a JSON string on invalid
    /// input.
    pub fn whole_raw(fragment: &str) -> Self {
        match RawValue::from_string(fragment.to_string()) {
            Ok(raw) => DataBlock::Whole(raw),
            Err(_) => DataBlock::Node(serde_json::Value::String(fragment.to_string())),
        }
    }
}

fn raw_entry(fragment: &str) -> DataEntry {
    match RawValue::from_string(fragment.to_string()) {
        Ok(raw) => DataEntry::Raw(raw),
        Err(_) => DataEntry::Node(serde_json::Value::String(fragment.to_string())),
    }
}

impl Serialize for DataBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            DataBlock::Fields(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, entry) in entries {
                    match entry {
                        DataEntry::Node(node) => map.serialize_entry(key, node)?,
                        DataEntry::Raw(raw) => map.serialize_entry(key, &**raw)?,
                    }
                }
                map.end()
            }
            DataBlock::Whole(raw) => raw.serialize(serializer),
            DataBlock::Node(node) => node.serialize(serializer),
        }
    }
}

/// The wire envelope. Field declaration order is the canonical emission
/// order; the line on the wire is this struct serialized and terminated
/// with a single newline.
#[derive(Serialize)]
pub struct Envelope<'a> {
    pub time: String,
    pub name: &'a str,
    pub level: &'static str,
    pub data: DataBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<serde_json::Value>,
    pub context: serde_json::Map<String, serde_json::Value>,
    pub id: String,
    pub version: &'static str,
}

//! Server entry list handed to the engine at session start.
//!
//! The list is the embedded set followed by a one-time import from the
//! legacy store, a JSON document of the form `{"serverEntries": ["...", ...]}`.
//! The import keeps at most `max_legacy` records and skips the remainder
//! while parsing, so a store that grew without bound over the years cannot
//! balloon memory. A successful import deletes the store.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserializer;
use thiserror::Error;
use tracing::{info, warn};

/// Ordered list of opaque server entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryList {
    entries: Vec<String>,
}

impl EntryList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Render in the engine's wire form: one entry per line.
    pub fn to_engine_string(&self) -> String {
        let mut out = String::with_capacity(self.entries.iter().map(|e| e.len() + 1).sum());
        for entry in &self.entries {
            out.push_str(entry);
            out.push('\n');
        }
        out
    }
}

/// Build the entry list: embedded entries first, then up to `max_legacy`
/// imported ones. Import failures fall back to the embedded set and are
/// never returned to the caller.
pub fn build_entry_list(embedded: &[String], legacy_path: &Path, max_legacy: usize) -> EntryList {
    let mut entries = embedded.to_vec();

    match read_legacy_entries(legacy_path, max_legacy) {
        Ok(imported) => {
            info!(
                "Entries: imported {} legacy server entries from {}",
                imported.len(),
                legacy_path.display()
            );
            entries.extend(imported);
            // Never import the same store twice.
            if let Err(e) = std::fs::remove_file(legacy_path) {
                warn!("Entries: failed to delete {}: {e}", legacy_path.display());
            }
        }
        Err(LegacyError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Entries: legacy import failed: {e}"),
    }

    EntryList { entries }
}

#[derive(Error, Debug)]
enum LegacyError {
    #[error("read: {0}")]
    Io(io::Error),
    #[error("parse: {0}")]
    Json(serde_json::Error),
}

fn read_legacy_entries(path: &Path, max_legacy: usize) -> Result<Vec<String>, LegacyError> {
    let file = File::open(path).map_err(LegacyError::Io)?;
    let mut de = serde_json::Deserializer::from_reader(BufReader::new(file));
    let entries = LegacyDocument { max_legacy }
        .deserialize(&mut de)
        .map_err(LegacyError::Json)?;
    de.end().map_err(LegacyError::Json)?;
    Ok(entries)
}

/// Seed for the top-level object; extracts `serverEntries`, ignores other keys.
struct LegacyDocument {
    max_legacy: usize,
}

impl<'de> DeserializeSeed<'de> for LegacyDocument {
    type Value = Vec<String>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for LegacyDocument {
    type Value = Vec<String>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object with a serverEntries array")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == "serverEntries" {
                if entries.is_some() {
                    return Err(de::Error::duplicate_field("serverEntries"));
                }
                entries = Some(map.next_value_seed(CappedEntries {
                    max: self.max_legacy,
                })?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        entries.ok_or_else(|| de::Error::missing_field("serverEntries"))
    }
}

/// Seed for the entries array; keeps the first `max` strings.
struct CappedEntries {
    max: usize,
}

impl<'de> DeserializeSeed<'de> for CappedEntries {
    type Value = Vec<String>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for CappedEntries {
    type Value = Vec<String>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of server entry strings")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(self.max.min(seq.size_hint().unwrap_or(0)));
        while entries.len() < self.max {
            match seq.next_element::<String>()? {
                Some(entry) => entries.push(entry),
                None => return Ok(entries),
            }
        }
        // Past the ceiling: consume without allocating.
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(entries)
    }
}

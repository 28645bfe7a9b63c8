//! Catalog types.
//!
//! The catalog is the full list of files in a vault, each with its ordered version history and
//! a pointer to the version currently considered "current". It is persisted as a single JSON
//! object keyed by file name, see [`crate::metadata`].
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

mod timestamp;

/// One stored version of a file.
///
/// Records are immutable once appended to a [`VaultEntry`]; field names match the persisted
/// document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionRecord {
    /// 1-based version number, equal to the record's position in the history
    pub version: u32,
    /// When this version was added
    #[serde(with = "timestamp")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Size of the stored content in bytes
    pub size: u64,
    /// Truncated content fingerprint, see [`crate::hash`]
    pub hash: String,
    /// Location of the content, relative to the vault root
    pub path: String,
}

/// The catalog record for one uniquely-named file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultEntry {
    pub name: String,
    pub versions: Vec<VersionRecord>,
    /// Index into `versions` of the current version
    pub current_version: usize,
}

impl VaultEntry {
    /// Creates an entry with no versions yet.
    ///
    /// An entry without versions is never persisted; callers push the first version before
    /// saving.
    pub fn new(name: String) -> Self {
        Self {
            name,
            versions: Vec::new(),
            current_version: 0,
        }
    }

    /// Version number the next appended record will get
    pub fn next_version(&self) -> u32 {
        u32::try_from(self.versions.len()).map_or(u32::MAX, |n| n.saturating_add(1))
    }

    /// Appends a record and makes it current
    pub fn push_version(&mut self, record: VersionRecord) {
        debug_assert_eq!(record.version, self.next_version());
        self.versions.push(record);
        self.current_version = self.versions.len() - 1;
    }

    pub fn current(&self) -> Option<&VersionRecord> {
        self.versions.get(self.current_version)
    }

    /// Checks the invariants a loaded entry must satisfy
    fn validate(&self, key: &str) -> Result<(), String> {
        if self.name != key {
            return Err(format!(
                "entry '{key}' has mismatched name '{}'",
                self.name
            ));
        }
        if self.versions.is_empty() {
            return Err(format!("entry '{key}' has no versions"));
        }
        for (idx, record) in self.versions.iter().enumerate() {
            if usize::try_from(record.version).ok() != Some(idx + 1) {
                return Err(format!(
                    "entry '{key}' has version {} at position {}",
                    record.version,
                    idx + 1
                ));
            }
            if !crate::hash::is_fingerprint(&record.hash) {
                return Err(format!(
                    "entry '{key}' version {} has malformed hash '{}'",
                    record.version, record.hash
                ));
            }
            if record.path.is_empty() {
                return Err(format!(
                    "entry '{key}' version {} has an empty path",
                    record.version
                ));
            }
        }
        if self.current_version >= self.versions.len() {
            return Err(format!(
                "entry '{key}' points at version index {} but has {} versions",
                self.current_version,
                self.versions.len()
            ));
        }
        Ok(())
    }
}

/// All entries of a vault, in the order their names were first added
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<VaultEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VaultEntry> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&VaultEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut VaultEntry> {
        self.entries.iter_mut().find(|e| e.name == name)
    }

    /// Returns the entry for `name`, appending a fresh one if the name is unseen
    pub fn entry_or_insert(&mut self, name: &str) -> &mut VaultEntry {
        let idx = match self.entries.iter().position(|e| e.name == name) {
            Some(idx) => idx,
            None => {
                self.entries.push(VaultEntry::new(name.to_owned()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx]
    }

    /// Removes and returns the entry for `name`, keeping the order of the others
    pub fn remove(&mut self, name: &str) -> Option<VaultEntry> {
        let idx = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(idx))
    }

    /// Checks every entry's invariants: keys match names, version numbers run 1..=n and the
    /// current pointer is in range.
    pub fn validate(&self) -> Result<(), String> {
        for entry in &self.entries {
            entry.validate(&entry.name)?;
        }
        Ok(())
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|e| (&e.name, e)))
    }
}

impl<'de> Deserialize<'de> for Catalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(CatalogVisitor)
    }
}

struct CatalogVisitor;

impl<'de> Visitor<'de> for CatalogVisitor {
    type Value = Catalog;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of file names to vault entries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries: Vec<VaultEntry> = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, entry)) = map.next_entry::<String, VaultEntry>()? {
            if entries.iter().any(|e| e.name == key) {
                return Err(serde::de::Error::custom(format!(
                    "duplicate entry '{key}'"
                )));
            }
            entry.validate(&key).map_err(serde::de::Error::custom)?;
            entries.push(entry);
        }
        Ok(Catalog { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(version: u32, hash: &str) -> VersionRecord {
        VersionRecord {
            version,
            timestamp: chrono::Utc::now(),
            size: 5,
            hash: hash.to_owned(),
            path: format!("files/a.txt/v{version}/a.txt"),
        }
    }

    #[test]
    fn test_push_version_advances_pointer() {
        let mut catalog = Catalog::new();
        let entry = catalog.entry_or_insert("a.txt");
        assert_eq!(entry.next_version(), 1);

        entry.push_version(record(1, "2cf24dba5fb0a30e"));
        entry.push_version(record(2, "b94d27b9934d3e08"));
        assert_eq!(entry.current_version, 1);
        assert_eq!(entry.next_version(), 3);
        assert_eq!(entry.current().unwrap().version, 2);

        // Existing names are not duplicated
        catalog.entry_or_insert("a.txt");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_insertion_order_survives_serialization() {
        let mut catalog = Catalog::new();
        for name in ["zeta.txt", "alpha.txt", "mid.txt"] {
            let entry = catalog.entry_or_insert(name);
            let mut rec = record(1, "e3b0c44298fc1c14");
            rec.path = format!("files/{name}/v1/{name}");
            entry.push_version(rec);
        }

        let json = serde_json::to_string_pretty(&catalog).unwrap();
        let loaded: Catalog = serde_json::from_str(&json).unwrap();

        let names: Vec<&str> = loaded.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["zeta.txt", "alpha.txt", "mid.txt"]);
        assert_eq!(loaded, catalog);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut catalog = Catalog::new();
        for name in ["a", "b", "c"] {
            catalog.entry_or_insert(name);
        }
        let removed = catalog.remove("b").unwrap();
        assert_eq!(removed.name, "b");
        assert!(catalog.remove("b").is_none());
        let names: Vec<&str> = catalog.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn test_reads_naive_timestamp_document() {
        let json = r#"{
  "report.txt": {
    "name": "report.txt",
    "versions": [
      {
        "version": 1,
        "timestamp": "2024-03-01T10:15:30.123456",
        "size": 5,
        "hash": "2cf24dba5fb0a30e",
        "path": "files/report.txt/v1/report.txt"
      }
    ],
    "current_version": 0
  }
}"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();
        let entry = catalog.get("report.txt").unwrap();
        assert_eq!(entry.versions.len(), 1);
        assert_eq!(entry.current().unwrap().hash, "2cf24dba5fb0a30e");
    }

    #[test]
    fn test_rejects_broken_invariants() {
        let gap = r#"{"a": {"name": "a", "current_version": 0, "versions": [
            {"version": 2, "timestamp": "2024-03-01T10:15:30Z", "size": 0,
             "hash": "e3b0c44298fc1c14", "path": "files/a/v2/a"}]}}"#;
        let err = serde_json::from_str::<Catalog>(gap).unwrap_err();
        assert!(err.to_string().contains("version 2 at position 1"));

        let pointer = r#"{"a": {"name": "a", "current_version": 3, "versions": [
            {"version": 1, "timestamp": "2024-03-01T10:15:30Z", "size": 0,
             "hash": "e3b0c44298fc1c14", "path": "files/a/v1/a"}]}}"#;
        assert!(serde_json::from_str::<Catalog>(pointer).is_err());

        let name = r#"{"a": {"name": "b", "current_version": 0, "versions": [
            {"version": 1, "timestamp": "2024-03-01T10:15:30Z", "size": 0,
             "hash": "e3b0c44298fc1c14", "path": "files/b/v1/b"}]}}"#;
        assert!(serde_json::from_str::<Catalog>(name).is_err());

        let hash = r#"{"a": {"name": "a", "current_version": 0, "versions": [
            {"version": 1, "timestamp": "2024-03-01T10:15:30Z", "size": 0,
             "hash": "not-a-hash", "path": "files/a/v1/a"}]}}"#;
        assert!(serde_json::from_str::<Catalog>(hash).is_err());

        assert!(serde_json::from_str::<Catalog>("[]").is_err());
    }
}

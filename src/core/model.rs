//! core::model
//!
//! Domain values exchanged with the versioning service.
//!
//! # Types
//!
//! - [`Reference`] - A branch or tag bound to a commit hash
//! - [`CommitMeta`] / [`Commit`] - Immutable history nodes
//! - [`Content`] - A catalog entry's value as of a snapshot
//! - [`Operation`] - A put or delete applied by a commit
//! - [`ContentEntry`] - One row of a content listing
//! - [`Page`] - One page of a paginated listing
//!
//! Everything here is plain data: serde-serializable in the service's JSON
//! shape and free of I/O.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{CommitHash, ContentKey, ReferenceName};

/// The kind of a named reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceKind {
    Branch,
    Tag,
}

impl ReferenceKind {
    /// The wire spelling, as used in `type=` query parameters.
    pub fn as_wire(&self) -> &'static str {
        match self {
            ReferenceKind::Branch => "BRANCH",
            ReferenceKind::Tag => "TAG",
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Branch => write!(f, "branch"),
            ReferenceKind::Tag => write!(f, "tag"),
        }
    }
}

impl std::str::FromStr for ReferenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "branch" => Ok(ReferenceKind::Branch),
            "tag" => Ok(ReferenceKind::Tag),
            other => Err(format!("unknown reference kind '{other}'")),
        }
    }
}

/// A named pointer into the commit history.
///
/// Serialized as `{"type": "BRANCH", "name": "main", "hash": "..."}`.
///
/// # Example
///
/// ```
/// use lakeref::core::model::{Reference, ReferenceKind};
/// use lakeref::core::types::{CommitHash, ReferenceName};
///
/// let main = Reference::branch(
///     ReferenceName::new("main").unwrap(),
///     CommitHash::no_ancestor(),
/// );
/// assert_eq!(main.kind(), ReferenceKind::Branch);
/// assert_eq!(main.name().as_str(), "main");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reference {
    Branch { name: ReferenceName, hash: CommitHash },
    Tag { name: ReferenceName, hash: CommitHash },
}

impl Reference {
    pub fn branch(name: ReferenceName, hash: CommitHash) -> Self {
        Reference::Branch { name, hash }
    }

    pub fn tag(name: ReferenceName, hash: CommitHash) -> Self {
        Reference::Tag { name, hash }
    }

    /// Build a reference of the given kind.
    pub fn of_kind(kind: ReferenceKind, name: ReferenceName, hash: CommitHash) -> Self {
        match kind {
            ReferenceKind::Branch => Reference::Branch { name, hash },
            ReferenceKind::Tag => Reference::Tag { name, hash },
        }
    }

    pub fn kind(&self) -> ReferenceKind {
        match self {
            Reference::Branch { .. } => ReferenceKind::Branch,
            Reference::Tag { .. } => ReferenceKind::Tag,
        }
    }

    pub fn name(&self) -> &ReferenceName {
        match self {
            Reference::Branch { name, .. } | Reference::Tag { name, .. } => name,
        }
    }

    pub fn hash(&self) -> &CommitHash {
        match self {
            Reference::Branch { hash, .. } | Reference::Tag { hash, .. } => hash,
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}@{}", self.kind(), self.name(), self.hash())
    }
}

/// Commit metadata as recorded by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommitMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<CommitHash>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committer: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parent_commit_hashes: Vec<CommitHash>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl CommitMeta {
    /// Metadata carrying only a message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// The first listed author, if any.
    pub fn author(&self) -> Option<&str> {
        self.authors.first().map(String::as_str)
    }
}

/// One commit in a reference's history.
///
/// Parents are listed first-parent first, exactly as the service reports them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Commit {
    pub hash: CommitHash,
    pub parents: Vec<CommitHash>,
    pub meta: CommitMeta,
    pub operations: Vec<Operation>,
}

impl Commit {
    pub fn message(&self) -> &str {
        &self.meta.message
    }

    pub fn author(&self) -> Option<&str> {
        self.meta.author()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.meta.commit_time
    }

    /// The first parent, `None` only for a root commit.
    pub fn first_parent(&self) -> Option<&CommitHash> {
        self.parents.first()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

/// Discriminator of a content value.
///
/// Unrecognized types are carried verbatim in [`ContentType::Other`] so
/// that they serialize back exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    IcebergTable,
    IcebergView,
    DeltaLakeTable,
    Namespace,
    Udf,
    Other(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::IcebergTable => "ICEBERG_TABLE",
            ContentType::IcebergView => "ICEBERG_VIEW",
            ContentType::DeltaLakeTable => "DELTA_LAKE_TABLE",
            ContentType::Namespace => "NAMESPACE",
            ContentType::Udf => "UDF",
            ContentType::Other(s) => s,
        }
    }
}

impl From<String> for ContentType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ICEBERG_TABLE" => ContentType::IcebergTable,
            "ICEBERG_VIEW" => ContentType::IcebergView,
            "DELTA_LAKE_TABLE" => ContentType::DeltaLakeTable,
            "NAMESPACE" => ContentType::Namespace,
            "UDF" => ContentType::Udf,
            _ => ContentType::Other(s),
        }
    }
}

impl From<ContentType> for String {
    fn from(t: ContentType) -> Self {
        match t {
            ContentType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A catalog entry's materialized value.
///
/// The payload is opaque to this crate: every attribute other than `type`
/// and `id` is preserved as-is.
///
/// # Example
///
/// ```
/// use lakeref::core::model::{Content, ContentType};
///
/// let table = Content::iceberg_table("s3://bucket/t/metadata/v1.json", 42);
/// assert_eq!(table.content_type, ContentType::IcebergTable);
/// assert!(table.id.is_none());
///
/// let json = serde_json::to_value(&table).unwrap();
/// assert_eq!(json["type"], "ICEBERG_TABLE");
/// assert_eq!(json["snapshotId"], 42);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Content {
    pub fn new(content_type: ContentType, payload: Map<String, Value>) -> Self {
        Self {
            content_type,
            id: None,
            payload,
        }
    }

    pub fn iceberg_table(metadata_location: impl Into<String>, snapshot_id: i64) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "metadataLocation".into(),
            Value::String(metadata_location.into()),
        );
        payload.insert("snapshotId".into(), Value::from(snapshot_id));
        payload.insert("schemaId".into(), Value::from(0));
        payload.insert("specId".into(), Value::from(0));
        payload.insert("sortOrderId".into(), Value::from(0));
        Self::new(ContentType::IcebergTable, payload)
    }

    pub fn namespace(key: &ContentKey) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "elements".into(),
            Value::from(key.elements().to_vec()),
        );
        Self::new(ContentType::Namespace, payload)
    }

    /// Same content bound to a content id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Compare payloads while ignoring the content id.
    pub fn same_value(&self, other: &Content) -> bool {
        self.content_type == other.content_type && self.payload == other.payload
    }
}

/// A change applied by a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Put { key: ContentKey, content: Content },
    Delete { key: ContentKey },
    Unchanged { key: ContentKey },
}

impl Operation {
    pub fn put(key: ContentKey, content: Content) -> Self {
        Operation::Put { key, content }
    }

    pub fn delete(key: ContentKey) -> Self {
        Operation::Delete { key }
    }

    pub fn key(&self) -> &ContentKey {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } | Operation::Unchanged { key } => {
                key
            }
        }
    }
}

/// One row of a content listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry {
    #[serde(rename = "name")]
    pub key: ContentKey,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
}

/// How a key differs between two commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Added,
    Removed,
    Modified,
}

impl Change {
    /// Marker used in text listings.
    pub fn symbol(self) -> char {
        match self {
            Change::Added => '+',
            Change::Removed => '-',
            Change::Modified => '~',
        }
    }
}

/// One key whose content differs between two commits.
///
/// `from` is absent when the key only exists on the `to` side, and the
/// reverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub key: ContentKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Content>,
}

impl DiffEntry {
    /// `None` for an entry with neither side, which a service should not send.
    pub fn change(&self) -> Option<Change> {
        match (&self.from, &self.to) {
            (None, Some(_)) => Some(Change::Added),
            (Some(_), None) => Some(Change::Removed),
            (Some(_), Some(_)) => Some(Change::Modified),
            (None, None) => None,
        }
    }
}

/// One page of a paginated listing.
///
/// `token` is `None` on the final page. A page may be short or even empty
/// while still carrying a token.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub token: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ReferenceName {
        ReferenceName::new(s).unwrap()
    }

    #[test]
    fn reference_wire_shape() {
        let reference = Reference::tag(name("v1"), CommitHash::new("deadbeef").unwrap());
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json["type"], "TAG");
        assert_eq!(json["name"], "v1");
        assert_eq!(json["hash"], "deadbeef");
    }

    #[test]
    fn reference_ignores_metadata() {
        let json = r#"{"type":"BRANCH","name":"main","hash":"deadbeef","metadata":{"numCommitsAhead":1}}"#;
        let reference: Reference = serde_json::from_str(json).unwrap();
        assert_eq!(reference.kind(), ReferenceKind::Branch);
        assert_eq!(reference.hash().as_str(), "deadbeef");
    }

    #[test]
    fn reference_kind_parse_and_display() {
        assert_eq!("BRANCH".parse::<ReferenceKind>().unwrap(), ReferenceKind::Branch);
        assert_eq!("tag".parse::<ReferenceKind>().unwrap(), ReferenceKind::Tag);
        assert!("detached".parse::<ReferenceKind>().is_err());
        assert_eq!(format!("{}", ReferenceKind::Branch), "branch");
        assert_eq!(ReferenceKind::Tag.as_wire(), "TAG");
    }

    #[test]
    fn unknown_content_type_is_preserved() {
        let json = r#"{"type":"FANCY_TABLE","id":"abc","location":"x"}"#;
        let content: Content = serde_json::from_str(json).unwrap();
        assert_eq!(content.content_type, ContentType::Other("FANCY_TABLE".into()));
        let back = serde_json::to_value(&content).unwrap();
        assert_eq!(back["type"], "FANCY_TABLE");
        assert_eq!(back["location"], "x");
        assert_eq!(back["id"], "abc");
    }

    #[test]
    fn same_value_ignores_id() {
        let a = Content::iceberg_table("loc", 1);
        let b = a.clone().with_id("x");
        assert!(a.same_value(&b));
        assert_ne!(a, b);
        assert!(!a.same_value(&Content::iceberg_table("loc", 2)));
    }

    #[test]
    fn operation_wire_shape() {
        let key = ContentKey::new(["ns", "t"]).unwrap();
        let op = Operation::delete(key.clone());
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "DELETE");
        assert_eq!(json["key"]["elements"][1], "t");
        assert_eq!(op.key(), &key);
    }

    #[test]
    fn commit_meta_camel_case() {
        let json = r#"{"message":"m","authors":["a"],"parentCommitHashes":["deadbeef"],"commitTime":"2024-01-01T00:00:00Z"}"#;
        let meta: CommitMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.author(), Some("a"));
        assert_eq!(meta.parent_commit_hashes.len(), 1);
        assert!(meta.commit_time.is_some());
    }

    #[test]
    fn content_entry_wire_shape() {
        let json = r#"{"name":{"elements":["ns","t"]},"type":"ICEBERG_TABLE","contentId":"id1"}"#;
        let entry: ContentEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.key.elements(), ["ns", "t"]);
        assert_eq!(entry.content_id.as_deref(), Some("id1"));
        assert!(entry.content.is_none());
    }

    #[test]
    fn diff_entry_change_follows_sides() {
        let key = ContentKey::new(["t"]).unwrap();
        let table = Content::iceberg_table("loc", 1);
        let entry = |from: Option<&Content>, to: Option<&Content>| DiffEntry {
            key: key.clone(),
            from: from.cloned(),
            to: to.cloned(),
        };
        assert_eq!(entry(None, Some(&table)).change(), Some(Change::Added));
        assert_eq!(entry(Some(&table), None).change(), Some(Change::Removed));
        assert_eq!(entry(Some(&table), Some(&table)).change(), Some(Change::Modified));
        assert_eq!(entry(None, None).change(), None);
        assert_eq!(Change::Modified.symbol(), '~');
    }
}

//! core::conflict
//!
//! Conflict taxonomy.
//!
//! The service reports conflicts with an open-ended `conflictType` string.
//! [`RawConflictType`] mirrors that wire enumeration, preserving unknown
//! values verbatim, while [`ConflictKind`] is the closed set callers branch
//! on. [`classify`] maps one to the other and never fails.

use serde::{Deserialize, Serialize};

use super::types::ContentKey;

/// Conflict type exactly as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RawConflictType {
    Unknown,
    KeyExists,
    KeyDoesNotExist,
    PayloadDiffers,
    ContentIdDiffers,
    ValueDiffers,
    NamespaceAbsent,
    NotANamespace,
    NamespaceNotEmpty,
    UnexpectedHash,
    KeyConflict,
    DocumentationDiffers,
    /// A type this client does not know yet, kept as received.
    Other(String),
}

impl RawConflictType {
    pub fn as_str(&self) -> &str {
        match self {
            RawConflictType::Unknown => "UNKNOWN",
            RawConflictType::KeyExists => "KEY_EXISTS",
            RawConflictType::KeyDoesNotExist => "KEY_DOES_NOT_EXIST",
            RawConflictType::PayloadDiffers => "PAYLOAD_DIFFERS",
            RawConflictType::ContentIdDiffers => "CONTENT_ID_DIFFERS",
            RawConflictType::ValueDiffers => "VALUE_DIFFERS",
            RawConflictType::NamespaceAbsent => "NAMESPACE_ABSENT",
            RawConflictType::NotANamespace => "NOT_A_NAMESPACE",
            RawConflictType::NamespaceNotEmpty => "NAMESPACE_NOT_EMPTY",
            RawConflictType::UnexpectedHash => "UNEXPECTED_HASH",
            RawConflictType::KeyConflict => "KEY_CONFLICT",
            RawConflictType::DocumentationDiffers => "DOCUMENTATION_DIFFERS",
            RawConflictType::Other(s) => s,
        }
    }
}

impl From<String> for RawConflictType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "UNKNOWN" => RawConflictType::Unknown,
            "KEY_EXISTS" => RawConflictType::KeyExists,
            "KEY_DOES_NOT_EXIST" => RawConflictType::KeyDoesNotExist,
            "PAYLOAD_DIFFERS" => RawConflictType::PayloadDiffers,
            "CONTENT_ID_DIFFERS" => RawConflictType::ContentIdDiffers,
            "VALUE_DIFFERS" => RawConflictType::ValueDiffers,
            "NAMESPACE_ABSENT" => RawConflictType::NamespaceAbsent,
            "NOT_A_NAMESPACE" => RawConflictType::NotANamespace,
            "NAMESPACE_NOT_EMPTY" => RawConflictType::NamespaceNotEmpty,
            "UNEXPECTED_HASH" => RawConflictType::UnexpectedHash,
            "KEY_CONFLICT" => RawConflictType::KeyConflict,
            "DOCUMENTATION_DIFFERS" => RawConflictType::DocumentationDiffers,
            _ => RawConflictType::Other(s),
        }
    }
}

impl From<RawConflictType> for String {
    fn from(t: RawConflictType) -> Self {
        match t {
            RawConflictType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for RawConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a caller can do about a conflicting key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConflictKind {
    /// The operation expected the key to exist.
    KeyNotFound,
    /// The operation expected the key to be absent.
    KeyAlreadyExists,
    /// Both sides changed the key to different values.
    ValuesDiffer,
    /// A parent namespace is missing, is not a namespace, or is not empty.
    NamespaceConflict,
    /// Not recognized by this client.
    Unknown,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::KeyNotFound => write!(f, "key not found"),
            ConflictKind::KeyAlreadyExists => write!(f, "key already exists"),
            ConflictKind::ValuesDiffer => write!(f, "values differ"),
            ConflictKind::NamespaceConflict => write!(f, "namespace conflict"),
            ConflictKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Map a wire conflict type onto the closed taxonomy.
///
/// Pure and total: anything unrecognized degrades to [`ConflictKind::Unknown`].
///
/// # Example
///
/// ```
/// use lakeref::core::conflict::{classify, ConflictKind, RawConflictType};
///
/// assert_eq!(classify(&RawConflictType::KeyExists), ConflictKind::KeyAlreadyExists);
/// assert_eq!(
///     classify(&RawConflictType::from("SOMETHING_NEW".to_string())),
///     ConflictKind::Unknown,
/// );
/// ```
pub fn classify(raw: &RawConflictType) -> ConflictKind {
    match raw {
        RawConflictType::KeyDoesNotExist => ConflictKind::KeyNotFound,
        RawConflictType::KeyExists => ConflictKind::KeyAlreadyExists,
        RawConflictType::PayloadDiffers
        | RawConflictType::ContentIdDiffers
        | RawConflictType::ValueDiffers
        | RawConflictType::DocumentationDiffers
        | RawConflictType::KeyConflict => ConflictKind::ValuesDiffer,
        RawConflictType::NamespaceAbsent
        | RawConflictType::NotANamespace
        | RawConflictType::NamespaceNotEmpty => ConflictKind::NamespaceConflict,
        RawConflictType::Unknown | RawConflictType::UnexpectedHash | RawConflictType::Other(_) => {
            ConflictKind::Unknown
        }
    }
}

/// A conflict as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConflict {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_type: Option<RawConflictType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<ContentKey>,
    #[serde(default)]
    pub message: String,
}

impl RawConflict {
    pub fn new(conflict_type: RawConflictType, key: Option<ContentKey>, message: impl Into<String>) -> Self {
        Self {
            conflict_type: Some(conflict_type),
            key,
            message: message.into(),
        }
    }

    /// Whether this entry reports a stale expected hash rather than a key conflict.
    pub fn is_unexpected_hash(&self) -> bool {
        self.conflict_type == Some(RawConflictType::UnexpectedHash)
    }
}

/// A classified conflict on one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub key: Option<ContentKey>,
    pub kind: ConflictKind,
    /// The wire type, kept for callers that need the finer distinction.
    pub raw_type: Option<RawConflictType>,
    pub message: String,
}

impl From<RawConflict> for Conflict {
    fn from(raw: RawConflict) -> Self {
        let kind = raw
            .conflict_type
            .as_ref()
            .map(classify)
            .unwrap_or(ConflictKind::Unknown);
        Conflict {
            key: raw.key,
            kind,
            raw_type: raw.conflict_type,
            message: raw.message,
        }
    }
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{key}: {}", self.kind)?,
            None => write!(f, "{}", self.kind)?,
        }
        if !self.message.is_empty() {
            write!(f, " ({})", self.message)?;
        }
        Ok(())
    }
}

/// The set of conflicts that prevented a mutation from applying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn new(conflicts: Vec<Conflict>) -> Self {
        Self { conflicts }
    }

    pub fn from_raw(raw: impl IntoIterator<Item = RawConflict>) -> Self {
        Self {
            conflicts: raw.into_iter().map(Conflict::from).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    /// Keys named by the report, in report order.
    pub fn keys(&self) -> impl Iterator<Item = &ContentKey> {
        self.conflicts.iter().filter_map(|c| c.key.as_ref())
    }

    /// Look up the kind reported for `key`.
    pub fn kind_of(&self, key: &ContentKey) -> Option<ConflictKind> {
        self.conflicts
            .iter()
            .find(|c| c.key.as_ref() == Some(key))
            .map(|c| c.kind)
    }
}

impl std::fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.conflicts.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_covers_every_wire_type() {
        use ConflictKind::*;
        let cases = [
            ("KEY_DOES_NOT_EXIST", KeyNotFound),
            ("KEY_EXISTS", KeyAlreadyExists),
            ("PAYLOAD_DIFFERS", ValuesDiffer),
            ("CONTENT_ID_DIFFERS", ValuesDiffer),
            ("VALUE_DIFFERS", ValuesDiffer),
            ("DOCUMENTATION_DIFFERS", ValuesDiffer),
            ("KEY_CONFLICT", ValuesDiffer),
            ("NAMESPACE_ABSENT", NamespaceConflict),
            ("NOT_A_NAMESPACE", NamespaceConflict),
            ("NAMESPACE_NOT_EMPTY", NamespaceConflict),
            ("UNEXPECTED_HASH", Unknown),
            ("UNKNOWN", Unknown),
            ("BRAND_NEW_KIND", Unknown),
            ("", Unknown),
        ];
        for (wire, expected) in cases {
            assert_eq!(classify(&RawConflictType::from(wire.to_string())), expected, "{wire}");
        }
    }

    #[test]
    fn wire_type_round_trips_verbatim() {
        for wire in ["KEY_EXISTS", "NAMESPACE_ABSENT", "lowercase_new", "X"] {
            let raw: RawConflictType = serde_json::from_str(&format!("\"{wire}\"")).unwrap();
            assert_eq!(serde_json::to_string(&raw).unwrap(), format!("\"{wire}\""));
        }
    }

    #[test]
    fn missing_type_classifies_unknown() {
        let raw: RawConflict = serde_json::from_str(r#"{"message":"boom"}"#).unwrap();
        let conflict = Conflict::from(raw);
        assert_eq!(conflict.kind, ConflictKind::Unknown);
        assert!(conflict.key.is_none());
    }

    #[test]
    fn report_lookup_by_key() {
        let key = ContentKey::new(["ns", "t"]).unwrap();
        let report = ConflictReport::from_raw(vec![
            RawConflict::new(RawConflictType::KeyConflict, Some(key.clone()), "both changed"),
            RawConflict::new(RawConflictType::Unknown, None, "?"),
        ]);
        assert_eq!(report.len(), 2);
        assert_eq!(report.kind_of(&key), Some(ConflictKind::ValuesDiffer));
        assert_eq!(report.keys().count(), 1);
        assert_eq!(
            report.to_string(),
            "ns.t: values differ (both changed); unknown (?)"
        );
    }

    #[test]
    fn unexpected_hash_detection() {
        let raw = RawConflict::new(RawConflictType::UnexpectedHash, None, "stale");
        assert!(raw.is_unexpected_hash());
        let raw = RawConflict::new(RawConflictType::KeyExists, None, "");
        assert!(!raw.is_unexpected_hash());
    }
}

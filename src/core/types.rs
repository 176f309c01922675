//! core::types
//!
//! Strong types for identifiers on the wire.
//!
//! # Types
//!
//! - [`CommitHash`] - Commit identifier (hex content hash)
//! - [`ContentKey`] - Hierarchical name of a catalog entry
//! - [`ReferenceName`] - Validated branch or tag name
//! - [`RefSpec`] - A reference path element: `name`, `name@hash` or `@hash`
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, so nothing malformed is ever sent to the service.
//!
//! # Examples
//!
//! ```
//! use lakeref::core::types::{CommitHash, ContentKey, ReferenceName, RefSpec};
//!
//! let name = ReferenceName::new("main").unwrap();
//! let hash = CommitHash::new("2e1cfa82b035c26c").unwrap();
//! let key = ContentKey::new(["ns", "table1"]).unwrap();
//!
//! assert_eq!(RefSpec::at(name, hash).to_path_string(), "main@2e1cfa82b035c26c");
//! assert_eq!(key.to_path_string(), "ns.table1");
//!
//! assert!(ReferenceName::new("HEAD").is_err());
//! assert!(CommitHash::new("not-a-hash").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid commit hash: {0}")]
    InvalidHash(String),

    #[error("invalid reference name: {0}")]
    InvalidReferenceName(String),

    #[error("invalid content key: {0}")]
    InvalidContentKey(String),

    #[error("invalid reference: {0}")]
    InvalidRefSpec(String),
}

/// A commit hash.
///
/// Hashes are 8 to 64 hexadecimal characters (4 to 32 bytes). They are kept
/// exactly as received so that they round-trip unchanged through the service;
/// no case normalization is applied.
///
/// # Example
///
/// ```
/// use lakeref::core::types::CommitHash;
///
/// let hash = CommitHash::new("2e1cfa82b035c26cbbbdae632cea070514eb8b773f616aaeaf668e2f0be8f10d").unwrap();
/// assert_eq!(hash.short(8), "2e1cfa82");
/// assert!(hash.is_no_ancestor());
///
/// assert!(CommitHash::new("abc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash(String);

impl CommitHash {
    /// Hash of the empty, parentless snapshot every new repository starts at.
    pub const NO_ANCESTOR: &'static str =
        "2e1cfa82b035c26cbbbdae632cea070514eb8b773f616aaeaf668e2f0be8f10d";

    const MIN_LEN: usize = 8;
    const MAX_LEN: usize = 64;

    /// Create a new validated commit hash.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidHash` if the string is not 8-64 hex characters.
    pub fn new(hash: impl Into<String>) -> Result<Self, TypeError> {
        let hash = hash.into();
        Self::validate(&hash)?;
        Ok(Self(hash))
    }

    /// The hash of the empty root snapshot.
    pub fn no_ancestor() -> Self {
        Self(Self::NO_ANCESTOR.to_string())
    }

    /// Check if this is the empty root snapshot.
    pub fn is_no_ancestor(&self) -> bool {
        self.0 == Self::NO_ANCESTOR
    }

    /// Check whether a string would be accepted by [`CommitHash::new`].
    pub fn is_valid(hash: &str) -> bool {
        Self::validate(hash).is_ok()
    }

    /// Get an abbreviated form of the hash.
    ///
    /// Returns the first `len` characters. If `len` exceeds the hash length,
    /// returns the full hash.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(hash: &str) -> Result<(), TypeError> {
        if hash.len() < Self::MIN_LEN || hash.len() > Self::MAX_LEN {
            return Err(TypeError::InvalidHash(format!(
                "expected {} to {} hex characters, got {}",
                Self::MIN_LEN,
                Self::MAX_LEN,
                hash.len()
            )));
        }
        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidHash(format!(
                "hash must be hexadecimal: {hash}"
            )));
        }
        Ok(())
    }

    /// Get the hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CommitHash {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CommitHash> for String {
    fn from(hash: CommitHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for CommitHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CommitHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A validated branch or tag name.
///
/// Names start with a letter, continue with letters, digits or one of
/// `./_-`, never contain `..` and never end with `/`. `HEAD`, `BARE` and
/// anything that could be mistaken for a commit hash are reserved.
///
/// # Example
///
/// ```
/// use lakeref::core::types::ReferenceName;
///
/// assert!(ReferenceName::new("main").is_ok());
/// assert!(ReferenceName::new("etl/2024-01-01").is_ok());
///
/// assert!(ReferenceName::new("").is_err());
/// assert!(ReferenceName::new("1abc").is_err());
/// assert!(ReferenceName::new("a..b").is_err());
/// assert!(ReferenceName::new("feature/").is_err());
/// assert!(ReferenceName::new("BARE").is_err());
/// assert!(ReferenceName::new("deadbeef").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceName(String);

impl ReferenceName {
    const FORBIDDEN: [&'static str; 2] = ["HEAD", "BARE"];

    /// Create a new validated reference name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidReferenceName` if the name violates the naming rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// The conventional default branch, `main`.
    pub fn main() -> Self {
        Self("main".to_string())
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        let mut chars = name.chars();
        match chars.next() {
            None => {
                return Err(TypeError::InvalidReferenceName(
                    "reference name cannot be empty".into(),
                ))
            }
            Some(first) if !first.is_ascii_alphabetic() => {
                return Err(TypeError::InvalidReferenceName(format!(
                    "reference name must start with a letter: {name}"
                )))
            }
            Some(_) => {}
        }

        if let Some(c) = chars.find(|c| !c.is_ascii_alphanumeric() && !"./_-".contains(*c)) {
            return Err(TypeError::InvalidReferenceName(format!(
                "reference name cannot contain '{c}'"
            )));
        }

        if name.contains("..") {
            return Err(TypeError::InvalidReferenceName(
                "reference name cannot contain '..'".into(),
            ));
        }
        if name.ends_with('/') {
            return Err(TypeError::InvalidReferenceName(
                "reference name cannot end with '/'".into(),
            ));
        }

        if Self::FORBIDDEN.contains(&name) || CommitHash::is_valid(name) {
            return Err(TypeError::InvalidReferenceName(format!(
                "'{name}' is reserved or looks like a commit hash"
            )));
        }

        Ok(())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ReferenceName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ReferenceName> for String {
    fn from(name: ReferenceName) -> Self {
        name.0
    }
}

impl AsRef<str> for ReferenceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReferenceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ReferenceName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Hierarchical name of a catalog entry, e.g. `["ns", "table1"]`.
///
/// Equality is structural: same elements in the same order, case-sensitive.
///
/// On the wire a key is a JSON object `{"elements": [...]}`. In URL paths it
/// uses the path form: elements joined by `.`, with a `.` inside an element
/// written as U+001D.
///
/// # Example
///
/// ```
/// use lakeref::core::types::ContentKey;
///
/// let key = ContentKey::new(["db", "v1.2", "events"]).unwrap();
/// assert_eq!(key.to_path_string(), "db.v1\u{1D}2.events");
/// assert_eq!(ContentKey::from_path_string(&key.to_path_string()).unwrap(), key);
///
/// assert!(ContentKey::new(Vec::<String>::new()).is_err());
/// assert!(ContentKey::new(["ns", ""]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawContentKey", into = "RawContentKey")]
pub struct ContentKey {
    elements: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct RawContentKey {
    elements: Vec<String>,
}

impl ContentKey {
    pub const MAX_ELEMENTS: usize = 20;
    pub const MAX_LENGTH: usize = 500;

    const PATH_SEPARATOR: char = '.';
    const ESCAPED_DOT: char = '\u{1D}';

    /// Create a new validated key from its elements.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidContentKey` when there are no elements, an
    /// element is empty or contains U+0000, or the size limits are exceeded.
    pub fn new<I, S>(elements: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let elements: Vec<String> = elements.into_iter().map(Into::into).collect();
        Self::validate(&elements)?;
        Ok(Self { elements })
    }

    fn validate(elements: &[String]) -> Result<(), TypeError> {
        if elements.is_empty() {
            return Err(TypeError::InvalidContentKey(
                "content key must have at least one element".into(),
            ));
        }
        if elements.len() > Self::MAX_ELEMENTS {
            return Err(TypeError::InvalidContentKey(format!(
                "content key has {} elements, at most {} allowed",
                elements.len(),
                Self::MAX_ELEMENTS
            )));
        }

        let mut total = 0;
        for element in elements {
            if element.is_empty() {
                return Err(TypeError::InvalidContentKey(
                    "content key elements cannot be empty".into(),
                ));
            }
            if element.contains('\0') {
                return Err(TypeError::InvalidContentKey(
                    "content key elements cannot contain NUL".into(),
                ));
            }
            total += element.chars().count();
        }
        if total > Self::MAX_LENGTH {
            return Err(TypeError::InvalidContentKey(format!(
                "content key is {total} characters long, at most {} allowed",
                Self::MAX_LENGTH
            )));
        }

        Ok(())
    }

    /// Parse the path form produced by [`ContentKey::to_path_string`].
    pub fn from_path_string(path: &str) -> Result<Self, TypeError> {
        Self::new(
            path.split(Self::PATH_SEPARATOR)
                .map(|e| e.replace(Self::ESCAPED_DOT, ".")),
        )
    }

    /// Encode the key for use in a URL path or query parameter.
    pub fn to_path_string(&self) -> String {
        self.elements
            .iter()
            .map(|e| e.replace('.', &Self::ESCAPED_DOT.to_string()))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// The key's elements in order.
    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    /// The last element, e.g. the table name.
    pub fn name(&self) -> &str {
        // Non-empty by construction
        self.elements.last().map(String::as_str).unwrap_or_default()
    }

    /// The key of the enclosing namespace, `None` for a top-level key.
    pub fn parent(&self) -> Option<ContentKey> {
        if self.elements.len() < 2 {
            return None;
        }
        Some(Self {
            elements: self.elements[..self.elements.len() - 1].to_vec(),
        })
    }

    /// Check whether `self` lies inside (or is) the namespace `prefix`.
    pub fn starts_with(&self, prefix: &ContentKey) -> bool {
        self.elements.starts_with(&prefix.elements)
    }
}

impl TryFrom<RawContentKey> for ContentKey {
    type Error = TypeError;

    fn try_from(raw: RawContentKey) -> Result<Self, Self::Error> {
        Self::new(raw.elements)
    }
}

impl From<ContentKey> for RawContentKey {
    fn from(key: ContentKey) -> Self {
        RawContentKey {
            elements: key.elements,
        }
    }
}

impl std::fmt::Display for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.elements.join("."))
    }
}

impl std::str::FromStr for ContentKey {
    type Err = TypeError;

    /// Parses the path form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_path_string(s)
    }
}

/// A reference as addressed in request paths.
///
/// # Example
///
/// ```
/// use lakeref::core::types::RefSpec;
///
/// let spec: RefSpec = "main@2e1cfa82b035c26c".parse().unwrap();
/// assert_eq!(spec.name().unwrap().as_str(), "main");
/// assert_eq!(spec.hash().unwrap().as_str(), "2e1cfa82b035c26c");
///
/// let detached: RefSpec = "@2e1cfa82b035c26c".parse().unwrap();
/// assert!(detached.name().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefSpec {
    /// The current head of a named reference.
    Named(ReferenceName),
    /// A named reference pinned to a hash.
    AtHash(ReferenceName, CommitHash),
    /// A bare commit, not bound to any reference.
    Detached(CommitHash),
}

impl RefSpec {
    pub fn named(name: ReferenceName) -> Self {
        RefSpec::Named(name)
    }

    pub fn at(name: ReferenceName, hash: CommitHash) -> Self {
        RefSpec::AtHash(name, hash)
    }

    pub fn detached(hash: CommitHash) -> Self {
        RefSpec::Detached(hash)
    }

    pub fn name(&self) -> Option<&ReferenceName> {
        match self {
            RefSpec::Named(name) | RefSpec::AtHash(name, _) => Some(name),
            RefSpec::Detached(_) => None,
        }
    }

    pub fn hash(&self) -> Option<&CommitHash> {
        match self {
            RefSpec::Named(_) => None,
            RefSpec::AtHash(_, hash) | RefSpec::Detached(hash) => Some(hash),
        }
    }

    /// Pin this spec to `hash`, keeping the name if there is one.
    pub fn pinned(&self, hash: CommitHash) -> Self {
        match self.name() {
            Some(name) => RefSpec::AtHash(name.clone(), hash),
            None => RefSpec::Detached(hash),
        }
    }

    /// Encode as a path element: `name`, `name@hash` or `@hash`.
    pub fn to_path_string(&self) -> String {
        match self {
            RefSpec::Named(name) => name.to_string(),
            RefSpec::AtHash(name, hash) => format!("{name}@{hash}"),
            RefSpec::Detached(hash) => format!("@{hash}"),
        }
    }
}

impl std::str::FromStr for RefSpec {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = || -> Result<Self, TypeError> {
            match s.split_once('@') {
                None => Ok(RefSpec::Named(ReferenceName::new(s)?)),
                Some(("", hash)) => Ok(RefSpec::Detached(CommitHash::new(hash)?)),
                Some((name, hash)) => Ok(RefSpec::AtHash(
                    ReferenceName::new(name)?,
                    CommitHash::new(hash)?,
                )),
            }
        };
        parse().map_err(|e| TypeError::InvalidRefSpec(format!("'{s}': {e}")))
    }
}

impl std::fmt::Display for RefSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_path_string())
    }
}

impl From<ReferenceName> for RefSpec {
    fn from(name: ReferenceName) -> Self {
        RefSpec::Named(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod commit_hash {
        use super::*;

        #[test]
        fn valid_hashes() {
            assert!(CommitHash::new("deadbeef").is_ok());
            assert!(CommitHash::new("DEADBEEF").is_ok());
            assert!(CommitHash::new(CommitHash::NO_ANCESTOR).is_ok());
        }

        #[test]
        fn length_bounds() {
            assert!(CommitHash::new("abcdef1").is_err());
            assert!(CommitHash::new("a".repeat(64)).is_ok());
            assert!(CommitHash::new("a".repeat(65)).is_err());
        }

        #[test]
        fn non_hex_rejected() {
            assert!(CommitHash::new("deadbeeg").is_err());
            assert!(CommitHash::new("dead beef").is_err());
        }

        #[test]
        fn case_is_preserved() {
            let hash = CommitHash::new("DeadBeef").unwrap();
            assert_eq!(hash.as_str(), "DeadBeef");
            assert_ne!(hash, CommitHash::new("deadbeef").unwrap());
        }

        #[test]
        fn short_clamps() {
            let hash = CommitHash::new("0123456789").unwrap();
            assert_eq!(hash.short(4), "0123");
            assert_eq!(hash.short(100), "0123456789");
        }

        #[test]
        fn serde_as_plain_string() {
            let hash = CommitHash::new("deadbeef").unwrap();
            assert_eq!(serde_json::to_string(&hash).unwrap(), "\"deadbeef\"");
            assert!(serde_json::from_str::<CommitHash>("\"xyz\"").is_err());
        }
    }

    mod reference_name {
        use super::*;

        #[test]
        fn valid_names() {
            for name in ["main", "dev", "a", "etl/2024-01-01", "v1.0", "Feature_x"] {
                assert!(ReferenceName::new(name).is_ok(), "{name}");
            }
        }

        #[test]
        fn must_start_with_letter() {
            assert!(ReferenceName::new("1main").is_err());
            assert!(ReferenceName::new("-main").is_err());
            assert!(ReferenceName::new("/main").is_err());
        }

        #[test]
        fn invalid_characters() {
            assert!(ReferenceName::new("has space").is_err());
            assert!(ReferenceName::new("a@b").is_err());
            assert!(ReferenceName::new("a:b").is_err());
        }

        #[test]
        fn double_dot_and_trailing_slash() {
            assert!(ReferenceName::new("a..b").is_err());
            assert!(ReferenceName::new("a/").is_err());
            assert!(ReferenceName::new("a.").is_ok());
        }

        #[test]
        fn reserved_names() {
            assert!(ReferenceName::new("HEAD").is_err());
            assert!(ReferenceName::new("BARE").is_err());
            assert!(ReferenceName::new("cafebabe").is_err());
            assert!(ReferenceName::new("cafebab").is_ok());
        }
    }

    mod content_key {
        use super::*;

        #[test]
        fn structural_equality() {
            let a = ContentKey::new(["ns", "t"]).unwrap();
            let b = ContentKey::new(vec!["ns".to_string(), "t".to_string()]).unwrap();
            assert_eq!(a, b);
            assert_ne!(a, ContentKey::new(["t", "ns"]).unwrap());
            assert_ne!(a, ContentKey::new(["NS", "t"]).unwrap());
        }

        #[test]
        fn limits() {
            let many: Vec<String> = (0..21).map(|i| format!("e{i}")).collect();
            assert!(ContentKey::new(many).is_err());
            assert!(ContentKey::new(["x".repeat(501)]).is_err());
            assert!(ContentKey::new(["x".repeat(500)]).is_ok());
            assert!(ContentKey::new(["a\0b"]).is_err());
        }

        #[test]
        fn path_string_escapes_dots() {
            let key = ContentKey::new(["a.b", "c"]).unwrap();
            assert_eq!(key.to_path_string(), "a\u{1D}b.c");
            assert_eq!(ContentKey::from_path_string("a\u{1D}b.c").unwrap(), key);
        }

        #[test]
        fn json_form() {
            let key = ContentKey::new(["ns", "table1"]).unwrap();
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, r#"{"elements":["ns","table1"]}"#);
            assert!(serde_json::from_str::<ContentKey>(r#"{"elements":[]}"#).is_err());
        }

        #[test]
        fn parent_and_prefix() {
            let key = ContentKey::new(["a", "b", "c"]).unwrap();
            let parent = key.parent().unwrap();
            assert_eq!(parent.elements(), ["a", "b"]);
            assert!(key.starts_with(&parent));
            assert!(!parent.starts_with(&key));
            assert!(ContentKey::new(["a"]).unwrap().parent().is_none());
            assert_eq!(key.name(), "c");
        }
    }

    mod ref_spec {
        use super::*;

        #[test]
        fn parse_forms() {
            assert!(matches!(
                "main".parse::<RefSpec>().unwrap(),
                RefSpec::Named(_)
            ));
            assert!(matches!(
                "main@deadbeef".parse::<RefSpec>().unwrap(),
                RefSpec::AtHash(_, _)
            ));
            assert!(matches!(
                "@deadbeef".parse::<RefSpec>().unwrap(),
                RefSpec::Detached(_)
            ));
        }

        #[test]
        fn parse_errors() {
            assert!("main@".parse::<RefSpec>().is_err());
            assert!("@nothex!".parse::<RefSpec>().is_err());
            assert!("".parse::<RefSpec>().is_err());
        }

        #[test]
        fn pinned_keeps_name() {
            let hash = CommitHash::new("deadbeef").unwrap();
            let named: RefSpec = "dev".parse().unwrap();
            assert_eq!(named.pinned(hash.clone()).to_path_string(), "dev@deadbeef");
            let detached = RefSpec::detached(CommitHash::new("cafebabe").unwrap());
            assert_eq!(detached.pinned(hash).to_path_string(), "@deadbeef");
        }
    }
}

//! api::wire
//!
//! JSON bodies of the service's v2 REST API.
//!
//! Field names follow the service (camelCase). Optional response fields are
//! defaulted so that older or newer servers that omit them still decode;
//! fields this client does not use are ignored.

use serde::{Deserialize, Serialize};

use crate::core::conflict::RawConflict;
use crate::core::model::{CommitMeta, Content, ContentEntry, DiffEntry, Operation, Reference};
use crate::core::types::{CommitHash, ContentKey, ReferenceName};

/// Body of every error response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorBody {
    pub status: u16,
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
}

/// Structured detail attached to some errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorDetails {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub detail_type: Option<String>,
    pub conflicts: Vec<RawConflict>,
}

/// Wire values of `errorCode`.
pub mod error_code {
    pub const REFERENCE_NOT_FOUND: &str = "REFERENCE_NOT_FOUND";
    pub const CONTENT_NOT_FOUND: &str = "CONTENT_NOT_FOUND";
    pub const REFERENCE_ALREADY_EXISTS: &str = "REFERENCE_ALREADY_EXISTS";
    pub const REFERENCE_CONFLICT: &str = "REFERENCE_CONFLICT";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const UNKNOWN: &str = "UNKNOWN";
}

/// Source name sent by merges and transplants from a bare hash.
pub const DETACHED: &str = "DETACHED";

/// A reference used as the source of a create or the target of an assign.
///
/// Unlike [`Reference`], this may be a bare hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceTarget {
    Branch { name: ReferenceName, hash: CommitHash },
    Tag { name: ReferenceName, hash: CommitHash },
    Detached { hash: CommitHash },
}

impl ReferenceTarget {
    pub fn hash(&self) -> &CommitHash {
        match self {
            ReferenceTarget::Branch { hash, .. }
            | ReferenceTarget::Tag { hash, .. }
            | ReferenceTarget::Detached { hash } => hash,
        }
    }

    pub fn name(&self) -> Option<&ReferenceName> {
        match self {
            ReferenceTarget::Branch { name, .. } | ReferenceTarget::Tag { name, .. } => Some(name),
            ReferenceTarget::Detached { .. } => None,
        }
    }
}

impl From<Reference> for ReferenceTarget {
    fn from(reference: Reference) -> Self {
        match reference {
            Reference::Branch { name, hash } => ReferenceTarget::Branch { name, hash },
            Reference::Tag { name, hash } => ReferenceTarget::Tag { name, hash },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencesResponse {
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleReferenceResponse {
    pub reference: Reference,
}

/// One entry of a commit log page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub commit_meta: CommitMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_commit_hash: Option<CommitHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<Operation>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResponse {
    #[serde(default)]
    pub log_entries: Vec<LogEntry>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesResponse {
    #[serde(default)]
    pub entries: Vec<ContentEntry>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_reference: Option<Reference>,
}

/// Page of `GET /trees/{from}/diff/{to}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResponse {
    #[serde(default)]
    pub diffs: Vec<DiffEntry>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_from_reference: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_to_reference: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_reference: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMultipleContentsRequest {
    pub requested_keys: Vec<ContentKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentWithKey {
    pub key: ContentKey,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMultipleContentsResponse {
    #[serde(default)]
    pub contents: Vec<ContentWithKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_reference: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub commit_meta: CommitMeta,
    pub operations: Vec<Operation>,
}

/// Content id the service assigned to a newly created key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedContent {
    pub key: ContentKey,
    pub content_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub target_branch: Reference,
    #[serde(default)]
    pub added_contents: Vec<AddedContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub from_ref_name: String,
    pub from_hash: CommitHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub return_conflict_as_result: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransplantRequest {
    pub from_ref_name: String,
    pub hashes_to_transplant: Vec<CommitHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub return_conflict_as_result: bool,
}

/// Per-key detail of a merge or transplant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDetails {
    pub key: ContentKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<RawConflict>,
}

/// Outcome of a merge or transplant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeResponse {
    pub was_applied: bool,
    pub was_successful: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resultant_target_hash: Option<CommitHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_ancestor: Option<CommitHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_target_hash: Option<CommitHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_hash: Option<CommitHash>,
    pub details: Vec<KeyDetails>,
}

impl MergeResponse {
    /// Conflicts listed in `details`, in order.
    pub fn conflicts(&self) -> Vec<RawConflict> {
        self.details
            .iter()
            .filter_map(|d| {
                d.conflict.clone().map(|mut c| {
                    if c.key.is_none() {
                        c.key = Some(d.key.clone());
                    }
                    c
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conflict::RawConflictType;
    use serde_json::json;

    #[test]
    fn error_body_with_conflicts() {
        let body: ErrorBody = serde_json::from_value(json!({
            "status": 409,
            "reason": "Conflict",
            "message": "Key 'ns.t' already exists",
            "errorCode": "REFERENCE_CONFLICT",
            "errorDetails": {
                "type": "REFERENCE_CONFLICTS",
                "conflicts": [
                    {"conflictType": "KEY_EXISTS", "key": {"elements": ["ns", "t"]}, "message": "exists"}
                ]
            }
        }))
        .unwrap();
        assert_eq!(body.error_code.as_deref(), Some(error_code::REFERENCE_CONFLICT));
        let details = body.error_details.unwrap();
        assert_eq!(details.conflicts.len(), 1);
        assert_eq!(
            details.conflicts[0].conflict_type,
            Some(RawConflictType::KeyExists)
        );
    }

    #[test]
    fn error_body_minimal() {
        let body: ErrorBody = serde_json::from_str(r#"{"status": 500}"#).unwrap();
        assert_eq!(body.status, 500);
        assert!(body.error_code.is_none());
        assert!(body.error_details.is_none());
    }

    #[test]
    fn detached_target_shape() {
        let target = ReferenceTarget::Detached {
            hash: CommitHash::new("cafebabe").unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&target).unwrap(),
            json!({"type": "DETACHED", "hash": "cafebabe"})
        );
    }

    #[test]
    fn merge_response_conflicts_inherit_detail_key() {
        let response: MergeResponse = serde_json::from_value(json!({
            "wasApplied": false,
            "wasSuccessful": false,
            "details": [
                {"key": {"elements": ["a"]}},
                {"key": {"elements": ["b"]}, "conflict": {"conflictType": "KEY_CONFLICT", "message": "both"}}
            ]
        }))
        .unwrap();
        let conflicts = response.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].key, Some(ContentKey::new(["b"]).unwrap()));
    }

    #[test]
    fn log_response_tolerates_missing_fields() {
        let response: LogResponse = serde_json::from_value(json!({
            "logEntries": [
                {"commitMeta": {"hash": "deadbeef", "message": "m"}}
            ]
        }))
        .unwrap();
        assert!(response.token.is_none());
        assert!(response.log_entries[0].operations.is_none());
    }

    #[test]
    fn diff_response_sides_are_optional() {
        let response: DiffResponse = serde_json::from_value(json!({
            "diffs": [
                {"key": {"elements": ["db", "t"]}, "to": {"type": "ICEBERG_TABLE", "id": "x", "metadataLocation": "s3://t", "snapshotId": 1}}
            ],
            "hasMore": false
        }))
        .unwrap();
        assert!(response.diffs[0].from.is_none());
        assert!(response.diffs[0].to.is_some());
        assert!(response.effective_to_reference.is_none());
    }

    #[test]
    fn merge_request_shape() {
        let request = MergeRequest {
            from_ref_name: "dev".into(),
            from_hash: CommitHash::new("deadbeef").unwrap(),
            message: None,
            dry_run: false,
            return_conflict_as_result: true,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "fromRefName": "dev",
                "fromHash": "deadbeef",
                "dryRun": false,
                "returnConflictAsResult": true
            })
        );
    }
}

//! engine::resolve
//!
//! Interpret service responses as typed outcomes.
//!
//! # Design
//!
//! Every response passes through [`decode`]. Success bodies are parsed into
//! the expected wire type, and a body that does not match is a
//! `MalformedResponse`. Error bodies are mapped by `errorCode`:
//!
//! | errorCode | Outcome |
//! |-----------|---------|
//! | `REFERENCE_NOT_FOUND`, `CONTENT_NOT_FOUND` | `NotFound` |
//! | `REFERENCE_ALREADY_EXISTS` | `AlreadyExists` |
//! | `REFERENCE_CONFLICT` with only `UNEXPECTED_HASH` (or no) conflicts | `PreconditionFailed` |
//! | `REFERENCE_CONFLICT` with key conflicts | `Conflicted` |
//! | `BAD_REQUEST` | `BadRequest` |
//!
//! Anything else falls back on the HTTP status.
//!
//! Nothing here performs I/O.

use serde::de::DeserializeOwned;

use crate::api::wire::{error_code, ErrorBody, MergeResponse};
use crate::api::{ApiError, ApiResponse};
use crate::core::conflict::{ConflictReport, RawConflict};
use crate::core::types::CommitHash;

/// The precondition a mutation was sent with.
#[derive(Debug, Clone, Copy)]
pub struct Expectation<'a> {
    pub reference: &'a str,
    pub expected: &'a CommitHash,
}

/// Decode a response, mapping error statuses to [`ApiError`].
///
/// `expectation` fills in `PreconditionFailed` for mutating calls.
pub fn decode<T: DeserializeOwned>(
    response: ApiResponse,
    expectation: Option<Expectation<'_>>,
) -> Result<T, ApiError> {
    if response.is_success() {
        return serde_json::from_str(&response.body).map_err(|e| {
            ApiError::MalformedResponse(format!("status {}: {}", response.status, e))
        });
    }
    Err(error_from(&response, expectation))
}

/// Map an error response to an [`ApiError`].
pub fn error_from(response: &ApiResponse, expectation: Option<Expectation<'_>>) -> ApiError {
    let body: ErrorBody = match serde_json::from_str(&response.body) {
        Ok(body) => body,
        Err(_) => return from_status(response.status, response.body.trim().to_string()),
    };

    let message = if body.message.is_empty() {
        body.reason.clone()
    } else {
        body.message.clone()
    };

    match body.error_code.as_deref() {
        Some(error_code::REFERENCE_NOT_FOUND) | Some(error_code::CONTENT_NOT_FOUND) => {
            ApiError::NotFound(message)
        }
        Some(error_code::REFERENCE_ALREADY_EXISTS) => ApiError::AlreadyExists(message),
        Some(error_code::REFERENCE_CONFLICT) => {
            let conflicts = body
                .error_details
                .map(|d| d.conflicts)
                .unwrap_or_default();
            conflict_outcome(&message, conflicts, expectation)
        }
        Some(error_code::BAD_REQUEST) => ApiError::BadRequest(message),
        _ => from_status(response.status, message),
    }
}

fn from_status(status: u16, message: String) -> ApiError {
    match status {
        400 => ApiError::BadRequest(message),
        404 => ApiError::NotFound(message),
        _ => ApiError::Server { status, message },
    }
}

/// Split a conflict list into a precondition failure or a conflict report.
///
/// Stale-hash entries never count as content conflicts.
fn conflict_outcome(
    message: &str,
    conflicts: Vec<RawConflict>,
    expectation: Option<Expectation<'_>>,
) -> ApiError {
    let (stale, content): (Vec<RawConflict>, Vec<RawConflict>) =
        conflicts.into_iter().partition(RawConflict::is_unexpected_hash);

    if !content.is_empty() {
        return ApiError::Conflicted(ConflictReport::from_raw(content));
    }

    let actual = parse_actual_hash(message).or_else(|| {
        stale
            .iter()
            .find_map(|c| parse_actual_hash(&c.message))
    });
    precondition_failed(expectation, actual)
}

fn precondition_failed(expectation: Option<Expectation<'_>>, actual: Option<CommitHash>) -> ApiError {
    ApiError::PreconditionFailed {
        reference: expectation
            .map(|e| e.reference.to_string())
            .unwrap_or_default(),
        expected: expectation.map(|e| e.expected.clone()),
        actual,
    }
}

/// Extract the current hash from a stale-hash message.
///
/// The service words these as
/// `Named-reference 'main' is not at expected hash 'X', but at 'Y'.`
/// Returns `None` when the message does not carry a valid hash.
pub fn parse_actual_hash(message: &str) -> Option<CommitHash> {
    let (_, rest) = message.rsplit_once("but at '")?;
    let (hash, _) = rest.split_once('\'')?;
    CommitHash::new(hash).ok()
}

/// What a merge or transplant response means.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub applied: bool,
    pub hash: CommitHash,
    pub common_ancestor: Option<CommitHash>,
}

/// Interpret a decoded merge or transplant response.
///
/// An unsuccessful response is turned into `Conflicted` (or
/// `PreconditionFailed` when the only reported conflict is a stale hash).
/// One that reports no conflict at all is malformed.
pub fn merge_outcome(
    response: MergeResponse,
    expectation: Expectation<'_>,
) -> Result<MergeOutcome, ApiError> {
    if !response.was_successful {
        let (stale, content): (Vec<RawConflict>, Vec<RawConflict>) = response
            .conflicts()
            .into_iter()
            .partition(RawConflict::is_unexpected_hash);
        if content.is_empty() && stale.is_empty() {
            return Err(ApiError::MalformedResponse(
                "unsuccessful merge without conflicts".to_string(),
            ));
        }
        if content.is_empty() {
            return Err(precondition_failed(
                Some(expectation),
                response.effective_target_hash,
            ));
        }
        return Err(ApiError::Conflicted(ConflictReport::from_raw(content)));
    }

    let hash = response.resultant_target_hash.ok_or_else(|| {
        ApiError::MalformedResponse("successful merge without resultantTargetHash".to_string())
    })?;
    Ok(MergeOutcome {
        applied: response.was_applied,
        hash,
        common_ancestor: response.common_ancestor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::wire::{KeyDetails, SingleReferenceResponse};
    use crate::core::conflict::{ConflictKind, RawConflictType};
    use crate::core::types::ContentKey;
    use serde_json::json;

    fn hash(s: &str) -> CommitHash {
        CommitHash::new(s).unwrap()
    }

    fn error(status: u16, body: serde_json::Value) -> ApiResponse {
        ApiResponse::json(status, &body)
    }

    mod decoding {
        use super::*;

        #[test]
        fn success_body() {
            let response = ApiResponse::json(
                200,
                &json!({"reference": {"type": "BRANCH", "name": "main", "hash": "deadbeef"}}),
            );
            let decoded: SingleReferenceResponse = decode(response, None).unwrap();
            assert_eq!(decoded.reference.hash().as_str(), "deadbeef");
        }

        #[test]
        fn malformed_success_body() {
            let response = ApiResponse::json(200, &json!({"unexpected": true}));
            let result: Result<SingleReferenceResponse, _> = decode(response, None);
            assert!(matches!(result, Err(ApiError::MalformedResponse(_))));
        }

        #[test]
        fn invalid_hash_in_body_is_malformed() {
            let response = ApiResponse::json(
                200,
                &json!({"reference": {"type": "BRANCH", "name": "main", "hash": "not-a-hash"}}),
            );
            let result: Result<SingleReferenceResponse, _> = decode(response, None);
            assert!(matches!(result, Err(ApiError::MalformedResponse(_))));
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn not_found_codes() {
            for code in ["REFERENCE_NOT_FOUND", "CONTENT_NOT_FOUND"] {
                let response = error(404, json!({"status": 404, "message": "gone", "errorCode": code}));
                assert_eq!(error_from(&response, None), ApiError::NotFound("gone".into()));
            }
        }

        #[test]
        fn already_exists() {
            let response = error(
                409,
                json!({"status": 409, "message": "exists", "errorCode": "REFERENCE_ALREADY_EXISTS"}),
            );
            assert!(matches!(
                error_from(&response, None),
                ApiError::AlreadyExists(_)
            ));
        }

        #[test]
        fn stale_hash_becomes_precondition_failed() {
            let expected = hash("aaaaaaaa");
            let response = error(
                409,
                json!({
                    "status": 409,
                    "message": "Named-reference 'main' is not at expected hash 'aaaaaaaa', but at 'bbbbbbbb'.",
                    "errorCode": "REFERENCE_CONFLICT"
                }),
            );
            let err = error_from(
                &response,
                Some(Expectation {
                    reference: "main",
                    expected: &expected,
                }),
            );
            assert_eq!(
                err,
                ApiError::PreconditionFailed {
                    reference: "main".into(),
                    expected: Some(expected),
                    actual: Some(hash("bbbbbbbb")),
                }
            );
        }

        #[test]
        fn unexpected_hash_entry_is_not_a_content_conflict() {
            let response = error(
                409,
                json!({
                    "status": 409,
                    "message": "conflict",
                    "errorCode": "REFERENCE_CONFLICT",
                    "errorDetails": {"conflicts": [
                        {"conflictType": "UNEXPECTED_HASH", "message": "... but at 'cccccccc'."}
                    ]}
                }),
            );
            match error_from(&response, None) {
                ApiError::PreconditionFailed { actual, .. } => {
                    assert_eq!(actual, Some(hash("cccccccc")))
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn key_conflicts_become_report() {
            let response = error(
                409,
                json!({
                    "status": 409,
                    "message": "conflicts",
                    "errorCode": "REFERENCE_CONFLICT",
                    "errorDetails": {"conflicts": [
                        {"conflictType": "KEY_EXISTS", "key": {"elements": ["a"]}, "message": "exists"},
                        {"conflictType": "BRAND_NEW_KIND", "key": {"elements": ["b"]}, "message": "?"}
                    ]}
                }),
            );
            let err = error_from(&response, None);
            let report = err.conflicts().unwrap();
            assert_eq!(report.len(), 2);
            assert_eq!(
                report.kind_of(&ContentKey::new(["a"]).unwrap()),
                Some(ConflictKind::KeyAlreadyExists)
            );
            assert_eq!(
                report.kind_of(&ContentKey::new(["b"]).unwrap()),
                Some(ConflictKind::Unknown)
            );
        }

        #[test]
        fn non_json_error_falls_back_on_status() {
            let response = ApiResponse::new(502, "<html>bad gateway</html>");
            assert!(matches!(
                error_from(&response, None),
                ApiError::Server { status: 502, .. }
            ));
            let response = ApiResponse::new(404, "");
            assert!(matches!(error_from(&response, None), ApiError::NotFound(_)));
        }

        #[test]
        fn bad_request() {
            let response = error(
                400,
                json!({"status": 400, "message": "nope", "errorCode": "BAD_REQUEST"}),
            );
            assert_eq!(error_from(&response, None), ApiError::BadRequest("nope".into()));
        }
    }

    mod actual_hash {
        use super::*;

        #[test]
        fn parses_service_message() {
            let message =
                "Named-reference 'main' is not at expected hash 'aaaaaaaa', but at 'bbbbbbbbcc'.";
            assert_eq!(parse_actual_hash(message), Some(hash("bbbbbbbbcc")));
        }

        #[test]
        fn ignores_other_messages() {
            assert_eq!(parse_actual_hash("something else"), None);
            assert_eq!(parse_actual_hash("but at 'zzz'"), None);
        }
    }

    mod merges {
        use super::*;

        fn expectation(expected: &CommitHash) -> Expectation<'_> {
            Expectation {
                reference: "main",
                expected,
            }
        }

        #[test]
        fn successful_merge() {
            let expected = hash("aaaaaaaa");
            let response = MergeResponse {
                was_applied: true,
                was_successful: true,
                resultant_target_hash: Some(hash("bbbbbbbb")),
                common_ancestor: Some(hash("cccccccc")),
                ..Default::default()
            };
            let outcome = merge_outcome(response, expectation(&expected)).unwrap();
            assert!(outcome.applied);
            assert_eq!(outcome.hash, hash("bbbbbbbb"));
        }

        #[test]
        fn conflicts_as_result() {
            let expected = hash("aaaaaaaa");
            let key = ContentKey::new(["ns", "t"]).unwrap();
            let response = MergeResponse {
                was_successful: false,
                details: vec![KeyDetails {
                    key: key.clone(),
                    conflict: Some(RawConflict::new(RawConflictType::KeyConflict, None, "both")),
                }],
                ..Default::default()
            };
            let err = merge_outcome(response, expectation(&expected)).unwrap_err();
            assert_eq!(
                err.conflicts().unwrap().kind_of(&key),
                Some(ConflictKind::ValuesDiffer)
            );
        }

        #[test]
        fn unsuccessful_without_conflicts_is_malformed() {
            let expected = hash("aaaaaaaa");
            let response = MergeResponse {
                was_successful: false,
                ..Default::default()
            };
            assert_eq!(
                merge_outcome(response, expectation(&expected)),
                Err(ApiError::MalformedResponse(
                    "unsuccessful merge without conflicts".to_string()
                ))
            );
        }

        #[test]
        fn missing_result_hash_is_malformed() {
            let expected = hash("aaaaaaaa");
            let response = MergeResponse {
                was_successful: true,
                ..Default::default()
            };
            assert!(matches!(
                merge_outcome(response, expectation(&expected)),
                Err(ApiError::MalformedResponse(_))
            ));
        }
    }
}

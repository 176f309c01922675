//! Property-based tests for identifiers, conflict classification and history.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::sync::Arc;

use proptest::prelude::*;

use lakeref::api::MockService;
use lakeref::core::config::ClientConfig;
use lakeref::core::conflict::{classify, ConflictKind, RawConflict, RawConflictType};
use lakeref::core::model::Content;
use lakeref::core::types::{CommitHash, ContentKey, RefSpec, ReferenceName};
use lakeref::engine::{Client, LogOptions};

/// Strategy for valid commit hashes, mixed case included.
fn commit_hash() -> impl Strategy<Value = CommitHash> {
    "[0-9a-fA-F]{8,64}".prop_map(|s| CommitHash::new(s).unwrap())
}

/// Strategy for reference names.
///
/// The first character is a letter outside a-f so no generated name can
/// look like a commit hash.
fn reference_name() -> impl Strategy<Value = ReferenceName> {
    "[g-zG-Z][a-zA-Z0-9_-]{0,10}(/[a-zA-Z0-9_-]{1,8}){0,2}"
        .prop_filter("reserved", |s| s != "HEAD")
        .prop_map(|s| ReferenceName::new(s).unwrap())
}

/// Strategy for key elements, dots and unicode included.
fn key_element() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_]{1,12}",
        "[a-z]{1,4}\\.[a-z0-9]{1,4}",
        "[\\p{L}\\p{N} -]{1,8}",
    ]
}

fn content_key() -> impl Strategy<Value = ContentKey> {
    prop::collection::vec(key_element(), 1..6).prop_map(|e| ContentKey::new(e).unwrap())
}

fn ref_spec() -> impl Strategy<Value = RefSpec> {
    prop_oneof![
        reference_name().prop_map(RefSpec::named),
        (reference_name(), commit_hash()).prop_map(|(n, h)| RefSpec::at(n, h)),
        commit_hash().prop_map(RefSpec::detached),
    ]
}

proptest! {
    #[test]
    fn commit_hash_json_round_trip(hash in commit_hash()) {
        let json = serde_json::to_string(&hash).unwrap();
        prop_assert_eq!(&json, &format!("\"{}\"", hash.as_str()));
        let back: CommitHash = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, hash);
    }

    #[test]
    fn content_key_path_round_trip(key in content_key()) {
        let path = key.to_path_string();
        let back = ContentKey::from_path_string(&path).unwrap();
        prop_assert_eq!(back.elements(), key.elements());
        prop_assert_eq!(back, key);
    }

    #[test]
    fn content_key_json_round_trip(key in content_key()) {
        let json = serde_json::to_value(&key).unwrap();
        prop_assert_eq!(json["elements"].as_array().unwrap().len(), key.elements().len());
        let back: ContentKey = serde_json::from_value(json).unwrap();
        prop_assert_eq!(back, key);
    }

    #[test]
    fn path_form_has_one_separator_per_boundary(key in content_key()) {
        let path = key.to_path_string();
        prop_assert_eq!(path.matches('.').count(), key.elements().len() - 1);
    }

    #[test]
    fn prefix_of_key_is_its_ancestor(key in content_key()) {
        let mut current = key.clone();
        while let Some(parent) = current.parent() {
            prop_assert!(key.starts_with(&parent));
            current = parent;
        }
        prop_assert_eq!(current.elements().len(), 1);
    }

    #[test]
    fn ref_spec_display_parses_back(spec in ref_spec()) {
        let back: RefSpec = spec.to_string().parse().unwrap();
        prop_assert_eq!(back, spec);
    }

    #[test]
    fn unknown_conflict_types_are_kept_verbatim(raw in "[A-Z_]{1,24}|\\PC{0,16}") {
        let parsed = RawConflictType::from(raw.clone());
        let kind = classify(&parsed);
        if matches!(parsed, RawConflictType::Other(_)) {
            prop_assert_eq!(kind, ConflictKind::Unknown);
        }
        prop_assert_eq!(String::from(parsed), raw);
    }

    #[test]
    fn raw_conflict_json_round_trip(raw in "[A-Z_]{1,24}", key in content_key()) {
        let conflict = RawConflict::new(RawConflictType::from(raw.clone()), Some(key), "m");
        let json = serde_json::to_value(&conflict).unwrap();
        prop_assert_eq!(json["conflictType"].as_str(), Some(raw.as_str()));
        let back: RawConflict = serde_json::from_value(json).unwrap();
        prop_assert_eq!(back, conflict);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// With no concurrent writers, history has one entry per commit and
    /// every entry's first parent is the next one listed.
    #[test]
    fn log_mirrors_commit_sequence(tables in prop::collection::vec("[a-z]{1,6}", 1..12), page in 1u32..5) {
        let service = MockService::new().with_max_page_size(page as usize);
        let config = ClientConfig::new("http://localhost:19120/api/v2".parse().unwrap())
            .with_page_size(page)
            .unwrap();
        let client = Client::with_transport(config, Arc::new(service));

        let (heads, log) = tokio_test::block_on(async {
            let mut head = CommitHash::no_ancestor();
            let mut heads = Vec::new();
            for (i, table) in tables.iter().enumerate() {
                // index keeps keys unique when the generator repeats a name
                let key = ContentKey::new(["ns".to_string(), format!("{table}{i}")]).unwrap();
                let result = client
                    .commit(ReferenceName::main(), head.clone())
                    .message(format!("add {key}"))
                    .put(key, Content::iceberg_table("s3://t", i as i64))
                    .submit()
                    .await
                    .unwrap();
                head = result.hash().clone();
                heads.push(head.clone());
            }
            let log = client
                .log(&RefSpec::named(ReferenceName::main()), LogOptions::default())
                .await
                .unwrap()
                .collect_all()
                .await
                .unwrap();
            (heads, log)
        });

        prop_assert_eq!(log.len(), heads.len());
        let listed: Vec<CommitHash> = log.iter().map(|c| c.hash.clone()).collect();
        let expected: Vec<CommitHash> = heads.into_iter().rev().collect();
        prop_assert_eq!(listed, expected);
        for pair in log.windows(2) {
            prop_assert_eq!(pair[0].first_parent(), Some(&pair[1].hash));
        }
    }
}

//! api::mock
//!
//! In-memory versioning service for deterministic testing.
//!
//! # Design
//!
//! `MockService` implements [`Transport`] by answering requests itself,
//! following the same REST contract as a live server: hash preconditions on
//! every mutation, atomic commits, first-parent history, fast-forward or
//! replay merges, cherry-pick transplants and opaque continuation tokens.
//! Every commit stores a full snapshot of the content tree, which keeps
//! as-of reads and diffs trivial.
//!
//! Commit hashes are SHA-256 digests of the parents, a sequence number and
//! the message, and commit times advance one second per commit from a fixed
//! epoch, so runs are reproducible.
//!
//! Faults can be injected per endpoint with [`FailOn`], and every request
//! is recorded for later inspection.
//!
//! Filter expressions are not evaluated; a request carrying one is answered
//! with 400.
//!
//! # Example
//!
//! ```
//! use lakeref::api::{ApiRequest, MockService, Transport};
//!
//! # tokio_test::block_on(async {
//! let service = MockService::new();
//! let response = service.execute(ApiRequest::get(["trees", "main"])).await.unwrap();
//! assert_eq!(response.status, 200);
//! assert_eq!(service.requests().len(), 1);
//! # });
//! ```

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use super::traits::{ApiRequest, ApiResponse, Method, Transport, TransportError};
use super::wire::{
    error_code, AddedContent, CommitRequest, CommitResponse, ContentResponse, ContentWithKey,
    DiffResponse, EntriesResponse, GetMultipleContentsRequest, GetMultipleContentsResponse,
    KeyDetails, LogEntry, LogResponse, MergeRequest, MergeResponse, ReferenceTarget,
    ReferencesResponse, SingleReferenceResponse, TransplantRequest, DETACHED,
};
use crate::core::conflict::{RawConflict, RawConflictType};
use crate::core::model::{
    CommitMeta, Content, ContentEntry, ContentType, DiffEntry, Operation, Reference,
    ReferenceKind,
};
use crate::core::types::{CommitHash, ContentKey, RefSpec, ReferenceName};

/// Page size used when a request does not ask for one.
const DEFAULT_PAGE_SIZE: usize = 100;

/// Unix time of the first mock commit (2024-01-01T00:00:00Z).
const EPOCH_SECS: i64 = 1_704_067_200;

type Tree = BTreeMap<ContentKey, Content>;

/// The REST endpoints the mock answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListReferences,
    GetReference,
    CreateReference,
    AssignReference,
    DeleteReference,
    History,
    Entries,
    Diff,
    GetContent,
    GetContents,
    Commit,
    Merge,
    Transplant,
}

impl Endpoint {
    /// Route a request, or `None` if no endpoint matches.
    pub fn of(request: &ApiRequest) -> Option<Endpoint> {
        let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();
        let endpoint = match (request.method, segments.as_slice()) {
            (Method::Get, ["trees"]) => Endpoint::ListReferences,
            (Method::Post, ["trees"]) => Endpoint::CreateReference,
            (Method::Get, ["trees", _]) => Endpoint::GetReference,
            (Method::Put, ["trees", _]) => Endpoint::AssignReference,
            (Method::Delete, ["trees", _]) => Endpoint::DeleteReference,
            (Method::Get, ["trees", _, "history"]) => Endpoint::History,
            (Method::Get, ["trees", _, "entries"]) => Endpoint::Entries,
            (Method::Get, ["trees", _, "diff", _]) => Endpoint::Diff,
            (Method::Post, ["trees", _, "contents"]) => Endpoint::GetContents,
            (Method::Get, ["trees", _, "contents", _]) => Endpoint::GetContent,
            (Method::Post, ["trees", _, "history", "commit"]) => Endpoint::Commit,
            (Method::Post, ["trees", _, "history", "merge"]) => Endpoint::Merge,
            (Method::Post, ["trees", _, "history", "transplant"]) => Endpoint::Transplant,
            _ => return None,
        };
        Some(endpoint)
    }
}

/// Configuration for which requests should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail before the service sees the request.
    Request(Endpoint, TransportError),
    /// Handle the request, then lose the response.
    Response(Endpoint, TransportError),
    /// Answer with a canned response instead of handling the request.
    Reply(Endpoint, ApiResponse),
}

impl FailOn {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            FailOn::Request(e, _) | FailOn::Response(e, _) | FailOn::Reply(e, _) => *e,
        }
    }
}

#[derive(Debug)]
struct Fault {
    fail_on: FailOn,
    /// Matching requests still to let through before failing
    passes: usize,
}

#[derive(Debug, Clone)]
struct StoredReference {
    kind: ReferenceKind,
    hash: CommitHash,
}

#[derive(Debug, Clone)]
struct StoredCommit {
    meta: CommitMeta,
    parents: Vec<CommitHash>,
    operations: Vec<Operation>,
    tree: Tree,
}

/// Mock service for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockService {
    inner: Arc<Mutex<MockServiceInner>>,
}

#[derive(Debug)]
struct MockServiceInner {
    references: BTreeMap<ReferenceName, StoredReference>,
    commits: HashMap<CommitHash, StoredCommit>,
    default_branch: ReferenceName,
    sequence: u64,
    max_page_size: usize,
    validate_namespaces: bool,
    fault: Option<Fault>,
    requests: Vec<ApiRequest>,
}

impl MockService {
    /// Create a service holding an empty `main` branch.
    pub fn new() -> Self {
        let root = StoredCommit {
            meta: CommitMeta {
                hash: Some(CommitHash::no_ancestor()),
                ..Default::default()
            },
            parents: Vec::new(),
            operations: Vec::new(),
            tree: Tree::new(),
        };
        let main = ReferenceName::main();

        let mut references = BTreeMap::new();
        references.insert(
            main.clone(),
            StoredReference {
                kind: ReferenceKind::Branch,
                hash: CommitHash::no_ancestor(),
            },
        );
        let mut commits = HashMap::new();
        commits.insert(CommitHash::no_ancestor(), root);

        Self {
            inner: Arc::new(Mutex::new(MockServiceInner {
                references,
                commits,
                default_branch: main,
                sequence: 0,
                max_page_size: usize::MAX,
                validate_namespaces: false,
                fault: None,
                requests: Vec::new(),
            })),
        }
    }

    /// Require every put key's parent to be an existing namespace, and
    /// refuse to delete namespaces that still have children.
    pub fn with_namespace_validation(self) -> Self {
        self.lock().validate_namespaces = true;
        self
    }

    /// Cap page sizes below what clients request.
    pub fn with_max_page_size(self, size: usize) -> Self {
        self.lock().max_page_size = size.max(1);
        self
    }

    /// Configure the mock to fail on a specific endpoint.
    ///
    /// # Example
    ///
    /// ```
    /// use lakeref::api::{Endpoint, FailOn, MockService, TransportError};
    ///
    /// let service = MockService::new()
    ///     .fail_on(FailOn::Request(Endpoint::Commit, TransportError::Timeout));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.set_fail_on(fail_on, 0);
        self
    }

    /// Let `passes` matching requests through, then fail every later one.
    pub fn fail_on_after(self, fail_on: FailOn, passes: usize) -> Self {
        self.set_fail_on(fail_on, passes);
        self
    }

    /// Replace the fault configuration on a shared handle.
    pub fn set_fail_on(&self, fail_on: FailOn, passes: usize) {
        self.lock().fault = Some(Fault { fail_on, passes });
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.lock().fault = None;
    }

    /// Get all recorded requests.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    /// Recorded requests routed to `endpoint`.
    pub fn requests_to(&self, endpoint: Endpoint) -> Vec<ApiRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| Endpoint::of(r) == Some(endpoint))
            .cloned()
            .collect()
    }

    /// Clear recorded requests.
    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Current hash of a reference (for test verification).
    pub fn head(&self, name: &str) -> Option<CommitHash> {
        let name = ReferenceName::new(name).ok()?;
        self.lock().references.get(&name).map(|r| r.hash.clone())
    }

    /// Content of `key` as of `hash` (for test verification).
    pub fn content_at(&self, hash: &CommitHash, key: &ContentKey) -> Option<Content> {
        self.lock()
            .commits
            .get(hash)
            .and_then(|c| c.tree.get(key).cloned())
    }

    /// Number of commits created, excluding the empty root.
    pub fn commit_count(&self) -> usize {
        self.lock().commits.len() - 1
    }

    fn lock(&self) -> MutexGuard<'_, MockServiceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockService {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut inner = self.lock();
        inner.requests.push(request.clone());
        let endpoint = Endpoint::of(&request);

        match inner.take_fault(endpoint) {
            Some(FailOn::Request(_, error)) => Err(error),
            Some(FailOn::Reply(_, response)) => Ok(response),
            Some(FailOn::Response(_, error)) => {
                inner.handle(endpoint, &request);
                Err(error)
            }
            None => Ok(inner.handle(endpoint, &request)),
        }
    }
}

/// An error response under construction.
#[derive(Debug)]
struct Failure {
    status: u16,
    code: &'static str,
    message: String,
    conflicts: Vec<RawConflict>,
}

impl Failure {
    fn new(status: u16, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            conflicts: Vec::new(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, error_code::BAD_REQUEST, message)
    }

    fn reference_not_found(name: impl std::fmt::Display) -> Self {
        Self::new(
            404,
            error_code::REFERENCE_NOT_FOUND,
            format!("Named reference '{name}' not found"),
        )
    }

    fn commit_not_found(hash: &CommitHash) -> Self {
        Self::new(
            404,
            error_code::REFERENCE_NOT_FOUND,
            format!("Commit '{hash}' not found"),
        )
    }

    fn unexpected_hash(name: &ReferenceName, expected: &CommitHash, actual: &CommitHash) -> Self {
        let message =
            format!("Named-reference '{name}' is not at expected hash '{expected}', but at '{actual}'.");
        Self {
            status: 409,
            code: error_code::REFERENCE_CONFLICT,
            conflicts: vec![RawConflict::new(
                RawConflictType::UnexpectedHash,
                None,
                message.clone(),
            )],
            message,
        }
    }

    fn conflicts(conflicts: Vec<RawConflict>) -> Self {
        let messages: Vec<&str> = conflicts.iter().map(|c| c.message.as_str()).collect();
        Self {
            status: 409,
            code: error_code::REFERENCE_CONFLICT,
            message: format!("There are conflicts that prevent committing: {}", messages.join(", ")),
            conflicts,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(500, error_code::UNKNOWN, message)
    }

    fn into_response(self) -> ApiResponse {
        let reason = match self.status {
            400 => "Bad Request",
            404 => "Not Found",
            409 => "Conflict",
            _ => "Internal Server Error",
        };
        let mut body = json!({
            "status": self.status,
            "reason": reason,
            "message": self.message,
            "errorCode": self.code,
        });
        if !self.conflicts.is_empty() {
            body["errorDetails"] = json!({
                "type": "REFERENCE_CONFLICTS",
                "conflicts": self.conflicts,
            });
        }
        ApiResponse::json(self.status, &body)
    }
}

type Handled = Result<ApiResponse, Failure>;

fn ok<T: Serialize>(body: &T) -> Handled {
    serde_json::to_value(body)
        .map(|v| ApiResponse::json(200, &v))
        .map_err(|e| Failure::internal(e.to_string()))
}

fn body<T: DeserializeOwned>(request: &ApiRequest) -> Result<T, Failure> {
    let value = request
        .body
        .clone()
        .ok_or_else(|| Failure::bad_request("request body is required"))?;
    serde_json::from_value(value).map_err(|e| Failure::bad_request(format!("invalid body: {e}")))
}

fn ref_segment(request: &ApiRequest) -> Result<RefSpec, Failure> {
    let segment = request
        .segments
        .get(1)
        .ok_or_else(|| Failure::bad_request("missing reference"))?;
    segment
        .parse::<RefSpec>()
        .map_err(|e| Failure::bad_request(format!("{e}")))
}

fn kind_param(request: &ApiRequest) -> Result<Option<ReferenceKind>, Failure> {
    request
        .query_value("type")
        .map(|t| t.parse::<ReferenceKind>().map_err(Failure::bad_request))
        .transpose()
}

fn reject_filter(request: &ApiRequest) -> Result<(), Failure> {
    if request.query_value("filter").is_some() {
        return Err(Failure::bad_request(
            "filter expressions are not supported by this service",
        ));
    }
    Ok(())
}

fn encode_token(offset: usize) -> String {
    format!("{offset:08x}")
}

fn decode_token(token: &str) -> Result<usize, Failure> {
    usize::from_str_radix(token, 16)
        .map_err(|_| Failure::bad_request(format!("invalid page token '{token}'")))
}

/// Changes from `from` to `to`; `None` marks a deleted key.
fn diff(from: &Tree, to: &Tree) -> BTreeMap<ContentKey, Option<Content>> {
    let mut changes = BTreeMap::new();
    for (key, content) in to {
        if from.get(key) != Some(content) {
            changes.insert(key.clone(), Some(content.clone()));
        }
    }
    for key in from.keys() {
        if !to.contains_key(key) {
            changes.insert(key.clone(), None);
        }
    }
    changes
}

fn apply_changes(tree: &mut Tree, changes: &BTreeMap<ContentKey, Option<Content>>) {
    for (key, change) in changes {
        match change {
            Some(content) => {
                tree.insert(key.clone(), content.clone());
            }
            None => {
                tree.remove(key);
            }
        }
    }
}

fn operations_for(changes: &BTreeMap<ContentKey, Option<Content>>) -> Vec<Operation> {
    changes
        .iter()
        .map(|(key, change)| match change {
            Some(content) => Operation::put(key.clone(), content.clone()),
            None => Operation::delete(key.clone()),
        })
        .collect()
}

fn key_conflict(key: &ContentKey) -> RawConflict {
    RawConflict::new(
        RawConflictType::KeyConflict,
        Some(key.clone()),
        format!("key '{key}' has conflicting changes"),
    )
}

impl MockServiceInner {
    fn take_fault(&mut self, endpoint: Option<Endpoint>) -> Option<FailOn> {
        let fault = self.fault.as_mut()?;
        if Some(fault.fail_on.endpoint()) != endpoint {
            return None;
        }
        if fault.passes > 0 {
            fault.passes -= 1;
            return None;
        }
        Some(fault.fail_on.clone())
    }

    fn handle(&mut self, endpoint: Option<Endpoint>, request: &ApiRequest) -> ApiResponse {
        let result = match endpoint {
            None => Err(Failure::new(
                404,
                error_code::UNKNOWN,
                format!("no route for {} {}", request.method, request.path()),
            )),
            Some(Endpoint::ListReferences) => self.list_references(request),
            Some(Endpoint::GetReference) => self.get_reference(request),
            Some(Endpoint::CreateReference) => self.create_reference(request),
            Some(Endpoint::AssignReference) => self.assign_reference(request),
            Some(Endpoint::DeleteReference) => self.delete_reference(request),
            Some(Endpoint::History) => self.history(request),
            Some(Endpoint::Entries) => self.entries(request),
            Some(Endpoint::Diff) => self.diff_trees(request),
            Some(Endpoint::GetContent) => self.get_content(request),
            Some(Endpoint::GetContents) => self.get_contents(request),
            Some(Endpoint::Commit) => self.commit(request),
            Some(Endpoint::Merge) => self.merge(request),
            Some(Endpoint::Transplant) => self.transplant(request),
        };
        result.unwrap_or_else(Failure::into_response)
    }

    // ---- helpers ----

    fn reference(&self, name: &ReferenceName) -> Result<Reference, Failure> {
        self.references
            .get(name)
            .map(|r| Reference::of_kind(r.kind, name.clone(), r.hash.clone()))
            .ok_or_else(|| Failure::reference_not_found(name))
    }

    fn commit_of(&self, hash: &CommitHash) -> Result<&StoredCommit, Failure> {
        self.commits
            .get(hash)
            .ok_or_else(|| Failure::commit_not_found(hash))
    }

    /// Resolve a read target to its effective reference and pinned hash.
    fn resolve_read(&self, spec: &RefSpec) -> Result<(Option<Reference>, CommitHash), Failure> {
        match spec {
            RefSpec::Named(name) => {
                let reference = self.reference(name)?;
                let hash = reference.hash().clone();
                Ok((Some(reference), hash))
            }
            RefSpec::AtHash(name, hash) => {
                let reference = self.reference(name)?;
                self.commit_of(hash)?;
                let pinned = Reference::of_kind(reference.kind(), name.clone(), hash.clone());
                Ok((Some(pinned), hash.clone()))
            }
            RefSpec::Detached(hash) => {
                self.commit_of(hash)?;
                Ok((None, hash.clone()))
            }
        }
    }

    /// Resolve a mutation target: a branch, optionally with its expected hash.
    fn resolve_branch(&self, spec: &RefSpec) -> Result<(ReferenceName, CommitHash), Failure> {
        let (name, expected) = match spec {
            RefSpec::Named(name) => (name, None),
            RefSpec::AtHash(name, hash) => (name, Some(hash)),
            RefSpec::Detached(_) => {
                return Err(Failure::bad_request("a branch name is required"));
            }
        };
        let stored = self
            .references
            .get(name)
            .ok_or_else(|| Failure::reference_not_found(name))?;
        if stored.kind != ReferenceKind::Branch {
            return Err(Failure::bad_request(format!("'{name}' is not a branch")));
        }
        if let Some(expected) = expected {
            if *expected != stored.hash {
                return Err(Failure::unexpected_hash(name, expected, &stored.hash));
            }
        }
        Ok((name.clone(), stored.hash.clone()))
    }

    /// Resolve an assign/delete target: `name@expected` of the given kind.
    fn resolve_named(
        &self,
        request: &ApiRequest,
    ) -> Result<(ReferenceName, ReferenceKind, CommitHash), Failure> {
        let (name, expected) = match ref_segment(request)? {
            RefSpec::AtHash(name, hash) => (name, hash),
            _ => return Err(Failure::bad_request("expected hash is required")),
        };
        let stored = self
            .references
            .get(&name)
            .ok_or_else(|| Failure::reference_not_found(&name))?;
        if let Some(kind) = kind_param(request)? {
            if kind != stored.kind {
                return Err(Failure::reference_not_found(format!("{kind} {name}")));
            }
        }
        if expected != stored.hash {
            return Err(Failure::unexpected_hash(&name, &expected, &stored.hash));
        }
        Ok((name, stored.kind, stored.hash.clone()))
    }

    /// Slice `total` items per the request's page parameters.
    fn page_bounds(
        &self,
        request: &ApiRequest,
        total: usize,
    ) -> Result<(usize, usize, Option<String>), Failure> {
        let start = match request.query_value("page-token") {
            Some(token) => decode_token(token)?,
            None => 0,
        };
        if start > total {
            return Err(Failure::bad_request("page token is out of range"));
        }
        let requested = match request.query_value("max-records") {
            Some(v) => v
                .parse::<usize>()
                .map_err(|_| Failure::bad_request(format!("invalid max-records '{v}'")))?,
            None => DEFAULT_PAGE_SIZE,
        };
        let size = requested.min(self.max_page_size).max(1);
        let end = start.saturating_add(size).min(total);
        let token = (end < total).then(|| encode_token(end));
        Ok((start, end, token))
    }

    fn next_hash(&mut self, parents: &[CommitHash], message: &str) -> Result<CommitHash, Failure> {
        self.sequence += 1;
        let mut hasher = Sha256::new();
        for parent in parents {
            hasher.update(parent.as_str().as_bytes());
        }
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(message.as_bytes());
        CommitHash::new(hex::encode(hasher.finalize())).map_err(|e| Failure::internal(e.to_string()))
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(EPOCH_SECS, 0).unwrap_or_default()
            + Duration::seconds(self.sequence as i64)
    }

    /// Record a new commit on top of `parents` and return its hash.
    fn store_commit(
        &mut self,
        parents: Vec<CommitHash>,
        mut meta: CommitMeta,
        operations: Vec<Operation>,
        tree: Tree,
    ) -> Result<CommitHash, Failure> {
        let hash = self.next_hash(&parents, &meta.message)?;
        meta.hash = Some(hash.clone());
        meta.commit_time = Some(self.now());
        meta.author_time = meta.author_time.or(meta.commit_time);
        meta.committer = meta.committer.or_else(|| Some("mock".to_string()));
        meta.parent_commit_hashes = parents.clone();
        self.commits.insert(
            hash.clone(),
            StoredCommit {
                meta,
                parents,
                operations,
                tree,
            },
        );
        Ok(hash)
    }

    fn move_reference(&mut self, name: &ReferenceName, hash: CommitHash) {
        if let Some(stored) = self.references.get_mut(name) {
            stored.hash = hash;
        }
    }

    fn tree(&self, hash: &CommitHash) -> Result<Tree, Failure> {
        Ok(self.commit_of(hash)?.tree.clone())
    }

    fn ancestors(&self, hash: &CommitHash) -> Vec<CommitHash> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([hash.clone()]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&next) {
                queue.extend(commit.parents.iter().cloned());
            }
            order.push(next);
        }
        order
    }

    fn common_ancestor(&self, a: &CommitHash, b: &CommitHash) -> CommitHash {
        let of_b: HashSet<CommitHash> = self.ancestors(b).into_iter().collect();
        self.ancestors(a)
            .into_iter()
            .find(|h| of_b.contains(h))
            .unwrap_or_else(CommitHash::no_ancestor)
    }

    fn check_source(&self, from_ref_name: &str, hashes: &[CommitHash]) -> Result<(), Failure> {
        if from_ref_name != DETACHED {
            let name = ReferenceName::new(from_ref_name)
                .map_err(|e| Failure::bad_request(e.to_string()))?;
            self.reference(&name)?;
        }
        for hash in hashes {
            self.commit_of(hash)?;
        }
        Ok(())
    }

    fn check_namespaces(&self, tree: &Tree, operations: &[Operation]) -> Vec<RawConflict> {
        let mut conflicts = Vec::new();
        for op in operations {
            match op {
                Operation::Put { key, .. } => {
                    let Some(parent) = key.parent() else { continue };
                    match tree.get(&parent) {
                        None => conflicts.push(RawConflict::new(
                            RawConflictType::NamespaceAbsent,
                            Some(key.clone()),
                            format!("namespace '{parent}' must exist"),
                        )),
                        Some(c) if c.content_type != ContentType::Namespace => {
                            conflicts.push(RawConflict::new(
                                RawConflictType::NotANamespace,
                                Some(key.clone()),
                                format!("'{parent}' is not a namespace"),
                            ))
                        }
                        Some(_) => {}
                    }
                }
                Operation::Delete { key } => {
                    let has_children = tree.keys().any(|k| k != key && k.starts_with(key));
                    if has_children {
                        conflicts.push(RawConflict::new(
                            RawConflictType::NamespaceNotEmpty,
                            Some(key.clone()),
                            format!("namespace '{key}' is not empty"),
                        ));
                    }
                }
                Operation::Unchanged { .. } => {}
            }
        }
        conflicts
    }

    // ---- references ----

    fn list_references(&self, request: &ApiRequest) -> Handled {
        reject_filter(request)?;
        let all: Vec<Reference> = self
            .references
            .iter()
            .map(|(name, r)| Reference::of_kind(r.kind, name.clone(), r.hash.clone()))
            .collect();
        let (start, end, token) = self.page_bounds(request, all.len())?;
        ok(&ReferencesResponse {
            references: all[start..end].to_vec(),
            has_more: token.is_some(),
            token,
        })
    }

    fn get_reference(&self, request: &ApiRequest) -> Handled {
        let name = match ref_segment(request)? {
            RefSpec::Named(name) | RefSpec::AtHash(name, _) => name,
            RefSpec::Detached(_) => {
                return Err(Failure::bad_request("a reference name is required"));
            }
        };
        ok(&SingleReferenceResponse {
            reference: self.reference(&name)?,
        })
    }

    fn create_reference(&mut self, request: &ApiRequest) -> Handled {
        let name = request
            .query_value("name")
            .ok_or_else(|| Failure::bad_request("name is required"))?;
        let name = ReferenceName::new(name).map_err(|e| Failure::bad_request(e.to_string()))?;
        let kind = kind_param(request)?.ok_or_else(|| Failure::bad_request("type is required"))?;
        let source: ReferenceTarget = body(request)?;

        if self.references.contains_key(&name) {
            return Err(Failure::new(
                409,
                error_code::REFERENCE_ALREADY_EXISTS,
                format!("Named reference '{name}' already exists."),
            ));
        }
        if let Some(source_name) = source.name() {
            self.reference(source_name)?;
        }
        self.commit_of(source.hash())?;

        self.references.insert(
            name.clone(),
            StoredReference {
                kind,
                hash: source.hash().clone(),
            },
        );
        ok(&SingleReferenceResponse {
            reference: Reference::of_kind(kind, name, source.hash().clone()),
        })
    }

    fn assign_reference(&mut self, request: &ApiRequest) -> Handled {
        let (name, kind, _) = self.resolve_named(request)?;
        let target: ReferenceTarget = body(request)?;
        self.commit_of(target.hash())?;
        self.move_reference(&name, target.hash().clone());
        ok(&SingleReferenceResponse {
            reference: Reference::of_kind(kind, name, target.hash().clone()),
        })
    }

    fn delete_reference(&mut self, request: &ApiRequest) -> Handled {
        let (name, kind, hash) = self.resolve_named(request)?;
        if name == self.default_branch {
            return Err(Failure::bad_request("cannot delete the default branch"));
        }
        self.references.remove(&name);
        ok(&SingleReferenceResponse {
            reference: Reference::of_kind(kind, name, hash),
        })
    }

    // ---- reads ----

    fn history(&self, request: &ApiRequest) -> Handled {
        reject_filter(request)?;
        let (_, start) = self.resolve_read(&ref_segment(request)?)?;
        let limit = request
            .query_value("limit-hash")
            .map(CommitHash::new)
            .transpose()
            .map_err(|e| Failure::bad_request(e.to_string()))?;

        let mut walk = Vec::new();
        let mut cursor = Some(start);
        while let Some(hash) = cursor {
            if hash.is_no_ancestor() {
                break;
            }
            let commit = self.commit_of(&hash)?;
            cursor = commit.parents.first().cloned();
            let reached_limit = limit.as_ref() == Some(&hash);
            walk.push(hash);
            if reached_limit {
                break;
            }
        }

        let with_operations = request.query_value("fetch") == Some("ALL");
        let (begin, end, token) = self.page_bounds(request, walk.len())?;
        let mut log_entries = Vec::with_capacity(end - begin);
        for hash in &walk[begin..end] {
            let commit = self.commit_of(hash)?;
            log_entries.push(LogEntry {
                commit_meta: commit.meta.clone(),
                parent_commit_hash: commit.parents.first().cloned(),
                operations: with_operations.then(|| commit.operations.clone()),
            });
        }
        ok(&LogResponse {
            log_entries,
            has_more: token.is_some(),
            token,
        })
    }

    fn entries(&self, request: &ApiRequest) -> Handled {
        reject_filter(request)?;
        let (effective, hash) = self.resolve_read(&ref_segment(request)?)?;
        let prefix = request
            .query_value("prefix-key")
            .map(ContentKey::from_path_string)
            .transpose()
            .map_err(|e| Failure::bad_request(e.to_string()))?;
        let with_content = request.query_value("content") == Some("true");

        let tree = &self.commit_of(&hash)?.tree;
        let matching: Vec<(&ContentKey, &Content)> = tree
            .iter()
            .filter(|(key, _)| prefix.as_ref().map_or(true, |p| key.starts_with(p)))
            .collect();
        let (start, end, token) = self.page_bounds(request, matching.len())?;
        let entries = matching[start..end]
            .iter()
            .map(|(key, content)| ContentEntry {
                key: (*key).clone(),
                content_type: content.content_type.clone(),
                content_id: content.id.clone(),
                content: with_content.then(|| (*content).clone()),
            })
            .collect();
        ok(&EntriesResponse {
            entries,
            has_more: token.is_some(),
            token,
            effective_reference: effective,
        })
    }

    fn diff_trees(&self, request: &ApiRequest) -> Handled {
        let (from_ref, from_hash) = self.resolve_read(&ref_segment(request)?)?;
        let to_segment = request
            .segments
            .get(3)
            .ok_or_else(|| Failure::bad_request("missing diff target"))?;
        let to_spec = to_segment
            .parse::<RefSpec>()
            .map_err(|e| Failure::bad_request(format!("{e}")))?;
        let (to_ref, to_hash) = self.resolve_read(&to_spec)?;

        let from = &self.commit_of(&from_hash)?.tree;
        let to = &self.commit_of(&to_hash)?.tree;
        let changed: Vec<DiffEntry> = diff(from, to)
            .into_keys()
            .map(|key| DiffEntry {
                from: from.get(&key).cloned(),
                to: to.get(&key).cloned(),
                key,
            })
            .collect();
        let (start, end, token) = self.page_bounds(request, changed.len())?;
        ok(&DiffResponse {
            diffs: changed[start..end].to_vec(),
            has_more: token.is_some(),
            token,
            effective_from_reference: from_ref,
            effective_to_reference: to_ref,
        })
    }

    fn get_content(&self, request: &ApiRequest) -> Handled {
        let (effective, hash) = self.resolve_read(&ref_segment(request)?)?;
        let path = request
            .segments
            .get(3)
            .ok_or_else(|| Failure::bad_request("missing content key"))?;
        let key =
            ContentKey::from_path_string(path).map_err(|e| Failure::bad_request(e.to_string()))?;
        let content = self.commit_of(&hash)?.tree.get(&key).cloned().ok_or_else(|| {
            Failure::new(
                404,
                error_code::CONTENT_NOT_FOUND,
                format!("Could not find content for key '{key}'"),
            )
        })?;
        ok(&ContentResponse {
            content,
            effective_reference: effective,
        })
    }

    fn get_contents(&self, request: &ApiRequest) -> Handled {
        let (effective, hash) = self.resolve_read(&ref_segment(request)?)?;
        let wanted: GetMultipleContentsRequest = body(request)?;
        let tree = &self.commit_of(&hash)?.tree;
        let contents = wanted
            .requested_keys
            .into_iter()
            .filter_map(|key| {
                tree.get(&key)
                    .cloned()
                    .map(|content| ContentWithKey { key, content })
            })
            .collect();
        ok(&GetMultipleContentsResponse {
            contents,
            effective_reference: effective,
        })
    }

    // ---- mutations ----

    fn commit(&mut self, request: &ApiRequest) -> Handled {
        let (branch, head) = self.resolve_branch(&ref_segment(request)?)?;
        let commit: CommitRequest = body(request)?;

        let mut seen = HashSet::new();
        for op in &commit.operations {
            if !seen.insert(op.key()) {
                return Err(Failure::bad_request(format!(
                    "duplicate key '{}' in operations",
                    op.key()
                )));
            }
        }

        let mut tree = self.tree(&head)?;
        let mut conflicts = Vec::new();
        let mut applied = Vec::with_capacity(commit.operations.len());
        let mut added_contents = Vec::new();

        for op in commit.operations {
            match op {
                Operation::Put { key, content } => {
                    let requested_id = content.id.clone();
                    let stored = match (tree.get(&key), requested_id.as_deref()) {
                        (Some(_), None) => {
                            conflicts.push(RawConflict::new(
                                RawConflictType::KeyExists,
                                Some(key.clone()),
                                format!("key '{key}' already exists"),
                            ));
                            continue;
                        }
                        (None, Some(_)) => {
                            conflicts.push(RawConflict::new(
                                RawConflictType::KeyDoesNotExist,
                                Some(key.clone()),
                                format!("key '{key}' does not exist"),
                            ));
                            continue;
                        }
                        (Some(current), Some(id)) if current.id.as_deref() != Some(id) => {
                            conflicts.push(RawConflict::new(
                                RawConflictType::ContentIdDiffers,
                                Some(key.clone()),
                                format!("content id of '{key}' differs"),
                            ));
                            continue;
                        }
                        (Some(current), Some(_)) if current.content_type != content.content_type => {
                            conflicts.push(RawConflict::new(
                                RawConflictType::PayloadDiffers,
                                Some(key.clone()),
                                format!("content type of '{key}' differs"),
                            ));
                            continue;
                        }
                        (Some(_), Some(_)) => content,
                        (None, None) => {
                            let id = uuid::Uuid::new_v4().to_string();
                            added_contents.push(AddedContent {
                                key: key.clone(),
                                content_id: id.clone(),
                            });
                            content.with_id(id)
                        }
                    };
                    tree.insert(key.clone(), stored.clone());
                    applied.push(Operation::put(key, stored));
                }
                Operation::Delete { key } => {
                    if tree.remove(&key).is_none() {
                        conflicts.push(RawConflict::new(
                            RawConflictType::KeyDoesNotExist,
                            Some(key.clone()),
                            format!("key '{key}' does not exist"),
                        ));
                        continue;
                    }
                    applied.push(Operation::delete(key));
                }
                unchanged @ Operation::Unchanged { .. } => applied.push(unchanged),
            }
        }

        if conflicts.is_empty() && self.validate_namespaces {
            conflicts = self.check_namespaces(&tree, &applied);
        }
        if !conflicts.is_empty() {
            return Err(Failure::conflicts(conflicts));
        }

        let hash = self.store_commit(vec![head], commit.commit_meta, applied, tree)?;
        self.move_reference(&branch, hash.clone());
        ok(&CommitResponse {
            target_branch: Reference::branch(branch, hash),
            added_contents,
        })
    }

    fn merge(&mut self, request: &ApiRequest) -> Handled {
        let (branch, head) = self.resolve_branch(&ref_segment(request)?)?;
        let merge: MergeRequest = body(request)?;
        self.check_source(&merge.from_ref_name, std::slice::from_ref(&merge.from_hash))?;

        let ancestor = self.common_ancestor(&head, &merge.from_hash);
        let mut response = MergeResponse {
            was_successful: true,
            resultant_target_hash: Some(head.clone()),
            common_ancestor: Some(ancestor.clone()),
            target_branch: Some(branch.to_string()),
            effective_target_hash: Some(head.clone()),
            expected_hash: Some(head.clone()),
            ..Default::default()
        };

        if merge.from_hash == ancestor {
            return ok(&response);
        }

        let base = self.tree(&ancestor)?;
        let source_changes = diff(&base, &self.tree(&merge.from_hash)?);
        response.details = source_changes
            .keys()
            .map(|key| KeyDetails {
                key: key.clone(),
                conflict: None,
            })
            .collect();

        if head == ancestor {
            if !merge.dry_run {
                self.move_reference(&branch, merge.from_hash.clone());
                response.was_applied = true;
                response.resultant_target_hash = Some(merge.from_hash);
            }
            return ok(&response);
        }

        let mut target_tree = self.tree(&head)?;
        let target_changes = diff(&base, &target_tree);
        let conflicts: Vec<RawConflict> = source_changes
            .iter()
            .filter(|(key, change)| {
                target_changes
                    .get(*key)
                    .map_or(false, |theirs| theirs != *change)
            })
            .map(|(key, _)| key_conflict(key))
            .collect();

        if !conflicts.is_empty() {
            if !merge.return_conflict_as_result {
                return Err(Failure::conflicts(conflicts));
            }
            response.was_successful = false;
            for detail in &mut response.details {
                detail.conflict = conflicts
                    .iter()
                    .find(|c| c.key.as_ref() == Some(&detail.key))
                    .cloned();
            }
            return ok(&response);
        }

        if merge.dry_run {
            return ok(&response);
        }

        apply_changes(&mut target_tree, &source_changes);
        let message = merge.message.unwrap_or_else(|| {
            format!(
                "Merged {} at {} into {} at {}",
                merge.from_ref_name, merge.from_hash, branch, head
            )
        });
        let hash = self.store_commit(
            vec![head, merge.from_hash],
            CommitMeta::from_message(message),
            operations_for(&source_changes),
            target_tree,
        )?;
        self.move_reference(&branch, hash.clone());
        response.was_applied = true;
        response.resultant_target_hash = Some(hash);
        ok(&response)
    }

    fn transplant(&mut self, request: &ApiRequest) -> Handled {
        let (branch, head) = self.resolve_branch(&ref_segment(request)?)?;
        let transplant: TransplantRequest = body(request)?;
        if transplant.hashes_to_transplant.is_empty() {
            return Err(Failure::bad_request("no commits to transplant"));
        }
        self.check_source(&transplant.from_ref_name, &transplant.hashes_to_transplant)?;

        let mut tree = self.tree(&head)?;
        let mut planned = Vec::with_capacity(transplant.hashes_to_transplant.len());
        let mut details = Vec::new();

        for hash in &transplant.hashes_to_transplant {
            let source = self.commit_of(hash)?;
            let parent = source
                .parents
                .first()
                .cloned()
                .unwrap_or_else(CommitHash::no_ancestor);
            let parent_tree = self.tree(&parent)?;
            let changes = diff(&parent_tree, &source.tree);

            let conflicts: Vec<RawConflict> = changes
                .iter()
                .filter(|(key, change)| {
                    let current = tree.get(*key);
                    current != parent_tree.get(*key) && current != change.as_ref()
                })
                .map(|(key, _)| key_conflict(key))
                .collect();
            if !conflicts.is_empty() {
                if !transplant.return_conflict_as_result {
                    return Err(Failure::conflicts(conflicts));
                }
                let details = conflicts
                    .into_iter()
                    .filter_map(|c| {
                        c.key.clone().map(|key| KeyDetails {
                            key,
                            conflict: Some(c),
                        })
                    })
                    .collect();
                return ok(&MergeResponse {
                    was_successful: false,
                    resultant_target_hash: Some(head.clone()),
                    target_branch: Some(branch.to_string()),
                    effective_target_hash: Some(head.clone()),
                    expected_hash: Some(head),
                    details,
                    ..Default::default()
                });
            }

            apply_changes(&mut tree, &changes);
            details.extend(changes.keys().map(|key| KeyDetails {
                key: key.clone(),
                conflict: None,
            }));
            let mut meta = CommitMeta {
                hash: None,
                commit_time: None,
                parent_commit_hashes: Vec::new(),
                ..source.meta.clone()
            };
            if let Some(message) = &transplant.message {
                meta.message = message.clone();
            }
            planned.push((meta, operations_for(&changes), tree.clone()));
        }

        let mut current = head.clone();
        if !transplant.dry_run {
            for (meta, operations, snapshot) in planned {
                current = self.store_commit(vec![current], meta, operations, snapshot)?;
            }
            self.move_reference(&branch, current.clone());
        }

        ok(&MergeResponse {
            was_applied: !transplant.dry_run,
            was_successful: true,
            resultant_target_hash: Some(current),
            target_branch: Some(branch.to_string()),
            effective_target_hash: Some(head.clone()),
            expected_hash: Some(head),
            details,
            ..Default::default()
        })
    }
}

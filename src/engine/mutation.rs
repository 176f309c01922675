//! engine::mutation
//!
//! Commits, merges and transplants.
//!
//! # Design
//!
//! Each mutation is a builder that accumulates its inputs and is submitted
//! exactly once. Every request carries the caller's expected hash for the
//! target branch; the service applies it atomically or rejects it, and the
//! builder records which of those happened in its [`MutationState`].
//!
//! ```text
//! Building --submit--> Submitted --+--> Succeeded
//!                                  +--> PreconditionFailed
//!                                  +--> Conflicted
//!                                  +--> PartiallyApplied
//!                                  +--> TransportFailed
//!                                  +--> Failed
//! ```
//!
//! Transplants are sent one commit per request so that a failure part-way
//! through can report exactly which commits landed. Dry runs are sent as a
//! single request since nothing is applied.
//!
//! # Invariants
//!
//! - A builder in any state other than `Building` refuses to submit again.
//! - `TransportFailed` means the outcome is unknown; the builder never
//!   retries on its own.
//!
//! # Example
//!
//! ```
//! use lakeref::api::MockService;
//! use lakeref::core::config::ClientConfig;
//! use lakeref::core::model::Content;
//! use lakeref::core::types::{CommitHash, ContentKey, ReferenceName};
//! use lakeref::engine::{Client, MutationState};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = ClientConfig::new("http://localhost:19120/api/v2".parse().unwrap());
//! let client = Client::with_transport(config, Arc::new(MockService::new()));
//!
//! let key = ContentKey::new(["orders"]).unwrap();
//! let mut commit = client
//!     .commit(ReferenceName::main(), CommitHash::no_ancestor())
//!     .message("add orders")
//!     .put(key.clone(), Content::iceberg_table("s3://warehouse/orders", 1));
//! let result = commit.submit().await.unwrap();
//!
//! assert_eq!(commit.state(), MutationState::Succeeded);
//! assert!(result.content_id(&key).is_some());
//! # });
//! ```

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use super::client::{record_outcome, Client};
use super::resolve::{merge_outcome, Expectation, MergeOutcome};
use crate::api::wire::{
    AddedContent, CommitRequest, CommitResponse, MergeRequest, MergeResponse, TransplantRequest,
    DETACHED,
};
use crate::api::{ApiError, ApiRequest, PartialTransplant};
use crate::core::model::{CommitMeta, Content, Operation, Reference};
use crate::core::types::{CommitHash, ContentKey, RefSpec, ReferenceName};

/// Lifecycle of a mutation builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    Building,
    Submitted,
    Succeeded,
    PreconditionFailed,
    Conflicted,
    PartiallyApplied,
    TransportFailed,
    /// Rejected for any other reason (not found, bad request, ...).
    Failed,
}

impl MutationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MutationState::Building | MutationState::Submitted)
    }
}

impl From<&ApiError> for MutationState {
    fn from(error: &ApiError) -> Self {
        match error {
            ApiError::PreconditionFailed { .. } => MutationState::PreconditionFailed,
            ApiError::Conflicted(_) => MutationState::Conflicted,
            ApiError::PartialApplication(_) => MutationState::PartiallyApplied,
            ApiError::TransportFailed(_) => MutationState::TransportFailed,
            _ => MutationState::Failed,
        }
    }
}

impl std::fmt::Display for MutationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MutationState::Building => "building",
            MutationState::Submitted => "submitted",
            MutationState::Succeeded => "succeeded",
            MutationState::PreconditionFailed => "precondition failed",
            MutationState::Conflicted => "conflicted",
            MutationState::PartiallyApplied => "partially applied",
            MutationState::TransportFailed => "transport failed",
            MutationState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

fn begin(state: &mut MutationState, operation: &str) -> Result<(), ApiError> {
    if *state != MutationState::Building {
        return Err(ApiError::InvalidState(format!(
            "{operation} was already submitted ({state})"
        )));
    }
    *state = MutationState::Submitted;
    Ok(())
}

fn settle<T>(
    state: &mut MutationState,
    operation: &'static str,
    reference: &str,
    result: Result<T, ApiError>,
) -> Result<T, ApiError> {
    *state = match &result {
        Ok(_) => MutationState::Succeeded,
        Err(e) => MutationState::from(e),
    };
    record_outcome(operation, reference, &result);
    result
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitResult {
    /// The branch at its new head
    pub reference: Reference,
    /// Content ids assigned to keys this commit created
    pub added_contents: Vec<AddedContent>,
}

impl CommitResult {
    pub fn hash(&self) -> &CommitHash {
        self.reference.hash()
    }

    /// The content id assigned to `key`, if this commit created it.
    pub fn content_id(&self, key: &ContentKey) -> Option<&str> {
        self.added_contents
            .iter()
            .find(|a| &a.key == key)
            .map(|a| a.content_id.as_str())
    }
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeResult {
    pub target: ReferenceName,
    /// Target head after the merge (unchanged for dry runs and no-ops)
    pub hash: CommitHash,
    pub common_ancestor: Option<CommitHash>,
    /// Whether the target branch moved
    pub applied: bool,
    /// Whether the target now points at the source commit itself
    pub fast_forward: bool,
    pub dry_run: bool,
}

/// Result of a transplant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransplantResult {
    pub target: ReferenceName,
    /// Target head after the last applied commit
    pub hash: CommitHash,
    /// Source commits applied, in order
    pub applied: Vec<CommitHash>,
    pub dry_run: bool,
}

/// A single atomic commit onto a branch.
#[derive(Debug)]
pub struct CommitBuilder {
    client: Client,
    branch: ReferenceName,
    expected: CommitHash,
    meta: CommitMeta,
    operations: Vec<Operation>,
    state: MutationState,
}

impl CommitBuilder {
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.meta.message = message.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.meta.authors.push(author.into());
        self
    }

    pub fn committer(mut self, committer: impl Into<String>) -> Self {
        self.meta.committer = Some(committer.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.properties.insert(key.into(), value.into());
        self
    }

    /// Replace all metadata at once.
    pub fn meta(mut self, meta: CommitMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Store `content` under `key`.
    ///
    /// Content without an id creates the key; content carrying the key's
    /// current id updates it.
    pub fn put(self, key: ContentKey, content: Content) -> Self {
        self.operation(Operation::put(key, content))
    }

    pub fn delete(self, key: ContentKey) -> Self {
        self.operation(Operation::delete(key))
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    /// Send the commit.
    ///
    /// # Errors
    ///
    /// - `BadRequest` if two operations name the same key (nothing is sent)
    /// - `PreconditionFailed` if the branch moved past the expected hash
    /// - `Conflicted` with one entry per rejected key
    /// - `InvalidState` if this builder was already submitted
    pub async fn submit(&mut self) -> Result<CommitResult, ApiError> {
        begin(&mut self.state, "commit")?;
        let result = self.send().await;
        settle(&mut self.state, "commit", self.branch.as_str(), result)
    }

    async fn send(&self) -> Result<CommitResult, ApiError> {
        let mut keys = HashSet::new();
        for op in &self.operations {
            if !keys.insert(op.key()) {
                return Err(ApiError::BadRequest(format!(
                    "key '{}' appears in more than one operation",
                    op.key()
                )));
            }
        }

        debug!(
            branch = %self.branch,
            expected = %self.expected,
            operations = self.operations.len(),
            "submitting commit"
        );
        let target = RefSpec::at(self.branch.clone(), self.expected.clone()).to_path_string();
        let request = ApiRequest::post(["trees", target.as_str(), "history", "commit"]).json(
            &CommitRequest {
                commit_meta: self.meta.clone(),
                operations: self.operations.clone(),
            },
        )?;
        let expectation = Expectation {
            reference: self.branch.as_str(),
            expected: &self.expected,
        };
        let response: CommitResponse = self.client.call(request, Some(expectation)).await?;
        Ok(CommitResult {
            reference: response.target_branch,
            added_contents: response.added_contents,
        })
    }
}

/// Merge of a source reference into a target branch.
#[derive(Debug)]
pub struct MergeBuilder {
    client: Client,
    target: ReferenceName,
    expected: CommitHash,
    source: RefSpec,
    message: Option<String>,
    dry_run: bool,
    state: MutationState,
}

impl MergeBuilder {
    /// Message for the merge commit, if one is created.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Check for conflicts without moving the target.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    /// Send the merge.
    ///
    /// A source given by bare name is resolved to its head first; the merge
    /// itself is one request.
    pub async fn submit(&mut self) -> Result<MergeResult, ApiError> {
        begin(&mut self.state, "merge")?;
        let result = self.send().await;
        settle(&mut self.state, "merge", self.target.as_str(), result)
    }

    async fn send(&self) -> Result<MergeResult, ApiError> {
        let from_hash = match self.source.hash() {
            Some(hash) => hash.clone(),
            None => self
                .client
                .pin(&self.source)
                .await?
                .hash()
                .cloned()
                .ok_or_else(|| ApiError::InvalidState("merge source has no hash".to_string()))?,
        };
        let from_ref_name = self
            .source
            .name()
            .map_or_else(|| DETACHED.to_string(), ReferenceName::to_string);

        debug!(
            target = %self.target,
            expected = %self.expected,
            from = %from_ref_name,
            from_hash = %from_hash,
            dry_run = self.dry_run,
            "submitting merge"
        );
        let target = RefSpec::at(self.target.clone(), self.expected.clone()).to_path_string();
        let request = ApiRequest::post(["trees", target.as_str(), "history", "merge"]).json(
            &MergeRequest {
                from_ref_name,
                from_hash: from_hash.clone(),
                message: self.message.clone(),
                dry_run: self.dry_run,
                return_conflict_as_result: true,
            },
        )?;
        let expectation = Expectation {
            reference: self.target.as_str(),
            expected: &self.expected,
        };
        let response: MergeResponse = self.client.call(request, Some(expectation)).await?;
        let outcome = merge_outcome(response, expectation)?;

        Ok(MergeResult {
            target: self.target.clone(),
            fast_forward: outcome.applied && outcome.hash == from_hash,
            hash: outcome.hash,
            common_ancestor: outcome.common_ancestor,
            applied: outcome.applied,
            dry_run: self.dry_run,
        })
    }
}

/// Replay of explicit commits onto a target branch.
#[derive(Debug)]
pub struct TransplantBuilder {
    client: Client,
    target: ReferenceName,
    expected: CommitHash,
    source: ReferenceName,
    commits: Vec<CommitHash>,
    message: Option<String>,
    dry_run: bool,
    state: MutationState,
}

impl TransplantBuilder {
    /// Override the message of every replayed commit.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Check every commit applies without moving the target.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    /// Send the transplant.
    ///
    /// # Errors
    ///
    /// If the first commit fails, its error is returned as is and nothing
    /// was applied. A later failure returns `PartialApplication` naming the
    /// commits that landed, the commit that failed and why.
    pub async fn submit(&mut self) -> Result<TransplantResult, ApiError> {
        begin(&mut self.state, "transplant")?;
        let result = self.send().await;
        settle(&mut self.state, "transplant", self.target.as_str(), result)
    }

    async fn send(&self) -> Result<TransplantResult, ApiError> {
        if self.commits.is_empty() {
            return Err(ApiError::BadRequest(
                "no commits to transplant".to_string(),
            ));
        }
        debug!(
            target = %self.target,
            expected = %self.expected,
            from = %self.source,
            commits = self.commits.len(),
            dry_run = self.dry_run,
            "submitting transplant"
        );

        if self.dry_run {
            let outcome = self.send_batch(&self.commits, &self.expected).await?;
            return Ok(TransplantResult {
                target: self.target.clone(),
                hash: outcome.hash,
                applied: Vec::new(),
                dry_run: true,
            });
        }

        let mut current = self.expected.clone();
        let mut applied = Vec::with_capacity(self.commits.len());
        for hash in &self.commits {
            match self.send_batch(std::slice::from_ref(hash), &current).await {
                Ok(outcome) => {
                    current = outcome.hash;
                    applied.push(hash.clone());
                }
                Err(cause) if applied.is_empty() => return Err(cause),
                Err(cause) => {
                    return Err(ApiError::PartialApplication(PartialTransplant {
                        applied,
                        failed_at: hash.clone(),
                        current_hash: current,
                        cause: Box::new(cause),
                    }));
                }
            }
        }

        Ok(TransplantResult {
            target: self.target.clone(),
            hash: current,
            applied,
            dry_run: false,
        })
    }

    async fn send_batch(
        &self,
        hashes: &[CommitHash],
        expected: &CommitHash,
    ) -> Result<MergeOutcome, ApiError> {
        let target = RefSpec::at(self.target.clone(), expected.clone()).to_path_string();
        let request = ApiRequest::post(["trees", target.as_str(), "history", "transplant"]).json(
            &TransplantRequest {
                from_ref_name: self.source.to_string(),
                hashes_to_transplant: hashes.to_vec(),
                message: self.message.clone(),
                dry_run: self.dry_run,
                return_conflict_as_result: true,
            },
        )?;
        let expectation = Expectation {
            reference: self.target.as_str(),
            expected,
        };
        let response: MergeResponse = self.client.call(request, Some(expectation)).await?;
        merge_outcome(response, expectation)
    }
}

impl Client {
    /// Start a commit onto `branch`, which must still be at `expected`.
    pub fn commit(&self, branch: ReferenceName, expected: CommitHash) -> CommitBuilder {
        CommitBuilder {
            client: self.clone(),
            branch,
            expected,
            meta: CommitMeta::default(),
            operations: Vec::new(),
            state: MutationState::Building,
        }
    }

    /// Start a merge of `source` into `target`, which must still be at
    /// `expected`.
    pub fn merge(&self, target: ReferenceName, expected: CommitHash, source: RefSpec) -> MergeBuilder {
        MergeBuilder {
            client: self.clone(),
            target,
            expected,
            source,
            message: None,
            dry_run: false,
            state: MutationState::Building,
        }
    }

    /// Start a transplant of `commits` (in order) from `source` onto
    /// `target`, which must still be at `expected`.
    pub fn transplant(
        &self,
        target: ReferenceName,
        expected: CommitHash,
        source: ReferenceName,
        commits: Vec<CommitHash>,
    ) -> TransplantBuilder {
        TransplantBuilder {
            client: self.clone(),
            target,
            expected,
            source,
            commits,
            message: None,
            dry_run: false,
            state: MutationState::Building,
        }
    }
}

//! engine::references
//!
//! Reading and managing named references.
//!
//! # Invariants
//!
//! - Reference names are unique across kinds. Asking for a name with the
//!   wrong kind reports `NotFound`, exactly as if the name did not exist.
//! - Assign and delete always carry the caller's expected hash; the service
//!   decides whether it still holds.

use async_trait::async_trait;
use tracing::debug;

use super::client::{record_outcome, Client};
use super::paging::{PagedEndpoint, Paginated};
use super::resolve::Expectation;
use crate::api::wire::{ReferenceTarget, ReferencesResponse, SingleReferenceResponse};
use crate::api::{ApiError, ApiRequest};
use crate::core::model::{Page, Reference, ReferenceKind};
use crate::core::types::{CommitHash, RefSpec, ReferenceName};

/// Pages of `GET /trees`.
#[derive(Debug, Clone)]
pub struct ReferencesEndpoint {
    client: Client,
    filter: Option<String>,
}

#[async_trait]
impl PagedEndpoint for ReferencesEndpoint {
    type Item = Reference;

    async fn fetch(&self, token: Option<&str>) -> Result<Page<Reference>, ApiError> {
        let request = ApiRequest::get(["trees"])
            .query("max-records", self.client.max_records())
            .query_opt("page-token", token)
            .query_opt("filter", self.filter.as_deref());
        let response: ReferencesResponse = self.client.call(request, None).await?;
        Ok(Page {
            items: response.references,
            token: response.token,
        })
    }
}

impl Client {
    /// Look up a reference by name, whatever its kind.
    pub async fn get_reference(&self, name: &ReferenceName) -> Result<Reference, ApiError> {
        let request = ApiRequest::get(["trees", name.as_str()]);
        let response: SingleReferenceResponse = self.call(request, None).await?;
        Ok(response.reference)
    }

    /// Look up a reference that must be of `kind`.
    pub async fn get(&self, name: &ReferenceName, kind: ReferenceKind) -> Result<Reference, ApiError> {
        let reference = self.get_reference(name).await?;
        if reference.kind() != kind {
            return Err(ApiError::NotFound(format!("{kind} '{name}' not found")));
        }
        Ok(reference)
    }

    /// Every reference, optionally narrowed by a server-side filter
    /// expression. Nothing is fetched until the cursor is driven.
    pub fn list_references(&self, filter: Option<String>) -> Paginated<ReferencesEndpoint> {
        Paginated::new(ReferencesEndpoint {
            client: self.clone(),
            filter,
        })
    }

    /// Create a branch or tag pointing where `from` points.
    ///
    /// A named `from` is resolved first so the new reference starts at its
    /// current hash.
    pub async fn create(
        &self,
        name: &ReferenceName,
        kind: ReferenceKind,
        from: &RefSpec,
    ) -> Result<Reference, ApiError> {
        let source = match from {
            RefSpec::Named(source) => ReferenceTarget::from(self.get_reference(source).await?),
            RefSpec::AtHash(source, hash) => {
                let reference = self.get_reference(source).await?;
                ReferenceTarget::from(Reference::of_kind(
                    reference.kind(),
                    source.clone(),
                    hash.clone(),
                ))
            }
            RefSpec::Detached(hash) => ReferenceTarget::Detached { hash: hash.clone() },
        };
        debug!(%name, %kind, from = %source.hash(), "creating reference");

        let request = ApiRequest::post(["trees"])
            .query("name", name.as_str())
            .query("type", kind.as_wire())
            .json(&source)?;
        let result = self
            .call::<SingleReferenceResponse>(request, None)
            .await
            .map(|r| r.reference);
        record_outcome("create", name.as_str(), &result);
        result
    }

    /// Move `name` from `expected` to `to`.
    pub async fn assign(
        &self,
        name: &ReferenceName,
        kind: ReferenceKind,
        expected: &CommitHash,
        to: &CommitHash,
    ) -> Result<Reference, ApiError> {
        debug!(%name, %kind, %expected, %to, "assigning reference");
        let target = RefSpec::at(name.clone(), expected.clone()).to_path_string();
        let request = ApiRequest::put(["trees", target.as_str()])
            .query("type", kind.as_wire())
            .json(&ReferenceTarget::Detached { hash: to.clone() })?;
        let expectation = Expectation {
            reference: name.as_str(),
            expected,
        };
        let result = self
            .call::<SingleReferenceResponse>(request, Some(expectation))
            .await
            .map(|r| r.reference);
        record_outcome("assign", name.as_str(), &result);
        result
    }

    /// Delete `name`, provided it is still at `expected`.
    pub async fn delete(
        &self,
        name: &ReferenceName,
        kind: ReferenceKind,
        expected: &CommitHash,
    ) -> Result<(), ApiError> {
        debug!(%name, %kind, %expected, "deleting reference");
        let target = RefSpec::at(name.clone(), expected.clone()).to_path_string();
        let request = ApiRequest::delete(["trees", target.as_str()]).query("type", kind.as_wire());
        let expectation = Expectation {
            reference: name.as_str(),
            expected,
        };
        let result = self
            .call::<SingleReferenceResponse>(request, Some(expectation))
            .await
            .map(|_| ());
        record_outcome("delete", name.as_str(), &result);
        result
    }

    /// Fix a read target to a single commit.
    ///
    /// A bare name is resolved to its current hash once; targets that
    /// already carry a hash are returned as they are.
    pub async fn pin(&self, spec: &RefSpec) -> Result<RefSpec, ApiError> {
        match spec {
            RefSpec::Named(name) => {
                let reference = self.get_reference(name).await?;
                Ok(spec.pinned(reference.hash().clone()))
            }
            RefSpec::AtHash(..) | RefSpec::Detached(_) => Ok(spec.clone()),
        }
    }
}

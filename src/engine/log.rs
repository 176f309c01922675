//! engine::log
//!
//! Commit history of a reference.
//!
//! Entries are returned newest first, in the order the service emits them.
//! The start of the walk is pinned before the first page is fetched, so
//! commits that land on the reference mid-traversal never appear.

use async_trait::async_trait;

use super::client::Client;
use super::paging::{PagedEndpoint, Paginated};
use crate::api::wire::{LogEntry, LogResponse};
use crate::api::{ApiError, ApiRequest};
use crate::core::model::{Commit, Page};
use crate::core::types::{CommitHash, RefSpec};

/// Options for [`Client::log`].
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Start the walk at this commit instead of the reference head.
    pub start: Option<CommitHash>,
    /// Stop after this commit (inclusive).
    pub limit: Option<CommitHash>,
    /// Server-side filter expression.
    pub filter: Option<String>,
    /// Resume a traversal from an earlier page token.
    pub token: Option<String>,
}

/// Pages of `GET /trees/{ref}/history`.
#[derive(Debug, Clone)]
pub struct LogEndpoint {
    client: Client,
    reference: RefSpec,
    limit: Option<CommitHash>,
    filter: Option<String>,
}

impl LogEndpoint {
    /// The pinned reference being walked.
    pub fn reference(&self) -> &RefSpec {
        &self.reference
    }
}

#[async_trait]
impl PagedEndpoint for LogEndpoint {
    type Item = Commit;

    async fn fetch(&self, token: Option<&str>) -> Result<Page<Commit>, ApiError> {
        let target = self.reference.to_path_string();
        let request = ApiRequest::get(["trees", target.as_str(), "history"])
            .query("max-records", self.client.max_records())
            .query("fetch", "ALL")
            .query_opt("page-token", token)
            .query_opt("limit-hash", self.limit.as_ref().map(CommitHash::as_str))
            .query_opt("filter", self.filter.as_deref());
        let response: LogResponse = self.client.call(request, None).await?;
        let items = response
            .log_entries
            .into_iter()
            .map(commit_from_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            token: response.token,
        })
    }
}

fn commit_from_entry(entry: LogEntry) -> Result<Commit, ApiError> {
    let hash = entry
        .commit_meta
        .hash
        .clone()
        .ok_or_else(|| ApiError::MalformedResponse("log entry without a hash".to_string()))?;
    let parents = if entry.commit_meta.parent_commit_hashes.is_empty() {
        entry.parent_commit_hash.into_iter().collect()
    } else {
        entry.commit_meta.parent_commit_hashes.clone()
    };
    Ok(Commit {
        hash,
        parents,
        meta: entry.commit_meta,
        operations: entry.operations.unwrap_or_default(),
    })
}

impl Client {
    /// Walk the history of `reference`, newest first.
    ///
    /// A bare name is pinned to its current head before anything is listed.
    pub async fn log(
        &self,
        reference: &RefSpec,
        options: LogOptions,
    ) -> Result<Paginated<LogEndpoint>, ApiError> {
        let pinned = match options.start {
            Some(start) => reference.pinned(start),
            None => self.pin(reference).await?,
        };
        let cursor = Paginated::new(LogEndpoint {
            client: self.clone(),
            reference: pinned,
            limit: options.limit,
            filter: options.filter,
        });
        Ok(match options.token {
            Some(token) => cursor.resume(token),
            None => cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Endpoint, MockService};
    use crate::core::config::ClientConfig;
    use crate::core::model::{Content, CommitMeta};
    use crate::core::types::{ContentKey, ReferenceName};
    use std::sync::Arc;

    fn client(service: &MockService) -> Client {
        let config = ClientConfig::new("http://localhost:19120/api/v2".parse().unwrap())
            .with_page_size(2)
            .unwrap();
        Client::with_transport(config, Arc::new(service.clone()))
    }

    fn key(s: &str) -> ContentKey {
        ContentKey::new([s]).unwrap()
    }

    async fn commit_n(client: &Client, n: usize) -> Vec<CommitHash> {
        let mut hashes = Vec::new();
        let mut head = CommitHash::no_ancestor();
        for i in 0..n {
            let result = client
                .commit(ReferenceName::main(), head.clone())
                .message(format!("commit {i}"))
                .put(key(&format!("t{i}")), Content::iceberg_table(format!("s3://t{i}"), 1))
                .submit()
                .await
                .unwrap();
            head = result.hash().clone();
            hashes.push(head.clone());
        }
        hashes
    }

    #[tokio::test]
    async fn newest_first_across_pages() {
        let service = MockService::new();
        let client = client(&service);
        let mut hashes = commit_n(&client, 5).await;
        hashes.reverse();

        let log = client
            .log(&RefSpec::named(ReferenceName::main()), LogOptions::default())
            .await
            .unwrap()
            .collect_all()
            .await
            .unwrap();
        let seen: Vec<CommitHash> = log.iter().map(|c| c.hash.clone()).collect();
        assert_eq!(seen, hashes);
        assert_eq!(log[0].message(), "commit 4");
        assert_eq!(log[0].parents, vec![hashes[1].clone()]);
        assert_eq!(log[0].operations.len(), 1);
        assert_eq!(service.requests_to(Endpoint::History).len(), 3);
    }

    #[tokio::test]
    async fn pinned_before_listing() {
        let service = MockService::new();
        let client = client(&service);
        let hashes = commit_n(&client, 3).await;

        let mut cursor = client
            .log(&RefSpec::named(ReferenceName::main()), LogOptions::default())
            .await
            .unwrap();
        let first = cursor.next_page().await.unwrap().unwrap();

        client
            .commit(ReferenceName::main(), hashes[2].clone())
            .meta(CommitMeta::from_message("late"))
            .put(key("late"), Content::iceberg_table("s3://late", 1))
            .submit()
            .await
            .unwrap();

        let mut rest = Vec::new();
        while let Some(page) = cursor.next_page().await.unwrap() {
            rest.extend(page);
        }
        assert_eq!(first.len() + rest.len(), 3);
        assert!(first.iter().chain(&rest).all(|c| c.message() != "late"));
        assert_eq!(
            cursor.endpoint().reference(),
            &RefSpec::at(ReferenceName::main(), hashes[2].clone())
        );
    }

    #[tokio::test]
    async fn limit_hash_is_inclusive() {
        let service = MockService::new();
        let client = client(&service);
        let hashes = commit_n(&client, 4).await;

        let options = LogOptions {
            limit: Some(hashes[1].clone()),
            ..Default::default()
        };
        let log = client
            .log(&RefSpec::named(ReferenceName::main()), options)
            .await
            .unwrap()
            .collect_all()
            .await
            .unwrap();
        let seen: Vec<CommitHash> = log.into_iter().map(|c| c.hash).collect();
        assert_eq!(seen, vec![hashes[3].clone(), hashes[2].clone(), hashes[1].clone()]);
    }

    #[tokio::test]
    async fn start_overrides_head() {
        let service = MockService::new();
        let client = client(&service);
        let hashes = commit_n(&client, 3).await;

        let options = LogOptions {
            start: Some(hashes[0].clone()),
            ..Default::default()
        };
        let log = client
            .log(&RefSpec::named(ReferenceName::main()), options)
            .await
            .unwrap()
            .collect_all()
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert!(service.requests_to(Endpoint::GetReference).is_empty());
    }

    #[tokio::test]
    async fn resumes_from_token() {
        let service = MockService::new();
        let client = client(&service);
        commit_n(&client, 5).await;
        let spec = RefSpec::named(ReferenceName::main());

        let mut cursor = client.log(&spec, LogOptions::default()).await.unwrap();
        cursor.next_page().await.unwrap();
        let token = cursor.token().map(str::to_string);
        let pinned = cursor.endpoint().reference().clone();

        let options = LogOptions {
            start: pinned.hash().cloned(),
            token,
            ..Default::default()
        };
        let rest = client.log(&spec, options).await.unwrap().collect_all().await.unwrap();
        assert_eq!(rest.len(), 3);
    }

    #[test]
    fn entry_without_hash_is_malformed() {
        let entry = LogEntry {
            commit_meta: CommitMeta::from_message("x"),
            parent_commit_hash: None,
            operations: None,
        };
        assert!(matches!(
            commit_from_entry(entry),
            Err(ApiError::MalformedResponse(_))
        ));
    }
}

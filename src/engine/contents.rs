//! engine::contents
//!
//! Reading content objects at a reference.
//!
//! Single-request reads go to the service as given; it resolves a bare name
//! atomically. Listings span several requests and are pinned to one hash
//! first, so every page describes the same commit.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::client::Client;
use super::paging::{PagedEndpoint, Paginated};
use crate::api::wire::{
    ContentResponse, EntriesResponse, GetMultipleContentsRequest, GetMultipleContentsResponse,
};
use crate::api::{ApiError, ApiRequest};
use crate::core::model::{Content, ContentEntry, Page};
use crate::core::types::{ContentKey, RefSpec};

/// Pages of `GET /trees/{ref}/entries`, with content included.
#[derive(Debug, Clone)]
pub struct EntriesEndpoint {
    client: Client,
    reference: RefSpec,
    prefix: Option<ContentKey>,
}

impl EntriesEndpoint {
    /// The pinned reference being listed.
    pub fn reference(&self) -> &RefSpec {
        &self.reference
    }
}

#[async_trait]
impl PagedEndpoint for EntriesEndpoint {
    type Item = ContentEntry;

    async fn fetch(&self, token: Option<&str>) -> Result<Page<ContentEntry>, ApiError> {
        let target = self.reference.to_path_string();
        let request = ApiRequest::get(["trees", target.as_str(), "entries"])
            .query("max-records", self.client.max_records())
            .query("content", "true")
            .query_opt("page-token", token)
            .query_opt("prefix-key", self.prefix.as_ref().map(ContentKey::to_path_string));
        let response: EntriesResponse = self.client.call(request, None).await?;
        Ok(Page {
            items: response.entries,
            token: response.token,
        })
    }
}

impl Client {
    /// Content stored under `key`, or `NotFound`.
    pub async fn get_content(&self, key: &ContentKey, reference: &RefSpec) -> Result<Content, ApiError> {
        let target = reference.to_path_string();
        let path = key.to_path_string();
        let request = ApiRequest::get(["trees", target.as_str(), "contents", path.as_str()]);
        let response: ContentResponse = self.call(request, None).await?;
        Ok(response.content)
    }

    /// Content for each of `keys` that exists; missing keys are left out.
    ///
    /// Duplicate keys are requested once. No request is made for an empty
    /// key set.
    pub async fn get_contents(
        &self,
        keys: &[ContentKey],
        reference: &RefSpec,
    ) -> Result<BTreeMap<ContentKey, Content>, ApiError> {
        let mut requested_keys: Vec<ContentKey> = Vec::with_capacity(keys.len());
        for key in keys {
            if !requested_keys.contains(key) {
                requested_keys.push(key.clone());
            }
        }
        if requested_keys.is_empty() {
            return Ok(BTreeMap::new());
        }

        let target = reference.to_path_string();
        let request = ApiRequest::post(["trees", target.as_str(), "contents"])
            .json(&GetMultipleContentsRequest { requested_keys })?;
        let response: GetMultipleContentsResponse = self.call(request, None).await?;
        Ok(response
            .contents
            .into_iter()
            .map(|c| (c.key, c.content))
            .collect())
    }

    /// Every key under `prefix` (or every key) with its content.
    pub async fn list_contents(
        &self,
        reference: &RefSpec,
        prefix: Option<ContentKey>,
    ) -> Result<Paginated<EntriesEndpoint>, ApiError> {
        let pinned = self.pin(reference).await?;
        Ok(Paginated::new(EntriesEndpoint {
            client: self.clone(),
            reference: pinned,
            prefix,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Endpoint, MockService};
    use crate::core::config::ClientConfig;
    use crate::core::types::{CommitHash, ReferenceName};
    use std::sync::Arc;

    fn key(path: &[&str]) -> ContentKey {
        ContentKey::new(path.iter().copied()).unwrap()
    }

    fn main() -> RefSpec {
        RefSpec::named(ReferenceName::main())
    }

    async fn seeded(page_size: u32) -> (MockService, Client, CommitHash) {
        let service = MockService::new();
        let config = ClientConfig::new("http://localhost:19120/api/v2".parse().unwrap())
            .with_page_size(page_size)
            .unwrap();
        let client = Client::with_transport(config, Arc::new(service.clone()));
        let result = client
            .commit(ReferenceName::main(), CommitHash::no_ancestor())
            .message("seed")
            .put(key(&["db"]), Content::namespace(&key(&["db"])))
            .put(key(&["db", "orders"]), Content::iceberg_table("s3://orders", 1))
            .put(key(&["db", "users"]), Content::iceberg_table("s3://users", 1))
            .put(key(&["logs.2024"]), Content::iceberg_table("s3://logs", 7))
            .submit()
            .await
            .unwrap();
        (service, client, result.hash().clone())
    }

    #[tokio::test]
    async fn get_content_by_key() {
        let (_, client, _) = seeded(100).await;
        let content = client.get_content(&key(&["db", "orders"]), &main()).await.unwrap();
        assert_eq!(content.payload["metadataLocation"], "s3://orders");
        assert!(content.id.is_some());
    }

    #[tokio::test]
    async fn dotted_element_survives_path_encoding() {
        let (service, client, _) = seeded(100).await;
        let content = client.get_content(&key(&["logs.2024"]), &main()).await.unwrap();
        assert_eq!(content.payload["snapshotId"], 7);
        let sent = service.requests_to(Endpoint::GetContent);
        assert_eq!(sent[0].segments[3], "logs\u{1d}2024");
    }

    #[tokio::test]
    async fn missing_content_is_not_found() {
        let (_, client, _) = seeded(100).await;
        let result = client.get_content(&key(&["nope"]), &main()).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn get_contents_omits_missing() {
        let (_, client, _) = seeded(100).await;
        let keys = vec![
            key(&["db", "orders"]),
            key(&["missing"]),
            key(&["db", "users"]),
            key(&["db", "orders"]),
        ];
        let found = client.get_contents(&keys, &main()).await.unwrap();
        assert_eq!(
            found.keys().cloned().collect::<Vec<_>>(),
            vec![key(&["db", "orders"]), key(&["db", "users"])]
        );
    }

    #[tokio::test]
    async fn empty_key_set_sends_nothing() {
        let (service, client, _) = seeded(100).await;
        service.clear_requests();
        let found = client.get_contents(&[], &main()).await.unwrap();
        assert!(found.is_empty());
        assert!(service.requests().is_empty());
    }

    #[tokio::test]
    async fn listing_is_pinned_and_paged() {
        let (service, client, seed) = seeded(2).await;
        let cursor = client
            .list_contents(&main(), Some(key(&["db"])))
            .await
            .unwrap();
        assert_eq!(cursor.endpoint().reference(), &RefSpec::at(ReferenceName::main(), seed));

        let entries = cursor.collect_all().await.unwrap();
        let keys: Vec<String> = entries.iter().map(|e| e.key.to_string()).collect();
        assert_eq!(keys, vec!["db", "db.orders", "db.users"]);
        assert!(entries.iter().all(|e| e.content.is_some()));
        assert_eq!(service.requests_to(Endpoint::Entries).len(), 2);
    }
}

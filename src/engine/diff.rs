//! engine::diff
//!
//! Per-key differences between two commits.
//!
//! Both sides are pinned to a hash before the first page is fetched, so a
//! traversal keeps comparing the same two snapshots even while either
//! reference moves.

use async_trait::async_trait;

use super::client::Client;
use super::paging::{PagedEndpoint, Paginated};
use crate::api::wire::DiffResponse;
use crate::api::{ApiError, ApiRequest};
use crate::core::model::{DiffEntry, Page};
use crate::core::types::RefSpec;

/// Pages of `GET /trees/{from}/diff/{to}`.
#[derive(Debug, Clone)]
pub struct DiffEndpoint {
    client: Client,
    from: RefSpec,
    to: RefSpec,
}

impl DiffEndpoint {
    /// The pinned base side.
    pub fn from(&self) -> &RefSpec {
        &self.from
    }

    /// The pinned target side.
    pub fn to(&self) -> &RefSpec {
        &self.to
    }
}

#[async_trait]
impl PagedEndpoint for DiffEndpoint {
    type Item = DiffEntry;

    async fn fetch(&self, token: Option<&str>) -> Result<Page<DiffEntry>, ApiError> {
        let from = self.from.to_path_string();
        let to = self.to.to_path_string();
        let request = ApiRequest::get(["trees", from.as_str(), "diff", to.as_str()])
            .query("max-records", self.client.max_records())
            .query_opt("page-token", token);
        let response: DiffResponse = self.client.call(request, None).await?;
        Ok(Page {
            items: response.diffs,
            token: response.token,
        })
    }
}

impl Client {
    /// Keys whose content differs between `from` and `to`.
    ///
    /// Named references on either side are pinned to their current heads
    /// first.
    pub async fn diff(
        &self,
        from: &RefSpec,
        to: &RefSpec,
    ) -> Result<Paginated<DiffEndpoint>, ApiError> {
        let from = self.pin(from).await?;
        let to = self.pin(to).await?;
        Ok(Paginated::new(DiffEndpoint {
            client: self.clone(),
            from,
            to,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Endpoint, MockService};
    use crate::core::config::ClientConfig;
    use crate::core::model::{Change, Content, ReferenceKind};
    use crate::core::types::{CommitHash, ContentKey, ReferenceName};
    use std::sync::Arc;

    fn client(service: &MockService, page_size: u32) -> Client {
        let config = ClientConfig::new("http://localhost:19120/api/v2".parse().unwrap())
            .with_page_size(page_size)
            .unwrap();
        Client::with_transport(config, Arc::new(service.clone()))
    }

    fn key(s: &str) -> ContentKey {
        ContentKey::new(["db", s]).unwrap()
    }

    #[tokio::test]
    async fn added_removed_and_modified() {
        let service = MockService::new();
        let client = client(&service, 100);
        let first = client
            .commit(ReferenceName::main(), CommitHash::no_ancestor())
            .put(key("keep"), Content::iceberg_table("s3://keep", 1))
            .put(key("drop"), Content::iceberg_table("s3://drop", 1))
            .put(key("bump"), Content::iceberg_table("s3://bump", 1))
            .submit()
            .await
            .unwrap();
        let bump_id = first.content_id(&key("bump")).unwrap().to_string();
        let second = client
            .commit(ReferenceName::main(), first.hash().clone())
            .delete(key("drop"))
            .put(key("bump"), Content::iceberg_table("s3://bump", 2).with_id(bump_id))
            .put(key("new"), Content::iceberg_table("s3://new", 1))
            .submit()
            .await
            .unwrap();

        let diffs = client
            .diff(
                &RefSpec::detached(first.hash().clone()),
                &RefSpec::detached(second.hash().clone()),
            )
            .await
            .unwrap()
            .collect_all()
            .await
            .unwrap();
        let changes: Vec<(String, Option<Change>)> = diffs
            .iter()
            .map(|d| (d.key.to_string(), d.change()))
            .collect();
        assert_eq!(
            changes,
            vec![
                ("db.bump".to_string(), Some(Change::Modified)),
                ("db.drop".to_string(), Some(Change::Removed)),
                ("db.new".to_string(), Some(Change::Added)),
            ]
        );
        assert!(service.requests_to(Endpoint::GetReference).is_empty());
    }

    #[tokio::test]
    async fn named_sides_are_pinned_and_paged() {
        let service = MockService::new();
        let client = client(&service, 1);
        let main = ReferenceName::main();
        let base = client.get_reference(&main).await.unwrap();
        let dev = ReferenceName::new("dev").unwrap();
        client
            .create(&dev, ReferenceKind::Branch, &RefSpec::named(main.clone()))
            .await
            .unwrap();
        let head = client
            .commit(main.clone(), base.hash().clone())
            .put(key("a"), Content::iceberg_table("s3://a", 1))
            .put(key("b"), Content::iceberg_table("s3://b", 1))
            .submit()
            .await
            .unwrap();

        let cursor = client
            .diff(&RefSpec::named(dev), &RefSpec::named(main.clone()))
            .await
            .unwrap();
        assert_eq!(cursor.endpoint().to(), &RefSpec::at(main, head.hash().clone()));
        assert_eq!(cursor.endpoint().from().hash(), Some(base.hash()));

        let diffs = cursor.collect_all().await.unwrap();
        assert_eq!(diffs.len(), 2);
        assert!(diffs.iter().all(|d| d.change() == Some(Change::Added)));
        assert_eq!(service.requests_to(Endpoint::Diff).len(), 2);
    }

    #[tokio::test]
    async fn identical_sides_have_no_entries() {
        let service = MockService::new();
        let client = client(&service, 100);
        let main = RefSpec::named(ReferenceName::main());
        let diffs = client.diff(&main, &main).await.unwrap().collect_all().await.unwrap();
        assert!(diffs.is_empty());
    }

    #[tokio::test]
    async fn missing_side_is_not_found() {
        let service = MockService::new();
        let client = client(&service, 100);
        let result = client
            .diff(
                &RefSpec::named(ReferenceName::main()),
                &RefSpec::named(ReferenceName::new("nope").unwrap()),
            )
            .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}

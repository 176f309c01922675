//! engine::paging
//!
//! Restartable cursors over paginated listings.
//!
//! # Design
//!
//! A [`PagedEndpoint`] knows how to fetch one page given a continuation
//! token. [`Paginated`] drives it: the token is its only resumable state, so
//! a traversal can be persisted with [`Paginated::token`] and picked up
//! later with [`Paginated::resume`].
//!
//! # Invariants
//!
//! - The cursor ends only when a page arrives without a token. Short pages,
//!   and even empty ones, continue the traversal.
//! - Page size is a hint; the cursor never counts items to decide it is done.
//! - Dropping a cursor mid-way needs no cleanup.
//!
//! # Example
//!
//! ```
//! use lakeref::api::MockService;
//! use lakeref::core::config::ClientConfig;
//! use lakeref::engine::Client;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = ClientConfig::new("http://localhost:19120/api/v2".parse().unwrap());
//! let client = Client::with_transport(config, Arc::new(MockService::new()));
//!
//! let mut refs = client.list_references(None);
//! let mut names = Vec::new();
//! while let Some(page) = refs.next_page().await.unwrap() {
//!     names.extend(page.into_iter().map(|r| r.name().to_string()));
//! }
//! assert_eq!(names, vec!["main"]);
//! # });
//! ```

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::api::ApiError;
use crate::core::model::Page;

/// A listing that can be fetched one page at a time.
#[async_trait]
pub trait PagedEndpoint: Send + Sync {
    type Item: Send;

    /// Fetch the page following `token`, or the first page when `None`.
    async fn fetch(&self, token: Option<&str>) -> Result<Page<Self::Item>, ApiError>;
}

/// A lazy, forward-only cursor over a [`PagedEndpoint`].
#[derive(Debug)]
pub struct Paginated<E> {
    endpoint: E,
    token: Option<String>,
    finished: bool,
}

impl<E: PagedEndpoint> Paginated<E> {
    /// Start at the first page.
    pub fn new(endpoint: E) -> Self {
        Self {
            endpoint,
            token: None,
            finished: false,
        }
    }

    /// Continue from a token returned by an earlier traversal.
    pub fn resume(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self.finished = false;
        self
    }

    /// The token that fetches the next page, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Whether the final page has been delivered.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Fetch the next page, or `None` once the listing is exhausted.
    ///
    /// On error the cursor keeps its position, so the same page can be
    /// requested again.
    pub async fn next_page(&mut self) -> Result<Option<Vec<E::Item>>, ApiError> {
        if self.finished {
            return Ok(None);
        }
        let page = self.endpoint.fetch(self.token.as_deref()).await?;
        self.finished = page.is_last();
        self.token = page.token;
        Ok(Some(page.items))
    }

    /// Drain every remaining page.
    pub async fn collect_all(mut self) -> Result<Vec<E::Item>, ApiError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }

    /// Flatten the remaining pages into a stream of items.
    pub fn into_stream(self) -> BoxStream<'static, Result<E::Item, ApiError>>
    where
        E: 'static,
        E::Item: 'static,
    {
        stream::try_unfold(self, |mut cursor| async move {
            let page = cursor.next_page().await?;
            Ok::<_, ApiError>(page.map(|items| {
                let items = items.into_iter().map(Ok::<E::Item, ApiError>);
                (stream::iter(items), cursor)
            }))
        })
        .try_flatten()
        .boxed()
    }
}

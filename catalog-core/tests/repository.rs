//! Repository contract checks that stop before the database.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use catalog_core::connection::{ConnectionFactory, ConnectionParameters};
use catalog_core::identity::{AccessToken, TokenProvider};
use catalog_core::repository::{CatalogRepository, ProductFilter, ProductSort};
use catalog_core::{CatalogError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Counts token requests and reports that no identity exists.
#[derive(Default)]
struct CountingNoIdentity {
    requests: AtomicUsize,
}

#[async_trait]
impl TokenProvider for CountingNoIdentity {
    async fn acquire_token(&self, _scope: &str, cancel: &CancellationToken) -> Result<AccessToken> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(CatalogError::cancelled("token"));
        }
        Err(CatalogError::credential_unavailable("no identity in test"))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

fn repository() -> (CatalogRepository, Arc<CountingNoIdentity>) {
    let tokens = Arc::new(CountingNoIdentity::default());
    let params = ConnectionParameters::new("demo.database.windows.net", "catalog").unwrap();
    let factory = ConnectionFactory::new(params, tokens.clone());
    (CatalogRepository::new(factory), tokens)
}

#[tokio::test]
async fn test_zero_take_returns_empty_without_round_trip() {
    let (repository, tokens) = repository();
    let cancel = CancellationToken::new();

    let filter = ProductFilter {
        take: 0,
        sort: ProductSort::BestSeller,
        ..ProductFilter::default()
    };
    assert!(repository.products(&filter, &cancel).await.unwrap().is_empty());
    assert!(repository.products_enriched(&filter, &cancel).await.unwrap().is_empty());
    assert!(repository.best_sellers(0, &cancel).await.unwrap().is_empty());
    assert!(repository.recent_activity(0, &cancel).await.unwrap().is_empty());

    assert_eq!(tokens.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_credential_failure_propagates_unchanged() {
    let (repository, tokens) = repository();
    let cancel = CancellationToken::new();

    let error = repository
        .products(&ProductFilter::default(), &cancel)
        .await
        .expect_err("no identity");
    assert!(matches!(error, CatalogError::CredentialUnavailable { .. }));

    let error = repository.categories(&cancel).await.expect_err("no identity");
    assert_eq!(error.user_hint(), catalog_core::CREDENTIAL_HINT);

    assert_eq!(tokens.requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancelled_request_surfaces_cancellation() {
    let (repository, _) = repository();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let error = repository
        .price_analysis(&cancel)
        .await
        .expect_err("cancelled");
    assert!(error.is_cancelled());
}

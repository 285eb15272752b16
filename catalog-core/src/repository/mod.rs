//! Read-only catalog queries over the AdventureWorksLT `SalesLT` schema.
//!
//! Every operation opens its own connection through the
//! [`ConnectionFactory`], runs one parameterized statement, maps the rows and
//! closes the connection. Nothing is pooled or cached between calls.

mod filter;
mod queries;
mod rows;

pub use filter::{DEFAULT_TAKE, ProductFilter, ProductSort};

use std::time::Instant;
use tiberius::Query;
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::connection::{ConnectionFactory, SqlClient};
use crate::models::{
    BestSeller, CategoryNode, PriceAnalysis, ProductCategory, ProductEnriched, ProductSummary,
    RecentActivity,
};
use crate::{CatalogError, Result};
use rows::{FromRow, TextValue};

/// Catalog query surface.
///
/// # Example
/// ```rust,no_run
/// use catalog_core::connection::{ConnectionFactory, ConnectionParameters};
/// use catalog_core::identity::IdentityMode;
/// use catalog_core::repository::{CatalogRepository, ProductFilter, ProductSort};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> catalog_core::Result<()> {
/// let params = ConnectionParameters::new("demo.database.windows.net", "catalog")?;
/// let factory = ConnectionFactory::for_identity(params, &IdentityMode::SystemAssigned)?;
/// let repository = CatalogRepository::new(factory);
///
/// let filter = ProductFilter {
///     sort: ProductSort::PriceDesc,
///     ..ProductFilter::default()
/// };
/// let products = repository.products(&filter, &CancellationToken::new()).await?;
/// println!("{} products", products.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    connections: ConnectionFactory,
}

impl CatalogRepository {
    /// Creates a repository over `connections`.
    pub const fn new(connections: ConnectionFactory) -> Self {
        Self { connections }
    }

    /// The factory used to open connections.
    pub const fn connections(&self) -> &ConnectionFactory {
        &self.connections
    }

    /// All categories ordered by name.
    ///
    /// # Errors
    /// Token, connection and query failures, or `Cancelled`.
    pub async fn categories(&self, cancel: &CancellationToken) -> Result<Vec<ProductCategory>> {
        self.fetch(Query::new(queries::CATEGORIES), cancel).await
    }

    /// Basic product listing.
    ///
    /// A `take` of zero returns an empty list without touching the database.
    ///
    /// # Errors
    /// Token, connection and query failures, or `Cancelled`.
    pub async fn products(
        &self,
        filter: &ProductFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProductSummary>> {
        if filter.take == 0 {
            return Ok(Vec::new());
        }
        let query = queries::bind_filter(queries::products_sql(filter.sort), filter);
        self.fetch(query, cancel).await
    }

    /// Product listing with pricing, lifecycle and sales columns.
    ///
    /// Same filter semantics as [`CatalogRepository::products`].
    ///
    /// # Errors
    /// Token, connection and query failures, or `Cancelled`.
    pub async fn products_enriched(
        &self,
        filter: &ProductFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProductEnriched>> {
        if filter.take == 0 {
            return Ok(Vec::new());
        }
        let query = queries::bind_filter(queries::products_enriched_sql(filter.sort), filter);
        self.fetch(query, cancel).await
    }

    /// Distinct non-null product colors, sorted.
    ///
    /// # Errors
    /// Token, connection and query failures, or `Cancelled`.
    pub async fn distinct_colors(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.distinct(queries::DISTINCT_COLORS, cancel).await
    }

    /// Distinct non-null product sizes, sorted.
    ///
    /// # Errors
    /// Token, connection and query failures, or `Cancelled`.
    pub async fn distinct_sizes(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.distinct(queries::DISTINCT_SIZES, cancel).await
    }

    /// Products with at least one order line, most units sold first.
    ///
    /// # Errors
    /// Token, connection and query failures, or `Cancelled`.
    pub async fn best_sellers(
        &self,
        take: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<BestSeller>> {
        if take == 0 {
            return Ok(Vec::new());
        }
        self.fetch(queries::with_top(queries::BEST_SELLERS, take), cancel)
            .await
    }

    /// Price statistics per category, highest average price first.
    ///
    /// # Errors
    /// Token, connection and query failures, or `Cancelled`.
    pub async fn price_analysis(&self, cancel: &CancellationToken) -> Result<Vec<PriceAnalysis>> {
        self.fetch(Query::new(queries::PRICE_ANALYSIS), cancel).await
    }

    /// Category tree flattened in path order.
    ///
    /// # Errors
    /// Token, connection and query failures, or `Cancelled`.
    pub async fn category_hierarchy(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<CategoryNode>> {
        self.fetch(Query::new(queries::CATEGORY_HIERARCHY), cancel)
            .await
    }

    /// Per-product sales on the most recent order dates.
    ///
    /// # Errors
    /// Token, connection and query failures, or `Cancelled`.
    pub async fn recent_activity(
        &self,
        take: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<RecentActivity>> {
        if take == 0 {
            return Ok(Vec::new());
        }
        self.fetch(queries::with_top(queries::RECENT_ACTIVITY, take), cancel)
            .await
    }

    async fn distinct(&self, sql: &'static str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let values: Vec<TextValue> = self.fetch(Query::new(sql), cancel).await?;
        Ok(values.into_iter().map(|TextValue(v)| v).collect())
    }

    /// Opens a connection, runs `query`, maps every row and closes the
    /// connection whether or not the query succeeded.
    async fn fetch<T: FromRow>(
        &self,
        query: Query<'static>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let started = Instant::now();
        let mut connection = self.connections.open(cancel).await?;

        let result = cancellable(T::OPERATION, cancel, execute::<T>(query, connection.client())).await;
        connection.close().await;

        match &result {
            Ok(rows) => tracing::debug!(
                operation = T::OPERATION,
                rows = rows.len(),
                elapsed = ?started.elapsed(),
                "Catalog query completed"
            ),
            Err(e) if e.is_cancelled() => {
                tracing::debug!(operation = T::OPERATION, "Catalog query cancelled");
            }
            Err(e) => tracing::warn!(operation = T::OPERATION, error = %e, "Catalog query failed"),
        }
        result
    }
}

async fn execute<T: FromRow>(query: Query<'static>, client: &mut SqlClient) -> Result<Vec<T>> {
    let stream = query
        .query(client)
        .await
        .map_err(|e| CatalogError::query_failed(format!("Failed to run {}", T::OPERATION), e))?;
    let rows = stream
        .into_first_result()
        .await
        .map_err(|e| CatalogError::query_failed(format!("Failed to read {} rows", T::OPERATION), e))?;

    rows.iter().map(T::from_row).collect()
}

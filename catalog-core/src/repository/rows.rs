//! Row decoding for catalog result sets.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tiberius::{FromSql, Row};

use crate::error::Message;
use crate::models::{
    BestSeller, CategoryNode, LifecycleStatus, PriceAnalysis, ProductCategory, ProductEnriched,
    ProductSummary, RecentActivity, SalesTotals,
};
use crate::{CatalogError, Result};

/// Extension trait for extracting typed values from tiberius rows with
/// consistent error context.
pub(crate) trait RowExt {
    /// Reads a nullable column.
    fn get_field<'r, T>(&'r self, column: &str, operation: &str) -> Result<Option<T>>
    where
        T: FromSql<'r>;

    /// Reads a column that must not be NULL.
    fn require_field<'r, T>(&'r self, column: &str, operation: &str) -> Result<T>
    where
        T: FromSql<'r>,
    {
        self.get_field(column, operation)?.ok_or_else(|| {
            CatalogError::parse_field(column, operation, Message("unexpected NULL".to_string()))
        })
    }

    /// Reads a non-null text column.
    fn text(&self, column: &str, operation: &str) -> Result<String> {
        self.require_field::<&str>(column, operation)
            .map(str::to_owned)
    }

    /// Reads a nullable text column.
    fn optional_text(&self, column: &str, operation: &str) -> Result<Option<String>> {
        Ok(self
            .get_field::<&str>(column, operation)?
            .map(str::to_owned))
    }
}

impl RowExt for Row {
    fn get_field<'r, T>(&'r self, column: &str, operation: &str) -> Result<Option<T>>
    where
        T: FromSql<'r>,
    {
        self.try_get(column)
            .map_err(|e| CatalogError::parse_field(column, operation, e))
    }
}

/// A record that can be decoded from one result row.
pub(crate) trait FromRow: Sized {
    /// Operation name used in error context and logs.
    const OPERATION: &'static str;

    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for ProductCategory {
    const OPERATION: &'static str = "categories";

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.require_field("ProductCategoryID", Self::OPERATION)?,
            name: row.text("Name", Self::OPERATION)?,
        })
    }
}

impl FromRow for ProductSummary {
    const OPERATION: &'static str = "products";

    fn from_row(row: &Row) -> Result<Self> {
        let op = Self::OPERATION;
        Ok(Self {
            id: row.require_field("ProductID", op)?,
            name: row.text("Name", op)?,
            color: row.optional_text("Color", op)?,
            list_price: row.require_field("ListPrice", op)?,
            category_name: row.optional_text("CategoryName", op)?,
        })
    }
}

impl FromRow for ProductEnriched {
    const OPERATION: &'static str = "products_enriched";

    fn from_row(row: &Row) -> Result<Self> {
        let op = Self::OPERATION;
        let status: &str = row.require_field("LifecycleStatus", op)?;
        let lifecycle_status = LifecycleStatus::from_label(status).ok_or_else(|| {
            CatalogError::parse_field(
                "LifecycleStatus",
                op,
                Message(format!("unknown lifecycle status '{status}'")),
            )
        })?;

        Ok(Self {
            id: row.require_field("ProductID", op)?,
            name: row.text("Name", op)?,
            color: row.optional_text("Color", op)?,
            size: row.optional_text("Size", op)?,
            list_price: row.require_field("ListPrice", op)?,
            standard_cost: row.get_field("StandardCost", op)?,
            category_name: row.optional_text("CategoryName", op)?,
            margin_percent: row.get_field("MarginPercent", op)?,
            lifecycle_status,
            days_in_catalog: row.get_field("DaysInCatalog", op)?.unwrap_or(0),
            sales: SalesTotals::from_nullable(
                row.get_field("TotalUnitsSold", op)?,
                row.get_field::<Decimal>("TotalRevenue", op)?,
            ),
            weight: row.get_field("Weight", op)?,
        })
    }
}

impl FromRow for BestSeller {
    const OPERATION: &'static str = "best_sellers";

    fn from_row(row: &Row) -> Result<Self> {
        let op = Self::OPERATION;
        let totals = SalesTotals::from_nullable(
            row.get_field("TotalUnitsSold", op)?,
            row.get_field("TotalRevenue", op)?,
        );
        Ok(Self {
            id: row.require_field("ProductID", op)?,
            name: row.text("Name", op)?,
            total_units_sold: totals.total_units_sold,
            total_revenue: totals.total_revenue,
        })
    }
}

impl FromRow for PriceAnalysis {
    const OPERATION: &'static str = "price_analysis";

    fn from_row(row: &Row) -> Result<Self> {
        let op = Self::OPERATION;
        Ok(Self {
            category: row.text("Category", op)?,
            product_count: row.require_field("ProductCount", op)?,
            avg_price: row.require_field("AvgPrice", op)?,
            min_price: row.require_field("MinPrice", op)?,
            max_price: row.require_field("MaxPrice", op)?,
            avg_margin_percent: row.get_field("AvgMarginPercent", op)?,
        })
    }
}

impl FromRow for CategoryNode {
    const OPERATION: &'static str = "category_hierarchy";

    fn from_row(row: &Row) -> Result<Self> {
        let op = Self::OPERATION;
        Ok(Self {
            id: row.require_field("ProductCategoryID", op)?,
            name: row.text("Name", op)?,
            parent_id: row.get_field("ParentProductCategoryID", op)?,
            path: row.text("CategoryPath", op)?,
            level: row.require_field("Level", op)?,
            product_count: row.require_field("ProductCount", op)?,
        })
    }
}

impl FromRow for RecentActivity {
    const OPERATION: &'static str = "recent_activity";

    fn from_row(row: &Row) -> Result<Self> {
        let op = Self::OPERATION;
        Ok(Self {
            id: row.require_field("ProductID", op)?,
            name: row.text("Name", op)?,
            order_date: row.require_field::<NaiveDateTime>("OrderDate", op)?,
            qty_sold: row.get_field("QtySold", op)?.unwrap_or(0),
            revenue: row.get_field("Revenue", op)?.unwrap_or(Decimal::ZERO),
        })
    }
}

/// Single-column text rows (distinct colors and sizes).
pub(crate) struct TextValue(pub(crate) String);

impl FromRow for TextValue {
    const OPERATION: &'static str = "distinct_values";

    fn from_row(row: &Row) -> Result<Self> {
        row.text("Value", Self::OPERATION).map(Self)
    }
}

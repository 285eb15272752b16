//! Result records returned by the catalog repository.
//!
//! Nullable columns map to `Option`; aggregated sales figures are never
//! optional and default to zero for products without order lines.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCategory {
    /// `ProductCategoryID`
    pub id: i32,
    /// Category name
    pub name: String,
}

/// One row of the basic product listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: i32,
    pub name: String,
    pub color: Option<String>,
    pub list_price: Decimal,
    pub category_name: Option<String>,
}

/// Where a product is in its sales lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleStatus {
    /// On sale
    Active,
    /// Has a sell end date but is not discontinued
    #[serde(rename = "Phase Out")]
    PhaseOut,
    /// Has a discontinued date
    Discontinued,
}

impl LifecycleStatus {
    /// Parses the label produced by the enriched listing query.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Active" => Some(Self::Active),
            "Phase Out" => Some(Self::PhaseOut),
            "Discontinued" => Some(Self::Discontinued),
            _ => None,
        }
    }

    /// Display label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::PhaseOut => "Phase Out",
            Self::Discontinued => "Discontinued",
        }
    }
}

/// Aggregated order-line totals for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesTotals {
    pub total_units_sold: i32,
    pub total_revenue: Decimal,
}

impl SalesTotals {
    /// Builds totals from possibly-null aggregates; absent sales are zero.
    pub fn from_nullable(units: Option<i32>, revenue: Option<Decimal>) -> Self {
        Self {
            total_units_sold: units.unwrap_or(0),
            total_revenue: revenue.unwrap_or(Decimal::ZERO),
        }
    }
}

/// One row of the enriched product listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductEnriched {
    pub id: i32,
    pub name: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub list_price: Decimal,
    pub standard_cost: Option<Decimal>,
    pub category_name: Option<String>,
    /// `(ListPrice - StandardCost) / ListPrice * 100`; absent when either is
    /// unknown or the price is zero
    pub margin_percent: Option<Decimal>,
    pub lifecycle_status: LifecycleStatus,
    pub days_in_catalog: i32,
    #[serde(flatten)]
    pub sales: SalesTotals,
    pub weight: Option<Decimal>,
}

/// Top-selling product by units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestSeller {
    pub id: i32,
    pub name: String,
    pub total_units_sold: i32,
    pub total_revenue: Decimal,
}

/// Price statistics for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAnalysis {
    pub category: String,
    pub product_count: i32,
    pub avg_price: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub avg_margin_percent: Option<Decimal>,
}

/// A category with its position in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: i32,
    pub name: String,
    pub parent_id: Option<i32>,
    /// Names from the root, joined with ` → `
    pub path: String,
    /// Depth, 0 for root categories
    pub level: i32,
    pub product_count: i32,
}

/// Sales of one product on one order date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub id: i32,
    pub name: String,
    pub order_date: NaiveDateTime,
    pub qty_sold: i32,
    pub revenue: Decimal,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_sales_map_to_zero() {
        let totals = SalesTotals::from_nullable(None, None);
        assert_eq!(totals.total_units_sold, 0);
        assert_eq!(totals.total_revenue, Decimal::ZERO);
    }

    #[test]
    fn test_present_sales_kept() {
        let totals = SalesTotals::from_nullable(Some(3), Some(Decimal::new(4497, 2)));
        assert_eq!(totals.total_units_sold, 3);
        assert_eq!(totals.total_revenue.to_string(), "44.97");
    }

    #[test]
    fn test_lifecycle_labels_round_trip() {
        for status in [
            LifecycleStatus::Active,
            LifecycleStatus::PhaseOut,
            LifecycleStatus::Discontinued,
        ] {
            assert_eq!(LifecycleStatus::from_label(status.label()), Some(status));
        }
        assert_eq!(LifecycleStatus::from_label("Retired"), None);
    }

    #[test]
    fn test_enriched_serializes_flat_sales_totals() {
        let product = ProductEnriched {
            id: 680,
            name: "HL Road Frame - Black, 58".to_string(),
            color: Some("Black".to_string()),
            size: Some("58".to_string()),
            list_price: Decimal::new(143_250, 2),
            standard_cost: None,
            category_name: Some("Road Frames".to_string()),
            margin_percent: None,
            lifecycle_status: LifecycleStatus::PhaseOut,
            days_in_catalog: 10,
            sales: SalesTotals::default(),
            weight: None,
        };
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["totalUnitsSold"], 0);
        assert_eq!(json["lifecycleStatus"], "Phase Out");
        assert!(json["standardCost"].is_null());
    }
}

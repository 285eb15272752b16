//! Query string parsing for the listing endpoints.
//!
//! Values arrive as raw strings so that blank inputs (an empty form field)
//! mean "no filter" instead of a rejection.

use catalog_core::{ProductFilter, ProductSort};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::error::ApiError;

/// Query string of `GET /api/products`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    /// Category id
    pub category_id: Option<String>,
    /// Name substring
    pub q: Option<String>,
    /// Inclusive lower price bound
    pub price_min: Option<String>,
    /// Inclusive upper price bound
    pub price_max: Option<String>,
    /// Exact color
    pub color: Option<String>,
    /// Exact size
    pub size: Option<String>,
    /// Sort key, see [`ProductSort`]
    pub sort_by: Option<String>,
    /// Include discontinued products
    pub show_discontinued: Option<String>,
    /// Return the enriched listing
    pub enriched: Option<String>,
}

impl ProductQuery {
    /// Builds the repository filter with the page size `take`.
    ///
    /// # Errors
    /// `BadRequest` for unparsable numbers or flags.
    pub fn to_filter(&self, take: u32) -> Result<ProductFilter, ApiError> {
        Ok(ProductFilter {
            take,
            category_id: parse_optional("categoryId", self.category_id.as_deref())?,
            search: self.q.clone(),
            price_min: parse_optional::<Decimal>("priceMin", self.price_min.as_deref())?,
            price_max: parse_optional::<Decimal>("priceMax", self.price_max.as_deref())?,
            color: self.color.clone(),
            size: self.size.clone(),
            sort: ProductSort::from_param(self.sort_by.as_deref()),
            include_discontinued: parse_flag("showDiscontinued", self.show_discontinued.as_deref())?,
        })
    }

    /// Whether the enriched listing was requested.
    ///
    /// # Errors
    /// `BadRequest` for an unparsable flag.
    pub fn is_enriched(&self) -> Result<bool, ApiError> {
        parse_flag("enriched", self.enriched.as_deref())
    }
}

/// Query string of the top-N endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct TopQuery {
    /// Requested row count
    pub take: Option<String>,
}

impl TopQuery {
    /// Requested row count, defaulting to `default` and capped at `max`.
    ///
    /// # Errors
    /// `BadRequest` for a non-numeric value.
    pub fn resolve(&self, default: u32, max: u32) -> Result<u32, ApiError> {
        Ok(parse_optional::<u32>("take", self.take.as_deref())?
            .unwrap_or(default)
            .min(max))
    }
}

fn parse_optional<T: FromStr>(name: &str, value: Option<&str>) -> Result<Option<T>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid value for {name}"))),
    }
}

fn parse_flag(name: &str, value: Option<&str>) -> Result<bool, ApiError> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("" | "false" | "0" | "off") => Ok(false),
        Some("true" | "1" | "on") => Ok(true),
        Some(_) => Err(ApiError::BadRequest(format!("Invalid value for {name}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_absent() {
        let query = ProductQuery {
            category_id: Some(String::new()),
            price_min: Some("  ".into()),
            show_discontinued: Some(String::new()),
            ..ProductQuery::default()
        };
        let filter = query.to_filter(50).unwrap();
        assert_eq!(filter.category_id, None);
        assert_eq!(filter.price_min, None);
        assert!(!filter.include_discontinued);
        assert_eq!(filter.sort, ProductSort::Name);
    }

    #[test]
    fn test_values_parsed() {
        let query = ProductQuery {
            category_id: Some("18".into()),
            q: Some("Road".into()),
            price_min: Some("100.50".into()),
            price_max: Some("2000".into()),
            sort_by: Some("price-desc".into()),
            show_discontinued: Some("true".into()),
            ..ProductQuery::default()
        };
        let filter = query.to_filter(25).unwrap();
        assert_eq!(filter.take, 25);
        assert_eq!(filter.category_id, Some(18));
        assert_eq!(filter.price_min, Some(Decimal::new(10050, 2)));
        assert_eq!(filter.sort, ProductSort::PriceDesc);
        assert!(filter.include_discontinued);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let query = ProductQuery {
            price_max: Some("cheap".into()),
            ..ProductQuery::default()
        };
        assert!(matches!(query.to_filter(50), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_top_query_is_capped() {
        let query = TopQuery {
            take: Some("500".into()),
        };
        assert_eq!(query.resolve(10, 50).unwrap(), 50);
        assert_eq!(TopQuery::default().resolve(10, 50).unwrap(), 10);
    }
}

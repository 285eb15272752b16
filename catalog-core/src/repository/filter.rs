//! Listing filters and the fixed set of sort orders.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CatalogError, Result};

/// Default page size for listings.
pub const DEFAULT_TAKE: u32 = 50;

/// Sort orders a listing can request.
///
/// Each maps to a fixed `ORDER BY` clause; request text never reaches SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProductSort {
    /// Name ascending
    #[default]
    #[serde(rename = "name")]
    Name,
    /// List price ascending
    #[serde(rename = "price-asc")]
    PriceAsc,
    /// List price descending
    #[serde(rename = "price-desc")]
    PriceDesc,
    /// Most recent sell start date first
    #[serde(rename = "newest")]
    Newest,
    /// Most units sold first
    #[serde(rename = "bestseller")]
    BestSeller,
}

impl ProductSort {
    /// Every sort order, in display order.
    pub const ALL: [Self; 5] = [
        Self::Name,
        Self::PriceAsc,
        Self::PriceDesc,
        Self::Newest,
        Self::BestSeller,
    ];

    /// Request key for this order.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::PriceAsc => "price-asc",
            Self::PriceDesc => "price-desc",
            Self::Newest => "newest",
            Self::BestSeller => "bestseller",
        }
    }

    /// The `ORDER BY` expression list for this order.
    ///
    /// Every order ends with the product name so paging is stable.
    pub const fn order_by(self) -> &'static str {
        match self {
            Self::Name => "p.Name asc",
            Self::PriceAsc => "p.ListPrice asc, p.Name asc",
            Self::PriceDesc => "p.ListPrice desc, p.Name asc",
            Self::Newest => "p.SellStartDate desc, p.Name asc",
            Self::BestSeller => "isnull(sales.TotalQty, 0) desc, p.Name asc",
        }
    }

    /// Lenient parse for request parameters: absent, blank and unknown keys
    /// fall back to [`ProductSort::Name`].
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => Self::default(),
            Some(key) => key.parse().unwrap_or_else(|_| {
                tracing::warn!(sort = key, "Unknown sort key, using name order");
                Self::default()
            }),
        }
    }
}

impl FromStr for ProductSort {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim();
        Self::ALL
            .into_iter()
            .find(|sort| sort.as_str().eq_ignore_ascii_case(key))
            .ok_or_else(|| CatalogError::configuration(format!("Unknown sort key '{key}'")))
    }
}

impl fmt::Display for ProductSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Criteria for the product listings. Every field is optional.
///
/// Blank strings behave like absent values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFilter {
    /// Maximum rows returned; zero returns nothing
    pub take: u32,
    /// Restrict to one category
    pub category_id: Option<i32>,
    /// Case-insensitive substring of the product name
    pub search: Option<String>,
    /// Inclusive lower bound on list price
    pub price_min: Option<Decimal>,
    /// Inclusive upper bound on list price
    pub price_max: Option<Decimal>,
    /// Exact color
    pub color: Option<String>,
    /// Exact size
    pub size: Option<String>,
    /// Result order
    pub sort: ProductSort,
    /// Include products with a discontinued date
    pub include_discontinued: bool,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            take: DEFAULT_TAKE,
            category_id: None,
            search: None,
            price_min: None,
            price_max: None,
            color: None,
            size: None,
            sort: ProductSort::Name,
            include_discontinued: false,
        }
    }
}

impl ProductFilter {
    /// Filter returning at most `take` rows and no other restriction.
    pub fn with_take(take: u32) -> Self {
        Self {
            take,
            ..Self::default()
        }
    }

    /// Search text, or `None` when absent or blank.
    pub fn search_term(&self) -> Option<&str> {
        non_blank(self.search.as_deref())
    }

    /// Color, or `None` when absent or blank.
    pub fn color_value(&self) -> Option<&str> {
        non_blank(self.color.as_deref())
    }

    /// Size, or `None` when absent or blank.
    pub fn size_value(&self) -> Option<&str> {
        non_blank(self.size.as_deref())
    }

    /// `take` as the SQL `top` operand.
    pub(crate) fn top(&self) -> i32 {
        i32::try_from(self.take).unwrap_or(i32::MAX)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Escapes `LIKE` wildcards so search text matches literally.
pub(crate) fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        match c {
            '%' | '_' | '[' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sort_keys_parse() {
        assert_eq!("price-asc".parse::<ProductSort>().unwrap(), ProductSort::PriceAsc);
        assert_eq!("PRICE-DESC".parse::<ProductSort>().unwrap(), ProductSort::PriceDesc);
        assert_eq!("bestseller".parse::<ProductSort>().unwrap(), ProductSort::BestSeller);
        assert!("price; drop table".parse::<ProductSort>().is_err());
    }

    #[test]
    fn test_unknown_sort_falls_back_to_name() {
        assert_eq!(ProductSort::from_param(None), ProductSort::Name);
        assert_eq!(ProductSort::from_param(Some("  ")), ProductSort::Name);
        assert_eq!(ProductSort::from_param(Some("random")), ProductSort::Name);
        assert_eq!(ProductSort::from_param(Some("newest")), ProductSort::Newest);
    }

    #[test]
    fn test_every_order_is_stable_by_name() {
        for sort in ProductSort::ALL {
            assert!(sort.order_by().ends_with("p.Name asc"), "{sort}");
        }
    }

    #[test]
    fn test_blank_filter_values_are_absent() {
        let filter = ProductFilter {
            search: Some("   ".to_string()),
            color: Some(String::new()),
            size: Some(" M ".to_string()),
            ..ProductFilter::default()
        };
        assert_eq!(filter.search_term(), None);
        assert_eq!(filter.color_value(), None);
        assert_eq!(filter.size_value(), Some("M"));
    }

    #[test]
    fn test_defaults() {
        let filter = ProductFilter::default();
        assert_eq!(filter.take, DEFAULT_TAKE);
        assert_eq!(filter.sort, ProductSort::Name);
        assert!(!filter.include_discontinued);
        assert_eq!(ProductFilter::with_take(u32::MAX).top(), i32::MAX);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off[1]"), "50[%][_]off[[]1]");
        assert_eq!(escape_like("Road-650"), "Road-650");
    }

    proptest! {
        #[test]
        fn prop_from_param_never_fails(key in ".{0,24}") {
            let sort = ProductSort::from_param(Some(&key));
            prop_assert!(ProductSort::ALL.contains(&sort));
        }

        #[test]
        fn prop_escaped_terms_have_no_bare_wildcards(term in ".{0,32}") {
            let escaped = escape_like(&term);
            let stripped = escaped.replace("[%]", "").replace("[_]", "");
            prop_assert!(!stripped.contains('%'));
            prop_assert!(!stripped.contains('_'));
        }
    }
}

//! Catalog SQL text and parameter binding.
//!
//! All statements are fixed text; caller input only ever reaches the server
//! as positional parameters (`@P1`, `@P2`, ...). Money columns are cast to
//! `decimal(19,4)` so they decode as [`rust_decimal::Decimal`].

use rust_decimal::Decimal;
use tiberius::Query;
use tiberius::numeric::Numeric;

use super::filter::{ProductFilter, ProductSort, escape_like};

pub(crate) const CATEGORIES: &str = r"
select ProductCategoryID, Name
from SalesLT.ProductCategory
order by Name;";

pub(crate) const DISTINCT_COLORS: &str = r"
select distinct Color as Value
from SalesLT.Product
where Color is not null
order by Value;";

pub(crate) const DISTINCT_SIZES: &str = r"
select distinct Size as Value
from SalesLT.Product
where Size is not null
order by Value;";

pub(crate) const BEST_SELLERS: &str = r"
select top (@P1)
    p.ProductID,
    p.Name,
    sum(sod.OrderQty) as TotalUnitsSold,
    cast(sum(sod.OrderQty * sod.UnitPrice) as decimal(19,4)) as TotalRevenue
from SalesLT.SalesOrderDetail sod
join SalesLT.Product p on p.ProductID = sod.ProductID
group by p.ProductID, p.Name
order by sum(sod.OrderQty) desc, p.Name asc;";

pub(crate) const PRICE_ANALYSIS: &str = r"
select
    c.Name as Category,
    count(*) as ProductCount,
    cast(avg(p.ListPrice) as decimal(19,4)) as AvgPrice,
    cast(min(p.ListPrice) as decimal(19,4)) as MinPrice,
    cast(max(p.ListPrice) as decimal(19,4)) as MaxPrice,
    cast(avg(case
        when p.ListPrice > 0 and p.StandardCost is not null
        then (p.ListPrice - p.StandardCost) / p.ListPrice * 100
    end) as decimal(19,4)) as AvgMarginPercent
from SalesLT.Product p
join SalesLT.ProductCategory c on c.ProductCategoryID = p.ProductCategoryID
group by c.Name
order by avg(p.ListPrice) desc, c.Name asc;";

pub(crate) const CATEGORY_HIERARCHY: &str = r"
with CategoryTree as (
    select
        c.ProductCategoryID,
        c.Name,
        c.ParentProductCategoryID,
        cast(c.Name as nvarchar(4000)) as CategoryPath,
        0 as Level
    from SalesLT.ProductCategory c
    where c.ParentProductCategoryID is null
    union all
    select
        c.ProductCategoryID,
        c.Name,
        c.ParentProductCategoryID,
        cast(t.CategoryPath + N' → ' + c.Name as nvarchar(4000)),
        t.Level + 1
    from SalesLT.ProductCategory c
    join CategoryTree t on t.ProductCategoryID = c.ParentProductCategoryID
)
select
    t.ProductCategoryID,
    t.Name,
    t.ParentProductCategoryID,
    t.CategoryPath,
    t.Level,
    (select count(*) from SalesLT.Product p
     where p.ProductCategoryID = t.ProductCategoryID) as ProductCount
from CategoryTree t
order by t.CategoryPath;";

pub(crate) const RECENT_ACTIVITY: &str = r"
select top (@P1)
    p.ProductID,
    p.Name,
    soh.OrderDate,
    sum(sod.OrderQty) as QtySold,
    cast(sum(sod.LineTotal) as decimal(19,4)) as Revenue
from SalesLT.SalesOrderDetail sod
join SalesLT.SalesOrderHeader soh on soh.SalesOrderID = sod.SalesOrderID
join SalesLT.Product p on p.ProductID = sod.ProductID
group by p.ProductID, p.Name, soh.OrderDate
order by soh.OrderDate desc, p.Name asc;";

const SALES_AGGREGATE: &str = r"
left join (
    select
        ProductID,
        sum(OrderQty) as TotalQty,
        cast(sum(OrderQty * UnitPrice) as decimal(19,4)) as TotalRevenue
    from SalesLT.SalesOrderDetail
    group by ProductID
) sales on sales.ProductID = p.ProductID";

const PRODUCT_FILTER: &str = r"
where (@P2 is null or p.ProductCategoryID = @P2)
  and (@P3 is null or p.Name like N'%' + @P3 + N'%')
  and (@P4 is null or p.ListPrice >= @P4)
  and (@P5 is null or p.ListPrice <= @P5)
  and (@P6 is null or p.Color = @P6)
  and (@P7 is null or p.Size = @P7)
  and (@P8 = 1 or p.DiscontinuedDate is null)";

const PRODUCT_COLUMNS: &str = r"
select top (@P1)
    p.ProductID,
    p.Name,
    p.Color,
    cast(p.ListPrice as decimal(19,4)) as ListPrice,
    c.Name as CategoryName
from SalesLT.Product p
left join SalesLT.ProductCategory c on c.ProductCategoryID = p.ProductCategoryID";

const ENRICHED_COLUMNS: &str = r"
select top (@P1)
    p.ProductID,
    p.Name,
    p.Color,
    p.Size,
    cast(p.ListPrice as decimal(19,4)) as ListPrice,
    cast(p.StandardCost as decimal(19,4)) as StandardCost,
    c.Name as CategoryName,
    cast(case
        when p.ListPrice > 0 and p.StandardCost is not null
        then (p.ListPrice - p.StandardCost) / p.ListPrice * 100
    end as decimal(19,4)) as MarginPercent,
    case
        when p.DiscontinuedDate is not null then 'Discontinued'
        when p.SellEndDate is not null then 'Phase Out'
        else 'Active'
    end as LifecycleStatus,
    datediff(day, p.SellStartDate, getdate()) as DaysInCatalog,
    isnull(sales.TotalQty, 0) as TotalUnitsSold,
    isnull(sales.TotalRevenue, 0) as TotalRevenue,
    cast(p.Weight as decimal(19,4)) as Weight
from SalesLT.Product p
left join SalesLT.ProductCategory c on c.ProductCategoryID = p.ProductCategoryID";

/// Statement text of the basic listing for `sort`.
pub(crate) fn products_sql(sort: ProductSort) -> String {
    format!(
        "{PRODUCT_COLUMNS}{SALES_AGGREGATE}{PRODUCT_FILTER}\norder by {};",
        sort.order_by()
    )
}

/// Statement text of the enriched listing for `sort`.
pub(crate) fn products_enriched_sql(sort: ProductSort) -> String {
    format!(
        "{ENRICHED_COLUMNS}{SALES_AGGREGATE}{PRODUCT_FILTER}\norder by {};",
        sort.order_by()
    )
}

/// Parameter values of a listing statement, in `@P1..@P8` order.
#[derive(Debug)]
pub(crate) struct FilterParams {
    top: i32,
    category_id: Option<i32>,
    search: Option<String>,
    price_min: Option<Numeric>,
    price_max: Option<Numeric>,
    color: Option<String>,
    size: Option<String>,
    include_discontinued: bool,
}

impl FilterParams {
    pub(crate) fn from_filter(filter: &ProductFilter) -> Self {
        Self {
            top: filter.top(),
            category_id: filter.category_id,
            search: filter.search_term().map(escape_like),
            price_min: filter.price_min.map(to_numeric),
            price_max: filter.price_max.map(to_numeric),
            color: filter.color_value().map(str::to_owned),
            size: filter.size_value().map(str::to_owned),
            include_discontinued: filter.include_discontinued,
        }
    }

    fn bind_to(self, query: &mut Query<'static>) {
        query.bind(self.top);
        query.bind(self.category_id);
        query.bind(self.search);
        query.bind(self.price_min);
        query.bind(self.price_max);
        query.bind(self.color);
        query.bind(self.size);
        query.bind(self.include_discontinued);
    }
}

/// `Decimal` only implements `ToSql`; owned parameters go through `Numeric`.
/// A `Decimal` scale never exceeds 28, so it always fits in `u8`.
fn to_numeric(value: Decimal) -> Numeric {
    let scale = u8::try_from(value.scale()).unwrap_or(u8::MAX);
    Numeric::new_with_scale(value.mantissa(), scale)
}

/// Binds `filter` onto a listing statement in `@P1..@P8` order.
pub(crate) fn bind_filter(sql: String, filter: &ProductFilter) -> Query<'static> {
    let mut query = Query::new(sql);
    FilterParams::from_filter(filter).bind_to(&mut query);
    query
}

/// A statement whose only parameter is its `top` row limit.
pub(crate) fn with_top(sql: &'static str, top: u32) -> Query<'static> {
    let mut query = Query::new(sql);
    query.bind(i32::try_from(top).unwrap_or(i32::MAX));
    query
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn full_filter() -> ProductFilter {
        ProductFilter {
            take: 25,
            category_id: Some(18),
            search: Some(" 100%_Road ".to_string()),
            price_min: Some(Decimal::new(10_050, 2)),
            price_max: Some(Decimal::new(2_000, 0)),
            color: Some("Black".to_string()),
            size: Some("58".to_string()),
            sort: ProductSort::PriceDesc,
            include_discontinued: true,
        }
    }

    #[test]
    fn test_filter_params_carry_every_value() {
        let params = FilterParams::from_filter(&full_filter());
        assert_eq!(params.top, 25);
        assert_eq!(params.category_id, Some(18));
        assert_eq!(params.search.as_deref(), Some("100[%][_]Road"));

        let min = params.price_min.unwrap();
        assert_eq!((min.value(), min.scale()), (10_050, 2));
        let max = params.price_max.unwrap();
        assert_eq!((max.value(), max.scale()), (2_000, 0));

        assert_eq!(params.color.as_deref(), Some("Black"));
        assert_eq!(params.size.as_deref(), Some("58"));
        assert!(params.include_discontinued);
    }

    #[test]
    fn test_blank_filter_values_bind_as_null() {
        let filter = ProductFilter {
            search: Some("   ".to_string()),
            color: Some(String::new()),
            size: Some(" ".to_string()),
            ..ProductFilter::default()
        };
        let params = FilterParams::from_filter(&filter);
        assert_eq!(params.category_id, None);
        assert_eq!(params.search, None);
        assert!(params.price_min.is_none());
        assert!(params.price_max.is_none());
        assert_eq!(params.color, None);
        assert_eq!(params.size, None);
        assert!(!params.include_discontinued);
    }

    #[test]
    fn test_bind_filter_builds_listing_queries() {
        for filter in [full_filter(), ProductFilter::default()] {
            let sql = products_sql(filter.sort);
            assert_eq!(parameter_count(&sql), 8);
            drop(bind_filter(sql, &filter));
            drop(bind_filter(products_enriched_sql(filter.sort), &filter));
        }
    }

    #[test]
    fn test_decimal_conversion_keeps_scale() {
        let numeric = to_numeric(Decimal::new(-123_456, 4));
        assert_eq!(numeric.value(), -123_456);
        assert_eq!(numeric.scale(), 4);
    }

    #[test]
    fn test_revenue_sources() {
        let gross = "sum(OrderQty * UnitPrice)";
        assert!(SALES_AGGREGATE.contains(gross));
        assert!(BEST_SELLERS.contains("sum(sod.OrderQty * sod.UnitPrice)"));
        assert!(!SALES_AGGREGATE.contains("LineTotal"));
        assert!(!BEST_SELLERS.contains("LineTotal"));
        assert!(RECENT_ACTIVITY.contains("sum(sod.LineTotal)"));
    }

    fn parameter_count(sql: &str) -> usize {
        (1..=16).filter(|n| sql.contains(&format!("@P{n}"))).count()
    }

    #[test]
    fn test_listing_orders_come_from_fixed_clauses() {
        for sort in ProductSort::ALL {
            let sql = products_sql(sort);
            assert!(sql.ends_with(&format!("order by {};", sort.order_by())));
            let sql = products_enriched_sql(sort);
            assert!(sql.ends_with(&format!("order by {};", sort.order_by())));
        }
    }

    #[test]
    fn test_both_listings_join_sales_for_bestseller_order() {
        assert!(products_sql(ProductSort::BestSeller).contains(") sales on sales.ProductID"));
        assert!(products_enriched_sql(ProductSort::BestSeller).contains(") sales on sales.ProductID"));
    }

    #[test]
    fn test_listing_parameters() {
        assert_eq!(parameter_count(&products_sql(ProductSort::Name)), 8);
        assert_eq!(parameter_count(&products_enriched_sql(ProductSort::Name)), 8);
        assert_eq!(parameter_count(BEST_SELLERS), 1);
        assert_eq!(parameter_count(RECENT_ACTIVITY), 1);
        assert_eq!(parameter_count(CATEGORIES), 0);
        assert_eq!(parameter_count(PRICE_ANALYSIS), 0);
    }

    #[test]
    fn test_lifecycle_labels_match_model() {
        use crate::models::LifecycleStatus;
        for status in [
            LifecycleStatus::Active,
            LifecycleStatus::PhaseOut,
            LifecycleStatus::Discontinued,
        ] {
            assert!(ENRICHED_COLUMNS.contains(&format!("'{}'", status.label())));
        }
    }

    #[test]
    fn test_hierarchy_path_separator() {
        assert!(CATEGORY_HIERARCHY.contains("N' → '"));
    }

    #[test]
    fn test_money_columns_are_cast_to_decimal() {
        let sql = products_enriched_sql(ProductSort::Name);
        for column in ["ListPrice", "StandardCost", "MarginPercent", "Weight"] {
            assert!(
                sql.contains(&format!("as decimal(19,4)) as {column}")),
                "{column} is not cast"
            );
        }
    }
}

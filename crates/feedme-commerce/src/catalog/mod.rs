//! Catalog module.
//!
//! Product prices and the admin price list import.

mod pricelist;

pub use pricelist::{
    parse_price, parse_price_list, ApplyReport, ParsedPriceList, PriceListIssue, PriceListService,
    PriceRow, ProductPrice,
};

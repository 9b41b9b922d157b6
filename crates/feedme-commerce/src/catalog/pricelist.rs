//! Price list import.
//!
//! Admins upload a spreadsheet export with one product per row. The header
//! row names the columns, so column order does not matter.

use crate::error::CommerceError;
use crate::ids::ProductId;
use crate::money::{Currency, Money};
use crate::tables::PRODUCTS;
use chrono::{DateTime, Utc};
use feedme_db::{Db, Filter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

const SKU_HEADERS: &[&str] = &["sku", "code", "product code"];
const NAME_HEADERS: &[&str] = &["name", "product", "item", "product name"];
const PRICE_HEADERS: &[&str] = &["price", "amount", "cost", "unit price"];
const UNIT_HEADERS: &[&str] = &["unit", "uom", "size"];

/// A product price read from the list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRow {
    /// 1-based line in the source text.
    pub line: usize,
    pub sku: String,
    pub name: String,
    pub unit: Option<String>,
    pub price: Money,
}

/// A row that could not be read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceListIssue {
    pub line: usize,
    pub reason: String,
}

/// Everything read from one upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedPriceList {
    pub delimiter: char,
    pub rows: Vec<PriceRow>,
    pub issues: Vec<PriceListIssue>,
}

struct Columns {
    sku: usize,
    name: usize,
    price: usize,
    unit: Option<usize>,
}

impl Columns {
    fn locate(headers: &[String]) -> Result<Self, CommerceError> {
        let find = |aliases: &[&str]| headers.iter().position(|h| aliases.contains(&h.as_str()));
        let require = |aliases: &[&str]| {
            find(aliases).ok_or_else(|| {
                CommerceError::Validation(format!("price list has no {} column", aliases[0]))
            })
        };
        Ok(Self {
            sku: require(SKU_HEADERS)?,
            name: require(NAME_HEADERS)?,
            price: require(PRICE_HEADERS)?,
            unit: find(UNIT_HEADERS),
        })
    }
}

fn detect_delimiter(header: &str) -> char {
    ['\t', ';', ',']
        .into_iter()
        .max_by_key(|d| header.matches(*d).count())
        .filter(|d| header.contains(*d))
        .unwrap_or(',')
}

/// Split one record, honouring double-quoted fields.
fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            c if c == delimiter && !quoted => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            c => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

/// Parse a price such as `₦1,250.50`, `NGN 800` or `2500` into minor units.
pub fn parse_price(raw: &str, currency: Currency) -> Result<Money, String> {
    let mut text = raw.trim();
    for prefix in ["₦", "NGN", "ngn", currency.symbol(), currency.code()] {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim_start();
            break;
        }
    }
    let cleaned: String = text.chars().filter(|c| *c != ',' && *c != ' ').collect();
    if cleaned.is_empty() {
        return Err("price is empty".to_string());
    }
    if cleaned.starts_with('-') {
        return Err(format!("price {} is negative", raw.trim()));
    }

    let (major, minor) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !digits(major) || !(minor.is_empty() || digits(minor)) {
        return Err(format!("price {} is not a number", raw.trim()));
    }
    if minor.len() > 2 {
        return Err(format!("price {} has more than two decimals", raw.trim()));
    }

    let overflow = || format!("price {} is too large", raw.trim());
    let major: i64 = major.parse().map_err(|_| overflow())?;
    let minor: i64 = format!("{:0<2}", minor).parse().unwrap_or(0);
    let amount = major
        .checked_mul(currency.minor_per_major())
        .and_then(|m| m.checked_add(minor))
        .ok_or_else(overflow)?;
    Ok(Money::new(amount, currency))
}

/// Read a delimited price list.
///
/// Comma, semicolon and tab delimiters are detected from the header row.
/// Blank rows are skipped; bad rows are reported as issues rather than
/// failing the whole upload. A repeated SKU keeps its first row.
pub fn parse_price_list(text: &str, currency: Currency) -> Result<ParsedPriceList, CommerceError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines
        .next()
        .ok_or_else(|| CommerceError::Validation("price list is empty".to_string()))?;
    let delimiter = detect_delimiter(header);
    let headers: Vec<String> = split_record(header, delimiter)
        .into_iter()
        .map(|h| h.to_lowercase())
        .collect();
    let columns = Columns::locate(&headers)?;

    let mut rows = Vec::new();
    let mut issues = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (line, record) in lines {
        let fields = split_record(record, delimiter);
        if fields.iter().all(|f| f.is_empty()) {
            continue;
        }
        let field = |i: usize| fields.get(i).map(String::as_str).unwrap_or("");
        let mut issue = |reason: String| issues.push(PriceListIssue { line, reason });

        let sku = field(columns.sku).to_ascii_uppercase();
        if sku.is_empty() {
            issue("missing sku".to_string());
            continue;
        }
        let name = field(columns.name);
        if name.is_empty() {
            issue(format!("missing name for {}", sku));
            continue;
        }
        let price = match parse_price(field(columns.price), currency) {
            Ok(price) => price,
            Err(reason) => {
                issue(reason);
                continue;
            }
        };
        if let Some(first) = seen.get(&sku) {
            issue(format!("duplicate sku {}, first seen on line {}", sku, first));
            continue;
        }
        seen.insert(sku.clone(), line);

        let unit = columns
            .unit
            .map(field)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        rows.push(PriceRow {
            line,
            sku,
            name: name.to_string(),
            unit,
            price,
        });
    }

    debug!(rows = rows.len(), issues = issues.len(), "price list parsed");
    Ok(ParsedPriceList {
        delimiter,
        rows,
        issues,
    })
}

/// Stored product price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductPrice {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit: Option<String>,
    pub price: Money,
    pub updated_at: DateTime<Utc>,
}

/// Counts from applying a price list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Product price storage.
#[derive(Clone)]
pub struct PriceListService {
    db: Db,
}

impl PriceListService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn by_sku(&self, sku: &str) -> Result<Option<ProductPrice>, CommerceError> {
        Ok(self
            .db
            .select_one(PRODUCTS, &Filter::all().eq("sku", sku.trim().to_ascii_uppercase()))
            .await?)
    }

    pub async fn list(&self) -> Result<Vec<ProductPrice>, CommerceError> {
        Ok(self.db.select(PRODUCTS, &Filter::all()).await?)
    }

    /// Upsert products by SKU.
    pub async fn apply(&self, rows: &[PriceRow]) -> Result<ApplyReport, CommerceError> {
        let mut report = ApplyReport::default();
        for row in rows {
            match self.by_sku(&row.sku).await? {
                Some(existing)
                    if existing.name == row.name
                        && existing.unit == row.unit
                        && existing.price == row.price =>
                {
                    report.unchanged += 1;
                }
                Some(existing) => {
                    self.db
                        .update_one(PRODUCTS, existing.id.as_str(), |p: &mut ProductPrice| {
                            p.name = row.name.clone();
                            p.unit = row.unit.clone();
                            p.price = row.price;
                            p.updated_at = Utc::now();
                            Ok::<_, CommerceError>(())
                        })
                        .await?;
                    report.updated += 1;
                }
                None => {
                    let product = ProductPrice {
                        id: ProductId::generate(),
                        sku: row.sku.clone(),
                        name: row.name.clone(),
                        unit: row.unit.clone(),
                        price: row.price,
                        updated_at: Utc::now(),
                    };
                    self.db.insert(PRODUCTS, &product).await?;
                    report.created += 1;
                }
            }
        }
        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            "price list applied"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::register_schema;

    fn ngn(minor: i64) -> Money {
        Money::new(minor, Currency::NGN)
    }

    #[test]
    fn test_parse_price_formats() {
        assert_eq!(parse_price("₦1,250.50", Currency::NGN).unwrap(), ngn(125_050));
        assert_eq!(parse_price("NGN 800", Currency::NGN).unwrap(), ngn(80_000));
        assert_eq!(parse_price("2500", Currency::NGN).unwrap(), ngn(250_000));
        assert_eq!(parse_price("12.5", Currency::NGN).unwrap(), ngn(1_250));
        assert!(parse_price("abc", Currency::NGN).is_err());
        assert!(parse_price("-5", Currency::NGN).is_err());
        assert!(parse_price("1.999", Currency::NGN).is_err());
        assert!(parse_price("", Currency::NGN).is_err());
    }

    #[test]
    fn test_comma_list_with_quotes() {
        let text = "SKU,Product,Price,Unit\n\
                    rice-50,\"Rice, long grain\",\"₦75,000\",bag\n\
                    \n\
                    beans-1,Honey beans,1200.00,\n";
        let parsed = parse_price_list(text, Currency::NGN).unwrap();
        assert_eq!(parsed.delimiter, ',');
        assert!(parsed.issues.is_empty());
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].sku, "RICE-50");
        assert_eq!(parsed.rows[0].name, "Rice, long grain");
        assert_eq!(parsed.rows[0].price, ngn(7_500_000));
        assert_eq!(parsed.rows[0].unit.as_deref(), Some("bag"));
        assert_eq!(parsed.rows[1].unit, None);
        assert_eq!(parsed.rows[1].line, 4);
    }

    #[test]
    fn test_semicolon_and_tab_detection() {
        let semi = parse_price_list("item;cost;sku\nGarri;500;G1\n", Currency::NGN).unwrap();
        assert_eq!(semi.delimiter, ';');
        assert_eq!(semi.rows[0].price, ngn(50_000));

        let tab = parse_price_list("sku\tname\tamount\nY1\tYam\t₦3,000\n", Currency::NGN).unwrap();
        assert_eq!(tab.delimiter, '\t');
        assert_eq!(tab.rows[0].name, "Yam");
    }

    #[test]
    fn test_bad_rows_become_issues() {
        let text = "sku,name,price\nA1,Apple,free\n,Nameless,100\nA2,,100\nA3,Orange,300\nA3,Orange again,350\n";
        let parsed = parse_price_list(text, Currency::NGN).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        let lines: Vec<usize> = parsed.issues.iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![2, 3, 4, 6]);
    }

    #[test]
    fn test_missing_columns_fail() {
        assert!(matches!(
            parse_price_list("sku,name\nA,B\n", Currency::NGN),
            Err(CommerceError::Validation(_))
        ));
        assert!(parse_price_list("  \n", Currency::NGN).is_err());
    }

    #[tokio::test]
    async fn test_apply_upserts_by_sku() {
        let db = Db::new();
        register_schema(&db).await.unwrap();
        let service = PriceListService::new(db);

        let first = parse_price_list("sku,name,price\nR1,Rice,100\nB1,Beans,200\n", Currency::NGN).unwrap();
        let report = service.apply(&first.rows).await.unwrap();
        assert_eq!(report.created, 2);

        let second = parse_price_list("sku,name,price\nr1,Rice,150\nB1,Beans,200\n", Currency::NGN).unwrap();
        let report = service.apply(&second.rows).await.unwrap();
        assert_eq!(report, ApplyReport { created: 0, updated: 1, unchanged: 1 });

        assert_eq!(service.by_sku("r1").await.unwrap().unwrap().price, ngn(15_000));
        assert_eq!(service.list().await.unwrap().len(), 2);
    }
}

// catalog_core/src/model.rs

//! Data structures for the catalog: the persisted `Product`, its normalized
//! `ProductView`, the raw `ProductDraft` a client submits and the
//! `ProductCreatedEvent` handed to the event channel.

use crate::error::{CatalogError, CatalogResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Digits kept after the decimal point (NUMERIC(10, 2)).
pub const PRICE_SCALE: u32 = 2;
/// Digits the rounding step needs: one past `PRICE_SCALE`.
const ROUNDING_SCALE: u32 = PRICE_SCALE + 1;
/// Integer digits NUMERIC(10, 2) can hold.
const MAX_INTEGER_DIGITS: i64 = 8;
/// Longest product name the store accepts.
pub const NAME_MAX_CHARS: usize = 255;

/// A monetary amount with exactly two fractional digits. Never a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(Decimal);

impl Price {
  /// Parses a numeric string: optional surrounding whitespace, optional sign,
  /// digits with an optional fraction and an optional exponent. Any such
  /// string is accepted as long as its rounded value fits NUMERIC(10, 2).
  pub fn parse(raw: &str) -> CatalogResult<Self> {
    let parts = NumericParts::scan(raw.trim())
      .ok_or_else(|| CatalogError::validation(format!("price '{}' is not numeric", raw)))?;

    // value = digits * 10^exponent, digits without leading zeros
    let digits: String = parts
      .integer
      .chars()
      .chain(parts.fraction.chars())
      .skip_while(|c| *c == '0')
      .collect();
    if digits.is_empty() {
      return Self::from_decimal(Decimal::ZERO);
    }
    let exponent = parts.exponent.saturating_sub(parts.fraction.len() as i64);

    if (digits.len() as i64).saturating_add(exponent) > MAX_INTEGER_DIGITS {
      return Err(CatalogError::validation(format!(
        "price '{}' exceeds the supported range",
        raw.trim()
      )));
    }

    // Half-away-from-zero rounding to PRICE_SCALE only looks at the next digit,
    // so everything past ROUNDING_SCALE can be cut off.
    let (kept, scale) = if exponent >= 0 {
      (format!("{}{}", digits, "0".repeat(exponent as usize)), 0)
    } else {
      let scale = exponent.unsigned_abs();
      let dropped = scale.saturating_sub(ROUNDING_SCALE as u64);
      let keep = (digits.len() as u64).saturating_sub(dropped) as usize;
      (digits[..keep].to_string(), scale.min(ROUNDING_SCALE as u64) as u32)
    };
    let mantissa = if kept.is_empty() {
      0
    } else {
      kept
        .parse::<i64>()
        .map_err(|e| CatalogError::validation(format!("price '{}' is out of range: {}", raw.trim(), e)))?
    };

    let value = Decimal::new(mantissa, scale);
    Self::from_decimal(if parts.negative { -value } else { value })
  }

  /// Rounds half away from zero to two digits and checks the NUMERIC(10, 2) range.
  pub fn from_decimal(value: Decimal) -> CatalogResult<Self> {
    let mut rounded = value.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
      rounded = Decimal::ZERO;
    }
    rounded.rescale(PRICE_SCALE);

    if rounded.abs() >= Decimal::from(100_000_000i64) {
      return Err(CatalogError::validation(format!(
        "price {} exceeds the supported range",
        rounded
      )));
    }
    Ok(Price(rounded))
  }

  pub fn as_decimal(&self) -> Decimal {
    self.0
  }
}

impl fmt::Display for Price {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for Price {
  type Err = CatalogError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Price::parse(s)
  }
}

impl Serialize for Price {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

struct NumericParts<'a> {
  negative: bool,
  integer: &'a str,
  fraction: &'a str,
  exponent: i64,
}

impl<'a> NumericParts<'a> {
  fn scan(s: &'a str) -> Option<Self> {
    let (negative, rest) = match s.as_bytes().first()? {
      b'-' => (true, &s[1..]),
      b'+' => (false, &s[1..]),
      _ => (false, s),
    };

    let (number, exponent) = match rest.find(['e', 'E']) {
      Some(idx) => {
        let exp = &rest[idx + 1..];
        let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
          return None;
        }
        let exp_negative = exp.starts_with('-');
        // Only overflow can fail here; saturate like the magnitude it stands for.
        let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
        (&rest[..idx], if exp_negative { -magnitude } else { magnitude })
      }
      None => (rest, 0),
    };

    let (integer, fraction) = match number.split_once('.') {
      Some((int, frac)) => (int, frac),
      None => (number, ""),
    };

    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if integer.is_empty() && fraction.is_empty() {
      return None;
    }
    if !all_digits(integer) || !all_digits(fraction) {
      return None;
    }

    Some(Self {
      negative,
      integer,
      fraction,
      exponent,
    })
  }
}

/// A product as the store persisted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
  pub id: i64,
  pub name: String,
  pub price: Price,
  pub created_at: DateTime<Utc>,
  pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
  pub fn view(&self) -> ProductView {
    ProductView::from(self)
  }
}

/// The externally visible representation, identical on the list and create paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
  pub id: i64,
  pub name: String,
  pub price: String,
  pub created_at: String,
  pub updated_at: Option<String>,
}

/// ISO-8601 with an explicit offset and second precision, e.g. `2025-01-01T10:00:00+00:00`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

impl From<&Product> for ProductView {
  fn from(product: &Product) -> Self {
    Self {
      id: product.id,
      name: product.name.clone(),
      price: product.price.to_string(),
      created_at: format_timestamp(&product.created_at),
      updated_at: product.updated_at.as_ref().map(format_timestamp),
    }
  }
}

/// Raw client input for a create. `price` is already textual: numbers are
/// rendered to their string form by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDraft {
  pub name: String,
  pub price: String,
}

impl ProductDraft {
  pub fn new(name: impl Into<String>, price: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      price: price.into(),
    }
  }

  pub fn validate(&self) -> CatalogResult<NewProduct> {
    if self.name.is_empty() {
      return Err(CatalogError::validation("name must be non-empty text"));
    }
    if self.name.chars().count() > NAME_MAX_CHARS {
      return Err(CatalogError::validation(format!(
        "name must be at most {} characters",
        NAME_MAX_CHARS
      )));
    }
    let price = Price::parse(&self.price)?;
    Ok(NewProduct {
      name: self.name.clone(),
      price,
    })
  }
}

/// Validated input handed to `ProductStore::insert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
  pub name: String,
  pub price: Price,
}

/// Snapshot published after a product was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductCreatedEvent {
  pub id: i64,
  pub name: String,
  pub price: Price,
}

impl From<&Product> for ProductCreatedEvent {
  fn from(product: &Product) -> Self {
    Self {
      id: product.id,
      name: product.name.clone(),
      price: product.price,
    }
  }
}

//! Row validation: turn a raw unit into a typed record or a [`UnitError`].

use batchwright_core::artifact::Unit;
use batchwright_core::error::UnitError;
use batchwright_core::layout;
use batchwright_core::types::JobType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLineRecord {
    pub order_ref: String,
    pub customer_email: String,
    pub sku: String,
    pub quantity: i64,
}

fn check_width(unit: &Unit, job_type: JobType) -> Result<(), UnitError> {
    let expected = layout::columns(job_type).len();
    if unit.fields.len() < expected {
        return Err(UnitError::missing_columns(expected, unit.fields.len()));
    }
    Ok(())
}

fn required<'a>(unit: &'a Unit, index: usize, column: &str) -> Result<&'a str, UnitError> {
    let value = unit.field(index);
    if value.is_empty() {
        return Err(UnitError::invalid(format!("{column} is required")));
    }
    Ok(value)
}

/// Lowercased email; must have exactly one `@` with text on both sides.
pub fn normalize_email(raw: &str) -> Result<String, UnitError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(UnitError::invalid(format!("invalid email '{raw}'")));
    }
    Ok(email)
}

/// Parse a decimal amount such as `12`, `12.5` or `12.50` into cents.
pub fn parse_price_cents(raw: &str) -> Result<i64, UnitError> {
    let invalid = || UnitError::invalid(format!("invalid price '{raw}'"));
    let (whole, frac) = match raw.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (raw, ""),
    };
    if whole.is_empty()
        || frac.len() > 2
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }
    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => frac.parse().map_err(|_| invalid())?,
    };
    whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(frac))
        .ok_or_else(invalid)
}

/// Whole number of items. `min` is the smallest accepted value.
pub fn parse_quantity(raw: &str, min: i64) -> Result<i64, UnitError> {
    match raw.parse::<i64>() {
        Ok(n) if n >= min => Ok(n),
        _ => Err(UnitError::invalid(format!("invalid quantity '{raw}'"))),
    }
}

impl CustomerRecord {
    pub fn parse(unit: &Unit) -> Result<Self, UnitError> {
        check_width(unit, JobType::Customers)?;
        Ok(Self {
            email: normalize_email(required(unit, 0, "email")?)?,
            first_name: required(unit, 1, "first_name")?.to_string(),
            last_name: required(unit, 2, "last_name")?.to_string(),
            city: unit.field(3).to_string(),
        })
    }
}

impl ProductRecord {
    pub fn parse(unit: &Unit) -> Result<Self, UnitError> {
        check_width(unit, JobType::Products)?;
        Ok(Self {
            sku: required(unit, 0, "sku")?.to_string(),
            name: required(unit, 1, "name")?.to_string(),
            price_cents: parse_price_cents(required(unit, 2, "price")?)?,
            quantity: parse_quantity(required(unit, 3, "quantity")?, 0)?,
        })
    }
}

impl OrderLineRecord {
    pub fn parse(unit: &Unit) -> Result<Self, UnitError> {
        check_width(unit, JobType::Orders)?;
        Ok(Self {
            order_ref: required(unit, 0, "order_ref")?.to_string(),
            customer_email: normalize_email(required(unit, 1, "customer_email")?)?,
            sku: required(unit, 2, "sku")?.to_string(),
            quantity: parse_quantity(required(unit, 3, "quantity")?, 1)?,
        })
    }
}

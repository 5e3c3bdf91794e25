//! Input checks shared by the finance service. Every function is pure and
//! returns a [`FinanceError::Validation`] naming the offending field.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound};
use rust_decimal::Decimal;

use crate::error::{FinanceError, FinanceResult};
use crate::money;

pub const MAX_USER_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 120;
pub const MAX_CATEGORY_NAME_LEN: usize = 50;

/// Largest accepted amount, 1,000,000,000.00, in cents. Keeps SQLite sums
/// over many rows well inside `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Trim `value` and require it to be non-empty and at most `max_len` chars.
pub fn required_text(field: &'static str, value: &str, max_len: usize) -> FinanceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FinanceError::invalid(field, format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max_len {
        return Err(FinanceError::invalid(
            field,
            format!("{field} must be at most {max_len} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Trimmed, lower-cased email with a plausible `local@domain.tld` shape.
pub fn normalize_email(value: &str) -> FinanceResult<String> {
    let email = value.trim().to_lowercase();
    let malformed = || FinanceError::invalid("email", format!("'{}' is not a valid email", value.trim()));

    if email.len() > MAX_EMAIL_LEN {
        return Err(FinanceError::invalid(
            "email",
            format!("email must be at most {MAX_EMAIL_LEN} characters"),
        ));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(malformed());
    }
    let (local, domain) = email.split_once('@').ok_or_else(malformed)?;
    if local.is_empty() || domain.contains('@') {
        return Err(malformed());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(malformed());
    }
    Ok(email)
}

/// Round to cents and require a positive result no larger than
/// [`MAX_AMOUNT_CENTS`].
pub fn positive_cents(field: &'static str, amount: Decimal) -> FinanceResult<i64> {
    let cents = money::to_cents(amount)
        .ok_or_else(|| FinanceError::invalid(field, format!("{field} is out of range")))?;
    if cents <= 0 {
        return Err(FinanceError::invalid(
            field,
            format!("{field} must be greater than zero"),
        ));
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(FinanceError::invalid(
            field,
            format!("{field} must be at most {}", money::from_cents(MAX_AMOUNT_CENTS)),
        ));
    }
    Ok(cents)
}

/// Parse an ISO-8601 timestamp. RFC 3339 values with an offset are
/// converted to UTC; a bare date means midnight. Sub-second precision is
/// dropped.
pub fn parse_timestamp(field: &'static str, value: &str) -> FinanceResult<NaiveDateTime> {
    parse_with_default_time(field, value, NaiveTime::MIN)
}

/// Like [`parse_timestamp`], but a bare date covers the whole day, for use
/// as an inclusive upper bound.
pub fn parse_range_end(field: &'static str, value: &str) -> FinanceResult<NaiveDateTime> {
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    parse_with_default_time(field, value, end_of_day)
}

fn parse_with_default_time(
    field: &'static str,
    value: &str,
    default_time: NaiveTime,
) -> FinanceResult<NaiveDateTime> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.naive_utc().trunc_subsecs(0));
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.trunc_subsecs(0));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(default_time));
    }
    Err(FinanceError::invalid(
        field,
        format!("{field} must be an ISO-8601 date or timestamp (got '{value}')"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn text_is_trimmed_and_bounded() {
        assert_eq!(required_text("name", "  Ada ", 10).unwrap(), "Ada");
        assert!(required_text("name", "   ", 10).unwrap_err().is_validation());
        let err = required_text("name", "abcdefghijk", 10).unwrap_err();
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email(" Ada@Example.COM ").unwrap(), "ada@example.com");
        for bad in ["", "ada", "@example.com", "ada@", "ada@example", "ada@@example.com", "a da@example.com", "ada@example..com"] {
            assert!(normalize_email(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn amounts_must_be_positive_after_rounding() {
        assert_eq!(positive_cents("amount", dec!(50.00)).unwrap(), 5000);
        assert_eq!(positive_cents("amount", dec!(19.999)).unwrap(), 2000);
        assert!(positive_cents("amount", dec!(0)).is_err());
        assert!(positive_cents("amount", dec!(-5)).is_err());
        assert!(positive_cents("amount", dec!(0.004)).is_err());
        assert!(positive_cents("amount", Decimal::MAX).is_err());
    }

    #[test]
    fn amounts_are_capped() {
        assert_eq!(
            positive_cents("amount", dec!(1000000000.00)).unwrap(),
            MAX_AMOUNT_CENTS
        );
        let err = positive_cents("amount", dec!(1000000000.01)).unwrap_err();
        assert_eq!(err.field(), Some("amount"));
        assert_eq!(err.to_string(), "amount must be at most 1000000000.00");
        assert!(positive_cents("amount", dec!(92233720368547758.07)).is_err());
    }

    #[test]
    fn timestamps_in_several_shapes() {
        assert_eq!(parse_timestamp("date", "2024-01-15").unwrap(), at("2024-01-15 00:00:00"));
        assert_eq!(
            parse_timestamp("date", "2024-01-15T10:20:30").unwrap(),
            at("2024-01-15 10:20:30")
        );
        assert_eq!(
            parse_timestamp("date", "2024-01-15 10:20:30.750").unwrap(),
            at("2024-01-15 10:20:30")
        );
        assert_eq!(
            parse_timestamp("date", "2024-01-15T10:20:30+02:00").unwrap(),
            at("2024-01-15 08:20:30")
        );
        assert_eq!(parse_timestamp("date", "15/01/2024").unwrap_err().field(), Some("date"));
    }

    #[test]
    fn range_end_covers_whole_day() {
        assert_eq!(
            parse_range_end("date_to", "2024-01-31").unwrap(),
            at("2024-01-31 23:59:59")
        );
        assert_eq!(
            parse_range_end("date_to", "2024-01-31T12:00:00").unwrap(),
            at("2024-01-31 12:00:00")
        );
    }
}

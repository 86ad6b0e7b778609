//! Age restriction translation.
//!
//! A trial writes `age_numerical: ">=18"`; the store holds birth dates.
//! The comparator is inverted (`>=X` on age means birth on or before
//! today − X) and fractional years are interpreted as months over a
//! decimal denominator: `.5` → 6 months, `.25` → 3 months.

use chrono::{Datelike, NaiveDate};

use crate::error::{EngineError, Result};
use oncomatch_store::FieldCond;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeOp {
    Gte,
    Lte,
    Gt,
    Lt,
}

/// Split `">=18"` into the operator and the numeric text.
pub fn parse_age_expr(expr: &str) -> Result<(AgeOp, &str)> {
    let expr = expr.trim();
    let (op, rest) = if let Some(rest) = expr.strip_prefix(">=") {
        (AgeOp::Gte, rest)
    } else if let Some(rest) = expr.strip_prefix("<=") {
        (AgeOp::Lte, rest)
    } else if let Some(rest) = expr.strip_prefix('>') {
        (AgeOp::Gt, rest)
    } else if let Some(rest) = expr.strip_prefix('<') {
        (AgeOp::Lt, rest)
    } else {
        return Err(EngineError::InvalidCriterion(format!(
            "age_numerical must start with >=, <=, > or <: {expr:?}"
        )));
    };
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(EngineError::InvalidCriterion(format!(
            "age_numerical has no value: {expr:?}"
        )));
    }
    Ok((op, rest))
}

/// Months encoded by the fractional part: floor(F·12 / 10^digits).
fn fraction_to_months(frac: &str) -> Result<u32> {
    let digits = frac.len() as u32;
    if digits == 0 || digits > 9 {
        return Err(EngineError::InvalidCriterion(format!(
            "bad fractional age: .{frac}"
        )));
    }
    let value: u64 = frac.parse().map_err(|_| {
        EngineError::InvalidCriterion(format!("bad fractional age: .{frac}"))
    })?;
    Ok(((value * 12) / 10u64.pow(digits)) as u32)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn date_clamped(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    let day = day.min(last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        EngineError::InvalidCriterion(format!("unrepresentable date {year}-{month}-{day}"))
    })
}

/// The birth date exactly `age` before `today`.
pub fn threshold_date(age: &str, today: NaiveDate) -> Result<NaiveDate> {
    if let Some((whole, frac)) = age.split_once('.') {
        let years: i32 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| {
                EngineError::InvalidCriterion(format!("bad age value: {age:?}"))
            })?
        };
        let months = fraction_to_months(frac)?;
        let today_month = today.month() as i32;
        // Subtracting the months may cross into the previous year.
        let (month, borrow) = if today_month - months as i32 <= 0 {
            (12 - (months as i32 - today_month), 1)
        } else {
            (today_month - months as i32, 0)
        };
        let month = if month == 0 { 1 } else { month as u32 };
        date_clamped(today.year() - years - borrow, month, today.day())
    } else {
        let years: i32 = age
            .parse()
            .map_err(|_| EngineError::InvalidCriterion(format!("bad age value: {age:?}")))?;
        date_clamped(today.year() - years, today.month(), today.day())
    }
}

/// Translate a full `age_numerical` expression into a birth_date
/// condition (ISO date strings compare lexicographically in the store).
pub fn birth_date_cond(expr: &str, today: NaiveDate) -> Result<FieldCond> {
    let (op, age) = parse_age_expr(expr)?;
    let bound = threshold_date(age, today)?.format("%Y-%m-%d").to_string();
    let value = serde_json::Value::String(bound);
    Ok(match op {
        AgeOp::Gte => FieldCond::Lte(value),
        AgeOp::Lte => FieldCond::Gte(value),
        AgeOp::Gt => FieldCond::Lt(value),
        AgeOp::Lt => FieldCond::Gt(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 11, 3).unwrap()
    }

    #[test]
    fn operator_inversion() {
        assert_eq!(
            birth_date_cond(">=18", today()).unwrap(),
            FieldCond::Lte(json!("1998-11-03"))
        );
        assert_eq!(
            birth_date_cond("<=18", today()).unwrap(),
            FieldCond::Gte(json!("1998-11-03"))
        );
        assert_eq!(
            birth_date_cond(">18", today()).unwrap(),
            FieldCond::Lt(json!("1998-11-03"))
        );
        assert_eq!(
            birth_date_cond("<18", today()).unwrap(),
            FieldCond::Gt(json!("1998-11-03"))
        );
    }

    #[test]
    fn fractional_ages_convert_to_months() {
        // .5 → 6 months; November − 6 = May
        assert_eq!(
            threshold_date(".5", today()).unwrap(),
            NaiveDate::from_ymd_opt(2016, 5, 3).unwrap()
        );
        // .25 → 3 months
        assert_eq!(
            threshold_date(".25", today()).unwrap(),
            NaiveDate::from_ymd_opt(2016, 8, 3).unwrap()
        );
        // 10.25 → 10 years 3 months
        assert_eq!(
            threshold_date("10.25", today()).unwrap(),
            NaiveDate::from_ymd_opt(2006, 8, 3).unwrap()
        );
    }

    #[test]
    fn month_subtraction_wraps_the_year() {
        let feb = NaiveDate::from_ymd_opt(2016, 2, 3).unwrap();
        // February − 6 months = August of the previous year
        assert_eq!(
            threshold_date(".5", feb).unwrap(),
            NaiveDate::from_ymd_opt(2015, 8, 3).unwrap()
        );
        assert_eq!(
            threshold_date("10.25", feb).unwrap(),
            NaiveDate::from_ymd_opt(2005, 11, 3).unwrap()
        );
    }

    #[test]
    fn day_clamps_to_month_length() {
        let jan31 = NaiveDate::from_ymd_opt(2017, 1, 31).unwrap();
        // January 31 − 11 months = end of February
        assert_eq!(
            threshold_date(".92", jan31).unwrap(),
            NaiveDate::from_ymd_opt(2016, 2, 29).unwrap()
        );
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(birth_date_cond("18", today()).is_err());
        assert!(birth_date_cond(">=", today()).is_err());
        assert!(birth_date_cond(">=abc", today()).is_err());
    }
}

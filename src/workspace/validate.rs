use chrono::NaiveDate;

use crate::error::{Error, Result};

/// Names must contain something other than whitespace. Returns the trimmed name.
pub(crate) fn name(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("Name must not be empty"));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn hours(field: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::validation(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(value)
}

pub(crate) fn percent(field: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(Error::validation(format!(
            "{field} must be between 0 and 100, got {value}"
        )));
    }
    Ok(value)
}

pub(crate) fn date_order(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(Error::validation(format!(
                "End date {end} is before start date {start}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_rejects_blank_and_trims() {
        assert!(name("   ").unwrap_err().is_validation());
        assert_eq!(name("  Launch ").unwrap(), "Launch");
    }

    #[test]
    fn test_hours_rejects_negative_and_nan() {
        assert!(hours("estimated_hours", -1.0).is_err());
        assert!(hours("estimated_hours", f64::NAN).is_err());
        assert_eq!(hours("estimated_hours", 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_date_order_allows_same_day() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(date_order(Some(day), Some(day)).is_ok());
        assert!(date_order(Some(day), day.pred_opt()).is_err());
        assert!(date_order(None, Some(day)).is_ok());
    }
}

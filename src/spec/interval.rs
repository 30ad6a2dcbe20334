//! Time-interval strings: "1.5s", "2us", "3m", or a bare number of microseconds.

use crate::Result;
use crate::error::CompileError;
use serde_yaml::Value;

/// Unit suffixes and their factor in microseconds, in lookup order.
const UNITS: [(&str, f64); 6] = [
    ("ms", 1_000.0),
    ("us", 1.0),
    ("m", 60_000_000.0),
    ("s", 1_000_000.0),
    ("h", 3_600_000_000.0),
    ("d", 86_400_000_000.0),
];

/// Parse an interval value into microseconds.
///
/// Numbers are taken to already be microseconds. Strings carry exactly one
/// case-insensitive unit suffix, or none at all.
pub fn parse_interval(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                Ok(f as i64)
            } else {
                Err(bad_interval(&n.to_string()))
            }
        }
        Value::String(s) => parse_interval_str(s),
        Value::Tagged(tagged) => parse_interval(&tagged.value),
        other => Err(bad_interval(&format!("{:?}", other))),
    }
}

pub fn parse_interval_str(text: &str) -> Result<i64> {
    let lowered = text.trim().to_lowercase();
    let unit = UNITS.iter().find(|(u, _)| lowered.contains(u));
    match unit {
        Some((unit, factor)) => {
            let (number, rest) = lowered.split_once(unit).unwrap_or((lowered.as_str(), ""));
            if !rest.is_empty() {
                return Err(bad_interval(text));
            }
            let number: f64 = number.trim().parse().map_err(|_| bad_interval(text))?;
            Ok((number * factor) as i64)
        }
        None => lowered.parse::<i64>().map_err(|_| bad_interval(text)),
    }
}

fn bad_interval(text: &str) -> CompileError {
    CompileError::validation(format!(
        "{} is not a valid time-interval string\n\
         Only a single unit-string is allowed. e.g. '50s40us' is not a valid entry.\n\
         Examples of acceptable format:\n\
         '1.5s' - 1.5 seconds\n\
         '1.5S' - 1.5 seconds\n\
         '2us'  - 2 microseconds\n\
         '3m'   - 3 minutes\n\
         '1h'   - 1 hour\n\
         '1d'   - 1 day",
        text
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unit_table() {
        let cases = [
            ("1.5s", 1_500_000),
            ("1.5S", 1_500_000),
            ("2us", 2),
            ("250ms", 250_000),
            ("3m", 180_000_000),
            ("1h", 3_600_000_000),
            ("1d", 86_400_000_000),
            ("1.0s", 1_000_000),
            ("500", 500),
        ];
        for (text, want) in cases {
            assert_eq!(parse_interval_str(text).unwrap(), want, "{}", text);
        }
    }

    #[test]
    fn numbers_pass_through() {
        let v: Value = serde_yaml::from_str("1000000").unwrap();
        assert_eq!(parse_interval(&v).unwrap(), 1_000_000);
        let v: Value = serde_yaml::from_str("2.9").unwrap();
        assert_eq!(parse_interval(&v).unwrap(), 2);
    }

    #[test]
    fn rejects_compound_and_junk() {
        assert!(parse_interval_str("50s40us").is_err());
        assert!(parse_interval_str("5min").is_err());
        assert!(parse_interval_str("fast").is_err());
        assert!(parse_interval_str("1.5").is_err());
        assert!(parse_interval(&Value::Bool(true)).is_err());
    }
}

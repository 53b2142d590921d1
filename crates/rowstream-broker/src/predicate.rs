//! Broker-side predicate interpretation.

use serde_json::Value;

use rowstream_proto::Record;

use crate::error::Error;

/// Comparison operator in a row predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Neq,
}

/// A parsed row predicate of the form `column=op.value`, e.g.
/// `meeting_id=eq.42`.
///
/// This is the broker's interpretation of the opaque predicate string
/// a subscription carries. Only `eq` and `neq` are supported; values
/// are compared against the row field's string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPredicate {
    column: String,
    op: Op,
    value: String,
}

impl RowPredicate {
    /// Parse a predicate string.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let (column, rest) = input
            .split_once('=')
            .ok_or_else(|| Error::InvalidPredicate(format!("missing '=' in {input:?}")))?;
        let (op, value) = rest
            .split_once('.')
            .ok_or_else(|| Error::InvalidPredicate(format!("missing operator in {input:?}")))?;

        if column.is_empty() {
            return Err(Error::InvalidPredicate(format!(
                "empty column in {input:?}"
            )));
        }

        let op = match op {
            "eq" => Op::Eq,
            "neq" => Op::Neq,
            other => {
                return Err(Error::InvalidPredicate(format!(
                    "unsupported operator {other:?}"
                )));
            }
        };

        Ok(Self {
            column: column.to_string(),
            op,
            value: value.to_string(),
        })
    }

    /// The column this predicate inspects.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Check whether a row satisfies the predicate. A missing column
    /// never equals the expected value.
    pub fn matches(&self, row: &Record) -> bool {
        let equal = match row.get(&self.column) {
            Some(Value::String(s)) => s == &self.value,
            Some(other) => other.to_string() == self.value,
            None => false,
        };
        match self.op {
            Op::Eq => equal,
            Op::Neq => !equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_parse_eq() {
        let predicate = RowPredicate::parse("meeting_id=eq.42").unwrap();
        assert_eq!(predicate.column(), "meeting_id");
        assert!(predicate.matches(&row(&[("meeting_id", serde_json::json!(42))])));
        assert!(!predicate.matches(&row(&[("meeting_id", serde_json::json!(7))])));
    }

    #[test]
    fn test_parse_neq() {
        let predicate = RowPredicate::parse("status=neq.done").unwrap();
        assert!(predicate.matches(&row(&[("status", serde_json::json!("open"))])));
        assert!(!predicate.matches(&row(&[("status", serde_json::json!("done"))])));
    }

    #[test]
    fn test_string_values_compare_unquoted() {
        let predicate = RowPredicate::parse("owner=eq.alice").unwrap();
        assert!(predicate.matches(&row(&[("owner", serde_json::json!("alice"))])));
    }

    #[test]
    fn test_missing_column() {
        let eq = RowPredicate::parse("owner=eq.alice").unwrap();
        assert!(!eq.matches(&row(&[])));

        let neq = RowPredicate::parse("owner=neq.alice").unwrap();
        assert!(neq.matches(&row(&[])));
    }

    #[test]
    fn test_parse_errors() {
        assert!(RowPredicate::parse("no-equals-sign").is_err());
        assert!(RowPredicate::parse("col=42").is_err());
        assert!(RowPredicate::parse("col=gt.42").is_err());
        assert!(RowPredicate::parse("=eq.42").is_err());
    }
}

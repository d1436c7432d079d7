//! Rule trees and their compilation into audience predicates.
//!
//! A [`Rule`] is either a leaf comparison over one customer attribute or a
//! boolean group of sub-rules. [`compile`] lowers a tree into an
//! [`AudienceFilter`], the composable predicate shape the store translates
//! (or evaluates directly, via [`eval`]). The temporal `since` operator is
//! resolved at compile time into an absolute cutoff, so compiling the same
//! tree at the same instant always yields the same predicate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use outreach_core::types::Customer;
use outreach_core::{OutreachError, OutreachResult};

/// A leaf comparison or boolean group of sub-rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    Group {
        operator: GroupOperator,
        conditions: Vec<Rule>,
    },
    Condition {
        field: CustomerField,
        operator: CompareOp,
        value: serde_json::Value,
    },
}

impl Rule {
    /// Parse a rule tree from its wire form. Malformed trees (unknown
    /// field or operator, wrong shape) are rejected as `InvalidRule`
    /// before any query runs.
    pub fn from_value(value: serde_json::Value) -> OutreachResult<Rule> {
        serde_json::from_value(value)
            .map_err(|e| OutreachError::InvalidRule(format!("malformed rule tree: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupOperator {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

/// Customer attributes rules may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomerField {
    TotalSpend,
    VisitCount,
    LastPurchase,
    CreatedAt,
}

impl CustomerField {
    fn is_temporal(&self) -> bool {
        matches!(self, CustomerField::LastPurchase | CustomerField::CreatedAt)
    }
}

/// Leaf operators in their wire spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "since")]
    Since,
}

/// Compiled audience predicate. `since` never survives compilation: it is
/// lowered to a `Lte` against an absolute instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AudienceFilter {
    All(Vec<AudienceFilter>),
    Any(Vec<AudienceFilter>),
    Cmp {
        field: CustomerField,
        op: FilterOp,
        value: FilterValue,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Number(f64),
    Timestamp(DateTime<Utc>),
}

/// Compile a rule tree into an audience predicate relative to `now`.
///
/// An empty group compiles to a vacuous-true `All([])` rather than an
/// undefined filter. Type mismatches between a leaf's value and its field
/// fail with `InvalidRule` naming the offending node.
pub fn compile(rule: &Rule, now: DateTime<Utc>) -> OutreachResult<AudienceFilter> {
    match rule {
        Rule::Group {
            operator,
            conditions,
        } => {
            if conditions.is_empty() {
                // Vacuous truth: an empty group matches everything.
                return Ok(AudienceFilter::All(Vec::new()));
            }
            let compiled = conditions
                .iter()
                .map(|c| compile(c, now))
                .collect::<OutreachResult<Vec<_>>>()?;
            Ok(match operator {
                GroupOperator::And => AudienceFilter::All(compiled),
                GroupOperator::Or => AudienceFilter::Any(compiled),
            })
        }
        Rule::Condition {
            field,
            operator,
            value,
        } => compile_condition(*field, *operator, value, now),
    }
}

fn compile_condition(
    field: CustomerField,
    operator: CompareOp,
    value: &serde_json::Value,
    now: DateTime<Utc>,
) -> OutreachResult<AudienceFilter> {
    if operator == CompareOp::Since {
        if !field.is_temporal() {
            return Err(OutreachError::InvalidRule(format!(
                "`since` requires a timestamp field, got {field:?}"
            )));
        }
        let window = parse_duration(value).ok_or_else(|| {
            OutreachError::InvalidRule(format!(
                "`since` value for {field:?} must be a day count or a duration string, got {value}"
            ))
        })?;
        return Ok(AudienceFilter::Cmp {
            field,
            op: FilterOp::Lte,
            value: FilterValue::Timestamp(now - window),
        });
    }

    let op = match operator {
        CompareOp::Gt => FilterOp::Gt,
        CompareOp::Gte => FilterOp::Gte,
        CompareOp::Lt => FilterOp::Lt,
        CompareOp::Lte => FilterOp::Lte,
        CompareOp::Eq => FilterOp::Eq,
        CompareOp::Ne => FilterOp::Ne,
        CompareOp::Since => unreachable!("handled above"),
    };

    let value = if field.is_temporal() {
        let raw = value.as_str().ok_or_else(|| {
            OutreachError::InvalidRule(format!(
                "comparison against {field:?} requires an RFC 3339 timestamp, got {value}"
            ))
        })?;
        let ts = DateTime::parse_from_rfc3339(raw).map_err(|e| {
            OutreachError::InvalidRule(format!("bad timestamp {raw:?} for {field:?}: {e}"))
        })?;
        FilterValue::Timestamp(ts.with_timezone(&Utc))
    } else {
        let num = value.as_f64().ok_or_else(|| {
            OutreachError::InvalidRule(format!(
                "comparison against {field:?} requires a number, got {value}"
            ))
        })?;
        FilterValue::Number(num)
    };

    Ok(AudienceFilter::Cmp { field, op, value })
}

/// Parse a `since` window: a bare number is a day count, a string takes an
/// `h`/`d`/`w`/`m` suffix (`"180d"`, `"6m"`). Months are 30 days.
fn parse_duration(value: &serde_json::Value) -> Option<Duration> {
    if let Some(days) = value.as_i64() {
        return (days >= 0).then(|| Duration::days(days));
    }
    let raw = value.as_str()?.trim();
    let mut chars = raw.chars();
    let unit = chars.next_back()?;
    let n: i64 = chars.as_str().parse().ok()?;
    if n < 0 {
        return None;
    }
    match unit {
        'h' => Some(Duration::hours(n)),
        'd' => Some(Duration::days(n)),
        'w' => Some(Duration::weeks(n)),
        'm' => Some(Duration::days(n * 30)),
        _ => None,
    }
}

/// Reference evaluation of a compiled filter against one customer.
///
/// This is what the in-memory store runs; a SQL- or document-backed store
/// would translate the same filter shape instead. Missing optional fields
/// never satisfy a comparison.
pub fn eval(filter: &AudienceFilter, customer: &Customer) -> bool {
    match filter {
        AudienceFilter::All(children) => children.iter().all(|f| eval(f, customer)),
        AudienceFilter::Any(children) => children.iter().any(|f| eval(f, customer)),
        AudienceFilter::Cmp { field, op, value } => match (field_value(*field, customer), value) {
            (Some(FieldValue::Number(actual)), FilterValue::Number(expected)) => {
                numeric_cmp(actual, *op, *expected)
            }
            (Some(FieldValue::Timestamp(actual)), FilterValue::Timestamp(expected)) => {
                temporal_cmp(actual, *op, *expected)
            }
            _ => false,
        },
    }
}

enum FieldValue {
    Number(f64),
    Timestamp(DateTime<Utc>),
}

fn field_value(field: CustomerField, customer: &Customer) -> Option<FieldValue> {
    match field {
        CustomerField::TotalSpend => Some(FieldValue::Number(customer.total_spend)),
        CustomerField::VisitCount => Some(FieldValue::Number(customer.visit_count as f64)),
        CustomerField::LastPurchase => customer.last_purchase.map(FieldValue::Timestamp),
        CustomerField::CreatedAt => Some(FieldValue::Timestamp(customer.created_at)),
    }
}

fn numeric_cmp(actual: f64, op: FilterOp, expected: f64) -> bool {
    match op {
        FilterOp::Gt => actual > expected,
        FilterOp::Gte => actual >= expected,
        FilterOp::Lt => actual < expected,
        FilterOp::Lte => actual <= expected,
        FilterOp::Eq => actual == expected,
        FilterOp::Ne => actual != expected,
    }
}

fn temporal_cmp(actual: DateTime<Utc>, op: FilterOp, expected: DateTime<Utc>) -> bool {
    match op {
        FilterOp::Gt => actual > expected,
        FilterOp::Gte => actual >= expected,
        FilterOp::Lt => actual < expected,
        FilterOp::Lte => actual <= expected,
        FilterOp::Eq => actual == expected,
        FilterOp::Ne => actual != expected,
    }
}

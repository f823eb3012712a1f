//! Group-and-aggregate reduction.

use crate::record::Record;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Reduction applied to each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReduceFunction {
    /// Sum of values.
    Sum,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Mean, truncated toward zero.
    Average,
}

/// What to aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    /// Reduction.
    pub function: ReduceFunction,
    /// Field to group by; `None` makes one implicit group.
    pub group_field: Option<String>,
    /// Integer field being reduced.
    pub value_field: String,
}

impl AggregateSpec {
    /// Creates an ungrouped aggregation.
    pub fn new(function: ReduceFunction, value_field: impl Into<String>) -> Self {
        Self {
            function,
            group_field: None,
            value_field: value_field.into(),
        }
    }

    /// `SUM(value_field)`
    pub fn sum(value_field: impl Into<String>) -> Self {
        Self::new(ReduceFunction::Sum, value_field)
    }

    /// `MIN(value_field)`
    pub fn min(value_field: impl Into<String>) -> Self {
        Self::new(ReduceFunction::Min, value_field)
    }

    /// `MAX(value_field)`
    pub fn max(value_field: impl Into<String>) -> Self {
        Self::new(ReduceFunction::Max, value_field)
    }

    /// `AVG(value_field)`
    pub fn average(value_field: impl Into<String>) -> Self {
        Self::new(ReduceFunction::Average, value_field)
    }

    /// Groups by a field.
    #[must_use]
    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.group_field = Some(field.into());
        self
    }
}

/// One group's reduced value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Group key; `None` when ungrouped.
    pub group_key: Option<Value>,
    /// Reduced value.
    pub value: i64,
}

#[derive(Default)]
struct Accumulator {
    sum: i128,
    count: i128,
    min: Option<i64>,
    max: Option<i64>,
}

impl Accumulator {
    fn push(&mut self, value: i64) {
        self.sum += i128::from(value);
        self.count += 1;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn finish(&self, function: ReduceFunction) -> i64 {
        let wide = match function {
            ReduceFunction::Sum => self.sum,
            ReduceFunction::Min => self.min.map_or(0, i128::from),
            ReduceFunction::Max => self.max.map_or(0, i128::from),
            ReduceFunction::Average if self.count == 0 => 0,
            ReduceFunction::Average => self.sum / self.count,
        };
        clamp(wide)
    }
}

fn clamp(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

/// Reduces `records` per `spec`.
///
/// Records whose value field is missing or not an integer still form
/// their group but contribute nothing to it. A missing group field groups
/// under `null`. Groups come back ordered by key; no records yields no
/// groups.
///
/// ```rust
/// use ebb_core::{aggregate, AggregateSpec, Record, Value};
///
/// let records = vec![
///     Record::with_id("1").field("team", "a").field("score", 3),
///     Record::with_id("2").field("team", "a").field("score", 4),
///     Record::with_id("3").field("team", "b").field("score", 10),
/// ];
/// let results = aggregate(&records, &AggregateSpec::average("score").group_by("team"));
/// assert_eq!(results[0].group_key, Some(Value::from("a")));
/// assert_eq!(results[0].value, 3);
/// ```
pub fn aggregate(records: &[Record], spec: &AggregateSpec) -> Vec<AggregateResult> {
    let mut groups: BTreeMap<Option<Value>, Accumulator> = BTreeMap::new();

    for record in records {
        let key = spec.group_field.as_ref().map(|field| {
            record
                .resolve(field)
                .map_or(Value::Null, Cow::into_owned)
        });
        let accumulator = groups.entry(key).or_default();
        if let Some(value) = record
            .resolve(&spec.value_field)
            .and_then(|v| v.as_integer())
        {
            accumulator.push(value);
        }
    }

    groups
        .into_iter()
        .map(|(group_key, acc)| AggregateResult {
            group_key,
            value: acc.finish(spec.function),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores() -> Vec<Record> {
        vec![
            Record::with_id("1").field("team", "red").field("score", 10),
            Record::with_id("2").field("team", "blue").field("score", 3),
            Record::with_id("3").field("team", "red").field("score", 5),
            Record::with_id("4").field("team", "blue").field("score", 4),
            Record::with_id("5").field("score", 7),
            Record::with_id("6").field("team", "red").field("score", "n/a"),
        ]
    }

    #[test]
    fn ungrouped_reductions() {
        let records = scores();
        let run = |spec: AggregateSpec| aggregate(&records, &spec);

        assert_eq!(run(AggregateSpec::sum("score"))[0].value, 29);
        assert_eq!(run(AggregateSpec::min("score"))[0].value, 3);
        assert_eq!(run(AggregateSpec::max("score"))[0].value, 10);
        assert_eq!(run(AggregateSpec::average("score"))[0].value, 5);
        assert_eq!(run(AggregateSpec::sum("score"))[0].group_key, None);
    }

    #[test]
    fn grouped_by_field() {
        let results = aggregate(&scores(), &AggregateSpec::average("score").group_by("team"));

        assert_eq!(
            results,
            vec![
                AggregateResult {
                    group_key: Some(Value::Null),
                    value: 7
                },
                AggregateResult {
                    group_key: Some(Value::from("blue")),
                    value: 3
                },
                AggregateResult {
                    group_key: Some(Value::from("red")),
                    value: 7
                },
            ]
        );
    }

    #[test]
    fn float_values_are_skipped() {
        let records = vec![
            Record::with_id("1").field("v", 2),
            Record::with_id("2").field("v", 40.5),
        ];
        assert_eq!(aggregate(&records, &AggregateSpec::max("v"))[0].value, 2);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(aggregate(&[], &AggregateSpec::sum("score")).is_empty());
    }

    #[test]
    fn average_truncates_toward_zero() {
        let records = vec![
            Record::with_id("1").field("v", -3),
            Record::with_id("2").field("v", -4),
        ];
        assert_eq!(aggregate(&records, &AggregateSpec::average("v"))[0].value, -3);
    }

    #[test]
    fn sum_saturates() {
        let records = vec![
            Record::with_id("1").field("v", i64::MAX),
            Record::with_id("2").field("v", 1i64),
        ];
        assert_eq!(aggregate(&records, &AggregateSpec::sum("v"))[0].value, i64::MAX);
    }
}

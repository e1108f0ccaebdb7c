use crate::error::{PipelineError, Result};
use crate::stage::Stage;
use serde::Serialize;
use std::collections::HashMap;

/// Number of ratings one item received
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CountPair {
    pub item_id: String,
    pub count: u64,
}

impl CountPair {
    pub fn new(item_id: impl Into<String>, count: u64) -> Self {
        Self {
            item_id: item_id.into(),
            count,
        }
    }
}

fn checked_total<'a>(item_id: &str, values: impl IntoIterator<Item = &'a u64>) -> Result<u64> {
    values.into_iter().try_fold(0u64, |acc, v| {
        acc.checked_add(*v).ok_or_else(|| {
            PipelineError::StageError(format!("rating count for item {} overflows u64", item_id))
        })
    })
}

/// Reduce-side stage: sums the grouped values of one item
#[derive(Debug, Default)]
pub struct CountAggregator;

impl Stage for CountAggregator {
    type Input = (String, Vec<u64>);
    type Output = CountPair;

    fn process(&mut self, (item_id, values): (String, Vec<u64>)) -> Result<Vec<CountPair>> {
        if values.is_empty() {
            return Ok(vec![]);
        }
        let count = checked_total(&item_id, &values)?;
        Ok(vec![CountPair { item_id, count }])
    }

    fn name(&self) -> &str {
        "count_aggregator"
    }
}

/// Map-side combiner: collapses one partition's `(item_id, n)` pairs to one
/// pair per item. Summing is associative, so the aggregator's result is the
/// same with or without this step.
pub fn combine_units(pairs: Vec<(String, u64)>) -> Result<Vec<(String, u64)>> {
    let mut totals: HashMap<String, u64> = HashMap::with_capacity(pairs.len() / 2);
    for (item_id, n) in pairs {
        let total = totals.entry(item_id).or_insert(0);
        *total = total.checked_add(n).ok_or_else(|| {
            PipelineError::StageError("partial rating count overflows u64".into())
        })?;
    }
    Ok(totals.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sums_group() {
        let mut agg = CountAggregator;
        let out = agg.process(("100".into(), vec![1, 1, 1])).unwrap();
        assert_eq!(out, vec![CountPair::new("100", 3)]);
    }

    #[test]
    fn test_sum_is_order_independent() {
        let mut agg = CountAggregator;
        let a = agg.process(("x".into(), vec![5, 1, 2])).unwrap();
        let b = agg.process(("x".into(), vec![2, 5, 1])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_group_emits_nothing() {
        let mut agg = CountAggregator;
        assert!(agg.process(("x".into(), vec![])).unwrap().is_empty());
    }

    #[test]
    fn test_overflow_is_an_error() {
        let mut agg = CountAggregator;
        let result = agg.process(("x".into(), vec![u64::MAX, 1]));
        assert!(matches!(result, Err(PipelineError::StageError(_))));
    }

    #[test]
    fn test_combiner_preserves_totals() {
        let pairs = vec![
            ("a".to_string(), 1),
            ("b".to_string(), 1),
            ("a".to_string(), 1),
            ("a".to_string(), 2),
        ];
        let mut combined = combine_units(pairs).unwrap();
        combined.sort();
        assert_eq!(combined, vec![("a".to_string(), 4), ("b".to_string(), 1)]);
    }
}

//! The grouping/sort step between stages.
//!
//! A shuffle takes every map output of a stage at once. It hands back reduce
//! partitions in which each key appears exactly once, together with all of its
//! values, and keys are sorted ascending. Because it needs the complete map
//! output before it can return, calling it is the barrier between stages.

use crate::error::{PipelineError, Result};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// One reduce partition: sorted keys, each with its grouped values
pub type Partition<K, V> = Vec<(K, Vec<V>)>;

/// Groups values by key and sorts the groups by key
pub trait Shuffle: Send + Sync {
    /// Shuffle the map outputs into exactly `partitions` reduce partitions
    fn shuffle<K, V>(
        &self,
        map_outputs: Vec<Vec<(K, V)>>,
        partitions: usize,
    ) -> Result<Vec<Partition<K, V>>>
    where
        K: Ord + Hash + Send,
        V: Send;
}

/// Routes a key to a reduce partition by hash
#[derive(Debug, Clone, Copy)]
pub struct HashPartitioner {
    partitions: usize,
}

impl HashPartitioner {
    pub fn new(partitions: usize) -> Result<Self> {
        if partitions == 0 {
            return Err(PipelineError::ShuffleError(
                "cannot shuffle into zero partitions".into(),
            ));
        }
        Ok(Self { partitions })
    }

    pub fn partition<K: Hash>(&self, key: &K) -> usize {
        if self.partitions == 1 {
            return 0;
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as usize
    }
}

/// Shuffle held entirely in memory
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryShuffle;

impl Shuffle for InMemoryShuffle {
    fn shuffle<K, V>(
        &self,
        map_outputs: Vec<Vec<(K, V)>>,
        partitions: usize,
    ) -> Result<Vec<Partition<K, V>>>
    where
        K: Ord + Hash + Send,
        V: Send,
    {
        let partitioner = HashPartitioner::new(partitions)?;
        let mut groups: Vec<BTreeMap<K, Vec<V>>> =
            (0..partitions).map(|_| BTreeMap::new()).collect();

        for output in map_outputs {
            for (key, value) in output {
                let idx = partitioner.partition(&key);
                groups[idx].entry(key).or_default().push(value);
            }
        }

        Ok(groups
            .into_iter()
            .map(|group| group.into_iter().collect())
            .collect())
    }
}

use crate::aggregate::CountPair;
use crate::error::Result;
use crate::rank_key::RankKeyEncoder;
use crate::stage::Stage;
use std::io::Write;

/// Final stage: expands each sorted rank-key bucket back into count pairs.
///
/// Items that share a key are emitted in ascending item id order.
#[derive(Debug, Clone)]
pub struct OrderedEmitter<E: RankKeyEncoder> {
    encoder: E,
}

impl<E: RankKeyEncoder> OrderedEmitter<E> {
    pub fn new(encoder: E) -> Self {
        Self { encoder }
    }
}

impl<E: RankKeyEncoder> Stage for OrderedEmitter<E> {
    type Input = (E::Key, Vec<String>);
    type Output = CountPair;

    fn process(&mut self, (key, mut items): (E::Key, Vec<String>)) -> Result<Vec<CountPair>> {
        let count = self.encoder.decode(&key)?;
        items.sort_unstable();
        Ok(items
            .into_iter()
            .map(|item_id| CountPair { item_id, count })
            .collect())
    }

    fn name(&self) -> &str {
        "ordered_emitter"
    }
}

/// Write pairs as `item_id<TAB>count` lines
pub fn write_pairs<W: Write>(mut writer: W, pairs: &[CountPair]) -> Result<()> {
    for pair in pairs {
        writeln!(writer, "{}\t{}", pair.item_id, pair.count)?;
    }
    writer.flush()?;
    Ok(())
}

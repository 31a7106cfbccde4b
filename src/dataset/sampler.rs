//! Index batching over an in-memory dataset
//!
//! Batches are produced as position lists so the caller can build tensors
//! lazily with whichever batcher (plain, weak or strong view) it needs.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// How positions are drawn for an epoch
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingMode {
    /// Every position exactly once (optionally shuffled)
    Sequential,
    /// Class-balanced sampling with replacement; `labels[i]` is the class of position `i`
    ClassBalanced { labels: Vec<usize>, num_classes: usize },
}

/// Batch index generator with a seeded shuffle
#[derive(Debug, Clone)]
pub struct BatchLoader {
    len: usize,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    mode: SamplingMode,
    rng: ChaCha8Rng,
}

impl BatchLoader {
    pub fn new(len: usize, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        Self {
            len,
            batch_size: batch_size.max(1),
            shuffle,
            drop_last: false,
            mode: SamplingMode::Sequential,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Sample classes uniformly, then a random member of the class
    pub fn with_class_balance(mut self, labels: Vec<usize>, num_classes: usize) -> Self {
        self.mode = SamplingMode::ClassBalanced { labels, num_classes };
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per epoch
    pub fn num_batches(&self) -> usize {
        if self.drop_last {
            self.len / self.batch_size
        } else {
            self.len.div_ceil(self.batch_size)
        }
    }

    /// Position lists for one epoch
    pub fn batches(&mut self) -> Vec<Vec<usize>> {
        let order = match &self.mode {
            SamplingMode::Sequential => {
                let mut order: Vec<usize> = (0..self.len).collect();
                if self.shuffle {
                    order.shuffle(&mut self.rng);
                }
                order
            }
            SamplingMode::ClassBalanced { labels, num_classes } => {
                balanced_order(labels, *num_classes, self.len, &mut self.rng)
            }
        };

        order
            .chunks(self.batch_size)
            .filter(|chunk| !self.drop_last || chunk.len() == self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}

fn balanced_order(
    labels: &[usize],
    num_classes: usize,
    count: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<usize> {
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); num_classes];
    for (pos, &label) in labels.iter().enumerate() {
        if label < num_classes {
            by_class[label].push(pos);
        }
    }
    let present: Vec<&Vec<usize>> = by_class.iter().filter(|c| !c.is_empty()).collect();
    if present.is_empty() {
        return Vec::new();
    }

    (0..count)
        .filter_map(|_| {
            let class = present[rng.gen_range(0..present.len())];
            class.choose(&mut *rng).copied()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_position_once() {
        let mut loader = BatchLoader::new(10, 4, true, 1);
        let batches = loader.batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(loader.num_batches(), 3);
        assert_eq!(batches[2].len(), 2);

        let mut all: Vec<usize> = batches.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_drop_last() {
        let mut loader = BatchLoader::new(10, 4, false, 1).with_drop_last(true);
        let batches = loader.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(loader.num_batches(), 2);
        assert_eq!(batches[0], vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_shuffle_changes_between_epochs() {
        let mut loader = BatchLoader::new(50, 50, true, 7);
        let first = loader.batches();
        let second = loader.batches();
        assert_ne!(first, second);
    }

    #[test]
    fn test_class_balanced_sampling_oversamples_rare_class() {
        // 95 samples of class 0, 5 of class 1
        let labels: Vec<usize> = (0..100).map(|i| usize::from(i >= 95)).collect();
        let mut loader = BatchLoader::new(100, 20, true, 3).with_class_balance(labels.clone(), 2);
        let drawn: Vec<usize> = loader.batches().into_iter().flatten().collect();
        assert_eq!(drawn.len(), 100);

        let rare = drawn.iter().filter(|&&p| labels[p] == 1).count();
        assert!(rare > 30, "rare class drawn {} times", rare);
    }
}

//! Dataset abstraction and mini-batch loading.
//!
//! A [`Dataset`] is anything indexable that can hand out an item and its
//! class label. The [`Loader`] restricts iteration to an index subset
//! (the train or eval side of a fold split), optionally reshuffles that
//! subset each epoch with a seeded generator, and yields fixed-size
//! [`MiniBatch`]es.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{HarnessError, Result};
use crate::Batch;

/// An indexable collection of labeled samples.
pub trait Dataset {
    /// The sample type handed to the model.
    type Item;

    /// Number of samples.
    fn len(&self) -> usize;

    /// The sample at `index`. Implementations may clone or materialize.
    fn get(&self, index: usize) -> Self::Item;

    /// The class label of the sample at `index`.
    fn label(&self, index: usize) -> usize;

    /// True when the dataset has no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All labels in dataset order, for fold construction.
    fn labels(&self) -> Vec<usize> {
        (0..self.len()).map(|index| self.label(index)).collect()
    }
}

/// A fixed-size batch of samples with their labels and source indices.
#[derive(Debug, Clone)]
pub struct MiniBatch<T> {
    /// Dataset indices of the batch members.
    pub indices: Vec<usize>,
    /// The samples, in `indices` order.
    pub inputs: Vec<T>,
    /// The class labels, in `indices` order.
    pub targets: Vec<usize>,
}

impl<T: Send + Sync> Batch for MiniBatch<T> {
    fn batch_size(&self) -> usize {
        self.inputs.len()
    }
}

/// Yields mini-batches over an index subset of a dataset.
///
/// Shuffling is off by default (evaluation order is dataset order);
/// [`Loader::with_shuffle`] turns it on with a seed, and each call to
/// [`Loader::batches`] advances an epoch counter so successive epochs
/// see different orders while reruns with the same seed reproduce them.
#[derive(Debug)]
pub struct Loader<'d, D: Dataset> {
    dataset: &'d D,
    indices: Vec<usize>,
    batch_size: usize,
    shuffle_seed: Option<u64>,
    epoch: u64,
}

impl<'d, D: Dataset> Loader<'d, D> {
    /// Creates a loader over an explicit index subset.
    ///
    /// # Errors
    ///
    /// `Dataset` when `batch_size` is zero or an index is out of range.
    pub fn new(dataset: &'d D, indices: Vec<usize>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(HarnessError::Dataset(
                "batch size must be at least 1".to_string(),
            ));
        }
        if let Some(&bad) = indices.iter().find(|&&index| index >= dataset.len()) {
            return Err(HarnessError::Dataset(format!(
                "index {bad} out of range for dataset of length {}",
                dataset.len()
            )));
        }
        Ok(Self {
            dataset,
            indices,
            batch_size,
            shuffle_seed: None,
            epoch: 0,
        })
    }

    /// Creates a loader over the whole dataset.
    ///
    /// # Errors
    ///
    /// As [`Loader::new`].
    pub fn full(dataset: &'d D, batch_size: usize) -> Result<Self> {
        Self::new(dataset, (0..dataset.len()).collect(), batch_size)
    }

    /// Enables per-epoch shuffling with a seed.
    #[must_use]
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Number of samples visited per epoch.
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.indices.len()
    }

    /// Number of batches per epoch (last batch may be short).
    #[must_use]
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    /// Materializes one epoch of batches.
    ///
    /// With shuffling enabled, the order is drawn from the seed and the
    /// epoch counter, which this call advances.
    pub fn batches(&mut self) -> Vec<MiniBatch<D::Item>> {
        let mut order = self.indices.clone();
        if let Some(seed) = self.shuffle_seed {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(self.epoch));
            order.shuffle(&mut rng);
        }
        self.epoch += 1;

        order
            .chunks(self.batch_size)
            .map(|chunk| MiniBatch {
                indices: chunk.to_vec(),
                inputs: chunk.iter().map(|&index| self.dataset.get(index)).collect(),
                targets: chunk.iter().map(|&index| self.dataset.label(index)).collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory dataset of (feature, label) pairs.
    #[derive(Debug)]
    struct VecDataset {
        samples: Vec<(f32, usize)>,
    }

    impl Dataset for VecDataset {
        type Item = f32;

        fn len(&self) -> usize {
            self.samples.len()
        }

        fn get(&self, index: usize) -> f32 {
            self.samples[index].0
        }

        fn label(&self, index: usize) -> usize {
            self.samples[index].1
        }
    }

    fn dataset() -> VecDataset {
        VecDataset {
            samples: (0..10).map(|i| (i as f32, i % 2)).collect(),
        }
    }

    #[test]
    fn test_full_loader_batches() {
        let data = dataset();
        let mut loader = Loader::full(&data, 4).unwrap();
        let batches = loader.batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].batch_size(), 4);
        assert_eq!(batches[2].batch_size(), 2);
        assert_eq!(batches[0].inputs, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(batches[0].targets, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_subset_loader_visits_only_subset() {
        let data = dataset();
        let mut loader = Loader::new(&data, vec![1, 3, 5], 2).unwrap();
        let visited: Vec<usize> = loader
            .batches()
            .iter()
            .flat_map(|batch| batch.indices.clone())
            .collect();
        assert_eq!(visited, vec![1, 3, 5]);
    }

    #[test]
    fn test_shuffle_is_reproducible() {
        let data = dataset();
        let order = |seed: u64| -> Vec<usize> {
            let mut loader = Loader::full(&data, 10).unwrap().with_shuffle(seed);
            loader.batches().remove(0).indices
        };
        assert_eq!(order(3), order(3));
        assert_ne!(order(3), order(4));
    }

    #[test]
    fn test_shuffle_varies_per_epoch() {
        let data = dataset();
        let mut loader = Loader::full(&data, 10).unwrap().with_shuffle(3);
        let first = loader.batches().remove(0).indices;
        let second = loader.batches().remove(0).indices;
        assert_ne!(first, second);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let data = dataset();
        assert!(Loader::full(&data, 0).is_err());
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let data = dataset();
        let error = Loader::new(&data, vec![0, 10], 2).unwrap_err();
        assert!(error.to_string().contains("index 10"));
    }

    #[test]
    fn test_labels_helper() {
        let data = dataset();
        assert_eq!(data.labels(), vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
    }
}

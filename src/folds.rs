//! Stratified k-fold partitioning and the cross-validation driver.
//!
//! [`stratified_folds`] splits sample indices so every fold draws a
//! proportional, contiguous slice from each class block. The
//! [`CrossValidator`] wraps the fold table: it hands out train/eval
//! index splits per fold and runs a caller-supplied fold function,
//! merging each fold's [`RecordLog`] into one top-level log so that
//! every metric column ends up with one entry per fold.
//!
//! # Example
//!
//! ```rust
//! use facefold_rs::folds::CrossValidator;
//! use facefold_rs::records::RecordLog;
//!
//! // Two classes of three samples each, class-contiguous.
//! let labels = [0, 0, 0, 1, 1, 1];
//! let validator = CrossValidator::new(&labels, 3, 42)?;
//!
//! let results = validator.run(|fold, split| {
//!     assert_eq!(split.eval.len(), 2);
//!     let mut log = RecordLog::new();
//!     log.append("fold", fold);
//!     Ok(log)
//! })?;
//!
//! // One merged entry per fold.
//! assert_eq!(results.get("fold")?.len(), 3);
//! # Ok::<(), facefold_rs::HarnessError>(())
//! ```

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::error::{HarnessError, Result};
use crate::records::{MergeMode, RecordLog};

/// Partitions `0..labels.len()` into `k` stratified folds.
///
/// Samples must be class-contiguous (all samples of a class adjacent),
/// the way a directory-per-class dataset enumerates. Each fold takes a
/// contiguous slice of every class block; when a class size is not
/// divisible by `k`, the first `size % k` folds take one extra sample.
///
/// # Errors
///
/// `Fold` when `k < 2`, when `labels` is empty, when a class has fewer
/// than `k` samples, or when classes are interleaved.
pub fn stratified_folds(labels: &[usize], k: usize) -> Result<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(HarnessError::Fold(format!("k must be at least 2, got {k}")));
    }
    if labels.is_empty() {
        return Err(HarnessError::Fold("no samples to partition".to_string()));
    }

    let blocks = class_blocks(labels)?;
    for (class, _, count) in &blocks {
        if *count < k {
            return Err(HarnessError::Fold(format!(
                "class {class} has {count} samples, fewer than k = {k}"
            )));
        }
    }

    let mut folds = vec![Vec::new(); k];
    for (_, offset, count) in &blocks {
        let base = count / k;
        let rem = count % k;
        for (fold_index, fold) in folds.iter_mut().enumerate() {
            let size = base + usize::from(fold_index < rem);
            let start = offset + fold_index * base + fold_index.min(rem);
            fold.extend(start..start + size);
        }
    }
    Ok(folds)
}

/// Scans labels into `(class, offset, count)` blocks, rejecting
/// interleaved classes.
fn class_blocks(labels: &[usize]) -> Result<Vec<(usize, usize, usize)>> {
    let mut blocks: Vec<(usize, usize, usize)> = Vec::new();
    for (index, &label) in labels.iter().enumerate() {
        match blocks.last_mut() {
            Some((class, _, count)) if *class == label => *count += 1,
            _ => {
                if blocks.iter().any(|(class, _, _)| *class == label) {
                    return Err(HarnessError::Fold(format!(
                        "samples of class {label} are not contiguous (reappear at index {index})"
                    )));
                }
                blocks.push((label, index, 1));
            }
        }
    }
    Ok(blocks)
}

/// Train/eval index lists for one fold.
#[derive(Debug, Clone)]
pub struct FoldSplit {
    /// Indices of every other fold, in shuffled order.
    pub train: Vec<usize>,
    /// Indices of the held-out fold, in dataset order.
    pub eval: Vec<usize>,
}

/// K-fold cross-validation driver.
///
/// Holds the fold table and a seed; the training side of each split is
/// shuffled with a fold-specific stream of that seed, so a rerun with
/// the same seed reproduces the same batches.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    folds: Vec<Vec<usize>>,
    seed: u64,
}

impl CrossValidator {
    /// Builds the fold table from class labels.
    ///
    /// # Errors
    ///
    /// Propagates [`stratified_folds`] validation errors.
    pub fn new(labels: &[usize], k: usize, seed: u64) -> Result<Self> {
        Ok(Self {
            folds: stratified_folds(labels, k)?,
            seed,
        })
    }

    /// Number of folds.
    #[must_use]
    pub fn k(&self) -> usize {
        self.folds.len()
    }

    /// The fold table: per fold, the held-out sample indices.
    #[must_use]
    pub fn folds(&self) -> &[Vec<usize>] {
        &self.folds
    }

    /// Train/eval split for one fold: eval is the held-out fold, train
    /// is every other fold concatenated and shuffled.
    ///
    /// # Errors
    ///
    /// `Fold` when `fold` is not a valid fold number.
    pub fn split(&self, fold: usize) -> Result<FoldSplit> {
        let k = self.k();
        if fold >= k {
            return Err(HarnessError::Fold(format!(
                "fold {fold} out of range for k = {k}"
            )));
        }

        let mut train: Vec<usize> = self
            .folds
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != fold)
            .flat_map(|(_, indices)| indices.iter().copied())
            .collect();

        #[allow(clippy::cast_possible_truncation)]
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(fold as u64));
        train.shuffle(&mut rng);

        Ok(FoldSplit {
            train,
            eval: self.folds[fold].clone(),
        })
    }

    /// Runs `fold_fn` once per fold and merges each fold's log into a
    /// single top-level [`RecordLog`] with append-mode merges, so each
    /// column holds one entry per fold.
    ///
    /// # Errors
    ///
    /// Propagates the first error from `fold_fn` or from merging.
    pub fn run<F>(&self, mut fold_fn: F) -> Result<RecordLog>
    where
        F: FnMut(usize, &FoldSplit) -> Result<RecordLog>,
    {
        let k = self.k();
        info!(k, "starting cross-validation");

        let mut results = RecordLog::new();
        for fold in 0..k {
            let split = self.split(fold)?;
            let fold_log = fold_fn(fold, &split)?;
            results.merge(&fold_log, None, MergeMode::Append)?;
            info!(fold = fold + 1, k, "fold finished");
        }
        Ok(results)
    }
}

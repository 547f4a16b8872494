//! Classification metrics: confusion accounting and accuracy.
//!
//! [`ConfusionMatrix`] keeps the usual true-by-predicted counts and,
//! alongside each cell, the dataset indices of the samples that landed
//! there — enough to pull up every image a class pair confused, which
//! is what error inspection needs downstream.

use std::fmt;

use crate::error::{HarnessError, Result};

/// Index of the highest score; ties go to the earlier class.
#[must_use]
pub fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold(0, |best, (index, &score)| {
            if score > scores[best] {
                index
            } else {
                best
            }
        })
}

/// True-by-predicted confusion counts with per-cell sample indices.
///
/// `count(t, p)` is the number of samples of true class `t` predicted as
/// `p`; `cell_samples(t, p)` lists which samples those were.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    n_classes: usize,
    counts: Vec<Vec<usize>>,
    samples: Vec<Vec<Vec<usize>>>,
}

impl ConfusionMatrix {
    /// Creates an empty matrix over `n_classes` classes.
    ///
    /// # Errors
    ///
    /// `Metrics` when `n_classes` is zero.
    pub fn new(n_classes: usize) -> Result<Self> {
        if n_classes == 0 {
            return Err(HarnessError::Metrics(
                "a confusion matrix needs at least one class".to_string(),
            ));
        }
        Ok(Self {
            n_classes,
            counts: vec![vec![0; n_classes]; n_classes],
            samples: vec![vec![Vec::new(); n_classes]; n_classes],
        })
    }

    /// Builds a matrix from parallel target/prediction/sample-index
    /// slices.
    ///
    /// # Errors
    ///
    /// `Metrics` when the slices disagree in length or a class index is
    /// out of range.
    pub fn from_predictions(
        targets: &[usize],
        predictions: &[usize],
        sample_indices: &[usize],
        n_classes: usize,
    ) -> Result<Self> {
        if targets.len() != predictions.len() || targets.len() != sample_indices.len() {
            return Err(HarnessError::Metrics(format!(
                "length mismatch: {} targets, {} predictions, {} sample indices",
                targets.len(),
                predictions.len(),
                sample_indices.len()
            )));
        }
        let mut matrix = Self::new(n_classes)?;
        for ((&truth, &predicted), &sample) in
            targets.iter().zip(predictions).zip(sample_indices)
        {
            matrix.record(truth, predicted, sample)?;
        }
        Ok(matrix)
    }

    /// Records one classified sample.
    ///
    /// # Errors
    ///
    /// `Metrics` when either class index is out of range.
    pub fn record(&mut self, truth: usize, predicted: usize, sample: usize) -> Result<()> {
        self.check_class(truth)?;
        self.check_class(predicted)?;
        self.counts[truth][predicted] += 1;
        self.samples[truth][predicted].push(sample);
        Ok(())
    }

    fn check_class(&self, class: usize) -> Result<()> {
        if class >= self.n_classes {
            return Err(HarnessError::Metrics(format!(
                "class {class} out of range for {} classes",
                self.n_classes
            )));
        }
        Ok(())
    }

    /// Number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Count of samples with true class `truth` predicted as `predicted`.
    ///
    /// # Errors
    ///
    /// `Metrics` when either class index is out of range.
    pub fn count(&self, truth: usize, predicted: usize) -> Result<usize> {
        self.check_class(truth)?;
        self.check_class(predicted)?;
        Ok(self.counts[truth][predicted])
    }

    /// Sample indices recorded for the `(truth, predicted)` cell.
    ///
    /// # Errors
    ///
    /// `Metrics` when either class index is out of range.
    pub fn cell_samples(&self, truth: usize, predicted: usize) -> Result<&[usize]> {
        self.check_class(truth)?;
        self.check_class(predicted)?;
        Ok(&self.samples[truth][predicted])
    }

    /// The raw count grid, `counts[truth][predicted]`.
    #[must_use]
    pub fn counts(&self) -> &[Vec<usize>] {
        &self.counts
    }

    /// Total recorded samples.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Total samples of true class `truth`.
    ///
    /// # Errors
    ///
    /// `Metrics` when the class index is out of range.
    pub fn row_total(&self, truth: usize) -> Result<usize> {
        self.check_class(truth)?;
        Ok(self.counts[truth].iter().sum())
    }

    /// Fraction of recorded samples on the diagonal; 0.0 when empty.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.n_classes).map(|c| self.counts[c][c]).sum();
        #[allow(clippy::cast_precision_loss)]
        {
            correct as f64 / total as f64
        }
    }

    /// Per-class accuracy (diagonal over row total); `None` for classes
    /// with no recorded samples.
    #[must_use]
    pub fn per_class_accuracy(&self) -> Vec<Option<f64>> {
        (0..self.n_classes)
            .map(|class| {
                let row: usize = self.counts[class].iter().sum();
                if row == 0 {
                    None
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    Some(self.counts[class][class] as f64 / row as f64)
                }
            })
            .collect()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ConfusionMatrix ({} classes, {} samples, accuracy {:.3})",
            self.n_classes,
            self.total(),
            self.accuracy()
        )?;
        for row in &self.counts {
            write!(f, " ")?;
            for count in row {
                write!(f, " {count:>5}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

//! # facefold-rs
//!
//! A thin experimentation harness for face-classification pipelines.
//!
//! ## Overview
//!
//! Training and cross-validation both need a place to accumulate
//! metrics as they go: per-batch losses inside an epoch, per-fold
//! results across a k-fold run. The harness funnels everything through
//! one columnar structure — a [`records::RecordLog`] — which grows each
//! metric column in lockstep and freezes into a typed
//! [`records::RecordTable`] for analysis.
//!
//! Around that core sit the pieces a face-classification experiment
//! actually runs:
//!
//! - [`folds`] — stratified k-fold partitioning and the
//!   cross-validation driver
//! - [`trainer`] — a framework-agnostic training loop over [`Model`] /
//!   [`Optimizer`] trait seams
//! - [`data`] — dataset abstraction and subset mini-batch loading
//! - [`metrics`] — confusion accounting with per-cell sample indices
//! - [`preprocess`] — face-crop directory orchestration behind detector
//!   and cropper seams
//! - [`schedule`] — learning-rate schedules
//! - [`config`] — TOML-loadable run configuration
//! - [`error`] — error types
//!
//! ## Quick Start
//!
//! ```rust
//! use facefold_rs::folds::CrossValidator;
//! use facefold_rs::records::RecordLog;
//!
//! let labels = [0, 0, 0, 0, 1, 1, 1, 1];
//! let validator = CrossValidator::new(&labels, 4, 42)?;
//!
//! let results = validator.run(|_fold, _split| {
//!     // Train on _split.train, evaluate on _split.eval ...
//!     let mut log = RecordLog::new();
//!     log.append("val_loss", 0.5);
//!     Ok(log)
//! })?;
//!
//! // One entry per fold.
//! assert_eq!(results.get("val_loss")?.len(), 4);
//! # Ok::<(), facefold_rs::HarnessError>(())
//! ```
//!
//! ## Concurrency
//!
//! The record containers are single-threaded by design: there is no
//! internal locking. Parallel fold workers should each accumulate into
//! their own log and merge the logs afterwards.

#![warn(missing_docs)]
#![deny(unsafe_code)]
// Allow precision loss casts - acceptable in ML numerical code
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

// Core record containers
pub mod error;
pub mod records;

// Cross-validation
pub mod folds;

// Data loading and the training loop
pub mod data;
pub mod schedule;
pub mod trainer;

// Evaluation and preprocessing
pub mod metrics;
pub mod preprocess;

// Run configuration
pub mod config;

// Re-exports for convenient access
pub use config::HarnessConfig;
pub use data::{Dataset, Loader, MiniBatch};
pub use error::{HarnessError, Result};
pub use folds::{stratified_folds, CrossValidator, FoldSplit};
pub use metrics::ConfusionMatrix;
pub use records::{Column, MergeMode, RecordLog, RecordTable, Selected, Value};
pub use schedule::{LrScheduler, MultiStepLr};
pub use trainer::{BatchRecord, EpochMode, Trainer};

/// Batch of training data.
///
/// Generic capability for anything a model consumes per step; the
/// concrete layout is the model implementation's business.
pub trait Batch: Send + Sync {
    /// Number of samples in the batch.
    fn batch_size(&self) -> usize;
}

/// Loss and per-sample class scores from one forward pass.
#[derive(Debug, Clone)]
pub struct ForwardOutput {
    /// The loss value for the batch.
    pub loss: f32,
    /// Class scores per sample, `scores[sample][class]`.
    pub scores: Vec<Vec<f32>>,
}

/// Gradient information from a backward pass.
#[derive(Debug, Clone)]
pub struct GradientInfo {
    /// The loss the gradients were computed against.
    pub loss: f32,
    /// L2 norm of all gradients.
    pub gradient_norm: f32,
}

/// Trait for models trainable by the harness.
///
/// The harness is framework-agnostic: anything that can run a forward
/// pass over a batch and a backward pass for gradients plugs in,
/// whatever tensor library it is built on.
pub trait Model<B: Batch>: Send {
    /// Executes the forward pass, returning the loss and class scores.
    ///
    /// # Errors
    ///
    /// Implementation-defined forward failure.
    fn forward(&mut self, batch: &B) -> Result<ForwardOutput>;

    /// Executes the backward pass. Called after [`forward`](Self::forward)
    /// in training mode.
    ///
    /// # Errors
    ///
    /// Implementation-defined backward failure.
    fn backward(&mut self) -> Result<GradientInfo>;

    /// Total number of trainable parameters.
    fn parameter_count(&self) -> usize;
}

/// Trait for optimizers that update model parameters.
///
/// Optimizer state (momentum, variance estimates) is distinct from
/// model parameters; separating the two lets either side be swapped
/// independently.
pub trait Optimizer<M, B: Batch>: Send
where
    M: Model<B>,
{
    /// Performs a single optimization step.
    ///
    /// # Errors
    ///
    /// Implementation-defined update failure.
    fn step(&mut self, model: &mut M, gradients: &GradientInfo) -> Result<()>;

    /// The current learning rate.
    fn learning_rate(&self) -> f32;

    /// Sets the learning rate (for schedules).
    fn set_learning_rate(&mut self, lr: f32);

    /// Zeros all accumulated gradients.
    fn zero_grad(&mut self);
}

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use facefold_rs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::HarnessConfig;
    pub use crate::data::{Dataset, Loader, MiniBatch};
    pub use crate::error::{HarnessError, Result};
    pub use crate::folds::{CrossValidator, FoldSplit};
    pub use crate::metrics::ConfusionMatrix;
    pub use crate::records::{MergeMode, RecordLog, RecordTable, Selected, Value};
    pub use crate::schedule::{ConstantLr, LrScheduler, MultiStepLr};
    pub use crate::trainer::{BatchRecord, EpochMode, Trainer};
    pub use crate::{Batch, ForwardOutput, GradientInfo, Model, Optimizer};
}

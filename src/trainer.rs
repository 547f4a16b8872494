//! Generic training-loop wrapper.
//!
//! [`Trainer`] owns a model, an optimizer, and a learning-rate schedule,
//! and drives one epoch at a time over a [`Loader`]. It is
//! framework-agnostic: the model and optimizer are trait seams
//! ([`Model`], [`Optimizer`]), so any backend that can run a forward and
//! backward pass plugs in.
//!
//! Each batch flows through an optional record hook, which is where
//! callers accumulate whatever metrics they care about into a
//! [`RecordLog`] — the trainer itself does not decide what to record.

use tracing::debug;

use crate::data::{Dataset, Loader, MiniBatch};
use crate::error::Result;
use crate::records::RecordLog;
use crate::schedule::LrScheduler;
use crate::{Model, Optimizer};

/// Whether an epoch updates parameters or only evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochMode {
    /// Forward, backward, optimizer step per batch; scheduler advances.
    Train,
    /// Forward only; nothing advances.
    Eval,
}

/// Per-batch snapshot handed to the record hook.
#[derive(Debug, Clone)]
pub struct BatchRecord {
    /// Position of the batch within the epoch.
    pub batch_index: usize,
    /// Loss reported by the forward pass.
    pub loss: f32,
    /// Per-sample class scores from the forward pass.
    pub scores: Vec<Vec<f32>>,
    /// Class labels of the batch members.
    pub targets: Vec<usize>,
    /// Dataset indices of the batch members.
    pub indices: Vec<usize>,
}

/// A record hook that appends each batch's loss under `"loss"`.
///
/// The conventional minimal hook; compose richer hooks in the caller.
pub fn record_loss(log: &mut RecordLog, record: &BatchRecord) {
    log.append("loss", record.loss);
}

/// Drives train/eval epochs for one model/optimizer/schedule triple.
pub struct Trainer<M, O, S> {
    model: M,
    optimizer: O,
    scheduler: S,
    epoch: u64,
}

impl<M, O, S: LrScheduler> Trainer<M, O, S> {
    /// Wraps a model, optimizer, and schedule. No work happens until an
    /// epoch runs.
    pub fn new(model: M, optimizer: O, scheduler: S) -> Self {
        Self {
            model,
            optimizer,
            scheduler,
            epoch: 0,
        }
    }

    /// Number of completed training epochs (eval epochs do not count).
    #[must_use]
    pub fn current_epoch(&self) -> u64 {
        self.epoch
    }

    /// Read access to the model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Write access to the model.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Releases the model, optimizer, and scheduler.
    pub fn into_parts(self) -> (M, O, S) {
        (self.model, self.optimizer, self.scheduler)
    }

    /// Runs one epoch over the loader, feeding each batch through the
    /// record hook.
    ///
    /// In [`EpochMode::Train`], the learning rate for the current epoch
    /// is installed first, each batch runs forward/backward/step, and
    /// the epoch counter advances afterwards (the schedule is stepped
    /// once per training epoch). In [`EpochMode::Eval`], batches run
    /// forward only and nothing advances.
    ///
    /// Returns the log the hook accumulated.
    ///
    /// # Errors
    ///
    /// Propagates the first model or optimizer error.
    pub fn run_epoch<D, F>(
        &mut self,
        loader: &mut Loader<'_, D>,
        mode: EpochMode,
        mut hook: F,
    ) -> Result<RecordLog>
    where
        D: Dataset,
        D::Item: Send + Sync,
        M: Model<MiniBatch<D::Item>>,
        O: Optimizer<M, MiniBatch<D::Item>>,
        F: FnMut(&mut RecordLog, &BatchRecord),
    {
        let training = mode == EpochMode::Train;
        if training {
            let lr = self.scheduler.lr_at(self.epoch);
            self.optimizer.set_learning_rate(lr);
            debug!(
                epoch = self.epoch,
                lr,
                phase = self.scheduler.phase_name(self.epoch),
                "starting training epoch"
            );
        }

        let mut log = RecordLog::new();
        for (batch_index, batch) in loader.batches().into_iter().enumerate() {
            let output = self.model.forward(&batch)?;
            if training {
                let gradients = self.model.backward()?;
                self.optimizer.step(&mut self.model, &gradients)?;
                self.optimizer.zero_grad();
            }
            let record = BatchRecord {
                batch_index,
                loss: output.loss,
                scores: output.scores,
                targets: batch.targets,
                indices: batch.indices,
            };
            hook(&mut log, &record);
        }

        if training {
            self.epoch += 1;
        }
        Ok(log)
    }

    /// [`run_epoch`](Self::run_epoch) in training mode.
    ///
    /// # Errors
    ///
    /// As [`run_epoch`](Self::run_epoch).
    pub fn train_epoch<D, F>(&mut self, loader: &mut Loader<'_, D>, hook: F) -> Result<RecordLog>
    where
        D: Dataset,
        D::Item: Send + Sync,
        M: Model<MiniBatch<D::Item>>,
        O: Optimizer<M, MiniBatch<D::Item>>,
        F: FnMut(&mut RecordLog, &BatchRecord),
    {
        self.run_epoch(loader, EpochMode::Train, hook)
    }

    /// [`run_epoch`](Self::run_epoch) in evaluation mode.
    ///
    /// # Errors
    ///
    /// As [`run_epoch`](Self::run_epoch).
    pub fn eval_epoch<D, F>(&mut self, loader: &mut Loader<'_, D>, hook: F) -> Result<RecordLog>
    where
        D: Dataset,
        D::Item: Send + Sync,
        M: Model<MiniBatch<D::Item>>,
        O: Optimizer<M, MiniBatch<D::Item>>,
        F: FnMut(&mut RecordLog, &BatchRecord),
    {
        self.run_epoch(loader, EpochMode::Eval, hook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;
    use crate::schedule::MultiStepLr;
    use crate::{ForwardOutput, GradientInfo};

    struct ToyDataset;

    impl Dataset for ToyDataset {
        type Item = f32;

        fn len(&self) -> usize {
            8
        }

        fn get(&self, index: usize) -> f32 {
            index as f32
        }

        fn label(&self, index: usize) -> usize {
            index % 2
        }
    }

    /// Model whose loss halves on every optimizer step.
    struct ToyModel {
        loss: f32,
        forward_calls: usize,
        backward_calls: usize,
    }

    impl ToyModel {
        fn new() -> Self {
            Self {
                loss: 1.0,
                forward_calls: 0,
                backward_calls: 0,
            }
        }
    }

    impl Model<MiniBatch<f32>> for ToyModel {
        fn forward(&mut self, batch: &MiniBatch<f32>) -> Result<ForwardOutput> {
            self.forward_calls += 1;
            Ok(ForwardOutput {
                loss: self.loss,
                scores: batch.targets.iter().map(|&t| {
                    // Always predict the true class, scores over 2 classes.
                    let mut scores = vec![0.0; 2];
                    scores[t] = 1.0;
                    scores
                }).collect(),
            })
        }

        fn backward(&mut self) -> Result<GradientInfo> {
            self.backward_calls += 1;
            Ok(GradientInfo {
                loss: self.loss,
                gradient_norm: self.loss * 0.5,
            })
        }

        fn parameter_count(&self) -> usize {
            1
        }
    }

    struct ToyOptimizer {
        lr: f32,
        steps: usize,
        zero_grads: usize,
    }

    impl Optimizer<ToyModel, MiniBatch<f32>> for ToyOptimizer {
        fn step(&mut self, model: &mut ToyModel, _gradients: &GradientInfo) -> Result<()> {
            self.steps += 1;
            model.loss *= 0.5;
            Ok(())
        }

        fn learning_rate(&self) -> f32 {
            self.lr
        }

        fn set_learning_rate(&mut self, lr: f32) {
            self.lr = lr;
        }

        fn zero_grad(&mut self) {
            self.zero_grads += 1;
        }
    }

    fn trainer() -> Trainer<ToyModel, ToyOptimizer, MultiStepLr> {
        Trainer::new(
            ToyModel::new(),
            ToyOptimizer {
                lr: 0.0,
                steps: 0,
                zero_grads: 0,
            },
            MultiStepLr::new(0.1, vec![1], 0.1),
        )
    }

    #[test]
    fn test_train_epoch_steps_everything() {
        let data = ToyDataset;
        let mut loader = Loader::full(&data, 4).unwrap();
        let mut trainer = trainer();

        let log = trainer.train_epoch(&mut loader, record_loss).unwrap();

        assert_eq!(trainer.current_epoch(), 1);
        assert_eq!(trainer.model().forward_calls, 2);
        assert_eq!(trainer.model().backward_calls, 2);
        assert_eq!(trainer.optimizer.steps, 2);
        assert_eq!(trainer.optimizer.zero_grads, 2);
        assert_eq!(log.get("loss").unwrap().len(), 2);
    }

    #[test]
    fn test_eval_epoch_is_forward_only() {
        let data = ToyDataset;
        let mut loader = Loader::full(&data, 4).unwrap();
        let mut trainer = trainer();

        trainer.eval_epoch(&mut loader, record_loss).unwrap();

        assert_eq!(trainer.current_epoch(), 0);
        assert_eq!(trainer.model().backward_calls, 0);
        assert_eq!(trainer.optimizer.steps, 0);
    }

    #[test]
    fn test_scheduler_applied_at_milestone() {
        let data = ToyDataset;
        let mut loader = Loader::full(&data, 8).unwrap();
        let mut trainer = trainer();

        trainer.train_epoch(&mut loader, |_, _| {}).unwrap();
        assert!((trainer.optimizer.lr - 0.1).abs() < 1e-9);

        // Milestone at epoch 1 decays the rate for the second epoch.
        trainer.train_epoch(&mut loader, |_, _| {}).unwrap();
        assert!((trainer.optimizer.lr - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_hook_sees_batch_records() {
        let data = ToyDataset;
        let mut loader = Loader::full(&data, 4).unwrap();
        let mut trainer = trainer();

        let log = trainer
            .train_epoch(&mut loader, |log, record| {
                log.append("batch", record.batch_index);
                log.append("n", record.targets.len());
            })
            .unwrap();

        assert_eq!(log.get("batch").unwrap().len(), 2);
        assert_eq!(log.get_at("n", 0).unwrap(), crate::records::Value::Int(4));
    }
}

//! End-to-end integration tests for facefold-rs: a prototype classifier
//! driven through training, evaluation, and cross-validation.

use facefold_rs::prelude::*;
use facefold_rs::metrics::argmax;

/// Scalar two-class dataset, class-contiguous: class 0 clusters near
/// 0.0, class 1 near 10.0.
struct ClusterDataset {
    samples: Vec<(f32, usize)>,
}

impl ClusterDataset {
    fn new(per_class: usize) -> Self {
        let mut samples = Vec::new();
        for i in 0..per_class {
            samples.push((i as f32 * 0.1, 0));
        }
        for i in 0..per_class {
            samples.push((10.0 + i as f32 * 0.1, 1));
        }
        Self { samples }
    }
}

impl Dataset for ClusterDataset {
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

/// Nearest-prototype classifier over scalar features.
///
/// The forward pass scores each sample by negated distance to each
/// class prototype and remembers per-class batch means; the optimizer
/// step pulls the prototypes toward those means.
struct PrototypeModel {
    prototypes: [f32; 2],
    last_loss: f32,
    pending: Option<[(f32, usize); 2]>,
}

impl PrototypeModel {
    fn new() -> Self {
        Self {
            prototypes: [5.0, 5.0],
            last_loss: 0.0,
            pending: None,
        }
    }

    fn apply_pending(&mut self, lr: f32) {
        if let Some(pending) = self.pending.take() {
            for (class, (sum, count)) in pending.iter().enumerate() {
                if *count > 0 {
                    let mean = sum / *count as f32;
                    self.prototypes[class] += lr * (mean - self.prototypes[class]);
                }
            }
        }
    }
}

impl Model<MiniBatch<f32>> for PrototypeModel {
    fn forward(&mut self, batch: &MiniBatch<f32>) -> Result<ForwardOutput> {
        let mut pending = [(0.0f32, 0usize); 2];
        let mut loss = 0.0;
        let mut scores = Vec::with_capacity(batch.inputs.len());

        for (&x, &target) in batch.inputs.iter().zip(&batch.targets) {
            scores.push(vec![
                -(x - self.prototypes[0]).abs(),
                -(x - self.prototypes[1]).abs(),
            ]);
            loss += (x - self.prototypes[target]).abs();
            pending[target].0 += x;
            pending[target].1 += 1;
        }

        loss /= batch.inputs.len() as f32;
        self.last_loss = loss;
        self.pending = Some(pending);
        Ok(ForwardOutput { loss, scores })
    }

    fn backward(&mut self) -> Result<GradientInfo> {
        Ok(GradientInfo {
            loss: self.last_loss,
            gradient_norm: self.last_loss,
        })
    }

    fn parameter_count(&self) -> usize {
        2
    }
}

/// Optimizer that applies the model's pending prototype update.
struct PrototypeOptimizer {
    lr: f32,
}

impl Optimizer<PrototypeModel, MiniBatch<f32>> for PrototypeOptimizer {
    fn step(&mut self, model: &mut PrototypeModel, _gradients: &GradientInfo) -> Result<()> {
        model.apply_pending(self.lr);
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn zero_grad(&mut self) {}
}

fn fit_and_eval(split: &FoldSplit, dataset: &ClusterDataset, epochs: usize) -> Result<RecordLog> {
    let mut trainer = Trainer::new(
        PrototypeModel::new(),
        PrototypeOptimizer { lr: 1.0 },
        ConstantLr(1.0),
    );

    let mut train_loader = Loader::new(dataset, split.train.clone(), 4)?.with_shuffle(42);
    for _ in 0..epochs {
        trainer.train_epoch(&mut train_loader, |_, _| {})?;
    }

    let mut eval_loader = Loader::new(dataset, split.eval.clone(), 4)?;
    let mut confusion = ConfusionMatrix::new(2)?;
    let eval_log = trainer.eval_epoch(&mut eval_loader, |log, record| {
        log.append("loss", record.loss);
        for ((scores, &target), &index) in record
            .scores
            .iter()
            .zip(&record.targets)
            .zip(&record.indices)
        {
            confusion
                .record(target, argmax(scores), index)
                .expect("class indices are in range");
        }
    })?;

    let mean_loss: f64 = eval_log
        .get("loss")?
        .iter()
        .filter_map(Value::as_f64)
        .sum::<f64>()
        / eval_log.get("loss")?.len() as f64;

    let mut fold_log = RecordLog::new();
    fold_log.append("val_loss", mean_loss);
    fold_log.append("val_acc", confusion.accuracy());
    Ok(fold_log)
}

#[test]
fn test_training_separates_clusters() {
    let dataset = ClusterDataset::new(8);
    let mut trainer = Trainer::new(
        PrototypeModel::new(),
        PrototypeOptimizer { lr: 1.0 },
        ConstantLr(1.0),
    );

    let mut loader = Loader::full(&dataset, 4).unwrap().with_shuffle(1);
    for _ in 0..5 {
        trainer.train_epoch(&mut loader, |_, _| {}).unwrap();
    }

    let prototypes = trainer.model().prototypes;
    assert!(prototypes[0] < 2.0, "class-0 prototype drifted: {prototypes:?}");
    assert!(prototypes[1] > 8.0, "class-1 prototype drifted: {prototypes:?}");
}

#[test]
fn test_cross_validation_end_to_end() {
    let dataset = ClusterDataset::new(8);
    let validator = CrossValidator::new(&dataset.labels(), 4, 42).unwrap();

    let results = validator
        .run(|_fold, split| fit_and_eval(split, &dataset, 5))
        .unwrap();

    // One merged entry per fold, per column.
    assert_eq!(results.get("val_loss").unwrap().len(), 4);
    assert_eq!(results.get("val_acc").unwrap().len(), 4);

    // The clusters are trivially separable: every fold classifies its
    // held-out samples perfectly.
    for fold in 0..4 {
        let acc = results.get_at("val_acc", fold).unwrap();
        let acc = acc.as_seq().expect("append-mode merge nests fold columns")[0]
            .as_f64()
            .expect("accuracy is numeric");
        assert!((acc - 1.0).abs() < 1e-9, "fold {fold} accuracy {acc}");
    }
}

#[test]
fn test_fold_results_freeze_for_analysis() {
    let dataset = ClusterDataset::new(8);
    let validator = CrossValidator::new(&dataset.labels(), 4, 42).unwrap();
    let results = validator
        .run(|_fold, split| fit_and_eval(split, &dataset, 3))
        .unwrap();

    let table = results.freeze();
    // Nested per-fold entries freeze to the untyped representation.
    assert_eq!(table.get("val_loss").unwrap().kind(), "mixed");
    assert_eq!(table.get("val_loss").unwrap().len(), 4);

    // The snapshot is JSON-exportable for plotting elsewhere.
    let json = table.to_json().unwrap();
    assert!(json.contains("val_acc"));
}

#[test]
fn test_config_drives_the_run() {
    let config = HarnessConfig::builder()
        .folds(4)
        .batch_size(4)
        .epochs(3)
        .seed(11)
        .build();
    config.validate().unwrap();

    let dataset = ClusterDataset::new(8);
    let validator = CrossValidator::new(&dataset.labels(), config.folds, config.seed).unwrap();
    assert_eq!(validator.k(), 4);

    let scheduler = config.scheduler();
    assert!((scheduler.lr_at(0) - config.base_lr).abs() < 1e-9);
}

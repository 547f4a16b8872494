//! Harness configuration.
//!
//! [`HarnessConfig`] gathers everything an experiment run needs: fold
//! count, batching, epochs, the learning-rate schedule, and the
//! preprocessing options. It is serializable, loadable from TOML,
//! buildable through a fluent builder, and validated before use.
//!
//! # Example
//!
//! ```rust
//! use facefold_rs::config::HarnessConfig;
//!
//! let config = HarnessConfig::builder()
//!     .folds(5)
//!     .epochs(20)
//!     .base_lr(1e-3)
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.folds, 5);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::preprocess::CropOptions;
use crate::schedule::MultiStepLr;

/// Configuration for a cross-validated training run.
///
/// # Defaults
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `folds` | 10 | Cross-validation fold count |
/// | `batch_size` | 32 | Mini-batch size |
/// | `epochs` | 15 | Training epochs per fold |
/// | `seed` | 42 | Shuffle seed |
/// | `base_lr` | 1e-3 | Initial learning rate |
/// | `milestones` | [5, 10] | Epochs at which the rate decays |
/// | `gamma` | 0.1 | Decay factor per milestone |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Number of cross-validation folds.
    #[serde(default = "default_folds")]
    pub folds: usize,

    /// Mini-batch size for both train and eval loaders.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Training epochs per fold.
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Seed for fold-split and loader shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Initial learning rate.
    #[serde(default = "default_base_lr")]
    pub base_lr: f32,

    /// Epochs at which the learning rate decays.
    #[serde(default = "default_milestones")]
    pub milestones: Vec<u64>,

    /// Multiplicative decay applied at each milestone.
    #[serde(default = "default_gamma")]
    pub gamma: f32,

    /// Face-crop preprocessing options.
    #[serde(default)]
    pub crop: CropConfig,
}

/// Preprocessing options, serialized alongside the harness config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropConfig {
    /// Output size of every crop, `(width, height)`.
    #[serde(default = "default_out_size")]
    pub out_size: (u32, u32),

    /// Re-crop even when the destination is already populated.
    #[serde(default = "default_regenerate")]
    pub regenerate: bool,

    /// Minimum detector confidence; forwarded to the detector
    /// implementation.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Non-maximum-suppression threshold; forwarded to the detector
    /// implementation.
    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f32,
}

fn default_folds() -> usize {
    10
}
fn default_batch_size() -> usize {
    32
}
fn default_epochs() -> usize {
    15
}
fn default_seed() -> u64 {
    42
}
fn default_base_lr() -> f32 {
    1e-3
}
fn default_milestones() -> Vec<u64> {
    vec![5, 10]
}
fn default_gamma() -> f32 {
    0.1
}
fn default_out_size() -> (u32, u32) {
    (160, 160)
}
fn default_regenerate() -> bool {
    true
}
fn default_confidence_threshold() -> f32 {
    0.02
}
fn default_nms_threshold() -> f32 {
    0.4
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            folds: default_folds(),
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            seed: default_seed(),
            base_lr: default_base_lr(),
            milestones: default_milestones(),
            gamma: default_gamma(),
            crop: CropConfig::default(),
        }
    }
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            out_size: default_out_size(),
            regenerate: default_regenerate(),
            confidence_threshold: default_confidence_threshold(),
            nms_threshold: default_nms_threshold(),
        }
    }
}

impl HarnessConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// IO errors reading the file and parse errors decoding it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Checks every parameter range.
    ///
    /// # Errors
    ///
    /// `Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.folds < 2 {
            return Err(HarnessError::Config(format!(
                "folds must be at least 2, got {}",
                self.folds
            )));
        }
        if self.batch_size == 0 {
            return Err(HarnessError::Config("batch_size must be at least 1".to_string()));
        }
        if self.epochs == 0 {
            return Err(HarnessError::Config("epochs must be at least 1".to_string()));
        }
        if !(self.base_lr > 0.0) {
            return Err(HarnessError::Config(format!(
                "base_lr must be positive, got {}",
                self.base_lr
            )));
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(HarnessError::Config(format!(
                "gamma must be in (0, 1], got {}",
                self.gamma
            )));
        }
        if self.milestones.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(HarnessError::Config(
                "milestones must be strictly increasing".to_string(),
            ));
        }
        if self.crop.out_size.0 == 0 || self.crop.out_size.1 == 0 {
            return Err(HarnessError::Config("crop out_size must be nonzero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.crop.confidence_threshold) {
            return Err(HarnessError::Config(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.crop.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.crop.nms_threshold) {
            return Err(HarnessError::Config(format!(
                "nms_threshold must be in [0, 1], got {}",
                self.crop.nms_threshold
            )));
        }
        Ok(())
    }

    /// The learning-rate schedule this configuration describes.
    #[must_use]
    pub fn scheduler(&self) -> MultiStepLr {
        MultiStepLr::new(self.base_lr, self.milestones.clone(), self.gamma)
    }

    /// The crop options this configuration describes.
    #[must_use]
    pub fn crop_options(&self) -> CropOptions {
        CropOptions {
            out_size: self.crop.out_size,
            regenerate: self.crop.regenerate,
        }
    }
}

/// Fluent builder for [`HarnessConfig`].
#[derive(Debug, Default)]
pub struct HarnessConfigBuilder {
    config: Option<HarnessConfig>,
}

impl HarnessConfigBuilder {
    fn config(&mut self) -> &mut HarnessConfig {
        self.config.get_or_insert_with(HarnessConfig::default)
    }

    /// Sets the fold count.
    #[must_use]
    pub fn folds(mut self, folds: usize) -> Self {
        self.config().folds = folds;
        self
    }

    /// Sets the mini-batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config().batch_size = batch_size;
        self
    }

    /// Sets the training epochs per fold.
    #[must_use]
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.config().epochs = epochs;
        self
    }

    /// Sets the shuffle seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config().seed = seed;
        self
    }

    /// Sets the initial learning rate.
    #[must_use]
    pub fn base_lr(mut self, base_lr: f32) -> Self {
        self.config().base_lr = base_lr;
        self
    }

    /// Sets the decay milestones.
    #[must_use]
    pub fn milestones(mut self, milestones: Vec<u64>) -> Self {
        self.config().milestones = milestones;
        self
    }

    /// Sets the decay factor.
    #[must_use]
    pub fn gamma(mut self, gamma: f32) -> Self {
        self.config().gamma = gamma;
        self
    }

    /// Sets the crop options.
    #[must_use]
    pub fn crop(mut self, crop: CropConfig) -> Self {
        self.config().crop = crop;
        self
    }

    /// Finalizes the configuration.
    #[must_use]
    pub fn build(mut self) -> HarnessConfig {
        self.config.take().unwrap_or_default()
    }
}

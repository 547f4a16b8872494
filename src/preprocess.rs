//! Face-crop preprocessing orchestration.
//!
//! The detector and the pixel work live outside this crate, behind the
//! [`FaceDetector`] and [`Cropper`] seams — the same outsourcing the
//! harness applies to the model. What lives here is the directory
//! protocol: walk a `src` tree laid out as one directory per class,
//! mirror that layout under `dest`, run the detector on every image,
//! and crop the top detection to a fixed output size.
//!
//! An image with no detection is logged and skipped; it does not abort
//! the run.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::error::{HarnessError, Result};

/// One detected face: a bounding box in pixel coordinates plus the
/// detector's confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Left edge.
    pub x_min: f32,
    /// Top edge.
    pub y_min: f32,
    /// Right edge.
    pub x_max: f32,
    /// Bottom edge.
    pub y_max: f32,
    /// Detector confidence.
    pub score: f32,
}

/// A pixel-aligned crop rectangle, rounded and clamped to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    /// Left edge in pixels.
    pub left: u32,
    /// Top edge in pixels.
    pub top: u32,
    /// Width in pixels, at least 1.
    pub width: u32,
    /// Height in pixels, at least 1.
    pub height: u32,
}

impl CropRect {
    /// Rounds a detection box to pixels and clamps it to an
    /// `image_width` by `image_height` image.
    ///
    /// # Errors
    ///
    /// `Preprocess` when the clamped box is empty.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_detection(
        detection: &Detection,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self> {
        let left = detection.x_min.round().clamp(0.0, image_width as f32) as u32;
        let right = detection.x_max.round().clamp(0.0, image_width as f32) as u32;
        let top = detection.y_min.round().clamp(0.0, image_height as f32) as u32;
        let bottom = detection.y_max.round().clamp(0.0, image_height as f32) as u32;

        if right <= left || bottom <= top {
            return Err(HarnessError::Preprocess(format!(
                "detection box ({}, {}, {}, {}) collapses to an empty crop in a {}x{} image",
                detection.x_min,
                detection.y_min,
                detection.x_max,
                detection.y_max,
                image_width,
                image_height
            )));
        }

        Ok(Self {
            left,
            top,
            width: right - left,
            height: bottom - top,
        })
    }
}

/// Seam for the third-party face detector.
pub trait FaceDetector {
    /// Detections for one image, best first.
    ///
    /// # Errors
    ///
    /// Implementation-defined detection failure.
    fn detect(&mut self, image: &Path) -> Result<Vec<Detection>>;
}

/// Seam for image inspection and the crop-resize-save pixel work.
pub trait Cropper {
    /// `(width, height)` of the image.
    ///
    /// # Errors
    ///
    /// Implementation-defined read failure.
    fn dimensions(&mut self, image: &Path) -> Result<(u32, u32)>;

    /// Crops `rect` out of `src`, resizes to `out_size`, saves at `dest`.
    ///
    /// # Errors
    ///
    /// Implementation-defined write failure.
    fn crop_resized(
        &mut self,
        src: &Path,
        dest: &Path,
        rect: &CropRect,
        out_size: (u32, u32),
    ) -> Result<()>;
}

/// Options for [`crop_faces`].
#[derive(Debug, Clone)]
pub struct CropOptions {
    /// Output size of every crop, `(width, height)`.
    pub out_size: (u32, u32),
    /// Re-crop even when every destination class directory is populated.
    pub regenerate: bool,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            out_size: (160, 160),
            regenerate: true,
        }
    }
}

/// What [`crop_faces`] did.
#[derive(Debug, Clone)]
pub struct CropSummary {
    /// False when an already-populated destination was left untouched.
    pub regenerated: bool,
    /// Per-class count of crops written (or found, when skipped).
    pub per_class: IndexMap<String, usize>,
    /// Images skipped because the detector found nothing.
    pub skipped: usize,
}

/// Crops every face image under `src` into the mirrored layout under
/// `dest`.
///
/// `src` must contain one subdirectory per class. Destination class
/// directories are created as needed. When none are missing, every one
/// is populated, and `regenerate` is off, nothing is recropped and the
/// existing per-class counts are returned.
///
/// # Errors
///
/// `Preprocess` when `src` has no class directories or a detection box
/// is degenerate; IO and detector/cropper errors propagate.
pub fn crop_faces(
    src: &Path,
    dest: &Path,
    detector: &mut dyn FaceDetector,
    cropper: &mut dyn Cropper,
    options: &CropOptions,
) -> Result<CropSummary> {
    if !dest.is_dir() {
        fs::create_dir_all(dest)?;
        info!(dest = %dest.display(), "created destination directory");
    }

    let classes = subdirectories(src)?;
    if classes.is_empty() {
        return Err(HarnessError::Preprocess(format!(
            "no class directories under {}",
            src.display()
        )));
    }

    let mut missing = Vec::new();
    for class in &classes {
        if !dest.join(class).is_dir() {
            missing.push(class.clone());
        }
    }

    if missing.is_empty() {
        let existing: IndexMap<String, usize> = classes
            .iter()
            .map(|class| Ok((class.clone(), files_in(&dest.join(class))?.len())))
            .collect::<Result<_>>()?;
        let all_populated = existing.values().all(|&count| count > 0);
        if all_populated && !options.regenerate {
            info!("destination already populated, skipping crop");
            return Ok(CropSummary {
                regenerated: false,
                per_class: existing,
                skipped: 0,
            });
        }
    } else {
        info!(classes = ?missing, "creating class directories");
        for class in &missing {
            fs::create_dir_all(dest.join(class))?;
        }
    }

    let mut per_class = IndexMap::new();
    let mut skipped = 0;
    for (class_index, class) in classes.iter().enumerate() {
        let mut count = 0;
        for image in files_in(&src.join(class))? {
            let detections = detector.detect(&image)?;
            let Some(top) = detections.first() else {
                warn!(image = %image.display(), "no detection");
                skipped += 1;
                continue;
            };

            let (width, height) = cropper.dimensions(&image)?;
            let rect = CropRect::from_detection(top, width, height)?;
            let file_name = image.file_name().ok_or_else(|| {
                HarnessError::Preprocess(format!("image path has no file name: {}", image.display()))
            })?;
            cropper.crop_resized(&image, &dest.join(class).join(file_name), &rect, options.out_size)?;
            count += 1;
        }
        info!(
            class = %class,
            done = class_index + 1,
            total = classes.len(),
            "finished cropping class"
        );
        per_class.insert(class.clone(), count);
    }

    Ok(CropSummary {
        regenerated: true,
        per_class,
        skipped,
    })
}

/// Sorted names of the subdirectories of `dir`.
fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Sorted paths of the plain files in `dir`.
fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    /// Detector returning the same centered box for every image, or
    /// nothing for files whose name contains "blank".
    struct FixedDetector;

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, image: &Path) -> Result<Vec<Detection>> {
            if image.to_string_lossy().contains("blank") {
                return Ok(Vec::new());
            }
            Ok(vec![Detection {
                x_min: 10.0,
                y_min: 10.0,
                x_max: 90.0,
                y_max: 90.0,
                score: 0.99,
            }])
        }
    }

    /// Cropper that records each destination by touching the file.
    struct TouchCropper;

    impl Cropper for TouchCropper {
        fn dimensions(&mut self, _image: &Path) -> Result<(u32, u32)> {
            Ok((100, 100))
        }

        fn crop_resized(
            &mut self,
            _src: &Path,
            dest: &Path,
            rect: &CropRect,
            out_size: (u32, u32),
        ) -> Result<()> {
            assert_eq!((rect.width, rect.height), (80, 80));
            assert_eq!(out_size, (160, 160));
            File::create(dest)?;
            Ok(())
        }
    }

    fn make_source(root: &Path, classes: &[(&str, &[&str])]) {
        for (class, images) in classes {
            let dir = root.join(class);
            fs::create_dir_all(&dir).unwrap();
            for image in *images {
                let mut file = File::create(dir.join(image)).unwrap();
                writeln!(file, "pixels").unwrap();
            }
        }
    }

    // ========== CropRect ==========

    #[test]
    fn test_rect_rounds_and_clamps() {
        let detection = Detection {
            x_min: -3.4,
            y_min: 1.6,
            x_max: 104.2,
            y_max: 98.4,
            score: 1.0,
        };
        let rect = CropRect::from_detection(&detection, 100, 100).unwrap();
        assert_eq!(rect, CropRect { left: 0, top: 2, width: 100, height: 96 });
    }

    #[test]
    fn test_rect_empty_box_rejected() {
        let detection = Detection {
            x_min: 50.0,
            y_min: 10.0,
            x_max: 50.2,
            y_max: 90.0,
            score: 1.0,
        };
        assert!(CropRect::from_detection(&detection, 100, 100).is_err());
    }

    #[test]
    fn test_rect_fully_outside_image_rejected() {
        let detection = Detection {
            x_min: 120.0,
            y_min: 10.0,
            x_max: 150.0,
            y_max: 90.0,
            score: 1.0,
        };
        assert!(CropRect::from_detection(&detection, 100, 100).is_err());
    }

    // ========== crop_faces ==========

    #[test]
    fn test_crop_creates_layout_and_counts() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let dest = dest.path().join("cropped");
        make_source(src.path(), &[("alice", &["a.png", "b.png"]), ("bob", &["c.png"])]);

        let summary = crop_faces(
            src.path(),
            &dest,
            &mut FixedDetector,
            &mut TouchCropper,
            &CropOptions::default(),
        )
        .unwrap();

        assert!(summary.regenerated);
        assert_eq!(summary.per_class.get("alice"), Some(&2));
        assert_eq!(summary.per_class.get("bob"), Some(&1));
        assert_eq!(summary.skipped, 0);
        assert!(dest.join("alice/a.png").is_file());
        assert!(dest.join("bob/c.png").is_file());
    }

    #[test]
    fn test_no_detection_skips_image() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        make_source(src.path(), &[("alice", &["a.png", "blank.png"])]);

        let summary = crop_faces(
            src.path(),
            dest.path(),
            &mut FixedDetector,
            &mut TouchCropper,
            &CropOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.per_class.get("alice"), Some(&1));
        assert!(!dest.path().join("alice/blank.png").exists());
    }

    #[test]
    fn test_populated_destination_skipped_without_regenerate() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        make_source(src.path(), &[("alice", &["a.png"])]);

        let options = CropOptions {
            regenerate: false,
            ..CropOptions::default()
        };

        // First run populates.
        let first = crop_faces(
            src.path(),
            dest.path(),
            &mut FixedDetector,
            &mut TouchCropper,
            &options,
        )
        .unwrap();
        assert!(first.regenerated);

        // Second run finds everything in place and leaves it alone.
        let second = crop_faces(
            src.path(),
            dest.path(),
            &mut FixedDetector,
            &mut TouchCropper,
            &options,
        )
        .unwrap();
        assert!(!second.regenerated);
        assert_eq!(second.per_class.get("alice"), Some(&1));
    }

    #[test]
    fn test_regenerate_recrops_populated_destination() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        make_source(src.path(), &[("alice", &["a.png"])]);

        let options = CropOptions::default();
        crop_faces(src.path(), dest.path(), &mut FixedDetector, &mut TouchCropper, &options)
            .unwrap();
        let again = crop_faces(
            src.path(),
            dest.path(),
            &mut FixedDetector,
            &mut TouchCropper,
            &options,
        )
        .unwrap();
        assert!(again.regenerated);
    }

    #[test]
    fn test_empty_source_rejected() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let result = crop_faces(
            src.path(),
            dest.path(),
            &mut FixedDetector,
            &mut TouchCropper,
            &CropOptions::default(),
        );
        assert!(result.is_err());
    }
}

//! Persisted composite masks, one `.npy` artifact per image.
//!
//! A composite is a boolean array of shape (height, width, label-count),
//! channel order following the label enumeration order. The in-memory copy
//! mirrors what is on disk: every mutation is computed on a copy, persisted
//! first, and only then committed to the cache, so a storage failure never
//! leaves memory ahead of disk.
//!
//! Writes go to a temp file in the artifact directory and are renamed into
//! place, so a concurrent reader never observes a partially-written array.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use ndarray::{s, Array3};
use ndarray_npy::{read_npy, write_npy, ReadNpyError, WriteNpyError};
use thiserror::Error;

use crate::config::LabelSet;
use crate::dataset::ImageId;
use crate::mask::{Mask, OVERLAY_ALPHA};

/// File extension of mask artifacts.
pub const MASK_EXTENSION: &str = "npy";

/// Path of the mask artifact for an image: `<mask_dir>/<image>.npy`.
pub fn artifact_path(mask_dir: &Path, id: &ImageId) -> PathBuf {
    mask_dir.join(format!("{id}.{MASK_EXTENSION}"))
}

/// Errors that can occur during mask store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write mask artifact: {0}")]
    Write(#[from] WriteNpyError),

    #[error("failed to read mask artifact: {0}")]
    Read(#[from] ReadNpyError),

    #[error("unknown label: {0}")]
    UnknownLabel(String),

    #[error("mask dimensions {found:?} do not match composite dimensions {expected:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("mask artifact for {image} has {found} label planes, expected {expected}")]
    LabelCountMismatch {
        image: ImageId,
        found: usize,
        expected: usize,
    },
}

/// Store of the persisted per-image, per-label composite masks.
pub struct MaskStore {
    root: PathBuf,
    labels: LabelSet,
    cache: HashMap<ImageId, Array3<bool>>,
}

impl MaskStore {
    /// Open a store rooted at `mask_dir`, creating the directory if needed.
    pub fn new(mask_dir: impl Into<PathBuf>, labels: LabelSet) -> Result<Self, StoreError> {
        let root = mask_dir.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            labels,
            cache: HashMap::new(),
        })
    }

    /// The label enumeration this store was opened with.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Whether a mask artifact exists on disk for this image.
    pub fn is_labeled(&self, id: &ImageId) -> bool {
        artifact_path(&self.root, id).is_file()
    }

    /// Merge a candidate into the label's plane: `plane |= mask`.
    ///
    /// The composite is created lazily from the candidate's dimensions on the
    /// first merge for an image. Persists before returning.
    pub fn merge(&mut self, id: &ImageId, label: &str, mask: &Mask) -> Result<(), StoreError> {
        let plane = self.label_index(label)?;
        let mut composite = match self.composite(id)? {
            Some(composite) => {
                check_dimensions(&composite, mask)?;
                composite
            }
            None => Array3::from_elem(
                (
                    mask.height() as usize,
                    mask.width() as usize,
                    self.labels.len(),
                ),
                false,
            ),
        };

        composite
            .slice_mut(s![.., .., plane])
            .zip_mut_with(mask.as_array(), |p, &m| *p = *p || m);

        log::debug!("merged {} pixels into {id}/{label}", mask.count());
        self.persist(id, composite)
    }

    /// Remove a candidate from the label's plane: `plane &= !mask`.
    ///
    /// Subtracting from an image with no artifact is a no-op. Persists before
    /// returning.
    pub fn subtract(&mut self, id: &ImageId, label: &str, mask: &Mask) -> Result<(), StoreError> {
        let plane = self.label_index(label)?;
        let Some(mut composite) = self.composite(id)? else {
            log::debug!("nothing stored for {id}, subtract is a no-op");
            return Ok(());
        };
        check_dimensions(&composite, mask)?;

        composite
            .slice_mut(s![.., .., plane])
            .zip_mut_with(mask.as_array(), |p, &m| *p = *p && !m);

        log::debug!("subtracted {} pixels from {id}/{label}", mask.count());
        self.persist(id, composite)
    }

    /// Zero one label's plane, or every plane when `label` is `None`.
    ///
    /// A composite that ends up all-false is deleted from disk, so the image
    /// reads as unlabeled again. Idempotent.
    pub fn clear(&mut self, id: &ImageId, label: Option<&str>) -> Result<(), StoreError> {
        match label {
            None => {
                log::info!("clearing all labels for {id}");
                self.cache.remove(id);
                remove_if_present(&artifact_path(&self.root, id))?;
                Ok(())
            }
            Some(label) => {
                let plane = self.label_index(label)?;
                let Some(mut composite) = self.composite(id)? else {
                    return Ok(());
                };
                log::info!("clearing {id}/{label}");
                composite.slice_mut(s![.., .., plane]).fill(false);
                self.persist(id, composite)
            }
        }
    }

    /// Read one label's plane for an image, if anything is stored.
    pub fn mask(&mut self, id: &ImageId, label: &str) -> Result<Option<Mask>, StoreError> {
        let plane = self.label_index(label)?;
        Ok(self
            .composite(id)?
            .map(|composite| Mask::from_array(composite.slice(s![.., .., plane]).to_owned())))
    }

    /// Composite all labels into a single colorized overlay.
    ///
    /// A pixel claimed by several labels renders as the earliest label in
    /// enumeration order. Read-only with respect to stored masks; returns
    /// `None` when nothing is stored for the image.
    pub fn render(&mut self, id: &ImageId) -> Result<Option<RgbaImage>, StoreError> {
        let Some(composite) = self.composite(id)? else {
            return Ok(None);
        };
        let (height, width, planes) = composite.dim();

        let mut image = RgbaImage::new(width as u32, height as u32);
        for y in 0..height {
            for x in 0..width {
                for plane in 0..planes {
                    if composite[[y, x, plane]] {
                        let color = self.labels.by_index(plane).map(|l| l.color).unwrap_or([
                            255, 255, 255,
                        ]);
                        image.put_pixel(
                            x as u32,
                            y as u32,
                            Rgba([color[0], color[1], color[2], OVERLAY_ALPHA]),
                        );
                        break;
                    }
                }
            }
        }
        Ok(Some(image))
    }

    fn label_index(&self, label: &str) -> Result<usize, StoreError> {
        self.labels
            .index_of(label)
            .ok_or_else(|| StoreError::UnknownLabel(label.to_string()))
    }

    /// The image's composite as a mutable copy, loading from disk on a cache
    /// miss. `None` when no artifact exists.
    fn composite(&mut self, id: &ImageId) -> Result<Option<Array3<bool>>, StoreError> {
        if let Some(composite) = self.cache.get(id) {
            return Ok(Some(composite.clone()));
        }

        let path = artifact_path(&self.root, id);
        if !path.is_file() {
            return Ok(None);
        }

        let composite: Array3<bool> = read_npy(&path)?;
        let planes = composite.dim().2;
        if planes != self.labels.len() {
            return Err(StoreError::LabelCountMismatch {
                image: id.clone(),
                found: planes,
                expected: self.labels.len(),
            });
        }
        log::debug!("loaded composite for {id} from {path:?}");
        self.cache.insert(id.clone(), composite.clone());
        Ok(Some(composite))
    }

    /// Persist a mutated composite, then commit it to the cache.
    ///
    /// An all-false composite deletes the artifact instead. On failure the
    /// cache keeps the last persisted value.
    fn persist(&mut self, id: &ImageId, composite: Array3<bool>) -> Result<(), StoreError> {
        let path = artifact_path(&self.root, id);

        if composite.iter().any(|&v| v) {
            let tmp = self.root.join(format!("{id}.{MASK_EXTENSION}.tmp"));
            if let Err(e) = write_npy(&tmp, &composite) {
                let _ = fs::remove_file(&tmp);
                return Err(e.into());
            }
            fs::rename(&tmp, &path)?;
            self.cache.insert(id.clone(), composite);
        } else {
            remove_if_present(&path)?;
            self.cache.remove(id);
        }
        Ok(())
    }
}

fn check_dimensions(composite: &Array3<bool>, mask: &Mask) -> Result<(), StoreError> {
    let (height, width, _) = composite.dim();
    let found = (mask.height() as usize, mask.width() as usize);
    if (height, width) != found {
        return Err(StoreError::DimensionMismatch {
            expected: (height, width),
            found,
        });
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

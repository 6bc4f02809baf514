//! Dataset enumeration and completion status.
//!
//! The index is built once from a directory listing and never mutated; all
//! session state lives elsewhere. Completion status is answered straight from
//! the mask artifact directory, so it always reflects what is actually
//! persisted.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store;

/// Supported image file extensions.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff", "tif"];

/// Check if a filename has a supported image extension.
pub fn is_image_file(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Opaque identifier naming one dataset image (its file name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Errors that can occur while building the dataset index.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no images found in {0:?}")]
    Empty(PathBuf),
}

/// Immutable, ordered index of the dataset images.
#[derive(Debug, Clone)]
pub struct DatasetIndex {
    images: Vec<ImageId>,
    mask_dir: PathBuf,
}

impl DatasetIndex {
    /// Enumerate an image directory.
    ///
    /// Files are filtered by [`IMAGE_EXTENSIONS`] and sorted by name; that
    /// order is the navigation order for the whole session. `mask_dir` is
    /// where completion status is looked up.
    pub fn scan(image_dir: &Path, mask_dir: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let mut names: Vec<String> = std::fs::read_dir(image_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_image_file(name))
            .collect();
        names.sort();

        log::info!("indexed {} images in {:?}", names.len(), image_dir);
        Self::from_images(names.into_iter().map(ImageId::new).collect(), mask_dir)
            .map_err(|_| DatasetError::Empty(image_dir.to_path_buf()))
    }

    /// Build an index from an already-enumerated image list, kept in the
    /// given order.
    pub fn from_images(
        images: Vec<ImageId>,
        mask_dir: impl Into<PathBuf>,
    ) -> Result<Self, DatasetError> {
        let mask_dir = mask_dir.into();
        if images.is_empty() {
            return Err(DatasetError::Empty(mask_dir));
        }
        Ok(Self { images, mask_dir })
    }

    /// All image identifiers in load-time order.
    pub fn images(&self) -> &[ImageId] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        // construction guarantees at least one image
        self.images.is_empty()
    }

    pub fn first(&self) -> &ImageId {
        &self.images[0]
    }

    pub fn get(&self, index: usize) -> Option<&ImageId> {
        self.images.get(index)
    }

    /// Position of an image in the iteration order.
    pub fn position(&self, id: &ImageId) -> Option<usize> {
        self.images.iter().position(|i| i == id)
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.position(id).is_some()
    }

    /// Whether a mask artifact exists on disk for this image (any label).
    pub fn is_labeled(&self, id: &ImageId) -> bool {
        store::artifact_path(&self.mask_dir, id).is_file()
    }

    /// Number of images with a persisted mask artifact.
    pub fn labeled_count(&self) -> usize {
        self.images.iter().filter(|id| self.is_labeled(id)).count()
    }

    /// The artifact directory this index reads completion status from.
    pub fn mask_dir(&self) -> &Path {
        &self.mask_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("masklab_dataset_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file("test.png"));
        assert!(is_image_file("test.PNG"));
        assert!(is_image_file("test.jpeg"));
        assert!(!is_image_file("test.txt"));
        assert!(!is_image_file("test.npy"));
        assert!(!is_image_file(""));
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let images = test_dir("scan_images");
        let masks = test_dir("scan_masks");
        for name in ["b.png", "a.jpg", "notes.txt", "c.bmp"] {
            fs::write(images.join(name), b"x").unwrap();
        }

        let index = DatasetIndex::scan(&images, &masks).unwrap();
        let names: Vec<&str> = index.images().iter().map(|i| i.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.bmp"]);

        let _ = fs::remove_dir_all(&images);
        let _ = fs::remove_dir_all(&masks);
    }

    #[test]
    fn test_scan_empty_dir_rejected() {
        let images = test_dir("empty_images");
        let masks = test_dir("empty_masks");
        assert!(matches!(
            DatasetIndex::scan(&images, &masks),
            Err(DatasetError::Empty(_))
        ));
        let _ = fs::remove_dir_all(&images);
        let _ = fs::remove_dir_all(&masks);
    }

    #[test]
    fn test_position_lookup() {
        let masks = test_dir("position_masks");
        let index = DatasetIndex::from_images(
            vec![ImageId::from("a.png"), ImageId::from("b.png")],
            &masks,
        )
        .unwrap();

        assert_eq!(index.position(&ImageId::from("b.png")), Some(1));
        assert_eq!(index.position(&ImageId::from("zzz.png")), None);
        assert!(index.contains(&ImageId::from("a.png")));
        assert_eq!(index.first().as_str(), "a.png");

        let _ = fs::remove_dir_all(&masks);
    }

    #[test]
    fn test_is_labeled_tracks_artifacts() {
        let masks = test_dir("labeled_masks");
        let index = DatasetIndex::from_images(
            vec![ImageId::from("a.png"), ImageId::from("b.png")],
            &masks,
        )
        .unwrap();

        assert!(!index.is_labeled(&ImageId::from("a.png")));
        assert_eq!(index.labeled_count(), 0);

        fs::write(store::artifact_path(&masks, &ImageId::from("a.png")), b"x").unwrap();
        assert!(index.is_labeled(&ImageId::from("a.png")));
        assert!(!index.is_labeled(&ImageId::from("b.png")));
        assert_eq!(index.labeled_count(), 1);

        let _ = fs::remove_dir_all(&masks);
    }
}

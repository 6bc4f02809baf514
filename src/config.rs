//! Label configuration.
//!
//! The label enumeration is loaded once at startup and stays fixed for the
//! session lifetime. Entry order matters: it is the enumeration order used
//! everywhere (render precedence, persisted channel order), and the first
//! entry is the default-selected label.
//!
//! # File format
//!
//! A JSON array, so the enumeration order survives parsing:
//!
//! ```json
//! [
//!   { "name": "person", "color": [220, 40, 40] },
//!   { "name": "vehicle" }
//! ]
//! ```
//!
//! `color` may be omitted; a distinct color is then generated from the
//! entry's position.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single label definition with a display color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDef {
    /// Display name of the label.
    pub name: String,
    /// RGB color used when rendering overlays.
    pub color: [u8; 3],
}

impl LabelDef {
    pub fn new(name: impl Into<String>, color: [u8; 3]) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }
}

/// Raw file entry; `color` is optional in the file but not in [`LabelDef`].
#[derive(Deserialize)]
struct LabelEntry {
    name: String,
    #[serde(default)]
    color: Option<[u8; 3]>,
}

/// The fixed, ordered set of labels for a session.
#[derive(Debug, Clone)]
pub struct LabelSet {
    labels: Vec<LabelDef>,
}

impl LabelSet {
    /// Build a label set, validating that it is non-empty and duplicate-free.
    pub fn new(labels: Vec<LabelDef>) -> Result<Self, ConfigError> {
        if labels.is_empty() {
            return Err(ConfigError::Empty);
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].iter().any(|l| l.name == label.name) {
                return Err(ConfigError::Duplicate {
                    name: label.name.clone(),
                });
            }
        }
        Ok(Self { labels })
    }

    /// Parse a label set from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let entries: Vec<LabelEntry> = serde_json::from_str(json)?;
        let labels = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| LabelDef {
                color: entry.color.unwrap_or_else(|| generated_color(i)),
                name: entry.name,
            })
            .collect();
        Self::new(labels)
    }

    /// Load a label set from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let set = Self::from_json(&json)?;
        log::info!("loaded {} labels from {:?}", set.len(), path);
        Ok(set)
    }

    /// Labels in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = &LabelDef> {
        self.labels.iter()
    }

    /// The default-selected label (first entry by enumeration order).
    pub fn first(&self) -> &LabelDef {
        &self.labels[0]
    }

    pub fn get(&self, name: &str) -> Option<&LabelDef> {
        self.labels.iter().find(|l| l.name == name)
    }

    /// Position of a label in enumeration order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|l| l.name == name)
    }

    pub fn by_index(&self, index: usize) -> Option<&LabelDef> {
        self.labels.get(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        // a constructed set is never empty, but the contract stays honest
        self.labels.is_empty()
    }
}

/// Generate a color for the label at `index`.
///
/// Golden-angle hue stepping keeps neighboring labels visually distinct.
fn generated_color(index: usize) -> [u8; 3] {
    let hue = (index as f32 * 137.5) % 360.0;
    let (r, g, b) = hsv_to_rgb(hue, 0.7, 0.9);
    [
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ]
}

/// Convert HSV to RGB (h in degrees, s and v in 0-1).
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (r + m, g + m, b + m)
}

/// Errors that can occur while loading the label configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse label configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("label configuration defines no labels")]
    Empty,

    #[error("duplicate label name: {name}")]
    Duplicate { name: String },
}

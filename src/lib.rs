//! masklab - point-prompt semantic segmentation labeling engine.
//!
//! An interactive session engine for building per-pixel multi-label masks
//! over an image dataset: sparse positive/negative click prompts are turned
//! into candidate masks by an injected segmentation oracle and composited
//! into persisted per-image annotations, one `.npy` array per image.
//!
//! The crate is headless. A presentation layer drives a [`Session`] (or the
//! underlying [`SessionEngine`] for async oracle dispatch) and renders the
//! overlays it returns; the segmentation model itself is supplied through
//! the [`SegmentationOracle`] trait.

pub mod config;
pub mod dataset;
pub mod engine;
pub mod mask;
pub mod navigator;
pub mod oracle;
pub mod prompt;
pub mod session;
pub mod store;

pub use config::{ConfigError, LabelDef, LabelSet};
pub use dataset::{DatasetError, DatasetIndex, ImageId};
pub use engine::{Delivery, EngineError, Mode, Phase, SessionEngine};
pub use mask::Mask;
pub use navigator::Direction;
pub use oracle::{OracleError, OracleRequest, PredictQuery, SegmentationOracle};
pub use prompt::PointPrompt;
pub use session::Session;
pub use store::{MaskStore, StoreError};

//! The segmentation oracle boundary.
//!
//! The oracle is an external collaborator: it turns an image plus an ordered
//! prompt sequence into a candidate mask. This crate only defines the seam.
//! The expensive step is the one-time-per-image embedding precompute; the
//! per-prompt prediction is a pure function of (embedding, prompt sequence),
//! so recomputing a candidate for the same prompts yields the same mask.

use thiserror::Error;

use crate::dataset::ImageId;
use crate::mask::Mask;
use crate::prompt::PointPrompt;

/// Errors surfaced by a segmentation oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("embedding precompute failed: {0}")]
    Precompute(String),

    #[error("prediction failed: {0}")]
    Predict(String),
}

/// A point-prompt segmentation model.
///
/// `precompute` is idempotent per image and may be cached by the caller.
/// `predict` must be stateless per call: the same embedding and prompt
/// sequence always produce the same mask.
pub trait SegmentationOracle {
    /// Opaque per-image embedding handle produced by `precompute`.
    type Embedding;

    /// Run the one-time embedding computation for an image.
    fn precompute(&mut self, image: &ImageId) -> Result<Self::Embedding, OracleError>;

    /// Predict a candidate mask from the full accumulated prompt sequence,
    /// in insertion order.
    fn predict(
        &self,
        embedding: &Self::Embedding,
        prompts: &[PointPrompt],
    ) -> Result<Mask, OracleError>;
}

/// A prediction request, attributed to the exact prompt sequence that
/// produced it.
///
/// The engine stamps every query with the prompt set's revision; a response
/// delivered with a revision that no longer matches was computed against
/// superseded prompts and is dropped rather than applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictQuery {
    pub image: ImageId,
    pub revision: u64,
    pub prompts: Vec<PointPrompt>,
}

/// Oracle work the session engine asks its caller to run.
///
/// The caller runs the request wherever it likes (inline, worker thread) and
/// feeds the result back through the engine's delivery methods; the engine
/// decides there whether the result still applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleRequest {
    /// Compute (or fetch cached) embeddings for an image.
    Precompute { image: ImageId },
    /// Predict a candidate mask for a prompt sequence.
    Predict(PredictQuery),
}

//! Synchronous session facade.
//!
//! [`Session`] owns a [`SessionEngine`] together with the oracle and a
//! per-image embedding cache, and runs every emitted [`OracleRequest`]
//! against the oracle before returning. The presentation layer gets plain
//! blocking calls (`open`, `add_prompt`, `accept`, ...) while the engine
//! underneath still attributes every response to its originating image and
//! prompt revision. An async caller that wants to run oracle work on its
//! own threads can drive the engine directly instead.

use std::collections::HashMap;

use image::RgbaImage;

use crate::dataset::{DatasetIndex, ImageId};
use crate::engine::{EngineError, Mode, Phase, SessionEngine};
use crate::mask::Mask;
use crate::navigator::Direction;
use crate::oracle::{OracleError, OracleRequest, SegmentationOracle};
use crate::prompt::PointPrompt;
use crate::store::MaskStore;

/// A complete annotation session: engine, oracle, and embedding cache.
pub struct Session<O: SegmentationOracle> {
    engine: SessionEngine,
    oracle: O,
    embeddings: HashMap<ImageId, O::Embedding>,
}

impl<O: SegmentationOracle> Session<O> {
    pub fn new(index: DatasetIndex, store: MaskStore, oracle: O) -> Self {
        Self {
            engine: SessionEngine::new(index, store),
            oracle,
            embeddings: HashMap::new(),
        }
    }

    /// Open an image and run its embedding precompute (cached after the
    /// first visit). On precompute failure the image stays open but
    /// prediction is unavailable until it is re-opened.
    pub fn open(&mut self, id: &ImageId) -> Result<(), EngineError> {
        let request = self.engine.open(id)?;
        self.run(request)
    }

    /// Step to the next/previous image and open it.
    pub fn navigate(
        &mut self,
        direction: Direction,
        unlabeled_only: bool,
    ) -> Result<ImageId, EngineError> {
        let (target, request) = self.engine.navigate(direction, unlabeled_only)?;
        self.run(request)?;
        Ok(target)
    }

    /// Append a prompt and predict a fresh candidate for the accumulated
    /// sequence; returns with the candidate ready.
    pub fn add_prompt(&mut self, x: u32, y: u32, validity: bool) -> Result<(), EngineError> {
        let query = self.engine.add_prompt(x, y, validity)?;
        self.run(OracleRequest::Predict(query))
    }

    /// The mode-dispatching point entry: review mode accumulates a prompt
    /// and leaves the candidate for review; instant mode predicts and
    /// commits in one call, with no candidate phase visible afterwards.
    pub fn point_event(&mut self, x: u32, y: u32, validity: bool) -> Result<(), EngineError> {
        let query = self.engine.point_event(x, y, validity)?;
        self.run(OracleRequest::Predict(query))
    }

    /// Merge the ready candidate into the label's composite.
    ///
    /// In review mode the selection survives: the candidate is recomputed
    /// for the preserved prompts so a [`Session::negate`] can follow
    /// immediately. The commit itself is authoritative; a failed recompute
    /// only costs the preview and is logged, not surfaced.
    pub fn accept(&mut self, label: &str) -> Result<(), EngineError> {
        if let Some(query) = self.engine.accept(label)? {
            if let Err(e) = self.run(OracleRequest::Predict(query)) {
                log::warn!("candidate recompute after accept failed: {e}");
            }
        }
        Ok(())
    }

    /// Subtract the ready candidate from the label's composite.
    pub fn negate(&mut self, label: &str) -> Result<(), EngineError> {
        if let Some(query) = self.engine.negate(label)? {
            if let Err(e) = self.run(OracleRequest::Predict(query)) {
                log::warn!("candidate recompute after negate failed: {e}");
            }
        }
        Ok(())
    }

    pub fn clear_prompts(&mut self) -> Result<(), EngineError> {
        self.engine.clear_prompts()
    }

    pub fn clear_label(&mut self, label: Option<&str>) -> Result<(), EngineError> {
        self.engine.clear_label(label)
    }

    pub fn set_label(&mut self, label: &str) -> Result<(), EngineError> {
        self.engine.set_label(label)
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.engine.set_mode(mode);
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    pub fn current_image(&self) -> Option<&ImageId> {
        self.engine.current_image()
    }

    pub fn current_label(&self) -> &str {
        self.engine.current_label()
    }

    pub fn mode(&self) -> Mode {
        self.engine.mode()
    }

    pub fn phase(&self) -> Phase {
        self.engine.phase()
    }

    pub fn prompts(&self) -> &[PointPrompt] {
        self.engine.prompts()
    }

    pub fn candidate(&self) -> Option<&Mask> {
        self.engine.candidate()
    }

    pub fn render(&mut self) -> Result<Option<RgbaImage>, EngineError> {
        self.engine.render()
    }

    pub fn mask(&mut self, label: &str) -> Result<Option<Mask>, EngineError> {
        self.engine.mask(label)
    }

    pub fn progress(&self) -> (usize, usize) {
        self.engine.progress()
    }

    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    // ------------------------------------------------------------------
    // Oracle dispatch
    // ------------------------------------------------------------------

    fn run(&mut self, request: OracleRequest) -> Result<(), EngineError> {
        match request {
            OracleRequest::Precompute { image } => {
                if self.embeddings.contains_key(&image) {
                    let _ = self.engine.embeddings_ready(&image);
                    return Ok(());
                }
                match self.oracle.precompute(&image) {
                    Ok(embedding) => {
                        self.embeddings.insert(image.clone(), embedding);
                        let _ = self.engine.embeddings_ready(&image);
                        Ok(())
                    }
                    Err(error) => {
                        let _ = self.engine.embeddings_failed(&image, error.clone());
                        Err(EngineError::PredictionUnavailable(error))
                    }
                }
            }
            OracleRequest::Predict(query) => {
                let embedding = self.embeddings.get(&query.image).ok_or_else(|| {
                    OracleError::Precompute(format!("no embeddings cached for {}", query.image))
                })?;
                match self.oracle.predict(embedding, &query.prompts) {
                    Ok(mask) => self
                        .engine
                        .prediction_ready(&query.image, query.revision, mask)
                        .map(|_| ()),
                    Err(error) => {
                        let _ =
                            self.engine
                                .prediction_failed(&query.image, query.revision, &error);
                        Err(EngineError::PredictionUnavailable(error))
                    }
                }
            }
        }
    }
}

//! The annotation session state machine.
//!
//! One engine instance owns all session state: the open image, the selected
//! label, the interaction mode, the accumulated prompts, and the candidate
//! mask awaiting a commit decision. Oracle work is not run here: operations
//! that need the oracle return an [`OracleRequest`] for the caller to
//! execute, and the result comes back through the delivery methods
//! ([`SessionEngine::embeddings_ready`], [`SessionEngine::prediction_ready`],
//! ...). Every delivery is checked against the originating image (and prompt
//! revision, for predictions) before it is applied; anything the session has
//! moved past is discarded as stale. Navigating away from an image is the
//! implicit cancellation of its in-flight work.

use image::RgbaImage;
use thiserror::Error;

use crate::dataset::{DatasetIndex, ImageId};
use crate::mask::Mask;
use crate::navigator::{self, Direction};
use crate::oracle::{OracleError, OracleRequest, PredictQuery};
use crate::prompt::{PointPrompt, PromptSet};
use crate::store::{MaskStore, StoreError};

/// Where the session currently is in the annotate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No image open.
    Idle,
    /// Image open, embeddings precomputing or ready, no candidate pending.
    ImageOpen,
    /// Prompts accumulated, candidate stale or still being predicted.
    Prompting,
    /// A candidate for the current prompt sequence is ready to commit.
    CandidateReady,
}

/// Interaction mode. Orthogonal to [`Phase`]: it changes which transitions
/// fire automatically, not which states exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Every candidate is reviewed; accept/negate are explicit calls.
    #[default]
    Review,
    /// Each point event commits immediately using its own validity flag.
    Instant,
}

/// What happened to a delivered oracle response.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Applied to the session.
    Applied,
    /// Applied and committed straight into the mask store (instant mode).
    Committed,
    /// Arrived for an image or prompt sequence the session has moved past;
    /// discarded without touching any state.
    Stale,
}

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no image is open")]
    NoImageOpen,

    #[error("unknown image: {0}")]
    UnknownImage(ImageId),

    #[error("unknown label: {0}")]
    UnknownLabel(String),

    #[error("no candidate mask is ready to commit")]
    NothingToCommit,

    #[error("prediction unavailable: {0}")]
    PredictionUnavailable(#[from] OracleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Embedding precompute status for the current image.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EmbeddingStatus {
    None,
    Pending(ImageId),
    Ready(ImageId),
    Failed(ImageId, OracleError),
}

/// An instant-mode commit decision, snapshotted at the point event.
#[derive(Debug, Clone)]
struct PendingCommit {
    label: String,
    additive: bool,
}

/// The annotation session engine.
pub struct SessionEngine {
    index: DatasetIndex,
    store: MaskStore,
    prompts: PromptSet,
    candidate: Option<Mask>,
    pending_commit: Option<PendingCommit>,
    current: Option<ImageId>,
    label: String,
    mode: Mode,
    phase: Phase,
    embeddings: EmbeddingStatus,
}

impl SessionEngine {
    /// Create an engine over a dataset. The default label is the first entry
    /// of the label enumeration; the default mode is review.
    pub fn new(index: DatasetIndex, store: MaskStore) -> Self {
        let label = store.labels().first().name.clone();
        Self {
            index,
            store,
            prompts: PromptSet::new(),
            candidate: None,
            pending_commit: None,
            current: None,
            label,
            mode: Mode::default(),
            phase: Phase::Idle,
            embeddings: EmbeddingStatus::None,
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Open an image, resetting the whole per-image session state.
    ///
    /// Prompts, candidate, and any pending instant commit are discarded; the
    /// returned request asks the caller to run the embedding precompute,
    /// which must at least be in flight before the first prompt query.
    pub fn open(&mut self, id: &ImageId) -> Result<OracleRequest, EngineError> {
        if !self.index.contains(id) {
            return Err(EngineError::UnknownImage(id.clone()));
        }
        log::info!("opening {id}");
        self.prompts.clear();
        self.candidate = None;
        self.pending_commit = None;
        self.current = Some(id.clone());
        self.phase = Phase::ImageOpen;
        self.embeddings = EmbeddingStatus::Pending(id.clone());
        Ok(OracleRequest::Precompute { image: id.clone() })
    }

    /// Step to the next/previous image and open it.
    ///
    /// With no image open, navigation starts at the first dataset image.
    pub fn navigate(
        &mut self,
        direction: Direction,
        unlabeled_only: bool,
    ) -> Result<(ImageId, OracleRequest), EngineError> {
        let target = match &self.current {
            Some(current) => navigator::step(&self.index, current, direction, unlabeled_only),
            None => self.index.first().clone(),
        };
        let request = self.open(&target)?;
        Ok((target, request))
    }

    // ------------------------------------------------------------------
    // Prompting
    // ------------------------------------------------------------------

    /// Append a prompt and request a fresh candidate prediction.
    ///
    /// Any existing candidate becomes stale the moment a new prompt lands
    /// and is discarded here; it must never be committed. The returned query
    /// carries the full accumulated prompt sequence in insertion order.
    pub fn add_prompt(
        &mut self,
        x: u32,
        y: u32,
        validity: bool,
    ) -> Result<PredictQuery, EngineError> {
        let image = self.require_current()?.clone();
        self.require_embeddings(&image)?;

        if self.candidate.take().is_some() {
            log::debug!("discarding superseded candidate for {image}");
        }
        self.prompts.add(PointPrompt::new(x, y, validity));
        self.phase = Phase::Prompting;
        Ok(self.predict_query(image))
    }

    /// The mode-dispatching point entry.
    ///
    /// In review mode this is exactly [`SessionEngine::add_prompt`]. In
    /// instant mode the click is recorded as a positive prompt and the
    /// event's validity flag is snapshotted with the current label as the
    /// commit decision: when the matching prediction arrives it is merged
    /// (validity true) or subtracted (false) immediately, without a visible
    /// [`Phase::CandidateReady`].
    pub fn point_event(
        &mut self,
        x: u32,
        y: u32,
        validity: bool,
    ) -> Result<PredictQuery, EngineError> {
        match self.mode {
            Mode::Review => self.add_prompt(x, y, validity),
            Mode::Instant => {
                let image = self.require_current()?.clone();
                self.require_embeddings(&image)?;

                self.candidate = None;
                self.prompts.add(PointPrompt::new(x, y, true));
                self.pending_commit = Some(PendingCommit {
                    label: self.label.clone(),
                    additive: validity,
                });
                self.phase = Phase::Prompting;
                Ok(self.predict_query(image))
            }
        }
    }

    /// Discard prompts and candidate without touching the mask store.
    pub fn clear_prompts(&mut self) -> Result<(), EngineError> {
        self.require_current()?;
        self.prompts.clear();
        self.candidate = None;
        self.pending_commit = None;
        self.phase = Phase::ImageOpen;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Committing
    // ------------------------------------------------------------------

    /// Merge the ready candidate into the given label's composite.
    ///
    /// See [`SessionEngine::negate`] for the subtractive twin. In review
    /// mode the prompt set survives the commit and the returned query asks
    /// for the candidate to be recomputed, so the same selection can
    /// immediately be committed the other way; in instant mode the prompt
    /// set is cleared.
    pub fn accept(&mut self, label: &str) -> Result<Option<PredictQuery>, EngineError> {
        self.commit(label, true)
    }

    /// Subtract the ready candidate from the given label's composite.
    ///
    /// This applies a fresh AND-NOT of the current candidate; it is not an
    /// undo of any earlier merge.
    pub fn negate(&mut self, label: &str) -> Result<Option<PredictQuery>, EngineError> {
        self.commit(label, false)
    }

    fn commit(&mut self, label: &str, additive: bool) -> Result<Option<PredictQuery>, EngineError> {
        let image = self.require_current()?.clone();
        if !self.store.labels().contains(label) {
            return Err(EngineError::UnknownLabel(label.to_string()));
        }
        if self.phase != Phase::CandidateReady {
            return Err(EngineError::NothingToCommit);
        }
        let candidate = self.candidate.as_ref().ok_or(EngineError::NothingToCommit)?;

        if additive {
            self.store.merge(&image, label, candidate)?;
        } else {
            self.store.subtract(&image, label, candidate)?;
        }

        // the candidate is consumed by the commit
        self.candidate = None;
        match self.mode {
            Mode::Instant => {
                self.prompts.clear();
                self.phase = Phase::ImageOpen;
                Ok(None)
            }
            Mode::Review => {
                if self.prompts.is_empty() {
                    self.phase = Phase::ImageOpen;
                    Ok(None)
                } else {
                    // keep the selection alive: recompute the candidate for
                    // the preserved prompts so an opposite commit can follow
                    self.phase = Phase::Prompting;
                    Ok(Some(self.predict_query(image)))
                }
            }
        }
    }

    /// Zero one label's composite for the current image, or all labels when
    /// `label` is `None`. Leaves the prompt set untouched.
    pub fn clear_label(&mut self, label: Option<&str>) -> Result<(), EngineError> {
        let image = self.require_current()?.clone();
        self.store.clear(&image, label)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Oracle deliveries
    // ------------------------------------------------------------------

    /// Deliver a finished embedding precompute.
    ///
    /// Discarded as stale unless the session is still waiting on embeddings
    /// for exactly this image.
    pub fn embeddings_ready(&mut self, image: &ImageId) -> Delivery {
        match &self.embeddings {
            EmbeddingStatus::Pending(id) if id == image => {
                log::debug!("embeddings ready for {image}");
                self.embeddings = EmbeddingStatus::Ready(image.clone());
                Delivery::Applied
            }
            _ => {
                log::warn!("discarding stale embeddings for {image}");
                Delivery::Stale
            }
        }
    }

    /// Deliver a failed embedding precompute.
    pub fn embeddings_failed(&mut self, image: &ImageId, error: OracleError) -> Delivery {
        match &self.embeddings {
            EmbeddingStatus::Pending(id) if id == image => {
                log::error!("embedding precompute for {image} failed: {error}");
                self.embeddings = EmbeddingStatus::Failed(image.clone(), error);
                Delivery::Applied
            }
            _ => {
                log::warn!("discarding stale embedding failure for {image}");
                Delivery::Stale
            }
        }
    }

    /// Deliver a predicted candidate mask.
    ///
    /// Applied only when both the image and the prompt revision still match
    /// the session; otherwise the response was computed against superseded
    /// prompts and is dropped. With a pending instant commit the mask is
    /// committed to the store immediately instead of being parked as a
    /// candidate.
    pub fn prediction_ready(
        &mut self,
        image: &ImageId,
        revision: u64,
        mask: Mask,
    ) -> Result<Delivery, EngineError> {
        if self.current.as_ref() != Some(image) || revision != self.prompts.revision() {
            log::warn!("discarding stale prediction for {image} (revision {revision})");
            return Ok(Delivery::Stale);
        }

        if let Some(commit) = self.pending_commit.take() {
            let result = if commit.additive {
                self.store.merge(image, &commit.label, &mask)
            } else {
                self.store.subtract(image, &commit.label, &mask)
            };
            match result {
                Ok(()) => {
                    self.prompts.clear();
                    self.candidate = None;
                    self.phase = Phase::ImageOpen;
                    Ok(Delivery::Committed)
                }
                Err(e) => {
                    // park the candidate so the caller can retry by hand
                    self.candidate = Some(mask);
                    self.phase = Phase::CandidateReady;
                    Err(e.into())
                }
            }
        } else {
            self.candidate = Some(mask);
            self.phase = Phase::CandidateReady;
            Ok(Delivery::Applied)
        }
    }

    /// Deliver a failed prediction.
    ///
    /// The session returns to [`Phase::ImageOpen`] with no stale candidate
    /// left in place; the accumulated prompts survive.
    pub fn prediction_failed(
        &mut self,
        image: &ImageId,
        revision: u64,
        error: &OracleError,
    ) -> Delivery {
        if self.current.as_ref() != Some(image) || revision != self.prompts.revision() {
            log::warn!("discarding stale prediction failure for {image}");
            return Delivery::Stale;
        }
        log::error!("prediction for {image} failed: {error}");
        self.candidate = None;
        self.pending_commit = None;
        self.phase = Phase::ImageOpen;
        Delivery::Applied
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Select the label that instant-mode commits target.
    pub fn set_label(&mut self, label: &str) -> Result<(), EngineError> {
        if !self.store.labels().contains(label) {
            return Err(EngineError::UnknownLabel(label.to_string()));
        }
        self.label = label.to_string();
        Ok(())
    }

    /// Switch interaction mode. Drops any pending instant commit; its
    /// snapshot belongs to the other interaction style.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.pending_commit.take().is_some() {
            log::debug!("dropping pending instant commit on mode change");
        }
        self.mode = mode;
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    pub fn current_image(&self) -> Option<&ImageId> {
        self.current.as_ref()
    }

    pub fn current_label(&self) -> &str {
        &self.label
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The accumulated prompts for the open image, in insertion order.
    pub fn prompts(&self) -> &[PointPrompt] {
        self.prompts.all()
    }

    /// The candidate awaiting a commit decision, if one is ready.
    pub fn candidate(&self) -> Option<&Mask> {
        self.candidate.as_ref()
    }

    pub fn index(&self) -> &DatasetIndex {
        &self.index
    }

    pub fn store(&self) -> &MaskStore {
        &self.store
    }

    /// Colorized overlay of everything persisted for the current image.
    pub fn render(&mut self) -> Result<Option<RgbaImage>, EngineError> {
        let image = self.require_current()?.clone();
        Ok(self.store.render(&image)?)
    }

    /// One label's persisted plane for the current image.
    pub fn mask(&mut self, label: &str) -> Result<Option<Mask>, EngineError> {
        let image = self.require_current()?.clone();
        Ok(self.store.mask(&image, label)?)
    }

    /// (labeled, total) image counts for a completion readout.
    pub fn progress(&self) -> (usize, usize) {
        (self.index.labeled_count(), self.index.len())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_current(&self) -> Result<&ImageId, EngineError> {
        self.current.as_ref().ok_or(EngineError::NoImageOpen)
    }

    /// Prompt queries need the current image's precompute to be at least in
    /// flight; a failed precompute makes prediction unavailable.
    fn require_embeddings(&self, image: &ImageId) -> Result<(), EngineError> {
        match &self.embeddings {
            EmbeddingStatus::Pending(id) | EmbeddingStatus::Ready(id) if id == image => Ok(()),
            EmbeddingStatus::Failed(id, error) if id == image => {
                Err(EngineError::PredictionUnavailable(error.clone()))
            }
            _ => Err(EngineError::PredictionUnavailable(OracleError::Precompute(
                format!("embeddings were never requested for {image}"),
            ))),
        }
    }

    fn predict_query(&self, image: ImageId) -> PredictQuery {
        PredictQuery {
            image,
            revision: self.prompts.revision(),
            prompts: self.prompts.all().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LabelDef, LabelSet};
    use std::fs;
    use std::path::PathBuf;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("masklab_engine_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn labels() -> LabelSet {
        LabelSet::new(vec![
            LabelDef::new("person", [200, 40, 40]),
            LabelDef::new("vehicle", [40, 40, 200]),
        ])
        .unwrap()
    }

    fn engine(name: &str, images: &[&str]) -> SessionEngine {
        let dir = test_dir(name);
        let index = DatasetIndex::from_images(
            images.iter().map(|i| ImageId::from(*i)).collect(),
            &dir,
        )
        .unwrap();
        let store = MaskStore::new(&dir, labels()).unwrap();
        SessionEngine::new(index, store)
    }

    fn id(name: &str) -> ImageId {
        ImageId::from(name)
    }

    fn block(x0: u32, y0: u32, size: u32) -> Mask {
        let mut mask = Mask::zeros(16, 16);
        for y in y0..(y0 + size).min(16) {
            for x in x0..(x0 + size).min(16) {
                mask.set(x, y, true);
            }
        }
        mask
    }

    /// Open an image and acknowledge its precompute, the common preamble.
    fn open_ready(engine: &mut SessionEngine, name: &str) {
        let request = engine.open(&id(name)).unwrap();
        assert_eq!(request, OracleRequest::Precompute { image: id(name) });
        assert_eq!(engine.embeddings_ready(&id(name)), Delivery::Applied);
    }

    #[test]
    fn test_open_resets_and_requests_precompute() {
        let mut engine = engine("open", &["a", "b"]);
        assert_eq!(engine.phase(), Phase::Idle);

        let request = engine.open(&id("a")).unwrap();
        assert_eq!(request, OracleRequest::Precompute { image: id("a") });
        assert_eq!(engine.phase(), Phase::ImageOpen);
        assert_eq!(engine.current_image(), Some(&id("a")));
        assert!(engine.prompts().is_empty());
        assert!(engine.candidate().is_none());
    }

    #[test]
    fn test_open_unknown_image_rejected() {
        let mut engine = engine("open_unknown", &["a"]);
        let result = engine.open(&id("nope"));
        assert!(matches!(result, Err(EngineError::UnknownImage(i)) if i == id("nope")));
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn test_default_label_is_first_entry() {
        let engine = engine("default_label", &["a"]);
        assert_eq!(engine.current_label(), "person");
    }

    #[test]
    fn test_stale_embeddings_discarded_after_navigation() {
        let mut engine = engine("stale_embed", &["x", "y"]);

        // precompute for x is in flight when the session moves to y
        let _ = engine.open(&id("x")).unwrap();
        let _ = engine.open(&id("y")).unwrap();

        assert_eq!(engine.embeddings_ready(&id("x")), Delivery::Stale);
        assert_eq!(engine.current_image(), Some(&id("y")));
        assert!(engine.candidate().is_none());

        // y's own arrival still applies
        assert_eq!(engine.embeddings_ready(&id("y")), Delivery::Applied);
    }

    #[test]
    fn test_queries_replay_full_prompt_sequence() {
        let mut engine = engine("replay", &["a"]);
        open_ready(&mut engine, "a");

        let q1 = engine.add_prompt(1, 1, true).unwrap();
        let q2 = engine.add_prompt(2, 2, false).unwrap();
        let q3 = engine.add_prompt(3, 3, true).unwrap();

        assert_eq!(q1.prompts, vec![PointPrompt::new(1, 1, true)]);
        assert_eq!(
            q2.prompts,
            vec![PointPrompt::new(1, 1, true), PointPrompt::new(2, 2, false)]
        );
        assert_eq!(
            q3.prompts,
            vec![
                PointPrompt::new(1, 1, true),
                PointPrompt::new(2, 2, false),
                PointPrompt::new(3, 3, true)
            ]
        );
        assert!(q1.revision < q2.revision && q2.revision < q3.revision);
    }

    #[test]
    fn test_prediction_applied_only_for_current_revision() {
        let mut engine = engine("revision", &["a"]);
        open_ready(&mut engine, "a");

        let q1 = engine.add_prompt(1, 1, true).unwrap();
        let q2 = engine.add_prompt(2, 2, true).unwrap();

        // the response to the superseded query must never become a candidate
        let stale = engine
            .prediction_ready(&id("a"), q1.revision, block(0, 0, 2))
            .unwrap();
        assert_eq!(stale, Delivery::Stale);
        assert!(engine.candidate().is_none());
        assert_eq!(engine.phase(), Phase::Prompting);

        let applied = engine
            .prediction_ready(&id("a"), q2.revision, block(0, 0, 2))
            .unwrap();
        assert_eq!(applied, Delivery::Applied);
        assert_eq!(engine.phase(), Phase::CandidateReady);
        assert!(engine.candidate().is_some());
    }

    #[test]
    fn test_prediction_for_other_image_discarded() {
        let mut engine = engine("other_image", &["a", "b"]);
        open_ready(&mut engine, "a");
        let q = engine.add_prompt(1, 1, true).unwrap();

        let _ = engine.open(&id("b")).unwrap();
        let delivery = engine
            .prediction_ready(&id("a"), q.revision, block(0, 0, 2))
            .unwrap();
        assert_eq!(delivery, Delivery::Stale);
        assert_eq!(engine.current_image(), Some(&id("b")));
        assert!(engine.candidate().is_none());
    }

    #[test]
    fn test_commit_without_candidate_rejected() {
        let mut engine = engine("no_candidate", &["a"]);
        open_ready(&mut engine, "a");

        assert!(matches!(
            engine.accept("person"),
            Err(EngineError::NothingToCommit)
        ));
        assert!(matches!(
            engine.negate("person"),
            Err(EngineError::NothingToCommit)
        ));
    }

    #[test]
    fn test_commit_unknown_label_rejected() {
        let mut engine = engine("bad_label", &["a"]);
        open_ready(&mut engine, "a");
        let q = engine.add_prompt(1, 1, true).unwrap();
        let _ = engine
            .prediction_ready(&id("a"), q.revision, block(0, 0, 2))
            .unwrap();

        assert!(matches!(
            engine.accept("tree"),
            Err(EngineError::UnknownLabel(name)) if name == "tree"
        ));
    }

    #[test]
    fn test_review_accept_preserves_prompts_and_requeries() {
        let mut engine = engine("review_accept", &["a"]);
        open_ready(&mut engine, "a");

        let q = engine.add_prompt(1, 1, true).unwrap();
        let _ = engine
            .prediction_ready(&id("a"), q.revision, block(0, 0, 2))
            .unwrap();

        let requery = engine.accept("person").unwrap().expect("requery expected");
        assert_eq!(requery.prompts, vec![PointPrompt::new(1, 1, true)]);
        assert_eq!(engine.prompts().len(), 1);
        assert!(engine.candidate().is_none());
        assert_eq!(engine.phase(), Phase::Prompting);

        // the committed region is persisted
        assert_eq!(engine.mask("person").unwrap().unwrap().count(), 4);
    }

    #[test]
    fn test_review_accept_then_negate_roundtrip() {
        let mut engine = engine("accept_negate", &["a"]);
        open_ready(&mut engine, "a");

        let q = engine.add_prompt(1, 1, true).unwrap();
        let _ = engine
            .prediction_ready(&id("a"), q.revision, block(0, 0, 2))
            .unwrap();
        let requery = engine.accept("person").unwrap().unwrap();

        // the recomputed candidate for the same prompts comes back identical
        let _ = engine
            .prediction_ready(&id("a"), requery.revision, block(0, 0, 2))
            .unwrap();
        let _ = engine.negate("person").unwrap();

        // the fresh AND-NOT removed exactly what the accept added
        assert!(engine.mask("person").unwrap().is_none());
        assert!(!engine.index().is_labeled(&id("a")));
    }

    #[test]
    fn test_instant_point_event_commits_and_clears() {
        let mut engine = engine("instant", &["a"]);
        open_ready(&mut engine, "a");
        engine.set_mode(Mode::Instant);

        let q = engine.point_event(1, 1, true).unwrap();
        // the click itself lands as a positive prompt
        assert_eq!(q.prompts, vec![PointPrompt::new(1, 1, true)]);

        let delivery = engine
            .prediction_ready(&id("a"), q.revision, block(0, 0, 4))
            .unwrap();
        assert_eq!(delivery, Delivery::Committed);
        assert_eq!(engine.phase(), Phase::ImageOpen);
        assert!(engine.prompts().is_empty());
        assert!(engine.candidate().is_none());
        assert_eq!(engine.mask("person").unwrap().unwrap().count(), 16);
    }

    #[test]
    fn test_instant_invalid_point_subtracts() {
        let mut engine = engine("instant_negate", &["a"]);
        open_ready(&mut engine, "a");

        // seed a labeled region in review mode
        let q = engine.add_prompt(0, 0, true).unwrap();
        let _ = engine
            .prediction_ready(&id("a"), q.revision, block(0, 0, 4))
            .unwrap();
        let _ = engine.accept("person").unwrap();

        engine.set_mode(Mode::Instant);
        engine.clear_prompts().unwrap();

        // a validity=false click is recorded positive but commits subtractive
        let q = engine.point_event(1, 1, false).unwrap();
        assert_eq!(q.prompts, vec![PointPrompt::new(1, 1, true)]);
        let delivery = engine
            .prediction_ready(&id("a"), q.revision, block(0, 0, 2))
            .unwrap();
        assert_eq!(delivery, Delivery::Committed);
        assert!(engine.prompts().is_empty());
        assert_eq!(engine.phase(), Phase::ImageOpen);

        let remaining = engine.mask("person").unwrap().unwrap();
        assert_eq!(remaining.count(), 12);
        assert!(!remaining.get(0, 0));
    }

    #[test]
    fn test_instant_rapid_clicks_commit_only_latest_sequence() {
        let mut engine = engine("instant_rapid", &["a"]);
        open_ready(&mut engine, "a");
        engine.set_mode(Mode::Instant);

        let q1 = engine.point_event(1, 1, true).unwrap();
        // second click arrives before the first prediction returns
        let q2 = engine.point_event(5, 5, true).unwrap();
        assert_eq!(q2.prompts.len(), 2);

        let first = engine
            .prediction_ready(&id("a"), q1.revision, block(0, 0, 2))
            .unwrap();
        assert_eq!(first, Delivery::Stale);
        assert!(engine.mask("person").unwrap().is_none());

        let second = engine
            .prediction_ready(&id("a"), q2.revision, block(0, 0, 6))
            .unwrap();
        assert_eq!(second, Delivery::Committed);
        assert_eq!(engine.mask("person").unwrap().unwrap().count(), 36);
    }

    #[test]
    fn test_prediction_failure_leaves_no_candidate() {
        let mut engine = engine("predict_fail", &["a"]);
        open_ready(&mut engine, "a");

        let q = engine.add_prompt(1, 1, true).unwrap();
        let delivery = engine.prediction_failed(
            &id("a"),
            q.revision,
            &OracleError::Predict("model crashed".into()),
        );
        assert_eq!(delivery, Delivery::Applied);
        assert_eq!(engine.phase(), Phase::ImageOpen);
        assert!(engine.candidate().is_none());
        // the prompts survive for a retry
        assert_eq!(engine.prompts().len(), 1);
    }

    #[test]
    fn test_failed_precompute_makes_prediction_unavailable() {
        let mut engine = engine("embed_fail", &["a"]);
        let _ = engine.open(&id("a")).unwrap();
        let delivery =
            engine.embeddings_failed(&id("a"), OracleError::Precompute("no model".into()));
        assert_eq!(delivery, Delivery::Applied);

        assert!(matches!(
            engine.add_prompt(1, 1, true),
            Err(EngineError::PredictionUnavailable(_))
        ));
        assert_eq!(engine.phase(), Phase::ImageOpen);
    }

    #[test]
    fn test_clear_prompts_keeps_store() {
        let mut engine = engine("clear_prompts", &["a"]);
        open_ready(&mut engine, "a");

        let q = engine.add_prompt(1, 1, true).unwrap();
        let _ = engine
            .prediction_ready(&id("a"), q.revision, block(0, 0, 2))
            .unwrap();
        let _ = engine.accept("person").unwrap();

        engine.clear_prompts().unwrap();
        assert!(engine.prompts().is_empty());
        assert!(engine.candidate().is_none());
        assert_eq!(engine.phase(), Phase::ImageOpen);
        // composites are untouched
        assert!(engine.mask("person").unwrap().is_some());
    }

    #[test]
    fn test_clear_label_keeps_prompts() {
        let mut engine = engine("clear_label", &["a"]);
        open_ready(&mut engine, "a");

        let q = engine.add_prompt(1, 1, true).unwrap();
        let _ = engine
            .prediction_ready(&id("a"), q.revision, block(0, 0, 2))
            .unwrap();
        let _ = engine.accept("person").unwrap();

        engine.clear_label(Some("person")).unwrap();
        assert!(engine.mask("person").unwrap().is_none());
        // prompts are not part of the composite lifecycle
        assert_eq!(engine.prompts().len(), 1);
    }

    #[test]
    fn test_navigate_opens_and_resets() {
        let mut engine = engine("navigate", &["a", "b", "c"]);

        let (target, _) = engine.navigate(Direction::Forward, false).unwrap();
        assert_eq!(target, id("a"));

        let (target, request) = engine.navigate(Direction::Forward, false).unwrap();
        assert_eq!(target, id("b"));
        assert_eq!(request, OracleRequest::Precompute { image: id("b") });
        assert_eq!(engine.current_image(), Some(&id("b")));
        assert_eq!(engine.phase(), Phase::ImageOpen);
    }

    #[test]
    fn test_set_label_validated() {
        let mut engine = engine("set_label", &["a"]);
        engine.set_label("vehicle").unwrap();
        assert_eq!(engine.current_label(), "vehicle");
        assert!(matches!(
            engine.set_label("tree"),
            Err(EngineError::UnknownLabel(_))
        ));
    }

    #[test]
    fn test_mode_change_drops_pending_commit() {
        let mut engine = engine("mode_change", &["a"]);
        open_ready(&mut engine, "a");
        engine.set_mode(Mode::Instant);

        let q = engine.point_event(1, 1, true).unwrap();
        engine.set_mode(Mode::Review);

        // the delivery now parks a candidate instead of committing
        let delivery = engine
            .prediction_ready(&id("a"), q.revision, block(0, 0, 2))
            .unwrap();
        assert_eq!(delivery, Delivery::Applied);
        assert_eq!(engine.phase(), Phase::CandidateReady);
        assert!(engine.mask("person").unwrap().is_none());
    }

    #[test]
    fn test_progress_counts() {
        let mut engine = engine("progress", &["a", "b"]);
        open_ready(&mut engine, "a");
        assert_eq!(engine.progress(), (0, 2));

        let q = engine.add_prompt(1, 1, true).unwrap();
        let _ = engine
            .prediction_ready(&id("a"), q.revision, block(0, 0, 2))
            .unwrap();
        let _ = engine.accept("person").unwrap();
        assert_eq!(engine.progress(), (1, 2));
    }
}

//! Prompt accumulation for the currently open image.
//!
//! Prompts are append-only within a file: [`PromptSet::clear`] is the only
//! removal path, invoked on file change, explicit reset-selection, and after
//! every instant-mode commit. The full sequence is replayed to the oracle in
//! insertion order on every query.

use serde::{Deserialize, Serialize};

/// A labeled click point fed to the segmentation oracle.
///
/// `validity` true means "this pixel is inside the object", false means
/// "this pixel is outside the object".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPrompt {
    pub x: u32,
    pub y: u32,
    pub validity: bool,
}

impl PointPrompt {
    pub fn new(x: u32, y: u32, validity: bool) -> Self {
        Self { x, y, validity }
    }
}

/// Ordered accumulator of the prompts for the image currently open.
///
/// The revision counter advances on every mutation, so an oracle response can
/// be attributed to the exact prompt sequence that produced it. A response
/// carrying a superseded revision must be dropped, never committed.
#[derive(Debug, Default)]
pub struct PromptSet {
    prompts: Vec<PointPrompt>,
    revision: u64,
}

impl PromptSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a prompt, invalidating any outstanding query.
    pub fn add(&mut self, prompt: PointPrompt) {
        self.prompts.push(prompt);
        self.revision += 1;
        log::trace!(
            "prompt added at ({}, {}), {} accumulated",
            prompt.x,
            prompt.y,
            self.prompts.len()
        );
    }

    /// Discard all prompts, invalidating any outstanding query.
    pub fn clear(&mut self) {
        self.prompts.clear();
        self.revision += 1;
    }

    /// The accumulated prompts in insertion order.
    pub fn all(&self) -> &[PointPrompt] {
        &self.prompts
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let mut set = PromptSet::new();
        set.add(PointPrompt::new(5, 5, true));
        set.add(PointPrompt::new(1, 2, false));
        set.add(PointPrompt::new(9, 0, true));

        let all = set.all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], PointPrompt::new(5, 5, true));
        assert_eq!(all[1], PointPrompt::new(1, 2, false));
        assert_eq!(all[2], PointPrompt::new(9, 0, true));
    }

    #[test]
    fn test_revision_advances_on_every_mutation() {
        let mut set = PromptSet::new();
        let r0 = set.revision();
        set.add(PointPrompt::new(0, 0, true));
        let r1 = set.revision();
        assert!(r1 > r0);

        set.clear();
        let r2 = set.revision();
        assert!(r2 > r1);

        // clearing an already-empty set still invalidates outstanding queries
        set.clear();
        assert!(set.revision() > r2);
    }

    #[test]
    fn test_clear_empties() {
        let mut set = PromptSet::new();
        set.add(PointPrompt::new(3, 4, true));
        assert!(!set.is_empty());
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }
}

//! Memory recall configuration.

/// Options for similarity recall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecallOptions {
    /// Maximum number of records returned.
    pub k: usize,
    /// Scores must be strictly greater than this value.
    pub min_score: f32,
}

impl RecallOptions {
    /// Build options from explicit values.
    pub fn new(k: usize, min_score: f32) -> Self {
        Self { k, min_score }
    }
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            k: 3,
            min_score: 0.6,
        }
    }
}

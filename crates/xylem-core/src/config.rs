//! Compilation policy knobs.

///
/// CompileConfig
///
/// Policy values threaded explicitly through every pass. The automatic
/// staging threshold is policy, not structure, so it lives here rather
/// than as a constant.
///

#[derive(Clone, Debug)]
pub struct CompileConfig {
    /// Automatic staging proceeds only when the optimizer's cardinality
    /// estimate is known and at most this many rows.
    pub auto_stage_row_threshold: u64,

    /// Name prefix for staged temporary relations.
    pub staged_prefix: String,
}

impl CompileConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_auto_stage_threshold(mut self, rows: u64) -> Self {
        self.auto_stage_row_threshold = rows;
        self
    }
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            auto_stage_row_threshold: 1_000,
            staged_prefix: "#stg".into(),
        }
    }
}

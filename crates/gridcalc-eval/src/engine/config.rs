/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on the cells materialized when an open-ended range is
    /// clipped to a sheet's stored extent, and on spill rectangles.
    pub max_materialized_cells: usize,
    /// Passes the recompute loop may take to settle spill-into-read
    /// chains before giving up.
    pub max_recompute_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_materialized_cells: 1 << 20,
            max_recompute_passes: 64,
        }
    }
}

use std::ops::Range;

/// Column layout of a frozen pipeline.
///
/// Every declared step owns a contiguous range of slots in the per-file
/// value vector. Mutating steps own an empty range.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPlan {
    /// Result column names in declaration order (identity column excluded)
    pub columns: Vec<String>,

    /// Slot range per step, indexed by step position
    pub step_columns: Vec<Range<usize>>,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStats {
    /// Total number of declared steps
    pub total_steps: usize,

    /// Steps that transform the surface
    pub mutating_steps: usize,

    /// Steps that contribute result columns
    pub measurement_steps: usize,

    /// Number of result columns
    pub result_columns: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl CompiledPlan {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Slot range written by `step`. Empty for mutating or out-of-range steps.
    pub fn slots(&self, step: usize) -> Range<usize> {
        self.step_columns.get(step).cloned().unwrap_or(0..0)
    }
}

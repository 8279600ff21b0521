//! Pagination cap shared by every iteration-returning query (spec.md §4.5
//! "Pagination cap", §6 "bounded pagination (`MaxIterationLimit=100`)").
pub const MAX_ITERATION_LIMIT: u32 = 100;
pub const DEFAULT_ITERATION_LIMIT: u32 = 10;

/// Clamps a caller-supplied `limit` to `[1, MAX_ITERATION_LIMIT]`, defaulting
/// to `DEFAULT_ITERATION_LIMIT` when absent.
pub fn clamp_limit(limit: Option<u32>) -> usize {
    limit
        .unwrap_or(DEFAULT_ITERATION_LIMIT)
        .clamp(1, MAX_ITERATION_LIMIT) as usize
}

/// Fixed-window admission rule.
///
/// The increment that produced `count` is itself counted, so the N-th call of
/// a window is admitted iff `N <= ceiling`.
pub fn evaluate(count: u64, ceiling: u32) -> bool {
    count <= ceiling as u64
}

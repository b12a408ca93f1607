//! Line-count deltas for changed blobs
//!
//! Added and deleted files are counted exactly. Modified files use a
//! size-difference heuristic instead of a real line diff; downstream hotspot
//! and coupling thresholds are calibrated against this scale, so keep it.

/// Count lines in raw blob content.
///
/// Every `\n` ends a line; a trailing fragment without a newline counts as one
/// more line.
pub fn count_lines(content: &[u8]) -> u64 {
    match content.last() {
        None => 0,
        Some(b'\n') => memchr::memchr_iter(b'\n', content).count() as u64,
        Some(_) => memchr::memchr_iter(b'\n', content).count() as u64 + 1,
    }
}

/// Approximate `(added, deleted)` for a file that changed from `old_lines`
/// to `new_lines` lines.
///
/// Growth is reported as pure additions, shrinkage as pure deletions. When
/// the line count is unchanged a tenth of the file is assumed rewritten.
pub fn modified_delta(old_lines: u64, new_lines: u64) -> (u64, u64) {
    if new_lines > old_lines {
        (new_lines - old_lines, 0)
    } else if new_lines < old_lines {
        (0, old_lines - new_lines)
    } else {
        let churn = new_lines / 10;
        (churn, churn)
    }
}

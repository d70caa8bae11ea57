//! Worker caps from the process file-descriptor limit.
//!
//! An in-flight item holds one descriptor per input file and one per output it writes, plus a
//! few for the transform itself (a decoded image's temp file, the stdout/stderr pipes of a
//! [`CommandTransform`](crate::engine::CommandTransform)). The pool is sized so that every worker
//! can hold a full item at once.

/// Descriptors a transform needs beyond its inputs and outputs.
pub const ITEM_OVERHEAD_FDS: usize = 4;

/// Descriptors kept for the orchestrator: stdio, log files, directory handles while listing.
pub const RESERVED_FDS: usize = 64;

/// Descriptors one in-flight item of a step may hold.
pub fn fds_per_item(input_dirs: usize, output_dirs: usize) -> usize {
    input_dirs + output_dirs + ITEM_OVERHEAD_FDS
}

/// Soft `RLIMIT_NOFILE`, or `None` when unlimited or unavailable.
#[cfg(unix)]
pub fn max_open_fds() -> Option<u64> {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `rlim` is a valid, writable rlimit for the duration of the call.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) } != 0 {
        return None;
    }
    if rlim.rlim_cur == libc::RLIM_INFINITY {
        return None;
    }
    u64::try_from(rlim.rlim_cur).ok().filter(|&n| n <= i64::MAX as u64)
}

#[cfg(not(unix))]
pub fn max_open_fds() -> Option<u64> {
    None
}

/// Workers that fit under `limit` when each holds `per_item` descriptors. Never below 1.
pub fn workers_for_limit(limit: u64, per_item: usize) -> usize {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let usable = limit.saturating_sub(RESERVED_FDS);
    (usable / per_item.max(1)).max(1)
}

/// Worker cap for items of `per_item` descriptors, or `None` when the process has no limit.
pub fn max_workers_by_fd_limit(per_item: usize) -> Option<usize> {
    max_open_fds().map(|limit| workers_for_limit(limit, per_item))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_budget_counts_dirs() {
        assert_eq!(fds_per_item(2, 2), 8);
        assert_eq!(fds_per_item(1, 1), 6);
    }

    #[test]
    fn workers_fit_under_limit() {
        // 1024 - 64 reserved = 960 usable
        assert_eq!(workers_for_limit(1024, 8), 120);
        assert_eq!(workers_for_limit(1024, 6), 160);
    }

    #[test]
    fn tiny_limit_still_allows_one_worker() {
        assert_eq!(workers_for_limit(16, 8), 1);
        assert_eq!(workers_for_limit(0, 0), 1);
    }
}

//! Range planning
//!
//! Turns "watched group, server-reported [first, last], what the index
//! already holds" into an ordered list of bounded XOVER chunks covering
//! exactly the missing article numbers.

/// An inclusive range of article numbers for one XOVER request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// First article number, inclusive
    pub lo: u64,
    /// Last article number, inclusive
    pub hi: u64,
}

impl Chunk {
    /// Number of article numbers covered
    pub fn len(&self) -> u64 {
        self.hi - self.lo + 1
    }

    /// True when the chunk covers nothing (never produced by the planner)
    pub fn is_empty(&self) -> bool {
        self.hi < self.lo
    }
}

/// Where to start fetching for a group.
///
/// Incremental runs start just past the highest indexed number; an initial
/// sweep of a newly watched group starts `backfill` articles below the
/// server's high-water mark. The server's `first` is the floor either way:
/// numbers expired from the server are never refetched.
pub fn start_point(first: u64, last: u64, last_indexed: u64, backfill: Option<u64>) -> u64 {
    match backfill {
        Some(backfill) => first.max(last.saturating_sub(backfill.saturating_sub(1))),
        None => first.max(last_indexed + 1),
    }
}

/// Compress the missing numbers in `[lo, hi]` into maximal intervals.
///
/// `indexed` must be sorted ascending and contain only numbers within
/// `[lo, hi]`; anything already indexed is skipped.
pub fn missing_intervals(lo: u64, hi: u64, indexed: &[u64]) -> Vec<(u64, u64)> {
    if hi < lo {
        return Vec::new();
    }

    let mut intervals = Vec::new();
    let mut cursor = lo;

    for &n in indexed {
        if n < cursor {
            continue;
        }
        if n > hi {
            break;
        }
        if n > cursor {
            intervals.push((cursor, n - 1));
        }
        cursor = n + 1;
    }

    if cursor <= hi {
        intervals.push((cursor, hi));
    }

    intervals
}

/// Split intervals left-to-right into chunks of width ≤ `span`.
pub fn chunks(intervals: &[(u64, u64)], span: u64) -> Vec<Chunk> {
    let span = span.max(1);
    let mut out = Vec::new();

    for &(lo, hi) in intervals {
        let mut start = lo;
        while start <= hi {
            let end = hi.min(start + span - 1);
            out.push(Chunk { lo: start, hi: end });
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
    }

    out
}

/// Full plan: start point, gap compression, chunking.
///
/// `indexed` holds the already-indexed numbers within `[start, last]`,
/// sorted ascending (the store query guarantees both).
pub fn plan(
    first: u64,
    last: u64,
    last_indexed: u64,
    indexed: &[u64],
    span: u64,
    backfill: Option<u64>,
) -> Vec<Chunk> {
    if first > last {
        return Vec::new();
    }
    let start = start_point(first, last, last_indexed, backfill);
    if last < start {
        return Vec::new();
    }
    chunks(&missing_intervals(start, last, indexed), span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_group_plan() {
        // first=1, last=250, span=100, nothing indexed
        let plan = plan(1, 250, 0, &[], 100, Some(1000));
        assert_eq!(
            plan,
            vec![
                Chunk { lo: 1, hi: 100 },
                Chunk { lo: 101, hi: 200 },
                Chunk { lo: 201, hi: 250 },
            ]
        );
    }

    #[test]
    fn test_plan_is_idempotent_when_nothing_changed() {
        // Everything up to the server's last is indexed
        let plan = plan(1, 250, 250, &[], 100, None);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_incremental_plan_after_server_advance() {
        let plan = plan(1, 305, 250, &[], 100, None);
        assert_eq!(plan, vec![Chunk { lo: 251, hi: 305 }]);
    }

    #[test]
    fn test_backfill_bounds_initial_sweep() {
        // last=5000, backfill=1000 → start at 4001
        assert_eq!(start_point(1, 5000, 0, Some(1000)), 4001);
        let plan = plan(1, 5000, 0, &[], 2000, Some(1000));
        assert_eq!(plan, vec![Chunk { lo: 4001, hi: 5000 }]);
    }

    #[test]
    fn test_backfill_clamped_to_server_first() {
        // Retention starts at 200; backfill would reach below it
        assert_eq!(start_point(200, 500, 0, Some(1000)), 200);
    }

    #[test]
    fn test_server_first_floor_for_incremental() {
        // Server expired everything below 300; indexed max is 250
        assert_eq!(start_point(300, 400, 250, None), 300);
    }

    #[test]
    fn test_empty_group_plans_nothing() {
        // Server reports first > last
        assert!(plan(21, 20, 0, &[], 100, None).is_empty());
        assert!(plan(21, 20, 0, &[], 100, Some(1000)).is_empty());
    }

    #[test]
    fn test_no_new_articles_plans_nothing() {
        // last < L after incremental start
        assert!(plan(1, 100, 100, &[], 50, None).is_empty());
        assert!(plan(1, 100, 150, &[], 50, None).is_empty());
    }

    #[test]
    fn test_missing_intervals_compression() {
        // 1..10 with 3,4,7 indexed → [1,2],[5,6],[8,10]
        assert_eq!(
            missing_intervals(1, 10, &[3, 4, 7]),
            vec![(1, 2), (5, 6), (8, 10)]
        );
    }

    #[test]
    fn test_missing_intervals_fully_covered() {
        assert_eq!(missing_intervals(1, 3, &[1, 2, 3]), Vec::<(u64, u64)>::new());
    }

    #[test]
    fn test_missing_intervals_nothing_covered() {
        assert_eq!(missing_intervals(5, 9, &[]), vec![(5, 9)]);
    }

    #[test]
    fn test_missing_intervals_inverted_range() {
        assert!(missing_intervals(10, 5, &[]).is_empty());
    }

    #[test]
    fn test_backfill_sweep_skips_indexed_holes() {
        // Initial sweep over a partially indexed window
        let plan = plan(1, 20, 0, &[5, 6, 7, 15], 4, Some(20));
        assert_eq!(
            plan,
            vec![
                Chunk { lo: 1, hi: 4 },
                Chunk { lo: 8, hi: 11 },
                Chunk { lo: 12, hi: 14 },
                Chunk { lo: 16, hi: 19 },
                Chunk { lo: 20, hi: 20 },
            ]
        );
    }

    #[test]
    fn test_chunks_respect_span() {
        let out = chunks(&[(1, 10)], 3);
        assert_eq!(
            out,
            vec![
                Chunk { lo: 1, hi: 3 },
                Chunk { lo: 4, hi: 6 },
                Chunk { lo: 7, hi: 9 },
                Chunk { lo: 10, hi: 10 },
            ]
        );
        for c in &out {
            assert!(c.len() <= 3);
        }
    }

    #[test]
    fn test_chunks_span_of_zero_treated_as_one() {
        let out = chunks(&[(1, 2)], 0);
        assert_eq!(out, vec![Chunk { lo: 1, hi: 1 }, Chunk { lo: 2, hi: 2 }]);
    }

    #[test]
    fn test_chunk_len() {
        assert_eq!(Chunk { lo: 1, hi: 100 }.len(), 100);
        assert_eq!(Chunk { lo: 5, hi: 5 }.len(), 1);
        assert!(!Chunk { lo: 5, hi: 5 }.is_empty());
    }
}

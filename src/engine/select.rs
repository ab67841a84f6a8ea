//! Boundary-pruning partial selection.
//!
//! This module exposes a single reusable primitive, [`partition_top_k`],
//! which reorders a slice so that the `k` smallest elements under a caller
//! comparator occupy the prefix `[0, k)` — without fully sorting either side.
//!
//! ## Algorithm
//!
//! Recursive quickselect with **boundary pruning**: after each partition the
//! routine descends only into segments that still straddle index `k`. A
//! segment entirely inside the prefix, or entirely inside the tail, is
//! already correct as a *set* — its internal order is irrelevant — so it is
//! never touched again. This is what makes re-selection O(n) amortized
//! instead of the O(n log n) of a full sort.
//!
//! ## Guarantees
//!
//! * After the call, every element in `[0, k)` compares `<=` every element in
//!   `[k, len)` under the comparator.
//! * Order *within* each side is unspecified.
//! * Ties at the boundary are broken by the partition's swap pattern:
//!   deterministic for a given input, but not meaningful. Callers must not
//!   rely on any particular tie order.
//!
//! ## Complexity
//!
//! Expected O(n); O(n²) in the adversarial pivot case, as with any
//! middle-pivot quickselect. The comparator must be a strict weak ordering.

/// Reorders `items` so the `k` smallest elements under `is_less` occupy
/// `[0, k)`.
///
/// `k == 0` and `k >= items.len()` are no-ops: the partition point already
/// coincides with a slice boundary and there is nothing to resolve.
pub fn partition_top_k<T, F>(items: &mut [T], k: usize, is_less: F)
where
    F: Fn(&T, &T) -> bool,
{
    if k == 0 || k >= items.len() {
        return;
    }
    select_range(items, 0, items.len(), k, &is_less);
}

/// Recursively partitions `[lo, hi)`, descending only into segments that
/// straddle the boundary `k`.
fn select_range<T, F>(items: &mut [T], lo: usize, hi: usize, k: usize, is_less: &F)
where
    F: Fn(&T, &T) -> bool,
{
    if hi - lo <= 1 {
        return;
    }
    // Segment entirely on one side of the boundary: its membership is final.
    if lo >= k || hi <= k {
        return;
    }

    let pivot = partition(items, lo, hi, is_less);
    select_range(items, lo, pivot, k, is_less);
    select_range(items, pivot + 1, hi, k, is_less);
}

/// Lomuto partition of `[lo, hi)` around the middle element.
///
/// Returns the pivot's final index. Elements strictly less than the pivot end
/// up before it; everything else after.
fn partition<T, F>(items: &mut [T], lo: usize, hi: usize, is_less: &F) -> usize
where
    F: Fn(&T, &T) -> bool,
{
    let last = hi - 1;
    let mid = lo + (hi - lo) / 2;
    items.swap(mid, last);

    let mut store = lo;
    for i in lo..last {
        if is_less(&items[i], &items[last]) {
            items.swap(i, store);
            store += 1;
        }
    }
    items.swap(store, last);
    store
}

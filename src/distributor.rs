// Capacity distributor: spreads requested growth evenly across node-groups.
// Pure; no I/O.

use std::collections::{BTreeMap, VecDeque};

use crate::models::{ScalePlan, SizeBuckets};

/// Spreads `desired` extra units across the groups in `groups_by_size`.
///
/// The smallest bucket is always served first; each group visited gains one
/// unit and moves to the back of the `size + 1` bucket, so groups level up
/// together and edited groups end within one unit of each other. Returns the
/// plan and the units that could not be placed (0 unless there are no groups
/// or every group is at `i32::MAX`, or `desired` itself when it is not positive).
pub fn distribute(groups_by_size: &SizeBuckets, desired: i32) -> (ScalePlan, i32) {
    if desired <= 0 {
        return (ScalePlan::default(), desired);
    }

    let group_count: usize = groups_by_size.values().map(Vec::len).sum();
    let mut plan = ScalePlan::with_capacity(group_count);
    let mut buckets: BTreeMap<i32, VecDeque<String>> = groups_by_size
        .iter()
        .filter(|(_, names)| !names.is_empty())
        .map(|(size, names)| (*size, names.iter().cloned().collect()))
        .collect();

    let mut remaining = desired;
    while remaining > 0 {
        let Some(mut smallest) = buckets.first_entry() else {
            break;
        };
        let size = *smallest.key();
        // every remaining group is already at the largest representable size
        let Some(next) = size.checked_add(1) else {
            break;
        };
        let Some(name) = smallest.get_mut().pop_front() else {
            smallest.remove();
            continue;
        };
        if smallest.get().is_empty() {
            smallest.remove();
        }

        plan.bump(&name, size);
        buckets.entry(next).or_default().push_back(name);
        remaining -= 1;
    }

    tracing::debug!(
        operation = "distribute",
        desired,
        remaining,
        groups_edited = plan.len(),
        "growth distributed"
    );
    (plan, remaining)
}

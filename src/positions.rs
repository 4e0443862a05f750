use std::collections::BTreeSet;

use crate::chaos::ChaosGenerator;

/// 1-based data-row indices (the header is row 0 and never selected).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionPositions(BTreeSet<usize>);

impl InjectionPositions {
    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

fn retry_cap(target: usize) -> usize {
    target.saturating_mul(32).max(64)
}

/// Draws `min(inject_count, data_rows)` distinct indices from `[1, data_rows]`.
///
/// Duplicate draws are skipped. Once the retry cap is reached the remaining
/// slots take the lowest unselected indices, so the result size is exact.
pub fn select_positions(
    rng: &mut ChaosGenerator,
    inject_count: u64,
    data_rows: usize,
) -> InjectionPositions {
    let target = usize::try_from(inject_count)
        .unwrap_or(usize::MAX)
        .min(data_rows);
    let mut set = BTreeSet::new();
    if target == 0 {
        return InjectionPositions(set);
    }
    let cap = retry_cap(target);
    let mut draws = 0usize;
    while set.len() < target && draws < cap {
        draws += 1;
        set.insert(rng.next_int(1, data_rows as i64) as usize);
    }
    if set.len() < target {
        log::debug!(
            "position sampling hit retry cap after {draws} draws, filling {} slots in order",
            target - set.len()
        );
        for idx in 1..=data_rows {
            if set.len() == target {
                break;
            }
            set.insert(idx);
        }
    }
    InjectionPositions(set)
}

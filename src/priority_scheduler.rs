//! Orders a list of items by distance from a focus index and assigns priority tiers.

use crate::artwork_key::{canonicalize, ArtworkKey};
use crate::config::FocusWindow;
use crate::protocol::{ArtworkItem, PriorityTier};

/// One planned submission. Recomputed on every pass, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleItem {
    pub index: usize,
    pub key: ArtworkKey,
    pub distance: usize,
    pub tier: PriorityTier,
}

pub fn tier_for_distance(distance: usize, window: FocusWindow) -> PriorityTier {
    if distance <= window.preload_radius {
        PriorityTier::High
    } else if distance <= window.lazy_radius {
        PriorityTier::Normal
    } else {
        PriorityTier::Low
    }
}

/// Indices `0..len` expanding outward from `focus_index`; at equal distance the later index
/// comes first. `focus_index` past the end is clamped to the last index.
pub fn expand_from_focus(len: usize, focus_index: usize) -> Vec<(usize, usize)> {
    if len == 0 {
        return Vec::new();
    }
    let focus = focus_index.min(len - 1);
    let mut order = Vec::with_capacity(len);
    order.push((focus, 0));
    let max_distance = focus.max(len - 1 - focus);
    for distance in 1..=max_distance {
        if focus + distance < len {
            order.push((focus + distance, distance));
        }
        if distance <= focus {
            order.push((focus - distance, distance));
        }
    }
    order
}

pub fn plan(items: &[ArtworkItem], focus_index: usize, window: FocusWindow) -> Vec<ScheduleItem> {
    let window = FocusWindow::new(window.preload_radius, window.lazy_radius);
    expand_from_focus(items.len(), focus_index)
        .into_iter()
        .map(|(index, distance)| {
            let item = &items[index];
            ScheduleItem {
                index,
                key: canonicalize(&item.artist, &item.track),
                distance,
                tier: tier_for_distance(distance, window),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{expand_from_focus, plan, tier_for_distance};
    use crate::config::FocusWindow;
    use crate::protocol::{ArtworkItem, PriorityTier};

    fn items(count: usize) -> Vec<ArtworkItem> {
        (0..count)
            .map(|index| ArtworkItem::new(format!("id-{index}"), "Artist", format!("Song {index}")))
            .collect()
    }

    #[test]
    fn test_plan_starts_at_focus_and_expands_outward() {
        let planned = plan(&items(10), 5, FocusWindow::new(1, 3));
        let indices: Vec<usize> = planned.iter().map(|item| item.index).collect();
        assert_eq!(indices, vec![5, 6, 4, 7, 3, 8, 2, 9, 1, 0]);
        assert_eq!(planned[0].tier, PriorityTier::High);
        assert_eq!(planned[0].distance, 0);
    }

    #[test]
    fn test_plan_never_schedules_farther_item_before_nearer_one() {
        for focus in 0..10 {
            let planned = plan(&items(10), focus, FocusWindow::new(2, 4));
            assert_eq!(planned.len(), 10);
            for pair in planned.windows(2) {
                assert!(pair[0].distance <= pair[1].distance);
                assert!(pair[0].tier >= pair[1].tier);
            }
        }
    }

    #[test]
    fn test_tiers_follow_radii() {
        let window = FocusWindow::new(1, 3);
        assert_eq!(tier_for_distance(0, window), PriorityTier::High);
        assert_eq!(tier_for_distance(1, window), PriorityTier::High);
        assert_eq!(tier_for_distance(2, window), PriorityTier::Normal);
        assert_eq!(tier_for_distance(3, window), PriorityTier::Normal);
        assert_eq!(tier_for_distance(4, window), PriorityTier::Low);
    }

    #[test]
    fn test_focus_past_end_is_clamped() {
        let order = expand_from_focus(4, 99);
        assert_eq!(order, vec![(3, 0), (2, 1), (1, 2), (0, 3)]);
        assert!(expand_from_focus(0, 0).is_empty());
    }

    #[test]
    fn test_plan_keys_are_canonical() {
        let list = vec![
            ArtworkItem::new("a", "Taylor Swift", "Anti-Hero"),
            ArtworkItem::new("b", "taylor  swift", "ANTI-HERO"),
        ];
        let planned = plan(&list, 0, FocusWindow::new(1, 1));
        assert_eq!(planned[0].key, planned[1].key);
    }
}

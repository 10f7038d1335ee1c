use tracing::warn;

use crate::interval::IntervalList;

/// Lowers the slot thresholds so that round-off in [`GuideTable::lookup`]
/// never starts the search behind the wanted interval.
const THRESHOLD_SLACK: f64 = 1e-12;

/// Total (scaled) areas below hat and squeeze.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Areas {
    pub(crate) hat: f64,
    pub(crate) squeeze: f64,
}

/// Index from cumulative hat area to the interval containing it.
///
/// Slot `j` holds the first interval whose cumulative area exceeds
/// `j * total / size`. The table stores arena indices and has to be rebuilt
/// whenever the interval list changes.
#[derive(Debug, Clone, Default)]
pub(crate) struct GuideTable {
    slots: Vec<usize>,
}

impl GuideTable {
    /// Recompute the cumulative areas of all intervals and build the table.
    pub(crate) fn build(list: &mut IntervalList, guide_factor: f64) -> (GuideTable, Areas) {
        let order: Vec<usize> = list.indices().collect();

        let mut areas = Areas::default();
        for &idx in &order {
            let iv = &mut list.nodes[idx];
            if iv.next.is_none() {
                iv.a_cum = f64::INFINITY;
                continue;
            }
            areas.hat += iv.a_hat;
            areas.squeeze += iv.a_squeeze;
            iv.a_cum = areas.hat;
        }

        let size = (list.n_intervals as f64 * guide_factor).round() as usize;
        if size == 0 || order.len() < 2 || !(areas.hat > 0. && areas.hat.is_finite()) {
            return (GuideTable { slots: vec![] }, areas);
        }

        let step = areas.hat / size as f64;
        let last_real = order[order.len() - 2];
        let mut slots = Vec::with_capacity(size);
        let mut pos = 0;
        for j in 0..size {
            let threshold = j as f64 * step * (1. - THRESHOLD_SLACK);
            while pos + 1 < order.len() && list.nodes[order[pos]].a_cum <= threshold {
                pos += 1;
            }
            if list.nodes[order[pos]].next.is_none() {
                warn!(slot = j, size, "round-off while building guide table");
                slots.resize(size, last_real);
                break;
            }
            slots.push(order[pos]);
        }

        (GuideTable { slots }, areas)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Interval containing the cumulative area `u * total`, for `u` in `[0, 1)`.
    ///
    /// The result is never the sentinel, even if round-off pushes
    /// `u * total` up to the total area.
    pub(crate) fn lookup(&self, list: &IntervalList, u: f64, total: f64) -> usize {
        let mut idx = if self.slots.is_empty() {
            list.head
        } else {
            let slot = ((u * self.slots.len() as f64) as usize).min(self.slots.len() - 1);
            self.slots[slot]
        };

        let target = u * total;
        loop {
            let iv = &list.nodes[idx];
            if iv.a_cum > target {
                return idx;
            }
            match iv.next {
                Some(next) if list.nodes[next].next.is_some() => idx = next,
                _ => return idx,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{density::test_densities::StdNormal, setup::Hat};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn normal_hat(guide_factor: f64) -> Hat {
        Hat::build(&StdNormal, &[-2., -0.5, 0.3, 1., 2.5], 100, guide_factor).unwrap()
    }

    #[test]
    fn table_size() {
        let hat = normal_hat(2.);
        assert_eq!(hat.guide.len(), 2 * hat.list.n_intervals);
        let hat = normal_hat(0.);
        assert_eq!(hat.guide.len(), 0);
        let hat = normal_hat(0.5);
        assert_eq!(hat.guide.len(), 3);
    }

    #[test]
    fn sentinel_is_never_returned() {
        let hat = normal_hat(2.);
        let idx = hat.guide.lookup(&hat.list, 1. - f64::EPSILON, hat.areas.hat);
        assert!(hat.list.nodes[idx].next.is_some());
        let idx = hat.guide.lookup(&hat.list, 0., hat.areas.hat);
        assert!(hat.list.nodes[idx].next.is_some());
    }

    #[test]
    fn non_finite_total_gives_empty_table() {
        let mut hat = normal_hat(2.);
        let head = hat.list.head;
        hat.list.nodes[head].a_hat = f64::INFINITY;
        let (guide, areas) = GuideTable::build(&mut hat.list, 2.);
        assert_eq!(guide.len(), 0);
        assert_eq!(areas.hat, f64::INFINITY);
    }

    proptest! {
        #[test]
        fn lookup_brackets_area(u in 0f64..1., factor in prop_oneof![Just(0.), Just(1.), Just(2.), Just(7.3)]) {
            let hat = normal_hat(factor);
            let total = hat.areas.hat;
            let idx = hat.guide.lookup(&hat.list, u, total);
            let iv = &hat.list.nodes[idx];
            let target = u * total;
            prop_assert!(iv.next.is_some());
            prop_assert!(iv.a_cum - iv.a_hat <= target * (1. + 1e-12) + 1e-300);
            prop_assert!(target < iv.a_cum);
        }
    }
}

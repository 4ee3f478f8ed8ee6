// Mines: association with nearby steps, and placement on the output pad.
//
// Mines never take part in the foot-placement searches. Once a chart has been
// expressed, each mine is tied to the step it most plausibly relates to: the
// latest earlier step on its lane ("after arrow") or the earliest later one
// ("before arrow"), whichever is closer, preferring the earlier step on a
// tie. The association records which foot made that step and how recently
// (or how soon) that foot used the lane relative to its other arrows.
//
// During performance the same description is replayed against the generated
// steps: the associated foot's arrows are ranked the same way and the mine
// goes on the arrow with the recorded rank, or the nearest rank that is free.
// Mines without an association, or whose ranked arrows are all busy, go on
// the least recently stepped free arrow. A mine with no free arrow at all is
// dropped.

use crate::types::Foot;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use stepshift_prng::ChartRng;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MineType {
    NoAssociation,
    /// The mine follows a step on its lane.
    AfterArrow,
    /// The mine precedes a step on its lane.
    BeforeArrow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MineEvent {
    pub position: i32,
    pub original_arrow: usize,
    pub mine_type: MineType,
    /// Rank of the mine's lane among the associated foot's distinct arrows,
    /// 0 being the most recent (after) or most imminent (before).
    pub nth_closest: usize,
    pub foot: Option<Foot>,
}

/// A placed arrow attributed to a foot, used as context for mines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FootStep {
    pub position: i32,
    pub arrow: usize,
    pub foot: Foot,
}

/// A mine placed on the output pad.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedMine {
    pub position: i32,
    pub arrow: usize,
}

/// Hold span on one arrow, both ends inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HoldSpan {
    pub arrow: usize,
    pub start: i32,
    pub end: i32,
}

/// Rank of `lane` among the distinct arrows `foot` steps on, in iteration
/// order.
fn rank_of_lane<'a>(
    steps: impl Iterator<Item = &'a FootStep>,
    foot: Foot,
    lane: usize,
) -> Option<usize> {
    let mut seen: SmallVec<[usize; 8]> = SmallVec::new();
    for s in steps.filter(|s| s.foot == foot) {
        if s.arrow == lane {
            return Some(seen.len());
        }
        if !seen.contains(&s.arrow) {
            seen.push(s.arrow);
        }
    }
    None
}

/// Distinct arrows of `foot` in iteration order.
fn ranked_arrows<'a>(steps: impl Iterator<Item = &'a FootStep>, foot: Foot) -> Vec<usize> {
    let mut out = Vec::new();
    for s in steps.filter(|s| s.foot == foot) {
        if !out.contains(&s.arrow) {
            out.push(s.arrow);
        }
    }
    out
}

/// Associate each mine with the step context around it. `steps` must be
/// sorted by position; `mines` are `(position, lane)` pairs.
pub fn associate_mines(steps: &[FootStep], mines: &[(i32, usize)]) -> Vec<MineEvent> {
    let mut out: Vec<MineEvent> = mines
        .iter()
        .map(|&(position, lane)| associate_one(steps, position, lane))
        .collect();
    out.sort_by_key(|m| (m.position, m.original_arrow));
    out
}

fn associate_one(steps: &[FootStep], position: i32, lane: usize) -> MineEvent {
    let split_before = steps.partition_point(|s| s.position < position);
    let split_after = steps.partition_point(|s| s.position <= position);
    let (earlier, later) = (&steps[..split_before], &steps[split_after..]);

    let prev = earlier.iter().rev().find(|s| s.arrow == lane);
    let next = later.iter().find(|s| s.arrow == lane);
    let use_prev = match (prev, next) {
        (Some(p), Some(n)) => position - p.position <= n.position - position,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => {
            return MineEvent {
                position,
                original_arrow: lane,
                mine_type: MineType::NoAssociation,
                nth_closest: 0,
                foot: None,
            };
        }
    };

    let (mine_type, foot, nth) = if let (true, Some(p)) = (use_prev, prev) {
        let nth = rank_of_lane(earlier.iter().rev(), p.foot, lane).unwrap_or(0);
        (MineType::AfterArrow, p.foot, nth)
    } else if let Some(n) = next {
        let nth = rank_of_lane(later.iter(), n.foot, lane).unwrap_or(0);
        (MineType::BeforeArrow, n.foot, nth)
    } else {
        return MineEvent {
            position,
            original_arrow: lane,
            mine_type: MineType::NoAssociation,
            nth_closest: 0,
            foot: None,
        };
    };
    MineEvent {
        position,
        original_arrow: lane,
        mine_type,
        nth_closest: nth,
        foot: Some(foot),
    }
}

/// Place mines on the output pad. Returns the placed mines; mines with no
/// free arrow are left out.
pub fn place_mines(
    mines: &[MineEvent],
    steps: &[FootStep],
    holds: &[HoldSpan],
    num_arrows: usize,
    rng: &mut ChartRng,
) -> Vec<PlacedMine> {
    let mut placed: Vec<PlacedMine> = Vec::with_capacity(mines.len());
    for mine in mines {
        let m = mine.position;
        let split_before = steps.partition_point(|s| s.position < m);
        let split_after = steps.partition_point(|s| s.position <= m);
        let (earlier, at, later) = (
            &steps[..split_before],
            &steps[split_before..split_after],
            &steps[split_after..],
        );
        let is_free = |arrow: usize, placed: &[PlacedMine]| {
            !at.iter().any(|s| s.arrow == arrow)
                && !holds
                    .iter()
                    .any(|h| h.arrow == arrow && h.start <= m && m <= h.end)
                && !placed.iter().any(|p| p.position == m && p.arrow == arrow)
        };

        let ranked = match (mine.mine_type, mine.foot) {
            (MineType::AfterArrow, Some(foot)) => ranked_arrows(earlier.iter().rev(), foot),
            (MineType::BeforeArrow, Some(foot)) => ranked_arrows(later.iter(), foot),
            _ => Vec::new(),
        };
        // Nearest rank to the recorded one first, lower rank on a tie.
        let mut by_rank: Vec<(usize, usize)> = ranked
            .iter()
            .enumerate()
            .map(|(rank, &arrow)| (rank.abs_diff(mine.nth_closest), arrow))
            .collect();
        by_rank.sort_by_key(|&(d, _)| d);
        let chosen = by_rank
            .iter()
            .map(|&(_, arrow)| arrow)
            .find(|&arrow| is_free(arrow, &placed));

        let chosen = chosen.or_else(|| {
            // Least recently stepped free arrow; never-stepped arrows first.
            let last_use = |arrow: usize| {
                earlier
                    .iter()
                    .rev()
                    .find(|s| s.arrow == arrow)
                    .map(|s| s.position)
            };
            let free: Vec<(Option<i32>, usize)> = (0..num_arrows)
                .filter(|&a| is_free(a, &placed))
                .map(|a| (last_use(a), a))
                .collect();
            let oldest = free.iter().map(|&(t, _)| t).min()?;
            let tied: Vec<usize> = free
                .iter()
                .filter(|&&(t, _)| t == oldest)
                .map(|&(_, a)| a)
                .collect();
            rng.pick(&tied).copied()
        });

        match chosen {
            Some(arrow) => placed.push(PlacedMine { position: m, arrow }),
            None => tracing::trace!(position = m, "no free arrow for mine"),
        }
    }
    placed.sort_by_key(|p| (p.position, p.arrow));
    placed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(position: i32, arrow: usize, foot: Foot) -> FootStep {
        FootStep {
            position,
            arrow,
            foot,
        }
    }

    #[test]
    fn closer_step_wins_and_ties_prefer_earlier() {
        let steps = vec![step(0, 0, Foot::Left), step(96, 0, Foot::Right)];
        let events = associate_mines(&steps, &[(24, 0), (48, 0), (72, 0)]);
        assert_eq!(events[0].mine_type, MineType::AfterArrow);
        assert_eq!(events[0].foot, Some(Foot::Left));
        assert_eq!(events[1].mine_type, MineType::AfterArrow, "tie prefers earlier");
        assert_eq!(events[2].mine_type, MineType::BeforeArrow);
        assert_eq!(events[2].foot, Some(Foot::Right));
    }

    #[test]
    fn unrelated_lane_has_no_association() {
        let steps = vec![step(0, 0, Foot::Left)];
        let events = associate_mines(&steps, &[(48, 2)]);
        assert_eq!(events[0].mine_type, MineType::NoAssociation);
        assert_eq!(events[0].foot, None);
    }

    #[test]
    fn nth_closest_counts_the_foots_distinct_arrows() {
        // Left foot: 0, then 1, then 1 again. A mine on 0 after that is the
        // second most recent arrow of the left foot.
        let steps = vec![
            step(0, 0, Foot::Left),
            step(48, 1, Foot::Left),
            step(72, 3, Foot::Right),
            step(96, 1, Foot::Left),
        ];
        let events = associate_mines(&steps, &[(120, 0)]);
        assert_eq!(events[0].mine_type, MineType::AfterArrow);
        assert_eq!(events[0].nth_closest, 1);
    }

    #[test]
    fn placement_replays_rank_on_output_steps() {
        let mines = [MineEvent {
            position: 120,
            original_arrow: 0,
            mine_type: MineType::AfterArrow,
            nth_closest: 1,
            foot: Some(Foot::Left),
        }];
        let steps = vec![
            step(0, 5, Foot::Left),
            step(48, 6, Foot::Left),
            step(96, 6, Foot::Left),
        ];
        let mut rng = ChartRng::new(1);
        let placed = place_mines(&mines, &steps, &[], 8, &mut rng);
        assert_eq!(placed, vec![PlacedMine { position: 120, arrow: 5 }]);
    }

    #[test]
    fn busy_arrows_are_skipped_and_full_rows_drop_mines() {
        let mines = [MineEvent {
            position: 48,
            original_arrow: 0,
            mine_type: MineType::NoAssociation,
            nth_closest: 0,
            foot: None,
        }];
        let steps = vec![step(48, 0, Foot::Left)];
        let holds = [HoldSpan {
            arrow: 1,
            start: 0,
            end: 96,
        }];
        let mut rng = ChartRng::new(1);
        assert!(place_mines(&mines, &steps, &holds, 2, &mut rng).is_empty());

        let placed = place_mines(&mines, &steps, &holds, 3, &mut rng);
        assert_eq!(placed, vec![PlacedMine { position: 48, arrow: 2 }]);
    }

    #[test]
    fn unassociated_mine_prefers_least_recent_arrow() {
        let mines = [MineEvent {
            position: 96,
            original_arrow: 0,
            mine_type: MineType::NoAssociation,
            nth_closest: 0,
            foot: None,
        }];
        let steps = vec![
            step(0, 0, Foot::Left),
            step(24, 1, Foot::Right),
            step(48, 0, Foot::Left),
        ];
        let mut rng = ChartRng::new(9);
        let placed = place_mines(&mines, &steps, &[], 2, &mut rng);
        assert_eq!(placed, vec![PlacedMine { position: 96, arrow: 1 }]);
    }
}

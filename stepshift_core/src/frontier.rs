// Dynamic-programming collapse shared by the expression and performance
// searches.
//
// Both searches advance a frontier of branches one sub-step at a time. After
// each sub-step only the cheapest branch per destination node survives.
// Candidates are sorted canonically (destination, then parent node, then
// link) before ties are considered, so the result never depends on the order
// candidates were generated in.

use crate::graph::NodeId;
use crate::technique::GraphLink;
use smallvec::SmallVec;

/// Costs closer than this are a genuine tie.
pub(crate) const COST_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Candidate {
    /// Index of the parent branch in the current frontier.
    pub parent: usize,
    pub parent_node: NodeId,
    pub to: NodeId,
    pub link: GraphLink,
    /// Cumulative cost including the parent's.
    pub cost: f64,
}

/// For each destination node, ascending, the indices of the candidates tied
/// for the lowest cost, in canonical order. Exact duplicates (same parent and
/// link) appear once.
pub(crate) fn cheapest_by_node(candidates: &[Candidate]) -> Vec<SmallVec<[usize; 4]>> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (&candidates[a], &candidates[b]);
        x.to
            .cmp(&y.to)
            .then(x.parent_node.cmp(&y.parent_node))
            .then(x.link.cmp(&y.link))
    });

    let mut groups = Vec::new();
    for run in order.chunk_by(|&a, &b| candidates[a].to == candidates[b].to) {
        let best = run
            .iter()
            .map(|&i| candidates[i].cost)
            .fold(f64::INFINITY, f64::min);
        let mut tied: SmallVec<[usize; 4]> = SmallVec::new();
        for &i in run {
            if candidates[i].cost > best + COST_EPSILON {
                continue;
            }
            if let Some(&last) = tied.last() {
                let prev: &Candidate = &candidates[last];
                if prev.parent_node == candidates[i].parent_node
                    && prev.link == candidates[i].link
                {
                    continue;
                }
            }
            tied.push(i);
        }
        groups.push(tied);
    }
    groups
}

/// Indices of the values tied for the minimum, in input order.
pub(crate) fn tied_minimum(costs: impl Iterator<Item = f64> + Clone) -> SmallVec<[usize; 4]> {
    let best = costs.clone().fold(f64::INFINITY, f64::min);
    costs
        .enumerate()
        .filter(|&(_, c)| c <= best + COST_EPSILON)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technique::{PortionLink, StepType};
    use crate::types::{Foot, FootAction, FootPortion};

    fn link(step: StepType) -> GraphLink {
        let mut l = GraphLink::default();
        l.set(
            Foot::Left,
            FootPortion::Heel,
            PortionLink::new(step, FootAction::Tap),
        );
        l
    }

    fn cand(parent_node: u32, to: u32, step: StepType, cost: f64) -> Candidate {
        Candidate {
            parent: parent_node as usize,
            parent_node: NodeId(parent_node),
            to: NodeId(to),
            link: link(step),
            cost,
        }
    }

    #[test]
    fn keeps_cheapest_per_destination_in_node_order() {
        let cands = vec![
            cand(0, 5, StepType::NewArrow, 3.0),
            cand(1, 2, StepType::NewArrow, 1.0),
            cand(2, 5, StepType::NewArrow, 2.0),
        ];
        let groups = cheapest_by_node(&cands);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].as_slice(), &[1]);
        assert_eq!(groups[1].as_slice(), &[2]);
    }

    #[test]
    fn ties_are_canonical_regardless_of_input_order() {
        let a = cand(3, 1, StepType::InvertBehind, 1.0);
        let b = cand(3, 1, StepType::InvertFront, 1.0);
        let c = cand(0, 1, StepType::NewArrow, 1.0);
        let forward = cheapest_by_node(&[a, b, c]);
        let backward = cheapest_by_node(&[c, b, a]);
        let names = |cands: &[Candidate], g: &SmallVec<[usize; 4]>| {
            g.iter()
                .map(|&i| (cands[i].parent_node, cands[i].link))
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&[a, b, c], &forward[0]), names(&[c, b, a], &backward[0]));
        assert_eq!(forward[0].len(), 3);
    }

    #[test]
    fn duplicates_collapse() {
        let a = cand(0, 1, StepType::NewArrow, 1.0);
        let groups = cheapest_by_node(&[a, a]);
        assert_eq!(groups[0].len(), 1);
    }

    #[test]
    fn tied_minimum_finds_all_ties() {
        let costs = [2.0, 1.0, 1.0 + 1e-12, 3.0];
        assert_eq!(tied_minimum(costs.iter().copied()).as_slice(), &[1, 2]);
        assert!(tied_minimum(std::iter::empty::<f64>()).is_empty());
    }
}

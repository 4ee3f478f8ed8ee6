// Chart Performance Engine: expressed technique chain -> output placements.
//
// The expressed chart is replayed position by position on the output graph.
// Every frontier branch tracks the output node it rests on, its cumulative
// cost, and which output arrows are currently held on behalf of which source
// lanes. Holds are keyed by lane rather than by foot portion because a
// one-arrow bracket can move a held arrow from the heel slot to the toe slot
// without releasing it. Per position:
//
// 1. Release. The lanes whose holds end are mapped through the branch's hold
//    map onto the output arrows tracking them, and the matching release edge
//    is taken. When two source holds were merged onto one output arrow, the
//    first hold end releases that arrow and the second has nothing left to
//    do. A branch that tracks none of the ending lanes is dropped.
// 2. Step. Each placing source foot asks for its technique on the same foot.
//    Level 0 accepts only the exact technique. Only when no branch of the
//    whole frontier has a level-0 candidate does the search widen to the
//    first fallback, then the first two, and so on.
//
// Candidate costs are travel distance, fallback rank, deviation from the
// desired arrow distribution, and step tightening (a long move shortly after
// the same foot's previous step). The frontier collapses to the cheapest
// branch per output node; genuine ties are ordered canonically and broken by
// the chart's `ChartRng`, which is also used for the final pick and for mine
// placement. Nothing else consumes randomness, so a seed only matters where
// costs tie.
//
// Start tiers are tried in order; each attempt restarts the PRNG from the
// seed.

use crate::error::PerformanceError;
use crate::expressed::{ExpressedChart, PortionLanes, PositionGroup};
use crate::fallbacks::StepTypeFallbacks;
use crate::frontier::{Candidate, cheapest_by_node, tied_minimum};
use crate::graph::{FootArrowEvent, GraphEdge, NodeId, StepGraph};
use crate::mines::{FootStep, HoldSpan, PlacedMine, place_mines};
use crate::pad::distance;
use crate::technique::{GraphLink, StepType};
use crate::types::{
    Foot, FootAction, FootPortion, NUM_FEET, NUM_PORTIONS, NoteEvent, arrow_bit, mask_arrows,
    portion_bit,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use stepshift_prng::ChartRng;
use tracing::{debug, trace};

/// Penalty for long moves shortly after the same foot's previous step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepTighteningConfig {
    /// Steps at most this many ticks after the foot's previous step count.
    pub time_threshold_ticks: i32,
    /// Travel beyond this distance is penalized.
    pub distance_threshold: f64,
    /// Cost per unit of travel beyond the threshold.
    pub weight: f64,
}

impl Default for StepTighteningConfig {
    fn default() -> Self {
        StepTighteningConfig {
            time_threshold_ticks: 24,
            distance_threshold: 1.5,
            weight: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Cost per unit of foot travel.
    pub travel_distance_weight: f64,
    /// Cost per fallback rank used.
    pub fallback_weight: f64,
    /// Desired relative frequency of each output arrow. Ignored unless it
    /// has one positive-sum entry per output arrow.
    pub arrow_weights: Vec<f64>,
    /// Cost per unit of absolute deviation from `arrow_weights`.
    pub arrow_weight_deviation_weight: f64,
    pub step_tightening: StepTighteningConfig,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            travel_distance_weight: 1.0,
            fallback_weight: 10.0,
            arrow_weights: Vec::new(),
            arrow_weight_deviation_weight: 2.0,
            step_tightening: StepTighteningConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PerformanceNodeKind {
    Root,
    Step(GraphLink),
    Release(GraphLink),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PerformanceNode {
    pub position: i32,
    pub graph_node: NodeId,
    pub kind: PerformanceNodeKind,
    /// Head of the next position. Set on heads only.
    pub next: Option<usize>,
    pub sibling: Option<usize>,
}

impl PerformanceNode {
    pub fn link(&self) -> Option<&GraphLink> {
        match &self.kind {
            PerformanceNodeKind::Root => None,
            PerformanceNodeKind::Step(link) | PerformanceNodeKind::Release(link) => Some(link),
        }
    }

    pub fn is_step(&self) -> bool {
        matches!(self.kind, PerformanceNodeKind::Step(_))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PerformedChart {
    nodes: Vec<PerformanceNode>,
    mines: Vec<PlacedMine>,
    start_tier: usize,
    total_cost: f64,
}

// ---------------------------------------------------------------------------
// Search state
// ---------------------------------------------------------------------------

/// Output arrow held on behalf of the given source lane mask.
type HeldArrows = SmallVec<[(usize, u64); 4]>;

#[derive(Clone, Debug)]
struct Branch {
    node: NodeId,
    cost: f64,
    trail: usize,
    holds: HeldArrows,
    /// Source lanes still held in the source whose output arrow was already
    /// released together with a merged partner.
    merged_released: u64,
    last_step: [Option<i32>; NUM_FEET],
    /// Steps per output arrow; empty unless arrow weights are in use.
    counts: Vec<u32>,
}

#[derive(Clone, Copy, Debug)]
struct TrailEntry {
    parent: Option<usize>,
    position: i32,
    node: NodeId,
    link: GraphLink,
}

/// Per-candidate state carried alongside a `Candidate`.
#[derive(Clone, Debug)]
struct Pending {
    holds: HeldArrows,
    merged_released: u64,
    placed_mask: u64,
}

/// What one source foot asks for at a position.
#[derive(Clone, Copy, Debug)]
struct WantedStep {
    foot: Foot,
    step: StepType,
    link: GraphLink,
    lanes: PortionLanes,
}

/// Lanes under the source portions named by `bits`.
fn lanes_of(bits: u8, foot: Foot, lanes: &PortionLanes) -> u64 {
    FootPortion::ALL
        .into_iter()
        .filter(|&p| bits & portion_bit(foot, p) != 0)
        .filter_map(|p| lanes[foot.index()][p.index()])
        .fold(0, |mask, lane| mask | arrow_bit(lane))
}

/// Source hold bits mapped onto each output portion of `foot`, or `None` when
/// the output placement cannot carry the source actions. Equal portion counts
/// pair up in order; a two-portion source may collapse onto one portion.
fn map_portions(src: &GraphLink, out: &GraphLink, foot: Foot) -> Option<[u8; NUM_PORTIONS]> {
    let placed = |link: &GraphLink| -> SmallVec<[(FootPortion, FootAction); 2]> {
        FootPortion::ALL
            .into_iter()
            .filter_map(|p| {
                link.get(foot, p)
                    .filter(|l| !l.is_release())
                    .map(|l| (p, l.action))
            })
            .collect()
    };
    let (src_placed, out_placed) = (placed(src), placed(out));
    let mut bits = [0u8; NUM_PORTIONS];
    if src_placed.len() == out_placed.len() {
        for (&(sp, sa), &(op, oa)) in src_placed.iter().zip(&out_placed) {
            if sa != oa {
                return None;
            }
            if sa == FootAction::Hold {
                bits[op.index()] |= portion_bit(foot, sp);
            }
        }
    } else if src_placed.len() == 2 && out_placed.len() == 1 {
        let (op, oa) = out_placed[0];
        let any_hold = src_placed.iter().any(|&(_, a)| a == FootAction::Hold);
        if (oa == FootAction::Hold) != any_hold {
            return None;
        }
        for &(sp, sa) in &src_placed {
            if sa == FootAction::Hold {
                bits[op.index()] |= portion_bit(foot, sp);
            }
        }
    } else {
        return None;
    }
    Some(bits)
}

struct PerformanceSearch<'a> {
    graph: &'a StepGraph,
    config: &'a PerformanceConfig,
    fallbacks: Option<&'a StepTypeFallbacks>,
    /// Normalized `arrow_weights`, when usable.
    weights: Option<Vec<f64>>,
    rng: ChartRng,
    frontier: Vec<Branch>,
    trail: Vec<TrailEntry>,
}

impl<'a> PerformanceSearch<'a> {
    fn new(
        graph: &'a StepGraph,
        config: &'a PerformanceConfig,
        fallbacks: Option<&'a StepTypeFallbacks>,
        start: &[NodeId],
        seed: u64,
    ) -> Self {
        let weights = normalized_weights(&config.arrow_weights, graph.num_arrows());
        let counts = if weights.is_some() {
            vec![0; graph.num_arrows()]
        } else {
            Vec::new()
        };
        let mut start = start.to_vec();
        start.sort();
        start.dedup();
        let mut trail = Vec::with_capacity(start.len());
        let mut frontier = Vec::with_capacity(start.len());
        for node in start {
            trail.push(TrailEntry {
                parent: None,
                position: -1,
                node,
                link: GraphLink::default(),
            });
            frontier.push(Branch {
                node,
                cost: 0.0,
                trail: trail.len() - 1,
                holds: SmallVec::new(),
                merged_released: 0,
                last_step: [None; NUM_FEET],
                counts: counts.clone(),
            });
        }
        PerformanceSearch {
            graph,
            config,
            fallbacks,
            weights,
            rng: ChartRng::new(seed),
            frontier,
            trail,
        }
    }

    fn run(&mut self, groups: &[PositionGroup]) -> Result<(), PerformanceError> {
        for group in groups {
            if group.released_lanes != 0 {
                self.release(group.position, group.released_lanes)?;
            }
            self.step(group)?;
        }
        Ok(())
    }

    fn release(&mut self, position: i32, lanes: u64) -> Result<(), PerformanceError> {
        let mut candidates = Vec::with_capacity(self.frontier.len());
        let mut pending = Vec::with_capacity(self.frontier.len());
        for (i, b) in self.frontier.iter().enumerate() {
            let mut mask = 0u64;
            let mut covered = 0u64;
            let mut kept = HeldArrows::new();
            for &(arrow, held) in &b.holds {
                if held & lanes != 0 {
                    mask |= arrow_bit(arrow);
                    covered |= held;
                } else {
                    kept.push((arrow, held));
                }
            }
            if lanes & !covered & !b.merged_released != 0 {
                continue;
            }
            let merged_released = (b.merged_released | covered) & !lanes;
            let (to, link) = if mask == 0 {
                (b.node, GraphLink::default())
            } else {
                let edge = self
                    .graph
                    .edges(b.node)
                    .iter()
                    .find(|e| e.link.is_release() && e.released_mask == mask);
                match edge {
                    Some(e) => (e.to, e.link),
                    None => continue,
                }
            };
            candidates.push(Candidate {
                parent: i,
                parent_node: b.node,
                to,
                link,
                cost: b.cost,
            });
            pending.push(Pending {
                holds: kept,
                merged_released,
                placed_mask: 0,
            });
        }
        if candidates.is_empty() {
            return Err(PerformanceError::UnmatchedRelease {
                position,
                lanes: mask_arrows(lanes),
            });
        }
        self.collapse(position, &candidates, &pending);
        Ok(())
    }

    fn step(&mut self, group: &PositionGroup) -> Result<(), PerformanceError> {
        let wanted: SmallVec<[WantedStep; 2]> = group
            .steps
            .iter()
            .zip(&group.step_lanes)
            .filter_map(|(link, lanes)| {
                let foot = link.mover()?;
                Some(WantedStep {
                    foot,
                    step: link.step_type(foot)?,
                    link: *link,
                    lanes: *lanes,
                })
            })
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }
        let max_depth = self.fallbacks.map_or(0, StepTypeFallbacks::max_depth);
        for depth in 0..=max_depth {
            let (candidates, pending) = self.step_candidates(group.position, &wanted, depth);
            if !candidates.is_empty() {
                if depth > 0 {
                    trace!(position = group.position, depth, "resolved with fallbacks");
                }
                self.collapse(group.position, &candidates, &pending);
                return Ok(());
            }
        }
        Err(PerformanceError::UnresolvedStep {
            position: group.position,
            step_types: wanted.iter().map(|w| w.step).collect(),
        })
    }

    fn step_candidates(
        &self,
        position: i32,
        wanted: &[WantedStep],
        depth: usize,
    ) -> (Vec<Candidate>, Vec<Pending>) {
        let mut candidates = Vec::new();
        let mut pending = Vec::new();
        for (i, b) in self.frontier.iter().enumerate() {
            let mut consider = |e: &GraphEdge| {
                if let Some((cost, p)) = self.evaluate(b, e, wanted, depth, position) {
                    candidates.push(Candidate {
                        parent: i,
                        parent_node: b.node,
                        to: e.to,
                        link: e.link,
                        cost,
                    });
                    pending.push(p);
                }
            };
            if let [single] = wanted {
                for e in self.graph.edges(b.node) {
                    if !e.link.is_release() && e.link.mover() == Some(single.foot) {
                        consider(e);
                    }
                }
            } else {
                let jumps = self.graph.jump_edges(b.node, |half| {
                    half.link.mover().is_some_and(|f| {
                        wanted
                            .iter()
                            .any(|w| w.foot == f && map_portions(&w.link, &half.link, f).is_some())
                    })
                });
                for e in &jumps {
                    consider(e);
                }
            }
        }
        (candidates, pending)
    }

    fn fallback_rank(&self, wanted: StepType, candidate: StepType, depth: usize) -> Option<usize> {
        if wanted == candidate {
            return Some(0);
        }
        self.fallbacks?.rank(wanted, candidate, depth)
    }

    fn evaluate(
        &self,
        branch: &Branch,
        edge: &GraphEdge,
        wanted: &[WantedStep],
        depth: usize,
        position: i32,
    ) -> Option<(f64, Pending)> {
        let mut rank_total = 0;
        let mut holds = branch.holds.clone();
        let events = self.graph.link_events(&edge.link, edge.to);
        for w in wanted {
            let out_step = edge.link.step_type(w.foot)?;
            rank_total += self.fallback_rank(w.step, out_step, depth)?;
            let bits = map_portions(&w.link, &edge.link, w.foot)?;
            for ev in events
                .iter()
                .filter(|ev| ev.foot == w.foot && ev.action == FootAction::Hold)
            {
                holds.push((ev.arrow, lanes_of(bits[ev.portion.index()], w.foot, &w.lanes)));
            }
        }
        let cost = branch.cost
            + self.config.fallback_weight * rank_total as f64
            + self.movement_cost(branch, edge, position)
            + self.distribution_cost(branch, edge.placed_mask);
        Some((
            cost,
            Pending {
                holds,
                merged_released: branch.merged_released,
                placed_mask: edge.placed_mask,
            },
        ))
    }

    fn movement_cost(&self, branch: &Branch, edge: &GraphEdge, position: i32) -> f64 {
        let tightening = &self.config.step_tightening;
        let mut cost = 0.0;
        for foot in edge.link.placing_feet() {
            let d = distance(
                self.graph.foot_center(branch.node, foot),
                self.graph.foot_center(edge.to, foot),
            );
            cost += self.config.travel_distance_weight * d;
            if let Some(last) = branch.last_step[foot.index()] {
                if position - last <= tightening.time_threshold_ticks
                    && d > tightening.distance_threshold
                {
                    cost += tightening.weight * (d - tightening.distance_threshold);
                }
            }
        }
        cost
    }

    fn distribution_cost(&self, branch: &Branch, placed_mask: u64) -> f64 {
        let Some(weights) = &self.weights else {
            return 0.0;
        };
        let counted = |a: usize| branch.counts[a] as f64 + ((placed_mask >> a) & 1) as f64;
        let total: f64 = (0..weights.len()).map(counted).sum();
        if total == 0.0 {
            return 0.0;
        }
        let deviation: f64 = weights
            .iter()
            .enumerate()
            .map(|(a, w)| (counted(a) / total - w).abs())
            .sum();
        self.config.arrow_weight_deviation_weight * deviation
    }

    fn collapse(&mut self, position: i32, candidates: &[Candidate], pending: &[Pending]) {
        let groups = cheapest_by_node(candidates);
        let mut next = Vec::with_capacity(groups.len());
        for tied in groups {
            let pick = self.rng.pick_index(tied.len()).unwrap_or(0);
            let ci = tied[pick];
            let c = &candidates[ci];
            let parent = &self.frontier[c.parent];
            let mut last_step = parent.last_step;
            let mut counts = parent.counts.clone();
            let trail = if c.link.is_empty() {
                parent.trail
            } else {
                self.trail.push(TrailEntry {
                    parent: Some(parent.trail),
                    position,
                    node: c.to,
                    link: c.link,
                });
                self.trail.len() - 1
            };
            if !c.link.is_empty() && !c.link.is_release() {
                for foot in c.link.placing_feet() {
                    last_step[foot.index()] = Some(position);
                }
                if !counts.is_empty() {
                    for a in mask_arrows(pending[ci].placed_mask) {
                        counts[a] += 1;
                    }
                }
            }
            next.push(Branch {
                node: c.to,
                cost: c.cost,
                trail,
                holds: pending[ci].holds.clone(),
                merged_released: pending[ci].merged_released,
                last_step,
                counts,
            });
        }
        self.frontier = next;
    }

    /// Pick the final branch and return its trail, root first, with its cost.
    fn best_path(&mut self) -> (Vec<TrailEntry>, f64) {
        let tied = tied_minimum(self.frontier.iter().map(|b| b.cost));
        let pick = self.rng.pick_index(tied.len()).unwrap_or(0);
        let Some(branch) = tied.get(pick).map(|&i| &self.frontier[i]) else {
            return (Vec::new(), 0.0);
        };
        let mut path = Vec::new();
        let mut cursor = Some(branch.trail);
        while let Some(i) = cursor {
            path.push(self.trail[i]);
            cursor = self.trail[i].parent;
        }
        path.reverse();
        (path, branch.cost)
    }
}

fn normalized_weights(weights: &[f64], num_arrows: usize) -> Option<Vec<f64>> {
    if weights.len() != num_arrows || weights.iter().any(|w| *w < 0.0) {
        return None;
    }
    let sum: f64 = weights.iter().sum();
    (sum > 0.0).then(|| weights.iter().map(|w| w / sum).collect())
}

/// Turn a root-first trail into the sibling/next arena.
fn build_chain(path: &[TrailEntry]) -> Vec<PerformanceNode> {
    let Some((root, rest)) = path.split_first() else {
        return Vec::new();
    };
    let mut nodes = vec![PerformanceNode {
        position: -1,
        graph_node: root.node,
        kind: PerformanceNodeKind::Root,
        next: None,
        sibling: None,
    }];
    let mut prev_head = 0;
    for group in rest.chunk_by(|a, b| a.position == b.position) {
        let head = nodes.len();
        let mut last: Option<usize> = None;
        for entry in group {
            let kinds: SmallVec<[PerformanceNodeKind; 2]> = if entry.link.is_release() {
                SmallVec::from_elem(PerformanceNodeKind::Release(entry.link), 1)
            } else {
                entry
                    .link
                    .placing_feet()
                    .map(|f| PerformanceNodeKind::Step(entry.link.restricted_to(f)))
                    .collect()
            };
            for kind in kinds {
                let index = nodes.len();
                nodes.push(PerformanceNode {
                    position: entry.position,
                    graph_node: entry.node,
                    kind,
                    next: None,
                    sibling: None,
                });
                if let Some(l) = last {
                    nodes[l].sibling = Some(index);
                }
                last = Some(index);
            }
        }
        nodes[prev_head].next = Some(head);
        prev_head = head;
    }
    nodes
}

impl PerformedChart {
    /// Realize `expressed` on `graph`.
    ///
    /// `start_tiers` are tried in order. `fallbacks` is consulted only when
    /// an exact technique is unavailable; pass `None` when the input pad fits
    /// within the output pad.
    pub fn create(
        graph: &StepGraph,
        config: &PerformanceConfig,
        start_tiers: &[Vec<NodeId>],
        fallbacks: Option<&StepTypeFallbacks>,
        expressed: &ExpressedChart,
        seed: u64,
        log_id: &str,
    ) -> Result<Self, PerformanceError> {
        let groups = expressed.position_groups();
        let mut first_error = None;
        for (tier, start) in start_tiers.iter().enumerate() {
            if start.is_empty() {
                continue;
            }
            let mut search = PerformanceSearch::new(graph, config, fallbacks, start, seed);
            if let Err(e) = search.run(&groups) {
                debug!("{log_id} Start tier {tier} failed: {e}");
                first_error.get_or_insert(e);
                continue;
            }
            let (path, total_cost) = search.best_path();
            let mut chart = PerformedChart {
                nodes: build_chain(&path),
                mines: Vec::new(),
                start_tier: tier,
                total_cost,
            };
            let steps = chart.foot_steps(graph);
            let holds = chart.hold_spans(graph);
            chart.mines = place_mines(
                expressed.mine_events(),
                &steps,
                &holds,
                graph.num_arrows(),
                &mut search.rng,
            );
            debug!(
                "{log_id} Performed {} positions from start tier {tier}, cost {total_cost:.2}",
                groups.len()
            );
            return Ok(chart);
        }
        Err(first_error.unwrap_or(PerformanceError::NoStartNodes))
    }

    pub fn nodes(&self) -> &[PerformanceNode] {
        &self.nodes
    }

    pub fn root(&self) -> &PerformanceNode {
        &self.nodes[0]
    }

    pub fn mines(&self) -> &[PlacedMine] {
        &self.mines
    }

    /// Index of the start tier the chart was generated from.
    pub fn start_tier(&self) -> usize {
        self.start_tier
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Indices of position heads in order, excluding the root.
    pub fn heads(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.nodes.first().and_then(|r| r.next), |&i| {
            self.nodes[i].next
        })
    }

    pub fn siblings(&self, head: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(head), |&i| self.nodes[i].sibling)
    }

    /// Every concrete arrow event in chain order.
    fn arrow_events(&self, graph: &StepGraph) -> Vec<(i32, FootArrowEvent)> {
        let mut out = Vec::new();
        for head in self.heads() {
            for i in self.siblings(head) {
                let node = &self.nodes[i];
                if let Some(link) = node.link() {
                    out.extend(
                        graph
                            .link_events(link, node.graph_node)
                            .into_iter()
                            .map(|ev| (node.position, ev)),
                    );
                }
            }
        }
        out
    }

    pub fn foot_steps(&self, graph: &StepGraph) -> Vec<FootStep> {
        self.arrow_events(graph)
            .into_iter()
            .filter(|(_, ev)| ev.action != FootAction::Release)
            .map(|(position, ev)| FootStep {
                position,
                arrow: ev.arrow,
                foot: ev.foot,
            })
            .collect()
    }

    fn hold_spans(&self, graph: &StepGraph) -> Vec<HoldSpan> {
        let mut open: Vec<Option<i32>> = vec![None; graph.num_arrows()];
        let mut spans = Vec::new();
        for (position, ev) in self.arrow_events(graph) {
            match ev.action {
                FootAction::Hold => open[ev.arrow] = Some(position),
                FootAction::Release => {
                    if let Some(start) = open[ev.arrow].take() {
                        spans.push(HoldSpan {
                            arrow: ev.arrow,
                            start,
                            end: position,
                        });
                    }
                }
                FootAction::Tap => {}
            }
        }
        spans
    }

    /// Materialize the chart as a sorted note timeline.
    pub fn create_events(&self, graph: &StepGraph) -> Vec<NoteEvent> {
        let mut events: Vec<NoteEvent> = self
            .arrow_events(graph)
            .into_iter()
            .map(|(position, ev)| match ev.action {
                FootAction::Tap => NoteEvent::tap(position, ev.arrow),
                FootAction::Hold => NoteEvent::hold_start(position, ev.arrow),
                FootAction::Release => NoteEvent::hold_end(position, ev.arrow),
            })
            .collect();
        events.extend(
            self.mines
                .iter()
                .map(|m| NoteEvent::mine(m.position, m.arrow)),
        );
        events.sort();
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressed::ExpressionConfig;
    use crate::pad::{ArrowPosition, PadData};
    use crate::types::NoteEvent as N;
    use crate::types::NoteKind;
    use std::collections::BTreeMap;

    fn single() -> StepGraph {
        StepGraph::build(PadData::dance_single()).unwrap()
    }

    fn two_arrow() -> StepGraph {
        let pad = PadData {
            steps_type: "two-arrow".to_string(),
            arrows: vec![ArrowPosition::new(0, 0), ArrowPosition::new(1, 0)],
            starting_positions: vec![vec![[0, 1]]],
            rules: Default::default(),
        };
        StepGraph::build(pad).unwrap()
    }

    fn perform(
        input: &StepGraph,
        output: &StepGraph,
        events: &[NoteEvent],
        fallbacks: Option<&StepTypeFallbacks>,
        seed: u64,
    ) -> Result<Vec<NoteEvent>, PerformanceError> {
        let expressed =
            ExpressedChart::create(events, input, &ExpressionConfig::default(), 10, "[test]")
                .unwrap();
        let chart = PerformedChart::create(
            output,
            &PerformanceConfig::default(),
            output.start_tiers(),
            fallbacks,
            &expressed,
            seed,
            "[test]",
        )?;
        Ok(chart.create_events(output))
    }

    #[test]
    fn single_tap_round_trips() {
        let g = single();
        let out = perform(&g, &g, &[N::tap(0, 0)], None, 1).unwrap();
        assert_eq!(out, vec![N::tap(0, 0)]);
    }

    #[test]
    fn hold_round_trips() {
        let g = single();
        let events = [N::hold_start(0, 0), N::hold_end(192, 0)];
        let out = perform(&g, &g, &events, None, 1).unwrap();
        assert_eq!(out, events.to_vec());
    }

    #[test]
    fn output_is_deterministic_for_a_seed() {
        let g = single();
        let events = [
            N::tap(0, 1),
            N::tap(48, 2),
            N::tap(96, 0),
            N::tap(96, 3),
            N::hold_start(144, 1),
            N::tap(168, 3),
            N::hold_end(192, 1),
            N::mine(216, 2),
        ];
        let a = perform(&g, &g, &events, None, 42).unwrap();
        let b = perform(&g, &g, &events, None, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn seeds_only_choose_between_tied_placements() {
        // From home, the left foot reaches down and up at equal distance.
        let g = single();
        let mut seen = std::collections::BTreeSet::new();
        for seed in 0..32 {
            let out = perform(&g, &g, &[N::tap(0, 1)], None, seed).unwrap();
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].position, 0);
            seen.insert(out[0].lane);
        }
        assert!(seen.iter().all(|lane| [1, 2].contains(lane)), "{seen:?}");
    }

    #[test]
    fn jump_onto_two_arrow_pad_uses_fallbacks() {
        let input = single();
        let output = two_arrow();
        let fallbacks = StepTypeFallbacks::default_table();
        let out = perform(
            &input,
            &output,
            &[N::tap(0, 1), N::tap(0, 2)],
            Some(&fallbacks),
            7,
        )
        .unwrap();
        assert_eq!(out, vec![N::tap(0, 0), N::tap(0, 1)]);
    }

    #[test]
    fn unresolvable_step_without_fallbacks() {
        let input = single();
        let output = two_arrow();
        let err = perform(&input, &output, &[N::tap(0, 1), N::tap(0, 2)], None, 7).unwrap_err();
        assert_eq!(
            err,
            PerformanceError::UnresolvedStep {
                position: 0,
                step_types: vec![StepType::NewArrow, StepType::NewArrow],
            }
        );
    }

    #[test]
    fn fallbacks_do_not_change_exactly_resolvable_charts() {
        let g = single();
        let events = [
            N::tap(0, 0),
            N::tap(24, 3),
            N::tap(48, 1),
            N::tap(72, 2),
            N::tap(96, 1),
            N::tap(96, 2),
        ];
        let fallbacks = StepTypeFallbacks::default_table();
        for seed in [1, 2, 3] {
            let without = perform(&g, &g, &events, None, seed).unwrap();
            let with = perform(&g, &g, &events, Some(&fallbacks), seed).unwrap();
            assert_eq!(without, with);
        }
    }

    #[test]
    fn empty_start_tiers_are_an_error() {
        let g = single();
        let expressed =
            ExpressedChart::create(&[N::tap(0, 0)], &g, &ExpressionConfig::default(), 1, "")
                .unwrap();
        let err = PerformedChart::create(
            &g,
            &PerformanceConfig::default(),
            &[Vec::new()],
            None,
            &expressed,
            0,
            "",
        )
        .unwrap_err();
        assert_eq!(err, PerformanceError::NoStartNodes);
    }

    #[test]
    fn mines_land_on_free_arrows() {
        let g = single();
        let events = [N::tap(0, 0), N::mine(24, 0), N::tap(48, 3)];
        let out = perform(&g, &g, &events, None, 5).unwrap();
        let mines: Vec<_> = out.iter().filter(|e| e.kind == NoteKind::Mine).collect();
        assert_eq!(mines.len(), 1);
        assert_eq!(mines[0].position, 24);
        assert_eq!(mines[0].lane, 0);
    }

    #[test]
    fn portion_mapping_merges_bracket_holds() {
        use crate::technique::PortionLink;
        let mut src = GraphLink::default();
        src.set(
            Foot::Left,
            FootPortion::Heel,
            PortionLink::new(StepType::BracketHeelNewToeNew, FootAction::Hold),
        );
        src.set(
            Foot::Left,
            FootPortion::Toe,
            PortionLink::new(StepType::BracketHeelNewToeNew, FootAction::Tap),
        );
        let mut out = GraphLink::default();
        out.set(
            Foot::Left,
            FootPortion::Heel,
            PortionLink::new(StepType::NewArrow, FootAction::Hold),
        );
        let bits = map_portions(&src, &out, Foot::Left).unwrap();
        assert_eq!(bits[0], portion_bit(Foot::Left, FootPortion::Heel));

        let mut tap = GraphLink::default();
        tap.set(
            Foot::Left,
            FootPortion::Heel,
            PortionLink::new(StepType::NewArrow, FootAction::Tap),
        );
        assert!(map_portions(&src, &tap, Foot::Left).is_none());
    }

    fn double() -> StepGraph {
        StepGraph::build(PadData::dance_double()).unwrap()
    }

    /// Panics unless every hold start is closed by a hold end on its lane
    /// with no other note on that lane in between.
    fn assert_holds_paired(events: &[NoteEvent]) {
        let mut open: BTreeMap<usize, i32> = BTreeMap::new();
        for e in events {
            match e.kind {
                NoteKind::HoldStart => {
                    assert!(open.insert(e.lane, e.position).is_none(), "{e:?} in {events:?}");
                }
                NoteKind::HoldEnd => {
                    assert!(open.remove(&e.lane).is_some(), "{e:?} in {events:?}");
                }
                NoteKind::Tap | NoteKind::Mine => {
                    assert!(!open.contains_key(&e.lane), "{e:?} in {events:?}");
                }
            }
        }
        assert!(open.is_empty(), "unterminated holds {open:?} in {events:?}");
    }

    /// Steps (taps and hold starts) and hold ends per position.
    fn shape(events: &[NoteEvent]) -> BTreeMap<i32, (usize, usize)> {
        let mut out: BTreeMap<i32, (usize, usize)> = BTreeMap::new();
        for e in events {
            let entry = out.entry(e.position).or_default();
            match e.kind {
                NoteKind::Tap | NoteKind::HoldStart => entry.0 += 1,
                NoteKind::HoldEnd => entry.1 += 1,
                NoteKind::Mine => {}
            }
        }
        out
    }

    /// A hold kept down through a one-arrow bracket ends on the toe slot.
    const BRACKET_KEEPS_HOLD: [NoteEvent; 6] = [
        N::hold_start(720, 3),
        N::hold_start(840, 2),
        N::tap(864, 0),
        N::hold_end(912, 2),
        N::tap(960, 0),
        N::hold_end(984, 3),
    ];

    #[test]
    fn hold_survives_a_one_arrow_bracket() {
        let g = single();
        let expressed = ExpressedChart::create(
            &BRACKET_KEEPS_HOLD,
            &g,
            &ExpressionConfig::default(),
            10,
            "[test]",
        )
        .unwrap();
        let bracket = expressed
            .position_groups()
            .into_iter()
            .find(|group| group.position == 864)
            .unwrap();
        assert!(bracket.steps[0].step_type(Foot::Left).unwrap().is_bracket());

        for seed in [1, 2, 3] {
            let out = perform(&g, &g, &BRACKET_KEEPS_HOLD, None, seed).unwrap();
            assert_holds_paired(&out);
            assert_eq!(shape(&out), shape(&BRACKET_KEEPS_HOLD));
        }
    }

    #[test]
    fn hold_chart_performs_on_double() {
        let input = single();
        let output = double();
        let events = [
            N::hold_start(0, 0),
            N::tap(24, 3),
            N::tap(48, 2),
            N::hold_end(72, 0),
            N::tap(72, 1),
            N::hold_start(96, 1),
            N::hold_start(96, 2),
            N::hold_end(144, 1),
            N::hold_end(144, 2),
        ];
        for events in [&events[..], &BRACKET_KEEPS_HOLD[..]] {
            for seed in [1, 9] {
                let out = perform(&input, &output, events, None, seed).unwrap();
                assert_holds_paired(&out);
                assert_eq!(shape(&out), shape(events));
                assert!(out.iter().all(|e| e.lane < 8));
            }
        }
    }

    /// A valid single-pad timeline with at most two holds open at once.
    fn random_hold_chart(rng: &mut ChartRng) -> Vec<NoteEvent> {
        let mut events = Vec::new();
        let mut open: [Option<i32>; 4] = [None; 4];
        let mut position = 0;
        for _ in 0..24 {
            position += 24 * rng.range_usize(1, 3) as i32;
            let held: Vec<usize> = (0..4).filter(|&l| open[l].is_some()).collect();
            let roll = rng.range_usize(0, 10);
            let end_hold = match held.len() {
                0 => false,
                1 => roll < 3,
                _ => roll < 8,
            };
            if end_hold {
                let lane = held[rng.range_usize(0, held.len())];
                open[lane] = None;
                events.push(N::hold_end(position, lane));
                continue;
            }
            let free: Vec<usize> = (0..4).filter(|&l| open[l].is_none()).collect();
            let lane = free[rng.range_usize(0, free.len())];
            if held.len() < 2 && roll >= 7 {
                open[lane] = Some(position);
                events.push(N::hold_start(position, lane));
            } else {
                events.push(N::tap(position, lane));
            }
        }
        position += 24;
        for (lane, start) in open.iter().enumerate() {
            if start.is_some() {
                events.push(N::hold_end(position, lane));
            }
        }
        events
    }

    #[test]
    fn random_hold_charts_perform_on_their_own_graph() {
        let g = single();
        let mut rng = ChartRng::new(0x5eed);
        let mut performed = 0;
        for _ in 0..40 {
            let events = random_hold_chart(&mut rng);
            let Ok(expressed) =
                ExpressedChart::create(&events, &g, &ExpressionConfig::default(), 10, "[test]")
            else {
                continue;
            };
            let chart = PerformedChart::create(
                &g,
                &PerformanceConfig::default(),
                g.start_tiers(),
                None,
                &expressed,
                3,
                "[test]",
            )
            .unwrap_or_else(|e| panic!("{e} for {events:?}"));
            let out = chart.create_events(&g);
            assert_holds_paired(&out);
            assert_eq!(shape(&out), shape(&events), "{events:?}");
            performed += 1;
        }
        assert!(performed >= 10, "only {performed} charts expressed");
    }

    #[test]
    fn seeds_agree_wherever_the_placement_is_forced() {
        // Only the first step is tied (down or up from the home position);
        // every later step has exactly one cheapest placement.
        let events = [
            N::tap(0, 1),
            N::tap(48, 0),
            N::tap(96, 3),
            N::tap(144, 0),
            N::hold_start(192, 3),
            N::tap(216, 0),
            N::hold_end(240, 3),
            N::tap(288, 0),
            N::tap(288, 3),
        ];
        let g = single();
        let baseline = perform(&g, &g, &events, None, 0).unwrap();
        for seed in 1..16 {
            let out = perform(&g, &g, &events, None, seed).unwrap();
            assert_eq!(out.len(), baseline.len());
            assert!([1, 2].contains(&out[0].lane), "{out:?}");
            assert_eq!(out[1..], baseline[1..], "seed {seed}");
        }

        // With no tie anywhere, every seed gives the same chart, also on a
        // different pad.
        let forced = &events[1..];
        for output in [single(), double()] {
            let baseline = perform(&g, &output, forced, None, 0).unwrap();
            assert_holds_paired(&baseline);
            for seed in 1..16 {
                assert_eq!(perform(&g, &output, forced, None, seed).unwrap(), baseline);
            }
        }
    }

    #[test]
    fn hold_end_without_a_tracked_hold_is_an_error() {
        let g = single();
        let config = PerformanceConfig::default();
        let mut search = PerformanceSearch::new(&g, &config, None, &g.start_tiers()[0], 0);
        assert_eq!(
            search.release(48, arrow_bit(2)),
            Err(PerformanceError::UnmatchedRelease {
                position: 48,
                lanes: vec![2],
            })
        );

        // A lane whose output arrow was released with a merged partner has
        // nothing left to release.
        let node = search.frontier[0].node;
        search.frontier[0].merged_released = arrow_bit(2);
        assert_eq!(search.release(48, arrow_bit(2)), Ok(()));
        assert_eq!(search.frontier.len(), 1);
        assert_eq!(search.frontier[0].node, node);
        assert_eq!(search.frontier[0].merged_released, 0);
    }

    #[test]
    fn arrow_weights_must_match_the_pad() {
        assert!(normalized_weights(&[1.0, 1.0], 4).is_none());
        assert!(normalized_weights(&[0.0, 0.0], 2).is_none());
        assert_eq!(normalized_weights(&[1.0, 3.0], 2), Some(vec![0.25, 0.75]));
    }
}

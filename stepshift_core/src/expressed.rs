// Chart Expression Engine: note timeline -> pad-independent technique chain.
//
// The timeline is grouped into rows (one per position). Each row is consumed
// in up to two sub-steps: first the hold ends at that position, which force
// a release link, then the taps and hold starts, which must be matched by a
// link engaging exactly those arrows with exactly those actions. For every
// live branch all consistent single-foot edges are expanded, plus composed
// jump edges when two or more arrows are hit. After each sub-step the
// frontier collapses to the cheapest branch per graph node (see
// `frontier.rs`). Equal costs keep the canonical first candidate; the
// expression search never consumes randomness.
//
// Costs come from `ExpressionCosts`: a per-technique cost, a bracket cost
// that depends on the bracket parsing method, and a double-step penalty for
// the same foot placing twice in a row while the other foot is free.
//
// The surviving branch becomes an arena of `ChartSearchNode`s. Each position
// is one head plus a sibling list: the release (if any) first, then one node
// per placing foot. A jump therefore appears as two same-position siblings
// that both reference the jump's destination node. Only heads carry `next`.
//
// Mines are associated afterwards; see `mines.rs`.

use crate::error::ExpressionError;
use crate::frontier::{Candidate, cheapest_by_node, tied_minimum};
use crate::graph::{NodeId, StepGraph};
use crate::mines::{FootStep, MineEvent, associate_mines};
use crate::technique::{GraphLink, StepType};
use crate::types::{
    Foot, FootAction, NUM_FEET, NUM_PORTIONS, NoteEvent, NoteKind, arrow_bit, mask_arrows,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BracketParsingMethod {
    /// Prefer brackets over jumps wherever both explain a row.
    Aggressive,
    /// Use brackets when they are clearly the better reading.
    Balanced,
    /// Only bracket when nothing else can satisfy a row.
    NoBrackets,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BracketParsingDetermination {
    UseDefaultMethod,
    /// Charts below `min_level_for_brackets` use `NoBrackets`; charts with
    /// rows of more than two arrows use `Aggressive`; others use `Balanced`.
    ChooseMethodDynamically,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionCosts {
    /// Cost of each technique. Missing entries use `StepType::default_cost`.
    pub step_costs: BTreeMap<StepType, f64>,
    /// Added per bracketing foot under `Aggressive` parsing.
    pub aggressive_bracket: f64,
    /// Added per bracketing foot under `Balanced` parsing.
    pub balanced_bracket: f64,
    /// Added per bracketing foot under `NoBrackets` parsing.
    pub no_brackets_bracket: f64,
    /// Same foot placing on consecutive rows while the other foot is free.
    pub double_step: f64,
}

impl Default for ExpressionCosts {
    fn default() -> Self {
        ExpressionCosts {
            step_costs: StepType::ALL
                .iter()
                .map(|&st| (st, st.default_cost()))
                .collect(),
            aggressive_bracket: -1.5,
            balanced_bracket: 1.5,
            no_brackets_bracket: 100.0,
            double_step: 3.0,
        }
    }
}

impl ExpressionCosts {
    pub fn step_cost(&self, step: StepType) -> f64 {
        self.step_costs
            .get(&step)
            .copied()
            .unwrap_or_else(|| step.default_cost())
    }

    pub fn bracket_cost(&self, method: BracketParsingMethod) -> f64 {
        match method {
            BracketParsingMethod::Aggressive => self.aggressive_bracket,
            BracketParsingMethod::Balanced => self.balanced_bracket,
            BracketParsingMethod::NoBrackets => self.no_brackets_bracket,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    pub default_bracket_parsing_method: BracketParsingMethod,
    pub bracket_parsing_determination: BracketParsingDetermination,
    /// Charts rated below this never bracket when choosing dynamically.
    pub min_level_for_brackets: u32,
    pub costs: ExpressionCosts,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        ExpressionConfig {
            default_bracket_parsing_method: BracketParsingMethod::Balanced,
            bracket_parsing_determination: BracketParsingDetermination::ChooseMethodDynamically,
            min_level_for_brackets: 7,
            costs: ExpressionCosts::default(),
        }
    }
}

impl ExpressionConfig {
    pub fn bracket_parsing_method(
        &self,
        difficulty_rating: u32,
        max_simultaneous_arrows: usize,
    ) -> BracketParsingMethod {
        match self.bracket_parsing_determination {
            BracketParsingDetermination::UseDefaultMethod => self.default_bracket_parsing_method,
            BracketParsingDetermination::ChooseMethodDynamically => {
                if difficulty_rating < self.min_level_for_brackets {
                    BracketParsingMethod::NoBrackets
                } else if max_simultaneous_arrows > 2 {
                    BracketParsingMethod::Aggressive
                } else {
                    BracketParsingMethod::Balanced
                }
            }
        }
    }
}

/// One decision point of an expressed chart.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ChartSearchNode {
    pub position: i32,
    pub graph_node: NodeId,
    /// `None` only at the root.
    pub link: Option<GraphLink>,
    /// Source lane engaged by each foot portion of `link`.
    pub lanes: PortionLanes,
    /// Cumulative search cost up to and including this position.
    pub cost: f64,
    /// Head of the next position. Set on heads only.
    pub next: Option<usize>,
    /// Next decision at the same position.
    pub sibling: Option<usize>,
}

/// Lane under each portion, indexed by foot then portion.
pub type PortionLanes = [[Option<usize>; NUM_PORTIONS]; NUM_FEET];

/// Everything an expressed chart records at one position.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionGroup {
    pub position: i32,
    /// Release link and the node it arrives at.
    pub release: Option<(GraphLink, NodeId)>,
    /// Source lanes whose holds end here.
    pub released_lanes: u64,
    /// One single-foot link per placing foot, left first.
    pub steps: SmallVec<[GraphLink; 2]>,
    /// Lanes engaged by each entry of `steps`.
    pub step_lanes: SmallVec<[PortionLanes; 2]>,
    /// Node reached by the steps, if there are any.
    pub step_node: Option<NodeId>,
}

/// Arrows engaged at one position, as re-derived from a technique chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngagedArrows {
    pub placed: u64,
    pub held: u64,
    pub released: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExpressedChart {
    nodes: Vec<ChartSearchNode>,
    mine_events: Vec<MineEvent>,
    bracket_parsing_method: BracketParsingMethod,
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Row {
    position: i32,
    released: u64,
    placed: u64,
    held: u64,
}

/// Group a sorted timeline into rows, validating lanes and hold pairing.
/// Returns the rows with steps or releases plus the mines.
fn group_rows(
    events: &[NoteEvent],
    num_arrows: usize,
) -> Result<(Vec<Row>, Vec<(i32, usize)>), ExpressionError> {
    let mut rows: Vec<Row> = Vec::new();
    let mut mines = Vec::new();
    let mut open_holds: Vec<Option<i32>> = vec![None; num_arrows];
    for ev in events {
        let (position, lane) = (ev.position, ev.lane);
        if lane >= num_arrows {
            return Err(ExpressionError::LaneOutOfRange {
                position,
                lane,
                num_arrows,
            });
        }
        if position < 0 {
            return Err(ExpressionError::NegativePosition { position, lane });
        }
        if ev.kind == NoteKind::Mine {
            mines.push((position, lane));
            continue;
        }
        if rows.last().is_none_or(|r| r.position != position) {
            rows.push(Row {
                position,
                ..Row::default()
            });
        }
        let Some(row) = rows.last_mut() else {
            continue;
        };
        let bit = arrow_bit(lane);
        match ev.kind {
            NoteKind::HoldEnd => {
                if open_holds[lane].take().is_none() {
                    return Err(ExpressionError::UnmatchedHoldEnd { position, lane });
                }
                row.released |= bit;
            }
            NoteKind::Tap => {
                if open_holds[lane].is_some() {
                    return Err(ExpressionError::HoldOverlap { position, lane });
                }
                row.placed |= bit;
            }
            NoteKind::HoldStart => {
                if open_holds[lane].is_some() {
                    return Err(ExpressionError::HoldOverlap { position, lane });
                }
                open_holds[lane] = Some(position);
                row.placed |= bit;
                row.held |= bit;
            }
            NoteKind::Mine => {}
        }
    }
    if let Some((lane, Some(position))) = open_holds
        .iter()
        .enumerate()
        .find(|(_, start)| start.is_some())
        .map(|(lane, start)| (lane, *start))
    {
        return Err(ExpressionError::UnterminatedHold { position, lane });
    }
    Ok((rows, mines))
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
struct Branch {
    node: NodeId,
    cost: f64,
    trail: usize,
    last_mover: Option<Foot>,
}

#[derive(Clone, Copy, Debug)]
struct TrailEntry {
    parent: Option<usize>,
    position: i32,
    node: NodeId,
    link: GraphLink,
    cost: f64,
}

struct ExpressionSearch<'a> {
    graph: &'a StepGraph,
    costs: &'a ExpressionCosts,
    method: BracketParsingMethod,
    frontier: Vec<Branch>,
    trail: Vec<TrailEntry>,
}

impl<'a> ExpressionSearch<'a> {
    fn new(graph: &'a StepGraph, costs: &'a ExpressionCosts, method: BracketParsingMethod) -> Self {
        let root = graph.root();
        ExpressionSearch {
            graph,
            costs,
            method,
            frontier: vec![Branch {
                node: root,
                cost: 0.0,
                trail: 0,
                last_mover: None,
            }],
            trail: vec![TrailEntry {
                parent: None,
                position: -1,
                node: root,
                link: GraphLink::default(),
                cost: 0.0,
            }],
        }
    }

    fn advance(&mut self, row: &Row) -> Result<(), ExpressionError> {
        if row.released != 0 {
            let mut candidates = Vec::new();
            for (i, b) in self.frontier.iter().enumerate() {
                for e in self.graph.edges(b.node) {
                    if e.link.is_release() && e.released_mask == row.released {
                        candidates.push(Candidate {
                            parent: i,
                            parent_node: b.node,
                            to: e.to,
                            link: e.link,
                            cost: b.cost,
                        });
                    }
                }
            }
            self.collapse(row.position, row.released, &candidates)?;
        }
        if row.placed != 0 {
            let mut candidates = Vec::new();
            for (i, b) in self.frontier.iter().enumerate() {
                let fits = |placed: u64, held: u64| placed == row.placed && held == row.held;
                for e in self.graph.edges(b.node) {
                    if !e.link.is_release() && fits(e.placed_mask, e.hold_mask) {
                        candidates.push(Candidate {
                            parent: i,
                            parent_node: b.node,
                            to: e.to,
                            link: e.link,
                            cost: b.cost + self.step_cost(b, &e.link),
                        });
                    }
                }
                if row.placed.count_ones() >= 2 {
                    let jumps = self.graph.jump_edges(b.node, |half| {
                        half.placed_mask & !row.placed == 0
                            && half.hold_mask == half.placed_mask & row.held
                    });
                    for e in jumps {
                        if fits(e.placed_mask, e.hold_mask) {
                            candidates.push(Candidate {
                                parent: i,
                                parent_node: b.node,
                                to: e.to,
                                link: e.link,
                                cost: b.cost + self.step_cost(b, &e.link),
                            });
                        }
                    }
                }
            }
            self.collapse(row.position, row.placed, &candidates)?;
        }
        Ok(())
    }

    fn step_cost(&self, branch: &Branch, link: &GraphLink) -> f64 {
        let mut cost = 0.0;
        for foot in link.placing_feet() {
            if let Some(step) = link.step_type(foot) {
                cost += self.costs.step_cost(step);
                if step.is_bracket() {
                    cost += self.costs.bracket_cost(self.method);
                }
            }
        }
        if let Some(mover) = link.mover() {
            let repeated = branch.last_mover == Some(mover);
            let moved = !link.step_type(mover).is_some_and(StepType::is_same_arrow);
            let other_free = !self.graph.node(branch.node).is_holding(mover.other());
            if repeated && moved && other_free {
                cost += self.costs.double_step;
            }
        }
        cost
    }

    fn collapse(
        &mut self,
        position: i32,
        arrows: u64,
        candidates: &[Candidate],
    ) -> Result<(), ExpressionError> {
        let groups = cheapest_by_node(candidates);
        if groups.is_empty() {
            return Err(ExpressionError::UnsatisfiableStep {
                position,
                arrows: mask_arrows(arrows),
            });
        }
        let mut next = Vec::with_capacity(groups.len());
        for tied in groups {
            let c = &candidates[tied[0]];
            let parent = self.frontier[c.parent];
            let last_mover = if c.link.is_release() {
                parent.last_mover
            } else {
                c.link.mover()
            };
            self.trail.push(TrailEntry {
                parent: Some(parent.trail),
                position,
                node: c.to,
                link: c.link,
                cost: c.cost,
            });
            next.push(Branch {
                node: c.to,
                cost: c.cost,
                trail: self.trail.len() - 1,
                last_mover,
            });
        }
        self.frontier = next;
        Ok(())
    }

    /// Trail entries of the cheapest surviving branch, oldest first,
    /// excluding the root.
    fn best_path(&self) -> Vec<TrailEntry> {
        let best = tied_minimum(self.frontier.iter().map(|b| b.cost))
            .first()
            .map(|&i| self.frontier[i].trail)
            .unwrap_or(0);
        let mut path = Vec::new();
        let mut cursor = Some(best);
        while let Some(i) = cursor {
            let entry = self.trail[i];
            if entry.parent.is_some() {
                path.push(entry);
            }
            cursor = entry.parent;
        }
        path.reverse();
        path
    }
}

impl ExpressedChart {
    /// Express a chart's note timeline on the input graph.
    ///
    /// `difficulty_rating` only feeds dynamic bracket parsing; `log_id`
    /// identifies the chart in diagnostics.
    pub fn create(
        events: &[NoteEvent],
        graph: &StepGraph,
        config: &ExpressionConfig,
        difficulty_rating: u32,
        log_id: &str,
    ) -> Result<Self, ExpressionError> {
        let mut sorted = events.to_vec();
        sorted.sort();
        let (rows, mines) = group_rows(&sorted, graph.num_arrows())?;

        let max_simultaneous = rows
            .iter()
            .map(|r| r.placed.count_ones() as usize)
            .max()
            .unwrap_or(0);
        let method = config.bracket_parsing_method(difficulty_rating, max_simultaneous);

        let mut search = ExpressionSearch::new(graph, &config.costs, method);
        for row in &rows {
            search.advance(row)?;
        }
        let path = search.best_path();
        let nodes = build_chain(graph, &path);

        let mut chart = ExpressedChart {
            nodes,
            mine_events: Vec::new(),
            bracket_parsing_method: method,
        };
        let steps = chart.foot_steps(graph);
        chart.mine_events = associate_mines(&steps, &mines);

        debug!(
            "{log_id} Expressed {} rows with {:?} bracket parsing, cost {:.2}",
            rows.len(),
            method,
            chart.total_cost()
        );
        Ok(chart)
    }

    pub fn root(&self) -> &ChartSearchNode {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[ChartSearchNode] {
        &self.nodes
    }

    pub fn mine_events(&self) -> &[MineEvent] {
        &self.mine_events
    }

    pub fn bracket_parsing_method(&self) -> BracketParsingMethod {
        self.bracket_parsing_method
    }

    /// Cost of the chosen chain.
    pub fn total_cost(&self) -> f64 {
        self.nodes.iter().map(|n| n.cost).fold(0.0, f64::max)
    }

    /// Indices of position heads in order, excluding the root.
    pub fn heads(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.nodes[0].next, |&i| self.nodes[i].next)
    }

    /// Indices of a head and its siblings.
    pub fn siblings(&self, head: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(head), |&i| self.nodes[i].sibling)
    }

    pub fn position_groups(&self) -> Vec<PositionGroup> {
        self.heads()
            .map(|head| {
                let mut group = PositionGroup {
                    position: self.nodes[head].position,
                    release: None,
                    released_lanes: 0,
                    steps: SmallVec::new(),
                    step_lanes: SmallVec::new(),
                    step_node: None,
                };
                for i in self.siblings(head) {
                    let node = &self.nodes[i];
                    let Some(link) = node.link else { continue };
                    if link.is_release() {
                        group.release = Some((link, node.graph_node));
                        group.released_lanes = node
                            .lanes
                            .iter()
                            .flatten()
                            .flatten()
                            .fold(0, |mask, &lane| mask | arrow_bit(lane));
                    } else {
                        group.steps.push(link);
                        group.step_lanes.push(node.lanes);
                        group.step_node = Some(node.graph_node);
                    }
                }
                group
            })
            .collect()
    }

    /// Arrows engaged at every position, re-derived from the chain alone.
    pub fn engaged_arrows(&self, graph: &StepGraph) -> BTreeMap<i32, EngagedArrows> {
        let mut out: BTreeMap<i32, EngagedArrows> = BTreeMap::new();
        for head in self.heads() {
            for i in self.siblings(head) {
                let node = &self.nodes[i];
                let Some(link) = node.link else { continue };
                let entry = out.entry(node.position).or_default();
                for ev in graph.link_events(&link, node.graph_node) {
                    let bit = arrow_bit(ev.arrow);
                    match ev.action {
                        FootAction::Tap => entry.placed |= bit,
                        FootAction::Hold => {
                            entry.placed |= bit;
                            entry.held |= bit;
                        }
                        FootAction::Release => entry.released |= bit,
                    }
                }
            }
        }
        out
    }

    /// Every placed arrow with the foot that placed it, in position order.
    pub fn foot_steps(&self, graph: &StepGraph) -> Vec<FootStep> {
        let mut steps = Vec::new();
        for head in self.heads() {
            for i in self.siblings(head) {
                let node = &self.nodes[i];
                let Some(link) = node.link else { continue };
                for ev in graph.link_events(&link, node.graph_node) {
                    if ev.action != FootAction::Release {
                        steps.push(FootStep {
                            position: node.position,
                            arrow: ev.arrow,
                            foot: ev.foot,
                        });
                    }
                }
            }
        }
        steps
    }
}

/// Turn the winning path into the sibling/next arena.
fn build_chain(graph: &StepGraph, path: &[TrailEntry]) -> Vec<ChartSearchNode> {
    let mut nodes = vec![ChartSearchNode {
        position: -1,
        graph_node: graph.root(),
        link: None,
        lanes: PortionLanes::default(),
        cost: 0.0,
        next: None,
        sibling: None,
    }];
    let mut prev_head = 0;
    for group in path.chunk_by(|a, b| a.position == b.position) {
        let head = nodes.len();
        let mut last: Option<usize> = None;
        for entry in group {
            let halves: SmallVec<[GraphLink; 2]> = if entry.link.is_jump() {
                entry
                    .link
                    .placing_feet()
                    .map(|f| entry.link.restricted_to(f))
                    .collect()
            } else {
                SmallVec::from_elem(entry.link, 1)
            };
            for link in halves {
                let mut lanes = PortionLanes::default();
                for ev in graph.link_events(&link, entry.node) {
                    lanes[ev.foot.index()][ev.portion.index()] = Some(ev.arrow);
                }
                let index = nodes.len();
                nodes.push(ChartSearchNode {
                    position: entry.position,
                    graph_node: entry.node,
                    link: Some(link),
                    lanes,
                    cost: entry.cost,
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

// Foot-placement graph for one pad layout.
//
// A `GraphNode` records, for each foot and portion, the arrow under it and
// that arrow's state. A `GraphEdge` is a transition labeled with a
// `GraphLink`. The graph is the closure of every geometrically valid
// transition from the home position, built breadth-first: each BFS layer
// computes its transitions in parallel with rayon, then destination nodes
// are interned serially in frontier order, so ids are identical run to run
// and structurally identical states always share one `NodeId`.
//
// Stored edges are single-foot steps and releases. Jumps are not stored:
// pairing every left move with every right move is quadratic per node, so
// `jump_edges()` composes them on demand from the stored single-foot edges,
// reclassifying each half against the other foot's final position. The
// closure still interns every jump destination so composed links always land
// on an existing node.
//
// Geometry comes from `PadRules`; see `pad.rs`.
//
// **Critical constraint: determinism.** No hash-map iteration reaches node or
// edge order. The `FxHashMap` index is lookup-only.

use crate::error::{GraphError, PadError};
use crate::pad::{PadData, distance};
use crate::technique::{GraphLink, PortionLink, StepType};
use crate::types::{
    ArrowState, Foot, FootAction, FootPortion, NUM_FEET, NUM_PORTIONS, arrow_bit,
};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;

const EPSILON: f64 = 1e-9;

/// Index of an interned node in its `StepGraph`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortionState {
    pub arrow: usize,
    pub state: ArrowState,
}

impl PortionState {
    pub const fn new(arrow: usize, state: ArrowState) -> Self {
        Self { arrow, state }
    }

    pub fn is_held(&self) -> bool {
        self.state == ArrowState::Held
    }

    pub fn is_lifted(&self) -> bool {
        self.state == ArrowState::Lifted
    }
}

/// Heel then toe. A foot always has a heel; the toe is only present while
/// bracketing.
pub type FootState = [Option<PortionState>; NUM_PORTIONS];

/// A resting foot-placement state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphNode {
    pub feet: [FootState; NUM_FEET],
}

impl GraphNode {
    /// Node with each foot on a single arrow.
    pub fn new(
        left_arrow: usize,
        left_state: ArrowState,
        right_arrow: usize,
        right_state: ArrowState,
    ) -> Self {
        Self {
            feet: [
                [Some(PortionState::new(left_arrow, left_state)), None],
                [Some(PortionState::new(right_arrow, right_state)), None],
            ],
        }
    }

    pub fn foot(&self, foot: Foot) -> &FootState {
        &self.feet[foot.index()]
    }

    pub fn portion(&self, foot: Foot, portion: FootPortion) -> Option<PortionState> {
        self.feet[foot.index()][portion.index()]
    }

    pub fn is_bracketing(&self, foot: Foot) -> bool {
        self.feet[foot.index()][FootPortion::Toe.index()].is_some()
    }

    pub fn is_holding(&self, foot: Foot) -> bool {
        self.foot(foot).iter().flatten().any(PortionState::is_held)
    }

    /// Arrows under held portions.
    pub fn held_arrows(&self) -> u64 {
        self.feet
            .iter()
            .flatten()
            .flatten()
            .filter(|p| p.is_held())
            .fold(0, |mask, p| mask | arrow_bit(p.arrow))
    }

    fn with_feet(mover: Foot, mover_state: FootState, other_state: FootState) -> Self {
        let mut feet = [mover_state, other_state];
        if mover == Foot::Right {
            feet.swap(0, 1);
        }
        Self { feet }
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for foot in Foot::ALL {
            if foot == Foot::Right {
                write!(f, " ")?;
            }
            write!(f, "{foot}[")?;
            for (i, p) in self.foot(foot).iter().flatten().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                let s = match p.state {
                    ArrowState::Resting => "",
                    ArrowState::Held => "h",
                    ArrowState::Lifted => "^",
                };
                write!(f, "{}{s}", p.arrow)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// An outgoing transition, with the arrow sets it engages precomputed so the
/// searches can filter edges with mask comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GraphEdge {
    pub link: GraphLink,
    pub to: NodeId,
    /// Arrows tapped or hold-started.
    pub placed_mask: u64,
    /// Arrows hold-started.
    pub hold_mask: u64,
    /// Arrows whose hold ends.
    pub released_mask: u64,
}

impl GraphEdge {
    fn new(link: GraphLink, to: NodeId, to_node: &GraphNode) -> Self {
        let mut edge = Self {
            link,
            to,
            placed_mask: 0,
            hold_mask: 0,
            released_mask: 0,
        };
        for ev in link_events_on(&link, to_node) {
            let bit = arrow_bit(ev.arrow);
            match ev.action {
                FootAction::Tap => edge.placed_mask |= bit,
                FootAction::Hold => {
                    edge.placed_mask |= bit;
                    edge.hold_mask |= bit;
                }
                FootAction::Release => edge.released_mask |= bit,
            }
        }
        edge
    }
}

/// A concrete arrow engaged by one portion of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FootArrowEvent {
    pub foot: Foot,
    pub portion: FootPortion,
    pub arrow: usize,
    pub action: FootAction,
}

/// Foot-placement graph for one pad. Read-only once built; share via `Arc`.
#[derive(Debug)]
pub struct StepGraph {
    pad: PadData,
    nodes: Vec<GraphNode>,
    index: FxHashMap<GraphNode, NodeId>,
    edges: Vec<Vec<GraphEdge>>,
    root: NodeId,
    start_tiers: Vec<Vec<NodeId>>,
}

#[derive(Default)]
struct Interner {
    nodes: Vec<GraphNode>,
    index: FxHashMap<GraphNode, NodeId>,
    discovered: Vec<NodeId>,
}

impl Interner {
    fn intern(&mut self, node: GraphNode) -> NodeId {
        if let Some(&id) = self.index.get(&node) {
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.index.insert(node, id);
        self.discovered.push(id);
        id
    }
}

struct Move {
    link: GraphLink,
    to: GraphNode,
}

impl StepGraph {
    /// Build the full reachable graph for a pad.
    pub fn build(pad: PadData) -> Result<Self, GraphError> {
        pad.validate()?;
        let [left, right] = pad.home().ok_or(PadError::NoStartingPositions)?;
        let root_node = GraphNode::new(left, ArrowState::Resting, right, ArrowState::Resting);
        if !is_valid_node(&pad, &root_node) {
            return Err(GraphError::InvalidRoot { left, right });
        }

        let mut interner = Interner::default();
        let root = interner.intern(root_node);
        let mut edges: Vec<Vec<GraphEdge>> = Vec::new();
        let mut frontier = std::mem::take(&mut interner.discovered);
        let mut layers = 0;

        while !frontier.is_empty() {
            layers += 1;
            let expansions: Vec<(Vec<Move>, Vec<GraphNode>)> = frontier
                .par_iter()
                .map(|id| expand(&pad, &interner.nodes[id.index()]))
                .collect();

            for (id, (moves, jump_targets)) in frontier.iter().zip(expansions) {
                let mut out = Vec::with_capacity(moves.len());
                for mv in moves {
                    let to = interner.intern(mv.to);
                    out.push(GraphEdge::new(mv.link, to, &mv.to));
                }
                for node in jump_targets {
                    interner.intern(node);
                }
                if edges.len() <= id.index() {
                    edges.resize_with(id.index() + 1, Vec::new);
                }
                edges[id.index()] = out;
            }
            frontier = std::mem::take(&mut interner.discovered);
        }
        edges.resize_with(interner.nodes.len(), Vec::new);

        let mut start_tiers = Vec::with_capacity(pad.starting_positions.len());
        for (tier, positions) in pad.starting_positions.iter().enumerate() {
            let mut ids = Vec::with_capacity(positions.len());
            for &[left, right] in positions {
                let node = GraphNode::new(left, ArrowState::Resting, right, ArrowState::Resting);
                match interner.index.get(&node) {
                    Some(&id) => ids.push(id),
                    None => {
                        return Err(GraphError::MissingStartingPosition { tier, left, right });
                    }
                }
            }
            start_tiers.push(ids);
        }

        tracing::debug!(
            steps_type = %pad.steps_type,
            nodes = interner.nodes.len(),
            edges = edges.iter().map(Vec::len).sum::<usize>(),
            layers,
            "built step graph"
        );

        Ok(Self {
            pad,
            nodes: interner.nodes,
            index: interner.index,
            edges,
            root,
            start_tiers,
        })
    }

    pub fn pad(&self) -> &PadData {
        &self.pad
    }

    pub fn steps_type(&self) -> &str {
        &self.pad.steps_type
    }

    pub fn num_arrows(&self) -> usize {
        self.pad.num_arrows()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.index()]
    }

    /// Stored single-foot and release edges out of `id`.
    pub fn edges(&self, id: NodeId) -> &[GraphEdge] {
        &self.edges[id.index()]
    }

    /// Tiered start nodes; tier 0 holds the root.
    pub fn start_tiers(&self) -> &[Vec<NodeId>] {
        &self.start_tiers
    }

    pub fn find(&self, node: &GraphNode) -> Option<NodeId> {
        self.index.get(node).copied()
    }

    /// Look up the node with each foot on a single arrow.
    pub fn find_node(
        &self,
        left_arrow: usize,
        left_state: ArrowState,
        right_arrow: usize,
        right_state: ArrowState,
    ) -> Option<NodeId> {
        self.find(&GraphNode::new(
            left_arrow,
            left_state,
            right_arrow,
            right_state,
        ))
    }

    /// Mean position of the arrows under `foot`.
    pub fn foot_center(&self, id: NodeId, foot: Foot) -> (f64, f64) {
        foot_center(&self.pad, self.node(id).foot(foot))
    }

    /// Concrete arrows engaged by `link` when it arrives at `to`.
    pub fn link_events(&self, link: &GraphLink, to: NodeId) -> SmallVec<[FootArrowEvent; 4]> {
        link_events_on(link, self.node(to))
    }

    /// Two-foot links out of `from`, composed from one left and one right
    /// single-foot edge. Only edges passing `accept` are paired. Foot swaps
    /// never take part in a jump.
    pub fn jump_edges(
        &self,
        from: NodeId,
        mut accept: impl FnMut(&GraphEdge) -> bool,
    ) -> Vec<GraphEdge> {
        let node = self.node(from);
        let mut halves: [Vec<&GraphEdge>; NUM_FEET] = [Vec::new(), Vec::new()];
        let mut seen: [Vec<(NodeId, [bool; NUM_PORTIONS])>; NUM_FEET] = [Vec::new(), Vec::new()];
        for edge in self.edges(from) {
            if edge.link.is_release() || edge.link.is_footswap() {
                continue;
            }
            let Some(foot) = edge.link.mover() else {
                continue;
            };
            // Parallel edges differ only in classification, which is redone
            // against the composed node anyway.
            let key = (edge.to, edge.link.placed_portions(foot));
            if seen[foot.index()].contains(&key) || !accept(edge) {
                continue;
            }
            seen[foot.index()].push(key);
            halves[foot.index()].push(edge);
        }

        let mut out = Vec::new();
        for left in &halves[Foot::Left.index()] {
            for right in &halves[Foot::Right.index()] {
                if left.placed_mask & right.placed_mask != 0 {
                    continue;
                }
                let new_left = self.node(left.to).feet[Foot::Left.index()];
                let new_right = self.node(right.to).feet[Foot::Right.index()];
                let composed = GraphNode {
                    feet: [new_left, new_right],
                };
                let Some(to) = self.find(&composed) else {
                    continue;
                };
                let left_placed = left.link.placed_portions(Foot::Left);
                let right_placed = right.link.placed_portions(Foot::Right);
                let left_types = classify(
                    &self.pad,
                    Foot::Left,
                    node.foot(Foot::Left),
                    &new_left,
                    left_placed,
                    &new_right,
                    false,
                );
                let right_types = classify(
                    &self.pad,
                    Foot::Right,
                    node.foot(Foot::Right),
                    &new_right,
                    right_placed,
                    &new_left,
                    false,
                );
                for &lt in &left_types {
                    for &rt in &right_types {
                        let link = foot_link(Foot::Left, &new_left, left_placed, lt)
                            .merged(&foot_link(Foot::Right, &new_right, right_placed, rt));
                        out.push(GraphEdge::new(link, to, &composed));
                    }
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Transition enumeration
// ---------------------------------------------------------------------------

fn expand(pad: &PadData, node: &GraphNode) -> (Vec<Move>, Vec<GraphNode>) {
    let mut moves = Vec::new();
    for foot in Foot::ALL {
        foot_moves(pad, node, foot, &mut moves);
    }
    release_moves(node, &mut moves);
    let jumps = jump_targets(pad, &moves);
    (moves, jumps)
}

/// The other foot's non-lifted portion on `arrow`, if any.
fn claim(other: &FootState, arrow: usize) -> Option<PortionState> {
    other
        .iter()
        .flatten()
        .find(|p| p.arrow == arrow && !p.is_lifted())
        .copied()
}

fn foot_has_arrow(foot: &FootState, arrow: usize) -> bool {
    foot.iter().flatten().any(|p| p.arrow == arrow)
}

fn is_bracket_pair(pad: &PadData, heel: usize, toe: usize) -> bool {
    pad.are_bracketable(heel, toe) && pad.arrows[heel].y > pad.arrows[toe].y
}

const ACTIONS: [FootAction; 2] = [FootAction::Tap, FootAction::Hold];

fn foot_moves(pad: &PadData, node: &GraphNode, mover: Foot, out: &mut Vec<Move>) {
    let old = *node.foot(mover);
    let other = *node.foot(mover.other());
    let holding = old.iter().flatten().any(PortionState::is_held);
    let lifted = old.iter().flatten().any(PortionState::is_lifted);
    let n = pad.num_arrows();

    if !holding {
        for arrow in 0..n {
            let swap = match claim(&other, arrow) {
                None => false,
                Some(p) if other[1].is_none() && p.state == ArrowState::Resting => true,
                Some(_) => continue,
            };
            for action in ACTIONS {
                let new_foot = [Some(PortionState::new(arrow, action.resulting_state())), None];
                let new_other = if swap {
                    [Some(PortionState::new(arrow, ArrowState::Lifted)), None]
                } else {
                    other
                };
                let to = GraphNode::with_feet(mover, new_foot, new_other);
                if !is_valid_node(pad, &to) {
                    continue;
                }
                let placed = [true, false];
                for step in classify(pad, mover, &old, &new_foot, placed, &new_other, swap) {
                    out.push(Move {
                        link: foot_link(mover, &new_foot, placed, step),
                        to,
                    });
                }
            }
        }

        if pad.rules.allow_brackets {
            for heel in 0..n {
                for toe in 0..n {
                    if !is_bracket_pair(pad, heel, toe)
                        || claim(&other, heel).is_some()
                        || claim(&other, toe).is_some()
                    {
                        continue;
                    }
                    for heel_action in ACTIONS {
                        for toe_action in ACTIONS {
                            let new_foot = [
                                Some(PortionState::new(heel, heel_action.resulting_state())),
                                Some(PortionState::new(toe, toe_action.resulting_state())),
                            ];
                            let to = GraphNode::with_feet(mover, new_foot, other);
                            if !is_valid_node(pad, &to) {
                                continue;
                            }
                            let placed = [true, true];
                            for step in classify(pad, mover, &old, &new_foot, placed, &other, false)
                            {
                                out.push(Move {
                                    link: foot_link(mover, &new_foot, placed, step),
                                    to,
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    if !pad.rules.allow_brackets || lifted {
        return;
    }
    // One-arrow brackets: one portion stays down (possibly held) while the
    // other is placed next to it.
    let kept_choices: SmallVec<[PortionState; 2]> = match old {
        [Some(heel), None] => smallvec![heel],
        [Some(heel), Some(toe)] => {
            let mut kept = SmallVec::new();
            if !toe.is_held() {
                kept.push(heel);
            }
            if !heel.is_held() {
                kept.push(toe);
            }
            kept
        }
        _ => SmallVec::new(),
    };
    for kept in kept_choices {
        for arrow in 0..n {
            if arrow == kept.arrow
                || !pad.are_bracketable(arrow, kept.arrow)
                || claim(&other, arrow).is_some()
            {
                continue;
            }
            for action in ACTIONS {
                let placed_state = PortionState::new(arrow, action.resulting_state());
                let (new_foot, placed) = if pad.arrows[arrow].y > pad.arrows[kept.arrow].y {
                    ([Some(placed_state), Some(kept)], [true, false])
                } else {
                    ([Some(kept), Some(placed_state)], [false, true])
                };
                let to = GraphNode::with_feet(mover, new_foot, other);
                if !is_valid_node(pad, &to) {
                    continue;
                }
                for step in classify(pad, mover, &old, &new_foot, placed, &other, false) {
                    out.push(Move {
                        link: foot_link(mover, &new_foot, placed, step),
                        to,
                    });
                }
            }
        }
    }
}

/// One release edge per non-empty subset of held portions.
fn release_moves(node: &GraphNode, out: &mut Vec<Move>) {
    let held: SmallVec<[(Foot, FootPortion); 4]> = Foot::ALL
        .into_iter()
        .flat_map(|f| FootPortion::ALL.into_iter().map(move |p| (f, p)))
        .filter(|&(f, p)| node.portion(f, p).is_some_and(|s| s.is_held()))
        .collect();
    for subset in 1u32..(1 << held.len()) {
        let mut to = *node;
        let mut link = GraphLink::default();
        for (i, &(foot, portion)) in held.iter().enumerate() {
            if subset & (1 << i) == 0 {
                continue;
            }
            if let Some(p) = to.feet[foot.index()][portion.index()].as_mut() {
                p.state = ArrowState::Resting;
            }
            link.set(foot, portion, PortionLink::release());
        }
        out.push(Move { link, to });
    }
}

/// Every valid node reachable by moving both feet at once.
fn jump_targets(pad: &PadData, moves: &[Move]) -> Vec<GraphNode> {
    let mut halves: [Vec<FootState>; NUM_FEET] = [Vec::new(), Vec::new()];
    for mv in moves {
        if mv.link.is_release() || mv.link.is_footswap() {
            continue;
        }
        if let Some(foot) = mv.link.mover() {
            halves[foot.index()].push(mv.to.feet[foot.index()]);
        }
    }
    for half in &mut halves {
        half.sort();
        half.dedup();
    }
    let mut out = Vec::new();
    for left in &halves[0] {
        for right in &halves[1] {
            let node = GraphNode {
                feet: [*left, *right],
            };
            if is_valid_node(pad, &node) {
                out.push(node);
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

fn foot_center(pad: &PadData, foot: &FootState) -> (f64, f64) {
    let mut sum = (0.0, 0.0);
    let mut count = 0.0;
    for p in foot.iter().flatten() {
        let (x, y) = pad.point(p.arrow);
        sum.0 += x;
        sum.1 += y;
        count += 1.0;
    }
    if count == 0.0 {
        return sum;
    }
    (sum.0 / count, sum.1 / count)
}

fn is_valid_node(pad: &PadData, node: &GraphNode) -> bool {
    let mut claimed = 0u64;
    for foot in Foot::ALL {
        let fs = node.foot(foot);
        let Some(heel) = fs[0] else {
            return false;
        };
        if let Some(toe) = fs[1] {
            if heel.is_lifted() || toe.is_lifted() || !is_bracket_pair(pad, heel.arrow, toe.arrow) {
                return false;
            }
        }
        for p in fs.iter().flatten().filter(|p| !p.is_lifted()) {
            let bit = arrow_bit(p.arrow);
            if claimed & bit != 0 {
                return false;
            }
            claimed |= bit;
        }
    }
    let span = distance(
        foot_center(pad, node.foot(Foot::Left)),
        foot_center(pad, node.foot(Foot::Right)),
    );
    span <= pad.rules.max_stretch_span + EPSILON
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Orientation {
    Normal,
    Front,
    Behind,
    Inverted,
}

/// Orientation of the body after `mover` lands at `mover_at` with the other
/// foot at `other_at`.
fn orientation(mover: Foot, mover_at: (f64, f64), other_at: (f64, f64)) -> Orientation {
    let right_minus_left = match mover {
        Foot::Left => other_at.0 - mover_at.0,
        Foot::Right => mover_at.0 - other_at.0,
    };
    if right_minus_left >= -EPSILON {
        Orientation::Normal
    } else if (mover_at.1 - other_at.1).abs() < EPSILON {
        Orientation::Inverted
    } else if mover_at.1 < other_at.1 {
        Orientation::Front
    } else {
        Orientation::Behind
    }
}

/// Techniques describing `mover` going from `old` to `new` with the other
/// foot ending in `other`. Inversions are ambiguous and yield both the front
/// and behind reading.
fn classify(
    pad: &PadData,
    mover: Foot,
    old: &FootState,
    new: &FootState,
    placed: [bool; NUM_PORTIONS],
    other: &FootState,
    swap: bool,
) -> SmallVec<[StepType; 2]> {
    if swap {
        return smallvec![StepType::FootSwap];
    }
    let other_at = foot_center(pad, other);
    match (new[0], new[1]) {
        (Some(heel), Some(toe)) if placed[0] && placed[1] => {
            classify_bracket(pad, mover, old, heel.arrow, toe.arrow, other_at)
        }
        (Some(heel), Some(toe)) => {
            let (portion, arrow) = if placed[0] {
                (FootPortion::Heel, heel.arrow)
            } else {
                (FootPortion::Toe, toe.arrow)
            };
            smallvec![StepType::one_arrow(portion, foot_has_arrow(old, arrow))]
        }
        (Some(heel), None) => classify_single(pad, mover, old, heel.arrow, other_at),
        _ => SmallVec::new(),
    }
}

fn classify_single(
    pad: &PadData,
    mover: Foot,
    old: &FootState,
    arrow: usize,
    other_at: (f64, f64),
) -> SmallVec<[StepType; 2]> {
    if foot_has_arrow(old, arrow) {
        return smallvec![StepType::SameArrow];
    }
    let at = pad.point(arrow);
    let stretch = distance(at, other_at) > pad.rules.natural_span + EPSILON;
    let maybe_stretched = |st: StepType| if stretch { st.stretched() } else { st };
    match orientation(mover, at, other_at) {
        Orientation::Normal if is_swing(pad, old, arrow) => smallvec![StepType::Swing],
        Orientation::Normal => smallvec![maybe_stretched(StepType::NewArrow)],
        Orientation::Front => smallvec![maybe_stretched(StepType::CrossoverFront)],
        Orientation::Behind => smallvec![maybe_stretched(StepType::CrossoverBehind)],
        Orientation::Inverted => smallvec![
            maybe_stretched(StepType::InvertFront),
            maybe_stretched(StepType::InvertBehind)
        ],
    }
}

fn is_swing(pad: &PadData, old: &FootState, arrow: usize) -> bool {
    let [Some(from), None] = *old else {
        return false;
    };
    let (a, b) = (pad.arrows[from.arrow], pad.arrows[arrow]);
    a.x == b.x && (a.y - b.y).abs() >= pad.rules.swing_min_vertical_travel
}

fn classify_bracket(
    pad: &PadData,
    mover: Foot,
    old: &FootState,
    heel: usize,
    toe: usize,
    other_at: (f64, f64),
) -> SmallVec<[StepType; 2]> {
    match (foot_has_arrow(old, heel), foot_has_arrow(old, toe)) {
        (true, true) => smallvec![StepType::BracketHeelSameToeSame],
        (same_heel, same_toe) if same_heel || same_toe => {
            // A kept arrow that changed role between heel and toe.
            let swung = matches!(*old, [Some(h), Some(t)] if h.arrow == toe || t.arrow == heel);
            if swung {
                smallvec![StepType::BracketSwing]
            } else if same_heel {
                smallvec![StepType::BracketHeelSameToeNew]
            } else {
                smallvec![StepType::BracketHeelNewToeSame]
            }
        }
        _ => {
            let (h, t) = (pad.point(heel), pad.point(toe));
            let at = ((h.0 + t.0) / 2.0, (h.1 + t.1) / 2.0);
            match orientation(mover, at, other_at) {
                Orientation::Normal if distance(at, other_at) > pad.rules.natural_span + EPSILON => {
                    smallvec![StepType::BracketStretchHeelNewToeNew]
                }
                Orientation::Normal => smallvec![StepType::BracketHeelNewToeNew],
                Orientation::Front => smallvec![StepType::BracketCrossoverFrontHeelNewToeNew],
                Orientation::Behind => smallvec![StepType::BracketCrossoverBehindHeelNewToeNew],
                Orientation::Inverted => smallvec![
                    StepType::BracketInvertFrontHeelNewToeNew,
                    StepType::BracketInvertBehindHeelNewToeNew
                ],
            }
        }
    }
}

/// Link for one foot placing the `placed` portions of `new` with `step`.
fn foot_link(
    mover: Foot,
    new: &FootState,
    placed: [bool; NUM_PORTIONS],
    step: StepType,
) -> GraphLink {
    let mut link = GraphLink::default();
    for portion in FootPortion::ALL {
        if !placed[portion.index()] {
            continue;
        }
        if let Some(p) = new[portion.index()] {
            let action = if p.is_held() {
                FootAction::Hold
            } else {
                FootAction::Tap
            };
            link.set(mover, portion, PortionLink::new(step, action));
        }
    }
    link
}

fn link_events_on(link: &GraphLink, to: &GraphNode) -> SmallVec<[FootArrowEvent; 4]> {
    let mut out = SmallVec::new();
    for foot in Foot::ALL {
        for portion in FootPortion::ALL {
            if let (Some(l), Some(p)) = (link.get(foot, portion), to.portion(foot, portion)) {
                out.push(FootArrowEvent {
                    foot,
                    portion,
                    arrow: p.arrow,
                    action: l.action,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArrowState::{Held, Lifted, Resting};

    fn single() -> StepGraph {
        StepGraph::build(PadData::dance_single()).unwrap()
    }

    fn edges_with(
        graph: &StepGraph,
        from: NodeId,
        foot: Foot,
        step: StepType,
    ) -> Vec<GraphEdge> {
        graph
            .edges(from)
            .iter()
            .filter(|e| e.link.mover() == Some(foot) && e.link.step_type(foot) == Some(step))
            .copied()
            .collect()
    }

    #[test]
    fn root_and_tiers() {
        let graph = single();
        assert_eq!(graph.root(), NodeId(0));
        assert_eq!(graph.find_node(0, Resting, 3, Resting), Some(graph.root()));
        let tiers = graph.start_tiers();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0], vec![graph.root()]);
        assert_eq!(tiers[1].len(), 4);
        assert_eq!(graph.num_arrows(), 4);
    }

    #[test]
    fn build_is_deterministic() {
        let a = single();
        let b = single();
        assert_eq!(a.nodes, b.nodes);
        assert_eq!(a.edges, b.edges);
    }

    #[test]
    fn every_node_is_valid_and_edges_land_on_known_nodes() {
        let graph = single();
        for (i, node) in graph.nodes.iter().enumerate() {
            assert!(is_valid_node(graph.pad(), node), "invalid node {node}");
            assert_eq!(graph.find(node), Some(NodeId(i as u32)));
            for edge in graph.edges(NodeId(i as u32)) {
                assert!(edge.to.index() < graph.num_nodes());
                assert!(!edge.link.is_empty());
            }
        }
    }

    #[test]
    fn same_arrow_tap_and_hold_from_root() {
        let graph = single();
        let taps = edges_with(&graph, graph.root(), Foot::Left, StepType::SameArrow);
        assert_eq!(taps.len(), 2, "tap and hold variants");
        assert!(taps.iter().all(|e| e.placed_mask == 0b0001));
        assert_eq!(taps.iter().filter(|e| e.hold_mask == 0b0001).count(), 1);
    }

    #[test]
    fn footswap_lifts_the_other_foot() {
        let graph = single();
        let swaps = edges_with(&graph, graph.root(), Foot::Left, StepType::FootSwap);
        assert!(!swaps.is_empty());
        let to = graph.node(swaps[0].to);
        assert_eq!(to.portion(Foot::Left, FootPortion::Heel).map(|p| p.arrow), Some(3));
        assert_eq!(
            to.portion(Foot::Right, FootPortion::Heel),
            Some(PortionState::new(3, Lifted))
        );
    }

    #[test]
    fn crossovers_front_and_behind() {
        let graph = single();
        // Right foot on Down: left foot to Right passes in front.
        let from = graph.find_node(0, Resting, 1, Resting).unwrap();
        let front = edges_with(&graph, from, Foot::Left, StepType::CrossoverFront);
        assert!(front.iter().any(|e| e.placed_mask == 0b1000));

        // Right foot on Up: left foot to Right passes behind.
        let from = graph.find_node(0, Resting, 2, Resting).unwrap();
        let behind = edges_with(&graph, from, Foot::Left, StepType::CrossoverBehind);
        assert!(behind.iter().any(|e| e.placed_mask == 0b1000));
    }

    #[test]
    fn inversion_emits_parallel_edges() {
        let graph = single();
        // Left on Down, right crossed onto Left; left foot steps to Right.
        let from = graph.find_node(1, Resting, 0, Resting).unwrap();
        let front = edges_with(&graph, from, Foot::Left, StepType::InvertFront);
        let behind = edges_with(&graph, from, Foot::Left, StepType::InvertBehind);
        assert!(!front.is_empty());
        assert_eq!(front.len(), behind.len());
        for (f, b) in front.iter().zip(&behind) {
            assert_eq!(f.to, b.to);
            assert_ne!(f.link, b.link);
        }
    }

    #[test]
    fn release_edges_cover_held_portions() {
        let graph = single();
        let held = graph.find_node(0, Held, 3, Resting).unwrap();
        let releases: Vec<_> = graph
            .edges(held)
            .iter()
            .filter(|e| e.link.is_release())
            .collect();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].released_mask, 0b0001);
        assert_eq!(releases[0].to, graph.root());

        let both = graph.find_node(0, Held, 3, Held).unwrap();
        let count = graph
            .edges(both)
            .iter()
            .filter(|e| e.link.is_release())
            .count();
        assert_eq!(count, 3);
    }

    #[test]
    fn held_foot_cannot_step_whole() {
        let graph = single();
        let held = graph.find_node(0, Held, 3, Resting).unwrap();
        assert!(
            graph
                .edges(held)
                .iter()
                .filter(|e| e.link.mover() == Some(Foot::Left))
                .all(|e| e.link.is_foot_bracket(Foot::Left)),
            "a holding foot may only add its other portion"
        );
    }

    #[test]
    fn bracket_from_root() {
        let graph = single();
        // Left foot on Left brackets Down (heel) + Left (toe).
        let brackets = edges_with(&graph, graph.root(), Foot::Left, StepType::BracketHeelNewToeSame);
        assert!(brackets.iter().any(|e| e.placed_mask == 0b0011));
    }

    #[test]
    fn no_brackets_when_disabled() {
        let mut pad = PadData::dance_single();
        pad.rules.allow_brackets = false;
        let graph = StepGraph::build(pad).unwrap();
        for i in 0..graph.num_nodes() {
            let id = NodeId(i as u32);
            assert!(!graph.node(id).is_bracketing(Foot::Left));
            assert!(graph.edges(id).iter().all(|e| !e.link.is_bracket()));
        }
    }

    #[test]
    fn jump_edges_compose_both_feet() {
        let graph = single();
        let jumps = graph.jump_edges(graph.root(), |e| e.placed_mask & 0b0110 == e.placed_mask);
        let down_up: Vec<_> = jumps
            .iter()
            .filter(|e| e.placed_mask == 0b0110 && e.hold_mask == 0)
            .collect();
        assert!(!down_up.is_empty());
        for e in down_up {
            assert!(e.link.is_jump());
            assert_eq!(graph.link_events(&e.link, e.to).len(), 2);
        }
    }

    #[test]
    fn missing_start_position_is_an_error() {
        let mut pad = PadData::dance_single();
        // An extra arrow far out to the right: standing on it with the left
        // foot still on Left is wider than any stretch.
        pad.arrows.push(crate::pad::ArrowPosition::new(6, 1));
        pad.starting_positions[1].push([0, 4]);
        let err = StepGraph::build(pad).unwrap_err();
        assert!(matches!(
            err,
            GraphError::MissingStartingPosition {
                tier: 1,
                left: 0,
                right: 4
            }
        ));
    }

    #[test]
    fn double_graph_has_all_tiers() {
        let graph = StepGraph::build(PadData::dance_double()).unwrap();
        assert_eq!(graph.num_arrows(), 8);
        let tiers = graph.start_tiers();
        assert_eq!(tiers.iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 4, 4, 2]);
        // Swing: left foot from Down to Up of the same pad half.
        let from = graph.find_node(1, Resting, 4, Resting).unwrap();
        let swings = graph
            .edges(from)
            .iter()
            .filter(|e| e.link.step_type(Foot::Left) == Some(StepType::Swing))
            .count();
        assert!(swings > 0);
    }
}

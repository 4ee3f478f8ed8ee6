// Foot-placement technique taxonomy and graph edge labels.
//
// `StepType` is the closed set of techniques one foot can perform on a step.
// A `GraphLink` labels an edge of the foot-placement graph with, for every
// foot and portion, the technique and action used. Composite links fall out
// of that shape: a jump is a link in which both feet place, a release is a
// link whose every entry is a `Release`, and a bracket is a link in which
// one foot places both of its portions.

use crate::types::{Foot, FootAction, FootPortion, NUM_FEET, NUM_PORTIONS, portion_bit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One foot's technique on a step.
///
/// The bracket variants name what each portion does: `Heel`/`Toe` for the
/// portion, `New`/`Same` for whether its arrow was already under the foot.
/// The `BracketOneArrow*` variants place a single portion while the other
/// portion stays down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepType {
    SameArrow,
    NewArrow,
    CrossoverFront,
    CrossoverBehind,
    InvertFront,
    InvertBehind,
    FootSwap,
    Swing,

    NewArrowStretch,
    CrossoverFrontStretch,
    CrossoverBehindStretch,
    InvertFrontStretch,
    InvertBehindStretch,

    BracketHeelNewToeNew,
    BracketHeelNewToeSame,
    BracketHeelSameToeNew,
    BracketHeelSameToeSame,
    BracketSwing,
    BracketCrossoverFrontHeelNewToeNew,
    BracketCrossoverBehindHeelNewToeNew,
    BracketInvertFrontHeelNewToeNew,
    BracketInvertBehindHeelNewToeNew,
    BracketStretchHeelNewToeNew,

    BracketOneArrowHeelSame,
    BracketOneArrowHeelNew,
    BracketOneArrowToeSame,
    BracketOneArrowToeNew,
}

impl StepType {
    pub const ALL: [StepType; 27] = [
        StepType::SameArrow,
        StepType::NewArrow,
        StepType::CrossoverFront,
        StepType::CrossoverBehind,
        StepType::InvertFront,
        StepType::InvertBehind,
        StepType::FootSwap,
        StepType::Swing,
        StepType::NewArrowStretch,
        StepType::CrossoverFrontStretch,
        StepType::CrossoverBehindStretch,
        StepType::InvertFrontStretch,
        StepType::InvertBehindStretch,
        StepType::BracketHeelNewToeNew,
        StepType::BracketHeelNewToeSame,
        StepType::BracketHeelSameToeNew,
        StepType::BracketHeelSameToeSame,
        StepType::BracketSwing,
        StepType::BracketCrossoverFrontHeelNewToeNew,
        StepType::BracketCrossoverBehindHeelNewToeNew,
        StepType::BracketInvertFrontHeelNewToeNew,
        StepType::BracketInvertBehindHeelNewToeNew,
        StepType::BracketStretchHeelNewToeNew,
        StepType::BracketOneArrowHeelSame,
        StepType::BracketOneArrowHeelNew,
        StepType::BracketOneArrowToeSame,
        StepType::BracketOneArrowToeNew,
    ];

    /// Any technique that leaves the foot covering two arrows.
    pub fn is_bracket(self) -> bool {
        use StepType::*;
        matches!(
            self,
            BracketHeelNewToeNew
                | BracketHeelNewToeSame
                | BracketHeelSameToeNew
                | BracketHeelSameToeSame
                | BracketSwing
                | BracketCrossoverFrontHeelNewToeNew
                | BracketCrossoverBehindHeelNewToeNew
                | BracketInvertFrontHeelNewToeNew
                | BracketInvertBehindHeelNewToeNew
                | BracketStretchHeelNewToeNew
        ) || self.is_one_arrow_bracket()
    }

    pub fn is_one_arrow_bracket(self) -> bool {
        use StepType::*;
        matches!(
            self,
            BracketOneArrowHeelSame
                | BracketOneArrowHeelNew
                | BracketOneArrowToeSame
                | BracketOneArrowToeNew
        )
    }

    pub fn is_stretch(self) -> bool {
        use StepType::*;
        matches!(
            self,
            NewArrowStretch
                | CrossoverFrontStretch
                | CrossoverBehindStretch
                | InvertFrontStretch
                | InvertBehindStretch
                | BracketStretchHeelNewToeNew
        )
    }

    pub fn is_crossover(self) -> bool {
        use StepType::*;
        matches!(
            self,
            CrossoverFront
                | CrossoverBehind
                | CrossoverFrontStretch
                | CrossoverBehindStretch
                | BracketCrossoverFrontHeelNewToeNew
                | BracketCrossoverBehindHeelNewToeNew
        )
    }

    pub fn is_invert(self) -> bool {
        use StepType::*;
        matches!(
            self,
            InvertFront
                | InvertBehind
                | InvertFrontStretch
                | InvertBehindStretch
                | BracketInvertFrontHeelNewToeNew
                | BracketInvertBehindHeelNewToeNew
        )
    }

    /// Whether the technique re-places a foot without moving it.
    pub fn is_same_arrow(self) -> bool {
        use StepType::*;
        matches!(
            self,
            SameArrow | BracketHeelSameToeSame | BracketOneArrowHeelSame | BracketOneArrowToeSame
        )
    }

    /// Stretch variant of a single-arrow technique. Techniques without one
    /// are returned unchanged.
    pub fn stretched(self) -> StepType {
        use StepType::*;
        match self {
            NewArrow => NewArrowStretch,
            CrossoverFront => CrossoverFrontStretch,
            CrossoverBehind => CrossoverBehindStretch,
            InvertFront => InvertFrontStretch,
            InvertBehind => InvertBehindStretch,
            BracketHeelNewToeNew => BracketStretchHeelNewToeNew,
            other => other,
        }
    }

    /// Cost used by the expression search when no configured cost exists.
    pub fn default_cost(self) -> f64 {
        use StepType::*;
        match self {
            SameArrow => 0.0,
            NewArrow => 1.0,
            CrossoverFront => 4.0,
            CrossoverBehind => 5.0,
            InvertFront | InvertBehind => 8.0,
            FootSwap => 6.0,
            Swing => 3.0,
            NewArrowStretch => 6.0,
            CrossoverFrontStretch => 9.0,
            CrossoverBehindStretch => 10.0,
            InvertFrontStretch | InvertBehindStretch => 12.0,
            BracketHeelNewToeNew => 2.0,
            BracketHeelNewToeSame | BracketHeelSameToeNew => 1.5,
            BracketHeelSameToeSame => 0.5,
            BracketSwing => 3.0,
            BracketCrossoverFrontHeelNewToeNew => 7.0,
            BracketCrossoverBehindHeelNewToeNew => 8.0,
            BracketInvertFrontHeelNewToeNew | BracketInvertBehindHeelNewToeNew => 10.0,
            BracketStretchHeelNewToeNew => 8.0,
            BracketOneArrowHeelSame | BracketOneArrowToeSame => 0.5,
            BracketOneArrowHeelNew | BracketOneArrowToeNew => 2.0,
        }
    }

    /// One-arrow bracket technique for the portion that was placed.
    pub fn one_arrow(portion: FootPortion, same: bool) -> StepType {
        match (portion, same) {
            (FootPortion::Heel, true) => StepType::BracketOneArrowHeelSame,
            (FootPortion::Heel, false) => StepType::BracketOneArrowHeelNew,
            (FootPortion::Toe, true) => StepType::BracketOneArrowToeSame,
            (FootPortion::Toe, false) => StepType::BracketOneArrowToeNew,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Technique and action for one foot portion on one edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortionLink {
    pub step: StepType,
    pub action: FootAction,
}

impl PortionLink {
    pub const fn new(step: StepType, action: FootAction) -> Self {
        Self { step, action }
    }

    /// Releases carry `SameArrow`: the portion stays where it is.
    pub const fn release() -> Self {
        Self::new(StepType::SameArrow, FootAction::Release)
    }

    pub fn is_release(&self) -> bool {
        self.action == FootAction::Release
    }
}

pub type FootLinks = [Option<PortionLink>; NUM_PORTIONS];

/// Edge label: per foot and portion, what was done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphLink {
    pub links: [FootLinks; NUM_FEET],
}

impl GraphLink {
    pub fn foot_links(&self, foot: Foot) -> &FootLinks {
        &self.links[foot.index()]
    }

    pub fn get(&self, foot: Foot, portion: FootPortion) -> Option<PortionLink> {
        self.links[foot.index()][portion.index()]
    }

    pub fn set(&mut self, foot: Foot, portion: FootPortion, link: PortionLink) {
        self.links[foot.index()][portion.index()] = Some(link);
    }

    pub fn is_empty(&self) -> bool {
        self.links.iter().flatten().all(Option::is_none)
    }

    /// Whether `foot` places at least one portion (tap or hold).
    pub fn is_placing(&self, foot: Foot) -> bool {
        self.foot_links(foot)
            .iter()
            .flatten()
            .any(|l| !l.is_release())
    }

    /// Portions of `foot` that are placed, by portion index.
    pub fn placed_portions(&self, foot: Foot) -> [bool; NUM_PORTIONS] {
        let links = self.foot_links(foot);
        [
            links[0].is_some_and(|l| !l.is_release()),
            links[1].is_some_and(|l| !l.is_release()),
        ]
    }

    pub fn placing_feet(&self) -> impl Iterator<Item = Foot> + '_ {
        Foot::ALL.into_iter().filter(|&f| self.is_placing(f))
    }

    /// The only placing foot, if exactly one foot places.
    pub fn mover(&self) -> Option<Foot> {
        match (self.is_placing(Foot::Left), self.is_placing(Foot::Right)) {
            (true, false) => Some(Foot::Left),
            (false, true) => Some(Foot::Right),
            _ => None,
        }
    }

    pub fn is_jump(&self) -> bool {
        self.is_placing(Foot::Left) && self.is_placing(Foot::Right)
    }

    pub fn is_release(&self) -> bool {
        !self.is_empty() && self.links.iter().flatten().flatten().all(PortionLink::is_release)
    }

    pub fn is_bracket(&self) -> bool {
        Foot::ALL.into_iter().any(|f| self.is_foot_bracket(f))
    }

    /// Whether `foot` performs any bracket technique (including one-arrow).
    pub fn is_foot_bracket(&self, foot: Foot) -> bool {
        self.step_type(foot).is_some_and(StepType::is_bracket)
    }

    pub fn is_footswap(&self) -> bool {
        self.links
            .iter()
            .flatten()
            .flatten()
            .any(|l| l.step == StepType::FootSwap && !l.is_release())
    }

    /// Technique of `foot` on this link, ignoring releases.
    pub fn step_type(&self, foot: Foot) -> Option<StepType> {
        self.foot_links(foot)
            .iter()
            .flatten()
            .find(|l| !l.is_release())
            .map(|l| l.step)
    }

    /// Bitmask of released (foot, portion) pairs; see `portion_bit`.
    pub fn released_portions(&self) -> u8 {
        let mut bits = 0;
        for foot in Foot::ALL {
            for portion in FootPortion::ALL {
                if self.get(foot, portion).is_some_and(|l| l.is_release()) {
                    bits |= portion_bit(foot, portion);
                }
            }
        }
        bits
    }

    /// Copy of this link with everything but `foot` cleared.
    pub fn restricted_to(&self, foot: Foot) -> GraphLink {
        let mut out = GraphLink::default();
        out.links[foot.index()] = self.links[foot.index()];
        out
    }

    /// Union of two links over disjoint entries.
    pub fn merged(&self, other: &GraphLink) -> GraphLink {
        let mut out = *self;
        for foot in Foot::ALL {
            for portion in FootPortion::ALL {
                if let Some(l) = other.get(foot, portion) {
                    out.set(foot, portion, l);
                }
            }
        }
        out
    }
}

impl fmt::Display for GraphLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for foot in Foot::ALL {
            for portion in FootPortion::ALL {
                if let Some(l) = self.get(foot, portion) {
                    if !first {
                        write!(f, " ")?;
                    }
                    first = false;
                    let p = match portion {
                        FootPortion::Heel => "",
                        FootPortion::Toe => "toe ",
                    };
                    write!(f, "{foot}:{p}{}/{:?}", l.step, l.action)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap(step: StepType) -> PortionLink {
        PortionLink::new(step, FootAction::Tap)
    }

    #[test]
    fn taxonomy_is_closed_and_unique() {
        let mut all = StepType::ALL.to_vec();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), StepType::ALL.len());
    }

    #[test]
    fn stretched_only_changes_stretchable_types() {
        assert_eq!(StepType::NewArrow.stretched(), StepType::NewArrowStretch);
        assert_eq!(StepType::Swing.stretched(), StepType::Swing);
        for st in StepType::ALL {
            if st.stretched() != st {
                assert!(st.stretched().is_stretch());
            }
        }
    }

    #[test]
    fn jump_and_release_predicates() {
        let mut jump = GraphLink::default();
        jump.set(Foot::Left, FootPortion::Heel, tap(StepType::NewArrow));
        jump.set(Foot::Right, FootPortion::Heel, tap(StepType::SameArrow));
        assert!(jump.is_jump());
        assert!(!jump.is_release());
        assert_eq!(jump.mover(), None);

        let left = jump.restricted_to(Foot::Left);
        assert_eq!(left.mover(), Some(Foot::Left));
        assert_eq!(left.merged(&jump.restricted_to(Foot::Right)), jump);

        let mut release = GraphLink::default();
        release.set(Foot::Right, FootPortion::Toe, PortionLink::release());
        assert!(release.is_release());
        assert!(!release.is_jump());
        assert_eq!(
            release.released_portions(),
            portion_bit(Foot::Right, FootPortion::Toe)
        );
        assert!(!GraphLink::default().is_release());
    }

    #[test]
    fn bracket_predicates() {
        let mut link = GraphLink::default();
        link.set(
            Foot::Left,
            FootPortion::Heel,
            tap(StepType::BracketHeelNewToeNew),
        );
        link.set(
            Foot::Left,
            FootPortion::Toe,
            tap(StepType::BracketHeelNewToeNew),
        );
        assert!(link.is_bracket());
        assert_eq!(link.placed_portions(Foot::Left), [true, true]);
        assert_eq!(link.step_type(Foot::Left), Some(StepType::BracketHeelNewToeNew));
        assert!(StepType::BracketOneArrowToeNew.is_bracket());
        assert!(!StepType::CrossoverFront.is_bracket());
    }
}

// Core types shared by the graph, both searches, and the batch layer.
//
// Defines the two feet and their portions, the per-arrow state a foot portion
// can be in, the action a portion performs on a step, and the raw note events
// that make up a chart timeline. Positions are integer ticks in a fixed
// resolution space (`ROWS_PER_BEAT` ticks per beat).

use serde::{Deserialize, Serialize};
use std::fmt;

pub const NUM_FEET: usize = 2;
pub const NUM_PORTIONS: usize = 2;

/// Arrow sets are tracked as `u64` bitmasks, so a pad has at most 64 arrows.
pub const MAX_ARROWS: usize = 64;

pub const ROWS_PER_BEAT: i32 = 48;

// ---------------------------------------------------------------------------
// Feet
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Foot {
    Left,
    Right,
}

impl Foot {
    pub const ALL: [Foot; NUM_FEET] = [Foot::Left, Foot::Right];

    pub fn index(self) -> usize {
        match self {
            Foot::Left => 0,
            Foot::Right => 1,
        }
    }

    pub fn other(self) -> Foot {
        match self {
            Foot::Left => Foot::Right,
            Foot::Right => Foot::Left,
        }
    }
}

impl fmt::Display for Foot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Foot::Left => write!(f, "L"),
            Foot::Right => write!(f, "R"),
        }
    }
}

/// Which part of a foot rests on an arrow. A foot on a single arrow always
/// uses the heel slot; a bracketing foot puts the rear arrow under the heel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FootPortion {
    Heel,
    Toe,
}

impl FootPortion {
    pub const ALL: [FootPortion; NUM_PORTIONS] = [FootPortion::Heel, FootPortion::Toe];

    pub fn index(self) -> usize {
        match self {
            FootPortion::Heel => 0,
            FootPortion::Toe => 1,
        }
    }

    pub fn other(self) -> FootPortion {
        match self {
            FootPortion::Heel => FootPortion::Toe,
            FootPortion::Toe => FootPortion::Heel,
        }
    }
}

/// Bit index used for per-(foot, portion) masks.
pub fn portion_bit(foot: Foot, portion: FootPortion) -> u8 {
    1 << (foot.index() * NUM_PORTIONS + portion.index())
}

// ---------------------------------------------------------------------------
// Arrow states and actions
// ---------------------------------------------------------------------------

/// State of the arrow under a foot portion.
///
/// `Lifted` marks a foot that was displaced by a foot swap: it hovers over
/// its old arrow while the other foot stands there, and may step anywhere
/// next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArrowState {
    Resting,
    Held,
    Lifted,
}

/// What a foot portion does on a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FootAction {
    Tap,
    Hold,
    Release,
}

impl FootAction {
    /// State a portion is left in after performing this action.
    pub fn resulting_state(self) -> ArrowState {
        match self {
            FootAction::Hold => ArrowState::Held,
            FootAction::Tap | FootAction::Release => ArrowState::Resting,
        }
    }
}

// ---------------------------------------------------------------------------
// Note events
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    Tap,
    HoldStart,
    HoldEnd,
    Mine,
}

impl NoteKind {
    /// Ordering of kinds within one position: hold ends first, then steps,
    /// then mines.
    fn rank(self) -> u8 {
        match self {
            NoteKind::HoldEnd => 0,
            NoteKind::Tap | NoteKind::HoldStart => 1,
            NoteKind::Mine => 2,
        }
    }
}

/// One raw note on a lane at an integer tick position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteEvent {
    pub position: i32,
    pub lane: usize,
    pub kind: NoteKind,
}

impl NoteEvent {
    pub const fn new(position: i32, lane: usize, kind: NoteKind) -> Self {
        Self {
            position,
            lane,
            kind,
        }
    }

    pub const fn tap(position: i32, lane: usize) -> Self {
        Self::new(position, lane, NoteKind::Tap)
    }

    pub const fn hold_start(position: i32, lane: usize) -> Self {
        Self::new(position, lane, NoteKind::HoldStart)
    }

    pub const fn hold_end(position: i32, lane: usize) -> Self {
        Self::new(position, lane, NoteKind::HoldEnd)
    }

    pub const fn mine(position: i32, lane: usize) -> Self {
        Self::new(position, lane, NoteKind::Mine)
    }

    /// A step is anything a foot has to land on: a tap or a hold start.
    pub fn is_step(&self) -> bool {
        matches!(self.kind, NoteKind::Tap | NoteKind::HoldStart)
    }

    fn sort_key(&self) -> (i32, u8, usize, NoteKind) {
        (self.position, self.kind.rank(), self.lane, self.kind)
    }
}

impl PartialOrd for NoteEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NoteEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Bitmask with one bit per arrow index.
pub fn arrow_bit(arrow: usize) -> u64 {
    1u64 << arrow
}

/// Arrow indices set in `mask`, ascending.
pub fn mask_arrows(mask: u64) -> Vec<usize> {
    (0..MAX_ARROWS).filter(|&a| mask & arrow_bit(a) != 0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_sort_hold_ends_before_steps_before_mines() {
        let mut events = vec![
            NoteEvent::mine(0, 0),
            NoteEvent::tap(0, 3),
            NoteEvent::hold_end(0, 2),
            NoteEvent::tap(-48, 1),
            NoteEvent::hold_start(0, 1),
        ];
        events.sort();
        assert_eq!(
            events,
            vec![
                NoteEvent::tap(-48, 1),
                NoteEvent::hold_end(0, 2),
                NoteEvent::hold_start(0, 1),
                NoteEvent::tap(0, 3),
                NoteEvent::mine(0, 0),
            ]
        );
    }

    #[test]
    fn note_kind_serializes_snake_case() {
        let json = serde_json::to_string(&NoteEvent::hold_start(96, 2)).unwrap();
        assert_eq!(json, r#"{"position":96,"lane":2,"kind":"hold_start"}"#);
    }

    #[test]
    fn portion_bits_are_distinct() {
        let mut seen = 0u8;
        for foot in Foot::ALL {
            for portion in FootPortion::ALL {
                let bit = portion_bit(foot, portion);
                assert_eq!(seen & bit, 0);
                seen |= bit;
            }
        }
        assert_eq!(seen, 0b1111);
    }

    #[test]
    fn mask_arrows_lists_set_bits() {
        assert_eq!(mask_arrows(0b1010), vec![1, 3]);
        assert!(mask_arrows(0).is_empty());
    }
}

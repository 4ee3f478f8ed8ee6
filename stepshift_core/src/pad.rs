// Pad geometry: where the arrows are, where feet may start, and the geometric
// rules the foot-placement graph is built from.
//
// A pad definition is data (`PadData`), loaded from `<steps_type>.json` in a
// pad-data directory or taken from the built-in definitions for
// `dance-single` and `dance-double`. Coordinates are in panel units with x
// growing to the player's right and y growing toward the player (so the
// front row of the pad has the smallest y).
//
// The bracket and stretch rules are not hard-coded in the graph builder; they
// live in `PadRules` so each pad can carry its own tuning.

use crate::error::PadError;
use crate::types::MAX_ARROWS;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrowPosition {
    pub x: i32,
    pub y: i32,
}

impl ArrowPosition {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Geometric feasibility rules for one pad.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PadRules {
    /// Feet farther apart than this (between foot centers, in panel units)
    /// are stretching.
    pub natural_span: f64,
    /// Feet farther apart than this cannot both be on the pad.
    pub max_stretch_span: f64,
    /// Whether one foot may cover two diagonally adjacent arrows.
    pub allow_brackets: bool,
    /// Minimum rows a foot must travel within one column for the move to
    /// count as a swing.
    pub swing_min_vertical_travel: i32,
}

impl Default for PadRules {
    fn default() -> Self {
        Self {
            natural_span: 2.3,
            max_stretch_span: 3.2,
            allow_brackets: true,
            swing_min_vertical_travel: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PadData {
    pub steps_type: String,
    pub arrows: Vec<ArrowPosition>,
    /// Tiered `[left, right]` starting arrows. Tier 0 holds exactly the home
    /// position used as the graph root; later tiers are progressively less
    /// natural places to begin a chart.
    pub starting_positions: Vec<Vec<[usize; 2]>>,
    #[serde(default)]
    pub rules: PadRules,
}

impl PadData {
    /// Standard four-panel pad: Left, Down, Up, Right.
    pub fn dance_single() -> Self {
        Self {
            steps_type: "dance-single".to_string(),
            arrows: vec![
                ArrowPosition::new(0, 1),
                ArrowPosition::new(1, 2),
                ArrowPosition::new(1, 0),
                ArrowPosition::new(2, 1),
            ],
            starting_positions: vec![vec![[0, 3]], vec![[0, 2], [2, 3], [0, 1], [1, 3]]],
            rules: PadRules::default(),
        }
    }

    /// Two four-panel pads side by side, played by one player.
    pub fn dance_double() -> Self {
        let single = Self::dance_single();
        let mut arrows = single.arrows.clone();
        arrows.extend(
            single
                .arrows
                .iter()
                .map(|a| ArrowPosition::new(a.x + 3, a.y)),
        );
        Self {
            steps_type: "dance-double".to_string(),
            arrows,
            starting_positions: vec![
                vec![[3, 4]],
                vec![[1, 4], [2, 4], [3, 5], [3, 6]],
                vec![[1, 5], [2, 6], [1, 6], [2, 5]],
                vec![[0, 4], [3, 7]],
            ],
            rules: PadRules {
                max_stretch_span: 3.7,
                ..PadRules::default()
            },
        }
    }

    /// Built-in definition for a steps type, if there is one.
    pub fn builtin(steps_type: &str) -> Option<Self> {
        match steps_type {
            "dance-single" => Some(Self::dance_single()),
            "dance-double" => Some(Self::dance_double()),
            _ => None,
        }
    }

    /// Load and validate a pad definition from a JSON file.
    pub fn load(path: &Path) -> Result<Self, PadError> {
        let text = std::fs::read_to_string(path).map_err(|source| PadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let pad: PadData = serde_json::from_str(&text).map_err(|source| PadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        pad.validate()?;
        Ok(pad)
    }

    /// Load `<dir>/<steps_type>.json` if it exists, otherwise fall back to the
    /// built-in definition.
    pub fn load_or_builtin(dir: Option<&Path>, steps_type: &str) -> Result<Self, PadError> {
        if let Some(dir) = dir {
            let path = dir.join(format!("{steps_type}.json"));
            if path.is_file() {
                return Self::load(&path);
            }
        }
        Self::builtin(steps_type).ok_or_else(|| PadError::UnknownStepsType(steps_type.to_string()))
    }

    pub fn validate(&self) -> Result<(), PadError> {
        if self.arrows.is_empty() {
            return Err(PadError::NoArrows(self.steps_type.clone()));
        }
        if self.arrows.len() > MAX_ARROWS {
            return Err(PadError::TooManyArrows(self.arrows.len()));
        }
        for (i, a) in self.arrows.iter().enumerate() {
            if let Some(j) = self.arrows[..i].iter().position(|b| b == a) {
                return Err(PadError::DuplicateArrow {
                    first: j,
                    second: i,
                    x: a.x,
                    y: a.y,
                });
            }
        }
        if self.starting_positions.is_empty() {
            return Err(PadError::NoStartingPositions);
        }
        for (tier, positions) in self.starting_positions.iter().enumerate() {
            if positions.is_empty() {
                return Err(PadError::EmptyStartingTier { tier });
            }
            for &[left, right] in positions {
                for arrow in [left, right] {
                    if arrow >= self.arrows.len() {
                        return Err(PadError::StartingArrowOutOfRange { tier, arrow });
                    }
                }
                if left == right {
                    return Err(PadError::StartingPositionSameArrow { tier, arrow: left });
                }
            }
        }
        let rules = &self.rules;
        if !(rules.natural_span > 0.0 && rules.max_stretch_span >= rules.natural_span) {
            return Err(PadError::InvalidRules(format!(
                "need 0 < natural_span <= max_stretch_span, got {} and {}",
                rules.natural_span, rules.max_stretch_span
            )));
        }
        if rules.swing_min_vertical_travel < 1 {
            return Err(PadError::InvalidRules(
                "swing_min_vertical_travel must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn num_arrows(&self) -> usize {
        self.arrows.len()
    }

    /// Home `[left, right]` arrows (first entry of tier 0).
    pub fn home(&self) -> Option<[usize; 2]> {
        self.starting_positions.first()?.first().copied()
    }

    /// Position of an arrow as floating point, for distance math.
    pub fn point(&self, arrow: usize) -> (f64, f64) {
        let a = self.arrows[arrow];
        (a.x as f64, a.y as f64)
    }

    /// Width and height of the arrows' bounding box, in panels.
    pub fn extent(&self) -> (i32, i32) {
        let min_x = self.arrows.iter().map(|a| a.x).min().unwrap_or(0);
        let max_x = self.arrows.iter().map(|a| a.x).max().unwrap_or(0);
        let min_y = self.arrows.iter().map(|a| a.y).min().unwrap_or(0);
        let max_y = self.arrows.iter().map(|a| a.y).max().unwrap_or(0);
        (max_x - min_x + 1, max_y - min_y + 1)
    }

    /// Whether every movement possible on this pad has room on `other`.
    ///
    /// When the input pad cannot fit within the output pad, some techniques
    /// will have no direct realization and the fallback table is needed.
    pub fn can_fit_within(&self, other: &PadData) -> bool {
        let (w, h) = self.extent();
        let (ow, oh) = other.extent();
        self.num_arrows() <= other.num_arrows() && w <= ow && h <= oh
    }

    /// Whether one foot can cover both arrows: diagonally adjacent panels.
    pub fn are_bracketable(&self, a: usize, b: usize) -> bool {
        if !self.rules.allow_brackets || a == b {
            return false;
        }
        let (pa, pb) = (self.arrows[a], self.arrows[b]);
        (pa.x - pb.x).abs() == 1 && (pa.y - pb.y).abs() == 1
    }
}

pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

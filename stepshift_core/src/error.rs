// Error types for stepshift_core.
//
// Pad, graph, and fallback errors are configuration errors: the batch layer
// treats them as fatal at startup. Expression and performance errors are
// per-chart: the chart is skipped and the batch continues.

use crate::technique::StepType;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PadError {
    #[error("Failed to read pad data {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse pad data {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("No pad data for steps type \"{0}\"")]
    UnknownStepsType(String),

    #[error("Pad \"{0}\" has no arrows")]
    NoArrows(String),

    #[error("Pad has {0} arrows; at most {max} are supported", max = crate::types::MAX_ARROWS)]
    TooManyArrows(usize),

    #[error("Arrows {first} and {second} share the position ({x}, {y})")]
    DuplicateArrow {
        first: usize,
        second: usize,
        x: i32,
        y: i32,
    },

    #[error("Pad has no starting positions")]
    NoStartingPositions,

    #[error("Starting position tier {tier} is empty")]
    EmptyStartingTier { tier: usize },

    #[error("Starting position in tier {tier} references arrow {arrow} which does not exist")]
    StartingArrowOutOfRange { tier: usize, arrow: usize },

    #[error("Starting position in tier {tier} puts both feet on arrow {arrow}")]
    StartingPositionSameArrow { tier: usize, arrow: usize },

    #[error("Invalid pad rules: {0}")]
    InvalidRules(String),
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error(transparent)]
    Pad(#[from] PadError),

    #[error("Home position (left {left}, right {right}) is not a valid foot placement")]
    InvalidRoot { left: usize, right: usize },

    #[error(
        "Starting position (left {left}, right {right}) in tier {tier} is not reachable on the graph"
    )]
    MissingStartingPosition {
        tier: usize,
        left: usize,
        right: usize,
    },
}

#[derive(Error, Debug)]
pub enum FallbackError {
    #[error("Failed to read fallbacks {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse fallbacks {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{0} lists itself as a fallback")]
    SelfReference(StepType),

    #[error("{step} lists {duplicate} more than once")]
    Duplicate { step: StepType, duplicate: StepType },
}

/// Failure to explain a chart's note timeline on the input graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("No foot placement can satisfy arrows {arrows:?} at position {position}")]
    UnsatisfiableStep { position: i32, arrows: Vec<usize> },

    #[error("Note on lane {lane} at position {position} is outside the pad's {num_arrows} arrows")]
    LaneOutOfRange {
        position: i32,
        lane: usize,
        num_arrows: usize,
    },

    #[error("Note on lane {lane} has negative position {position}")]
    NegativePosition { position: i32, lane: usize },

    #[error("Hold end on lane {lane} at position {position} has no matching hold start")]
    UnmatchedHoldEnd { position: i32, lane: usize },

    #[error("Step on lane {lane} at position {position} overlaps a hold on the same lane")]
    HoldOverlap { position: i32, lane: usize },

    #[error("Hold on lane {lane} starting at position {position} never ends")]
    UnterminatedHold { position: i32, lane: usize },
}

/// Failure to realize an expressed chart on the output graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PerformanceError {
    #[error("No starting positions are available on the output graph")]
    NoStartNodes,

    #[error("No placement or fallback realizes {step_types:?} at position {position}")]
    UnresolvedStep {
        position: i32,
        step_types: Vec<StepType>,
    },

    #[error("No held arrow tracks the hold ends on lanes {lanes:?} at position {position}")]
    UnmatchedRelease { position: i32, lanes: Vec<usize> },
}

// stepshift_core: retargeting of step charts between pad layouts.
//
// This crate holds everything between a parsed note timeline and a
// materialized note timeline: pad geometry, the foot-placement graph, the
// technique taxonomy, and the two cost-guided searches. It performs no file
// system I/O apart from the explicit JSON loaders on `PadData` and
// `StepTypeFallbacks`, so it can be tested and benchmarked headless.
//
// Module overview:
// - `types.rs`:        Feet, foot portions, arrow states, note events.
// - `pad.rs`:          PadData (arrow geometry, start tiers, PadRules) + built-in pads.
// - `technique.rs`:    StepType taxonomy, PortionLink, GraphLink.
// - `graph.rs`:        StepGraph: interned GraphNodes, edges, BFS closure, jump composition.
// - `frontier.rs`:     Per-node frontier collapse shared by both searches.
// - `expressed.rs`:    Chart Expression Engine: timeline -> ExpressedChart.
// - `mines.rs`:        Mine association (expression) and mine placement (performance).
// - `fallbacks.rs`:    StepTypeFallbacks table.
// - `performed.rs`:    Chart Performance Engine: ExpressedChart -> PerformedChart -> events.
// - `drop_detect.rs`:  Lock-step comparison of source and generated timelines.
// - `error.rs`:        Error enums for every fallible operation above.
//
// **Critical constraint: determinism.** For a given (timeline, graphs,
// configuration, seed) the output is a pure function. Graph node ids are
// assigned serially in BFS order, searches iterate frontiers in NodeId order,
// and genuine cost ties are broken by sorting candidates canonically and then
// drawing from `stepshift_prng::ChartRng`. Never let hash-map iteration order
// reach an output.

pub mod drop_detect;
pub mod error;
pub mod expressed;
pub mod fallbacks;
mod frontier;
pub mod graph;
pub mod mines;
pub mod pad;
pub mod performed;
pub mod technique;
pub mod types;

pub use stepshift_prng as prng;

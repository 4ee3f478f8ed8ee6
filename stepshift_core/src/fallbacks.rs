// Step type fallbacks for the performance search.
//
// When the output pad cannot realize a technique exactly (a bracket on a pad
// with no bracketable pairs, a crossover on a two-arrow pad), the performance
// search widens the acceptable set one entry at a time along the technique's
// fallback list. The lists are ordered: earlier entries are closer in feel
// and cost less.
//
// The table is plain JSON keyed by step type name, e.g.
//   { "fallbacks": { "NewArrow": ["SameArrow", "NewArrowStretch"] } }
// Types missing from a loaded file have no fallbacks.

use crate::error::FallbackError;
use crate::technique::StepType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepTypeFallbacks {
    pub fallbacks: BTreeMap<StepType, Vec<StepType>>,
}

impl StepTypeFallbacks {
    /// Built-in table with an entry for every step type.
    pub fn default_table() -> Self {
        use StepType::*;
        let entries: [(StepType, &[StepType]); 27] = [
            (SameArrow, &[NewArrow, BracketOneArrowHeelSame, BracketOneArrowToeSame]),
            (
                NewArrow,
                &[SameArrow, NewArrowStretch, CrossoverFront, CrossoverBehind, Swing],
            ),
            (
                CrossoverFront,
                &[CrossoverBehind, NewArrow, CrossoverFrontStretch, SameArrow],
            ),
            (
                CrossoverBehind,
                &[CrossoverFront, NewArrow, CrossoverBehindStretch, SameArrow],
            ),
            (
                InvertFront,
                &[InvertBehind, CrossoverFront, CrossoverBehind, NewArrow, SameArrow],
            ),
            (
                InvertBehind,
                &[InvertFront, CrossoverBehind, CrossoverFront, NewArrow, SameArrow],
            ),
            (FootSwap, &[NewArrow, SameArrow]),
            (Swing, &[NewArrow, NewArrowStretch, SameArrow]),
            (NewArrowStretch, &[NewArrow, SameArrow]),
            (
                CrossoverFrontStretch,
                &[CrossoverFront, CrossoverBehindStretch, NewArrowStretch, NewArrow],
            ),
            (
                CrossoverBehindStretch,
                &[CrossoverBehind, CrossoverFrontStretch, NewArrowStretch, NewArrow],
            ),
            (
                InvertFrontStretch,
                &[InvertFront, InvertBehindStretch, CrossoverFrontStretch, NewArrowStretch],
            ),
            (
                InvertBehindStretch,
                &[InvertBehind, InvertFrontStretch, CrossoverBehindStretch, NewArrowStretch],
            ),
            (
                BracketHeelNewToeNew,
                &[
                    BracketHeelNewToeSame,
                    BracketHeelSameToeNew,
                    BracketStretchHeelNewToeNew,
                    NewArrow,
                    SameArrow,
                ],
            ),
            (
                BracketHeelNewToeSame,
                &[BracketHeelNewToeNew, BracketHeelSameToeNew, NewArrow, SameArrow],
            ),
            (
                BracketHeelSameToeNew,
                &[BracketHeelNewToeNew, BracketHeelNewToeSame, NewArrow, SameArrow],
            ),
            (
                BracketHeelSameToeSame,
                &[BracketHeelNewToeSame, BracketHeelSameToeNew, SameArrow, NewArrow],
            ),
            (
                BracketSwing,
                &[BracketHeelNewToeNew, Swing, NewArrow, SameArrow],
            ),
            (
                BracketCrossoverFrontHeelNewToeNew,
                &[
                    BracketCrossoverBehindHeelNewToeNew,
                    BracketHeelNewToeNew,
                    CrossoverFront,
                    NewArrow,
                ],
            ),
            (
                BracketCrossoverBehindHeelNewToeNew,
                &[
                    BracketCrossoverFrontHeelNewToeNew,
                    BracketHeelNewToeNew,
                    CrossoverBehind,
                    NewArrow,
                ],
            ),
            (
                BracketInvertFrontHeelNewToeNew,
                &[
                    BracketInvertBehindHeelNewToeNew,
                    BracketCrossoverFrontHeelNewToeNew,
                    InvertFront,
                    NewArrow,
                ],
            ),
            (
                BracketInvertBehindHeelNewToeNew,
                &[
                    BracketInvertFrontHeelNewToeNew,
                    BracketCrossoverBehindHeelNewToeNew,
                    InvertBehind,
                    NewArrow,
                ],
            ),
            (
                BracketStretchHeelNewToeNew,
                &[BracketHeelNewToeNew, NewArrowStretch, NewArrow],
            ),
            (
                BracketOneArrowHeelSame,
                &[BracketOneArrowToeSame, SameArrow, BracketOneArrowHeelNew, NewArrow],
            ),
            (
                BracketOneArrowHeelNew,
                &[BracketOneArrowToeNew, NewArrow, BracketOneArrowHeelSame, SameArrow],
            ),
            (
                BracketOneArrowToeSame,
                &[BracketOneArrowHeelSame, SameArrow, BracketOneArrowToeNew, NewArrow],
            ),
            (
                BracketOneArrowToeNew,
                &[BracketOneArrowHeelNew, NewArrow, BracketOneArrowToeSame, SameArrow],
            ),
        ];
        StepTypeFallbacks {
            fallbacks: entries
                .into_iter()
                .map(|(st, list)| (st, list.to_vec()))
                .collect(),
        }
    }

    /// Load and validate a fallback table from a JSON file.
    pub fn load(path: &Path) -> Result<Self, FallbackError> {
        let text = std::fs::read_to_string(path).map_err(|source| FallbackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table: StepTypeFallbacks =
            serde_json::from_str(&text).map_err(|source| FallbackError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), FallbackError> {
        for (&step, list) in &self.fallbacks {
            for (i, &fb) in list.iter().enumerate() {
                if fb == step {
                    return Err(FallbackError::SelfReference(step));
                }
                if list[..i].contains(&fb) {
                    return Err(FallbackError::Duplicate {
                        step,
                        duplicate: fb,
                    });
                }
            }
        }
        Ok(())
    }

    /// Ordered substitutes for `step`; empty when none are configured.
    pub fn fallbacks_for(&self, step: StepType) -> &[StepType] {
        self.fallbacks.get(&step).map_or(&[], Vec::as_slice)
    }

    /// Longest fallback list in the table.
    pub fn max_depth(&self) -> usize {
        self.fallbacks.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Rank of `candidate` as a substitute for `wanted` when at most `depth`
    /// fallbacks are allowed: 0 for an exact match, `i + 1` for the i-th
    /// fallback, `None` when not acceptable.
    pub fn rank(&self, wanted: StepType, candidate: StepType, depth: usize) -> Option<usize> {
        if wanted == candidate {
            return Some(0);
        }
        self.fallbacks_for(wanted)
            .iter()
            .take(depth)
            .position(|&fb| fb == candidate)
            .map(|i| i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_table_covers_every_type_and_validates() {
        let table = StepTypeFallbacks::default_table();
        for st in StepType::ALL {
            assert!(
                !table.fallbacks_for(st).is_empty(),
                "{st} has no fallbacks"
            );
        }
        table.validate().unwrap();
    }

    #[test]
    fn rank_respects_depth() {
        let table = StepTypeFallbacks::default_table();
        let wanted = StepType::NewArrow;
        assert_eq!(table.rank(wanted, StepType::NewArrow, 0), Some(0));
        assert_eq!(table.rank(wanted, StepType::SameArrow, 0), None);
        assert_eq!(table.rank(wanted, StepType::SameArrow, 1), Some(1));
        assert_eq!(table.rank(wanted, StepType::CrossoverFront, 2), None);
        assert_eq!(table.rank(wanted, StepType::CrossoverFront, 3), Some(3));
    }

    #[test]
    fn validation_rejects_self_reference_and_duplicates() {
        let mut table = StepTypeFallbacks::default();
        table
            .fallbacks
            .insert(StepType::Swing, vec![StepType::NewArrow, StepType::Swing]);
        assert!(matches!(
            table.validate(),
            Err(FallbackError::SelfReference(StepType::Swing))
        ));

        table.fallbacks.insert(
            StepType::Swing,
            vec![StepType::NewArrow, StepType::SameArrow, StepType::NewArrow],
        );
        assert!(matches!(
            table.validate(),
            Err(FallbackError::Duplicate {
                step: StepType::Swing,
                duplicate: StepType::NewArrow
            })
        ));
    }

    #[test]
    fn load_reads_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "fallbacks": {{ "CrossoverFront": ["NewArrow", "SameArrow"] }} }}"#
        )
        .unwrap();
        let table = StepTypeFallbacks::load(file.path()).unwrap();
        assert_eq!(
            table.fallbacks_for(StepType::CrossoverFront),
            &[StepType::NewArrow, StepType::SameArrow]
        );
        assert!(table.fallbacks_for(StepType::NewArrow).is_empty());
        assert_eq!(table.max_depth(), 2);
    }

    #[test]
    fn load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "fallbacks": {{ "NotAStep": [] }} }}"#).unwrap();
        assert!(matches!(
            StepTypeFallbacks::load(file.path()),
            Err(FallbackError::Parse { .. })
        ));
    }
}

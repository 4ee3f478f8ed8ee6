// Lock-step comparison of a source timeline and its generated counterpart.
//
// Walks both sorted timelines by position. At every position where the
// source has at least one non-mine note, the output must have the same
// number of non-mine notes, otherwise the position is reported. Mines are
// compared at source positions only, as a running difference that is
// reported when positive; mines the output adds elsewhere never offset
// dropped ones. The result is advisory: the batch layer logs it and writes
// the chart anyway.

use crate::types::{NoteEvent, NoteKind};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropReport {
    /// Positions whose note count differs, ascending.
    pub positions: Vec<i32>,
    /// Source mines minus output mines at source positions, floored at zero.
    pub dropped_mines: usize,
}

impl DropReport {
    pub fn is_clean(&self) -> bool {
        self.positions.is_empty() && self.dropped_mines == 0
    }
}

impl fmt::Display for DropReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.positions.as_slice() {
            [] => {}
            [p] => write!(f, "Dropped 1 step at position {p}.")?,
            ps => write!(f, "Dropped {} steps at positions: {ps:?}.", ps.len())?,
        }
        if self.dropped_mines != 0 {
            if !self.positions.is_empty() {
                write!(f, " ")?;
            }
            if self.dropped_mines == 1 {
                write!(f, "Dropped 1 mine.")?;
            } else {
                write!(f, "Dropped {} mines.", self.dropped_mines)?;
            }
        }
        Ok(())
    }
}

/// Per-position (steps, mines) counts of a sorted timeline.
fn counts_by_position(events: &[NoteEvent]) -> impl Iterator<Item = (i32, usize, usize)> + '_ {
    events.chunk_by(|a, b| a.position == b.position).map(|row| {
        let mines = row.iter().filter(|e| e.kind == NoteKind::Mine).count();
        (row[0].position, row.len() - mines, mines)
    })
}

/// Compare `source` and `output`, both sorted by position.
pub fn detect_dropped_steps(source: &[NoteEvent], output: &[NoteEvent]) -> DropReport {
    let mut report = DropReport::default();
    let mut mine_balance = 0i64;
    let mut src = counts_by_position(source).peekable();
    let mut out = counts_by_position(output).peekable();
    loop {
        let (s, o) = (src.peek().copied(), out.peek().copied());
        let (position, src_steps, src_mines, out_steps, out_mines) = match (s, o) {
            (None, None) => break,
            (Some(s), Some(o)) if s.0 == o.0 => {
                src.next();
                out.next();
                (s.0, s.1, s.2, o.1, o.2)
            }
            (Some(s), Some(o)) if s.0 < o.0 => {
                src.next();
                (s.0, s.1, s.2, 0, 0)
            }
            (Some(s), None) => {
                src.next();
                (s.0, s.1, s.2, 0, 0)
            }
            (_, Some(_)) => {
                out.next();
                continue;
            }
        };
        if src_steps > 0 && src_steps != out_steps {
            report.positions.push(position);
        }
        mine_balance += src_mines as i64 - out_mines as i64;
    }
    report.dropped_mines = usize::try_from(mine_balance).unwrap_or(0);
    report
}

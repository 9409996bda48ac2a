//! Position adjustments recorded by structural edits.
//!
//! Every primitive edit repositions every other live cursor and marker. The
//! same repositioning must be replayable later: redo replays the forward
//! adjustments in edit order, undo replays the recorded inverses in reverse
//! order. Instead of capturing closures per edit, each primitive records a
//! small [`Adjustment`] value, and one generic replay routine interprets it
//! against cursor boundary pairs and marker lines. This keeps undo steps
//! inspectable and serializable.
//!
//! Columns are code units (byte offsets); lines are row indices.

use serde::{
  Deserialize,
  Serialize,
};
use smallvec::SmallVec;

use crate::position::Position;

/// Adjustments recorded for one undo step.
pub type AdjustmentList = SmallVec<[Adjustment; 2]>;

/// A single structural repositioning rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Adjustment {
  /// Text of `len` code units was inserted at `(line, column)`.
  ///
  /// Boundary shifting at exactly `column` is selection-aware, see
  /// [`Adjustment::apply_to_cursor`].
  InsertColumns {
    line:   usize,
    column: usize,
    len:    usize,
  },
  /// `len` code units were removed at `(line, start)`: positions inside the
  /// removed range collapse to `start`, positions past it shift left.
  CollapseColumns {
    line:  usize,
    start: usize,
    len:   usize,
  },
  /// Removed text was restored at `(line, start)`: every boundary at or
  /// right of `start` (it sat at or past the removed range) shifts right by
  /// `len`, back to its exact prior offset.
  ShiftColumns {
    line:  usize,
    start: usize,
    len:   usize,
  },
  /// `line` was split at `column`; content at or past `column` now starts
  /// the following line.
  SplitLine { line: usize, column: usize },
  /// `line + 1` was merged onto `line`, whose length was `column` before the
  /// merge.
  MergeLines { line: usize, column: usize },
  /// `len` lines starting at `start` were removed.
  CollapseLines { start: usize, len: usize },
  /// `len` removed lines were restored at `start`.
  OpenLines { start: usize, len: usize },
  /// Rows `start .. start + mapping.len()` were reordered; old row
  /// `start + i` is now row `start + mapping[i]`.
  PermuteLines { start: usize, mapping: Vec<usize> },
}

impl Adjustment {
  /// Replay this adjustment against the `(position, anchor)` pair of a
  /// cursor that did not drive the edit.
  ///
  /// Insertions treat the two boundaries asymmetrically so that typing
  /// exactly at a foreign cursor moves it without growing a foreign
  /// selection, while a selection genuinely straddling the insert point does
  /// grow: a boundary strictly right of the insert column always shifts, and
  /// a boundary exactly at it shifts only when it is the selection's start
  /// edge (or the cursor has no selection at all).
  pub fn apply_to_cursor(&self, position: &mut Position, anchor: &mut Position) {
    if let Adjustment::InsertColumns { line, column, len } = *self {
      let no_selection = position == anchor;
      let position_is_start = *position <= *anchor;
      apply_insert_boundary(position, line, column, len, no_selection || position_is_start);
      apply_insert_boundary(anchor, line, column, len, no_selection || !position_is_start);
    } else {
      self.apply_to_boundary(position);
      self.apply_to_boundary(anchor);
    }
  }

  /// Replay this adjustment against a single selection-free boundary.
  pub fn apply_to_boundary(&self, pos: &mut Position) {
    match *self {
      Adjustment::InsertColumns { line, column, len } => {
        apply_insert_boundary(pos, line, column, len, true);
      },
      Adjustment::CollapseColumns { line, start, len } => {
        if pos.line == line && pos.code_unit >= start {
          if pos.code_unit < start + len {
            pos.code_unit = start;
          } else {
            pos.code_unit -= len;
          }
        }
      },
      Adjustment::ShiftColumns { line, start, len } => {
        if pos.line == line && pos.code_unit >= start {
          pos.code_unit += len;
        }
      },
      Adjustment::SplitLine { line, column } => {
        if pos.line > line {
          pos.line += 1;
        } else if pos.line == line && pos.code_unit >= column {
          pos.line = line + 1;
          pos.code_unit -= column;
        }
      },
      Adjustment::MergeLines { line, column } => {
        if pos.line == line + 1 {
          pos.line = line;
          pos.code_unit += column;
        } else if pos.line > line + 1 {
          pos.line -= 1;
        }
      },
      Adjustment::CollapseLines { start, len } => {
        if pos.line >= start {
          if pos.line < start + len {
            pos.line = start;
            pos.code_unit = 0;
          } else {
            pos.line -= len;
          }
        }
      },
      Adjustment::OpenLines { start, len } => {
        if pos.line >= start {
          pos.line += len;
        }
      },
      Adjustment::PermuteLines { start, ref mapping } => {
        if pos.line >= start && pos.line < start + mapping.len() {
          pos.line = start + mapping[pos.line - start];
        }
      },
    }
  }

  /// Replay this adjustment against a line marker.
  ///
  /// Markers carry no column; for a split they follow the moved content only
  /// when the whole line moved (split at column 0).
  pub fn apply_to_marker(&self, marker_line: &mut usize) {
    match *self {
      Adjustment::InsertColumns { .. }
      | Adjustment::CollapseColumns { .. }
      | Adjustment::ShiftColumns { .. } => {},
      Adjustment::SplitLine { line, column } => {
        if *marker_line > line || (*marker_line == line && column == 0) {
          *marker_line += 1;
        }
      },
      Adjustment::MergeLines { line, .. } => {
        if *marker_line == line + 1 {
          *marker_line = line;
        } else if *marker_line > line + 1 {
          *marker_line -= 1;
        }
      },
      Adjustment::CollapseLines { start, len } => {
        if *marker_line >= start {
          if *marker_line < start + len {
            *marker_line = start;
          } else {
            *marker_line -= len;
          }
        }
      },
      Adjustment::OpenLines { start, len } => {
        if *marker_line >= start {
          *marker_line += len;
        }
      },
      Adjustment::PermuteLines { start, ref mapping } => {
        if *marker_line >= start && *marker_line < start + mapping.len() {
          *marker_line = start + mapping[*marker_line - start];
        }
      },
    }
  }
}

fn apply_insert_boundary(
  pos: &mut Position,
  line: usize,
  column: usize,
  len: usize,
  shift_at_column: bool,
) {
  if pos.line == line && (pos.code_unit > column || (pos.code_unit == column && shift_at_column)) {
    pos.code_unit += len;
  }
}

/// Invert a row permutation: if `mapping[old] == new`, the result maps `new`
/// back to `old`.
pub fn invert_mapping(mapping: &[usize]) -> Vec<usize> {
  let mut inverse = vec![0; mapping.len()];
  for (old, &new) in mapping.iter().enumerate() {
    inverse[new] = old;
  }
  inverse
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cursor(position: Position, anchor: Position) -> (Position, Position) {
    (position, anchor)
  }

  #[test]
  fn insert_moves_plain_cursor_at_insert_point() {
    let insert = Adjustment::InsertColumns {
      line:   0,
      column: 3,
      len:    2,
    };
    let (mut p, mut a) = cursor(Position::new(0, 3), Position::new(0, 3));
    insert.apply_to_cursor(&mut p, &mut a);
    assert_eq!(p, Position::new(0, 5));
    assert_eq!(a, Position::new(0, 5));
  }

  #[test]
  fn insert_does_not_grow_selection_ending_at_insert_point() {
    let insert = Adjustment::InsertColumns {
      line:   0,
      column: 3,
      len:    2,
    };
    // Selection [1, 3): anchor at 1, position at 3 (the max edge).
    let (mut p, mut a) = cursor(Position::new(0, 3), Position::new(0, 1));
    insert.apply_to_cursor(&mut p, &mut a);
    assert_eq!(p, Position::new(0, 3));
    assert_eq!(a, Position::new(0, 1));
  }

  #[test]
  fn insert_shifts_selection_starting_at_insert_point() {
    let insert = Adjustment::InsertColumns {
      line:   0,
      column: 3,
      len:    2,
    };
    // Selection [3, 6): start edge sits exactly at the insert column, so the
    // whole selection shifts and keeps its contents.
    let (mut p, mut a) = cursor(Position::new(0, 6), Position::new(0, 3));
    insert.apply_to_cursor(&mut p, &mut a);
    assert_eq!(p, Position::new(0, 8));
    assert_eq!(a, Position::new(0, 5));
  }

  #[test]
  fn insert_grows_straddling_selection() {
    let insert = Adjustment::InsertColumns {
      line:   0,
      column: 3,
      len:    2,
    };
    let (mut p, mut a) = cursor(Position::new(0, 5), Position::new(0, 1));
    insert.apply_to_cursor(&mut p, &mut a);
    assert_eq!(p, Position::new(0, 7));
    assert_eq!(a, Position::new(0, 1));
  }

  #[test]
  fn collapse_then_shift_restores_right_side_exactly() {
    let remove = Adjustment::CollapseColumns {
      line:  1,
      start: 2,
      len:   3,
    };
    let restore = Adjustment::ShiftColumns {
      line:  1,
      start: 2,
      len:   3,
    };

    // Boundary past the removed range.
    let mut pos = Position::new(1, 7);
    remove.apply_to_boundary(&mut pos);
    assert_eq!(pos, Position::new(1, 4));
    restore.apply_to_boundary(&mut pos);
    assert_eq!(pos, Position::new(1, 7));

    // Boundary at the removed range end.
    let mut pos = Position::new(1, 5);
    remove.apply_to_boundary(&mut pos);
    assert_eq!(pos, Position::new(1, 2));
    restore.apply_to_boundary(&mut pos);
    assert_eq!(pos, Position::new(1, 5));

    // Boundary left of the removed range never moves.
    let mut pos = Position::new(1, 1);
    remove.apply_to_boundary(&mut pos);
    restore.apply_to_boundary(&mut pos);
    assert_eq!(pos, Position::new(1, 1));
  }

  #[test]
  fn split_then_merge_is_identity() {
    let split = Adjustment::SplitLine { line: 2, column: 4 };
    let merge = Adjustment::MergeLines { line: 2, column: 4 };

    for original in [
      Position::new(1, 9),
      Position::new(2, 2),
      Position::new(2, 4),
      Position::new(2, 8),
      Position::new(5, 0),
    ] {
      let mut pos = original;
      split.apply_to_boundary(&mut pos);
      merge.apply_to_boundary(&mut pos);
      assert_eq!(pos, original);
    }

    for original in [1usize, 2, 3, 7] {
      let mut line = original;
      split.apply_to_marker(&mut line);
      merge.apply_to_marker(&mut line);
      assert_eq!(line, original);
    }
  }

  #[test]
  fn split_at_column_zero_carries_marker() {
    let split = Adjustment::SplitLine { line: 2, column: 0 };
    let mut line = 2;
    split.apply_to_marker(&mut line);
    assert_eq!(line, 3);

    let split_mid = Adjustment::SplitLine { line: 2, column: 3 };
    let mut line = 2;
    split_mid.apply_to_marker(&mut line);
    assert_eq!(line, 2);
  }

  #[test]
  fn collapse_lines_and_open_lines() {
    let remove = Adjustment::CollapseLines { start: 2, len: 3 };
    let restore = Adjustment::OpenLines { start: 2, len: 3 };

    let mut pos = Position::new(6, 4);
    remove.apply_to_boundary(&mut pos);
    assert_eq!(pos, Position::new(3, 4));
    restore.apply_to_boundary(&mut pos);
    assert_eq!(pos, Position::new(6, 4));

    let mut inside = Position::new(3, 5);
    remove.apply_to_boundary(&mut inside);
    assert_eq!(inside, Position::new(2, 0));

    let mut marker = 4;
    remove.apply_to_marker(&mut marker);
    assert_eq!(marker, 2);
  }

  #[test]
  fn permutation_and_inverse_round_trip() {
    let mapping = vec![2, 0, 1, 3];
    let inverse = invert_mapping(&mapping);
    assert_eq!(inverse, vec![1, 2, 0, 3]);

    let forward = Adjustment::PermuteLines {
      start: 5,
      mapping: mapping.clone(),
    };
    let backward = Adjustment::PermuteLines {
      start:   5,
      mapping: inverse,
    };

    for original in [4usize, 5, 6, 7, 8, 9] {
      let mut line = original;
      forward.apply_to_marker(&mut line);
      backward.apply_to_marker(&mut line);
      assert_eq!(line, original);
    }

    let mut line = 5;
    forward.apply_to_marker(&mut line);
    assert_eq!(line, 7);
  }
}

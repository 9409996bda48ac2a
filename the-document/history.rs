//! Undo/redo step history.
//!
//! Every step stores a full line-store snapshot (the state *after* the step)
//! together with the driving cursor's start/end positions and the recorded
//! forward/inverse adjustment lists for all other cursors and markers. The
//! stack itself only manages ordering, collapsing and the saved baseline;
//! restoring state and replaying adjustments is driven by the document.

use crate::{
  adjustment::AdjustmentList,
  line::Line,
  position::Position,
};

#[derive(Debug, Clone)]
pub(crate) struct UndoStep {
  /// Line store after this step.
  pub lines:            Vec<Line>,
  pub newline_missing:  bool,
  pub start_cursor:     Position,
  pub end_cursor:       Position,
  pub redo_adjustments: AdjustmentList,
  pub undo_adjustments: AdjustmentList,
  pub collapsible:      bool,
}

/// Owned restore bundle handed to the document by [`UndoStack::undo`] and
/// [`UndoStack::redo`].
#[derive(Debug)]
pub(crate) struct RestoreStep {
  pub lines:           Vec<Line>,
  pub newline_missing: bool,
  /// Where the driving cursor goes.
  pub cursor:          Position,
  /// Adjustments to replay against every other cursor and marker, already in
  /// replay order.
  pub adjustments:     AdjustmentList,
}

#[derive(Debug)]
pub(crate) struct UndoStack {
  steps:   Vec<UndoStep>,
  current: usize,
  /// Step marking the "not modified" baseline; `None` once that step has
  /// been truncated or merged away.
  saved:   Option<usize>,
}

impl UndoStack {
  pub fn new(initial: UndoStep) -> Self {
    Self {
      steps:   vec![initial],
      current: 0,
      saved:   Some(0),
    }
  }

  pub fn reset(&mut self, initial: UndoStep) {
    self.steps = vec![initial];
    self.current = 0;
    self.saved = Some(0);
  }

  pub fn is_undo_available(&self) -> bool {
    self.current > 0
  }

  pub fn is_redo_available(&self) -> bool {
    self.current + 1 < self.steps.len()
  }

  pub fn is_modified(&self) -> bool {
    self.saved != Some(self.current)
  }

  pub fn mark_saved(&mut self) {
    self.saved = Some(self.current);
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.steps.len()
  }

  /// Append a finished step, or merge it into the current top when
  /// collapsing applies.
  ///
  /// Any step recorded while not at the top of history discards the tail
  /// first.
  pub fn push(&mut self, step: UndoStep, collapse: bool) {
    if self.current + 1 < self.steps.len() {
      tracing::debug!(
        discarded = self.steps.len() - self.current - 1,
        "edit below top of history, discarding redo steps"
      );
      self.steps.truncate(self.current + 1);
      if self.saved.is_some_and(|saved| saved > self.current) {
        self.saved = None;
      }
    }

    let top = self
      .steps
      .last_mut()
      .expect("undo stack always has a base step");

    if collapse && top.collapsible && top.end_cursor == step.start_cursor {
      top.lines = step.lines;
      top.newline_missing = step.newline_missing;
      top.end_cursor = step.end_cursor;
      top.redo_adjustments.extend(step.redo_adjustments);
      let mut undo = step.undo_adjustments;
      undo.extend(top.undo_adjustments.drain(..));
      top.undo_adjustments = undo;
      top.collapsible = step.collapsible;
      // The merged step no longer matches any saved baseline.
      if self.saved == Some(self.current) {
        self.saved = None;
      }
    } else {
      self.steps.push(step);
      self.current += 1;
    }
  }

  /// Explicitly end a collapsing run, e.g. after cursor movement.
  pub fn break_collapsing(&mut self) {
    if let Some(top) = self.steps.get_mut(self.current) {
      top.collapsible = false;
    }
  }

  pub fn undo(&mut self) -> Option<RestoreStep> {
    if self.current == 0 {
      return None;
    }
    let undone = self.current;
    self.current -= 1;
    self.steps[self.current].collapsible = false;

    let restore = &self.steps[self.current];
    let undone = &self.steps[undone];
    Some(RestoreStep {
      lines:           restore.lines.clone(),
      newline_missing: restore.newline_missing,
      cursor:          undone.start_cursor,
      adjustments:     undone.undo_adjustments.clone(),
    })
  }

  pub fn redo(&mut self) -> Option<RestoreStep> {
    if self.current + 1 >= self.steps.len() {
      return None;
    }
    self.current += 1;
    let redone = &mut self.steps[self.current];
    redone.collapsible = false;
    Some(RestoreStep {
      lines:           redone.lines.clone(),
      newline_missing: redone.newline_missing,
      cursor:          redone.end_cursor,
      adjustments:     redone.redo_adjustments.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use smallvec::smallvec;

  use super::*;
  use crate::adjustment::Adjustment;

  fn step(text: &str, start: Position, end: Position, collapsible: bool) -> UndoStep {
    UndoStep {
      lines: vec![Line::new(text.to_string(), 1)],
      newline_missing: true,
      start_cursor: start,
      end_cursor: end,
      redo_adjustments: AdjustmentList::new(),
      undo_adjustments: AdjustmentList::new(),
      collapsible,
    }
  }

  #[test]
  fn availability_and_saved_tracking() {
    let mut stack = UndoStack::new(step("", Position::zero(), Position::zero(), false));
    assert!(!stack.is_undo_available());
    assert!(!stack.is_redo_available());
    assert!(!stack.is_modified());

    stack.push(
      step("a", Position::zero(), Position::new(0, 1), false),
      false,
    );
    assert!(stack.is_undo_available());
    assert!(stack.is_modified());

    stack.mark_saved();
    assert!(!stack.is_modified());

    assert!(stack.undo().is_some());
    assert!(stack.is_redo_available());
    assert!(stack.is_modified());

    assert!(stack.redo().is_some());
    assert!(!stack.is_modified());
    assert!(!stack.is_redo_available());
  }

  #[test]
  fn collapse_merges_into_top() {
    let mut stack = UndoStack::new(step("", Position::zero(), Position::zero(), false));
    let mut first = step("a", Position::zero(), Position::new(0, 1), true);
    first.redo_adjustments = smallvec![Adjustment::InsertColumns {
      line:   0,
      column: 0,
      len:    1,
    }];
    first.undo_adjustments = smallvec![Adjustment::CollapseColumns {
      line:  0,
      start: 0,
      len:   1,
    }];
    stack.push(first, true);
    assert_eq!(stack.len(), 2);

    let mut second = step("ab", Position::new(0, 1), Position::new(0, 2), true);
    second.redo_adjustments = smallvec![Adjustment::InsertColumns {
      line:   0,
      column: 1,
      len:    1,
    }];
    second.undo_adjustments = smallvec![Adjustment::CollapseColumns {
      line:  0,
      start: 1,
      len:   1,
    }];
    stack.push(second, true);

    // Merged: still two steps, the top one now covers both edits.
    assert_eq!(stack.len(), 2);
    let restore = stack.undo().expect("one collapsed step to undo");
    assert_eq!(restore.adjustments.len(), 2);
    // Undo adjustments replay newest-first.
    assert!(matches!(
      restore.adjustments[0],
      Adjustment::CollapseColumns { start: 1, .. }
    ));
    assert_eq!(restore.cursor, Position::zero());
  }

  #[test]
  fn break_collapsing_forces_new_step() {
    let mut stack = UndoStack::new(step("", Position::zero(), Position::zero(), false));
    stack.push(step("a", Position::zero(), Position::new(0, 1), true), true);
    stack.break_collapsing();
    stack.push(
      step("ab", Position::new(0, 1), Position::new(0, 2), true),
      true,
    );
    assert_eq!(stack.len(), 3);
  }

  #[test]
  fn collapse_requires_contiguous_positions() {
    let mut stack = UndoStack::new(step("", Position::zero(), Position::zero(), false));
    stack.push(step("a", Position::zero(), Position::new(0, 1), true), true);
    // Start does not line up with the previous end: no merge.
    stack.push(
      step("ab", Position::new(0, 0), Position::new(0, 1), true),
      true,
    );
    assert_eq!(stack.len(), 3);
  }

  #[test]
  fn edit_below_top_discards_tail_and_saved_marker() {
    let mut stack = UndoStack::new(step("", Position::zero(), Position::zero(), false));
    stack.push(
      step("a", Position::zero(), Position::new(0, 1), false),
      false,
    );
    stack.push(
      step("ab", Position::new(0, 1), Position::new(0, 2), false),
      false,
    );
    stack.mark_saved();

    stack.undo().unwrap();
    stack.undo().unwrap();
    stack.push(
      step("x", Position::zero(), Position::new(0, 1), false),
      false,
    );

    assert_eq!(stack.len(), 2);
    assert!(!stack.is_redo_available());
    // The saved step is gone for good.
    assert!(stack.is_modified());
    stack.undo().unwrap();
    assert!(stack.is_modified());
  }
}

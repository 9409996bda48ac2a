//! Cursor handles and their editing/motion operations.
//!
//! Cursor state lives inside the document; [`CursorId`] is a stable slot-map
//! handle to it. [`Cursor`] is a cheap read view, [`CursorMut`] a guard that
//! borrows the document mutably and funnels every edit through the mutation
//! primitives, so each operation records exactly one undo step (or joins the
//! enclosing undo group).
//!
//! Horizontal motion is grapheme-cluster-wise; columns remain code units
//! (byte offsets). Vertical motion goes through the caller-supplied
//! [`LineLayout`] and keeps the cursor's preferred visual column across
//! consecutive vertical moves.

use the_text::{
  chars::{
    CharCategory,
    categorize_char,
  },
  grapheme,
};

use crate::{
  document::Document,
  event::DocumentEvent,
  layout::LineLayout,
  position::Position,
};

slotmap::new_key_type! {
  /// Stable handle to a cursor registered on a document.
  pub struct CursorId;
}

/// Cursor state: position, selection anchor, and the preferred visual column
/// for vertical motion. `anchor != position` denotes an active selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CursorState {
  pub position:        Position,
  pub anchor:          Position,
  pub vertical_column: Option<usize>,
}

/// Read-only view of one cursor.
pub struct Cursor<'a> {
  pub(crate) document: &'a Document,
  pub(crate) id:       CursorId,
}

impl Cursor<'_> {
  fn state(&self) -> CursorState {
    self.document.cursors[self.id]
  }

  pub fn position(&self) -> Position {
    self.state().position
  }

  pub fn anchor(&self) -> Position {
    self.state().anchor
  }

  pub fn has_selection(&self) -> bool {
    let state = self.state();
    state.position != state.anchor
  }

  /// Selection as an ordered `(start, end)` pair, `None` when collapsed.
  pub fn selection(&self) -> Option<(Position, Position)> {
    let state = self.state();
    if state.position == state.anchor {
      return None;
    }
    Some((
      state.position.min(state.anchor),
      state.position.max(state.anchor),
    ))
  }

  /// Selected text with lines joined by `\n`; empty without a selection.
  pub fn selected_text(&self) -> String {
    let Some((start, end)) = self.selection() else {
      return String::new();
    };
    if start.line == end.line {
      return self.document.line(start.line)[start.code_unit..end.code_unit].to_string();
    }
    let mut out = String::new();
    out.push_str(&self.document.line(start.line)[start.code_unit..]);
    for line in start.line + 1..end.line {
      out.push('\n');
      out.push_str(self.document.line(line));
    }
    out.push('\n');
    out.push_str(&self.document.line(end.line)[..end.code_unit]);
    out
  }

  pub fn at_start(&self) -> bool {
    self.position() == Position::zero()
  }

  pub fn at_end(&self) -> bool {
    self.position() == self.document.end_position()
  }
}

/// Mutable cursor guard. All editing operations restore every cursor/marker
/// invariant before returning.
pub struct CursorMut<'a> {
  pub(crate) document: &'a mut Document,
  pub(crate) id:       CursorId,
}

impl CursorMut<'_> {
  pub fn as_ref(&self) -> Cursor<'_> {
    Cursor {
      document: &*self.document,
      id:       self.id,
    }
  }

  pub fn position(&self) -> Position {
    self.as_ref().position()
  }

  pub fn anchor(&self) -> Position {
    self.as_ref().anchor()
  }

  pub fn has_selection(&self) -> bool {
    self.as_ref().has_selection()
  }

  pub fn selection(&self) -> Option<(Position, Position)> {
    self.as_ref().selection()
  }

  pub fn selected_text(&self) -> String {
    self.as_ref().selected_text()
  }

  pub fn at_start(&self) -> bool {
    self.as_ref().at_start()
  }

  pub fn at_end(&self) -> bool {
    self.as_ref().at_end()
  }

  // Motion.
  //

  pub fn set_position(&mut self, position: impl Into<Position>, extend_selection: bool) {
    let target = self.document.clamp_position(position.into());
    self.commit_motion(target, extend_selection, None);
  }

  pub fn set_anchor(&mut self, anchor: impl Into<Position>) {
    let target = self.document.clamp_position(anchor.into());
    self.document.cursors[self.id].anchor = target;
    self.document.note_cursor_moved(self.id);
  }

  pub fn clear_selection(&mut self) {
    let position = self.document.cursors[self.id].position;
    self.document.cursors[self.id].anchor = position;
    self.document.note_cursor_moved(self.id);
  }

  pub fn select_all(&mut self) {
    let end = self.document.end_position();
    let state = &mut self.document.cursors[self.id];
    state.anchor = Position::zero();
    state.position = end;
    state.vertical_column = None;
    self.document.note_cursor_moved(self.id);
  }

  pub fn move_character_left(&mut self, extend_selection: bool) {
    let pos = self.position();
    let target = if pos.code_unit > 0 {
      let text = self.document.line(pos.line);
      Position::new(pos.line, grapheme::prev_grapheme_boundary(text, pos.code_unit))
    } else if pos.line > 0 {
      Position::new(pos.line - 1, self.document.line_code_units(pos.line - 1))
    } else {
      pos
    };
    self.commit_motion(target, extend_selection, None);
  }

  pub fn move_character_right(&mut self, extend_selection: bool) {
    let pos = self.position();
    let line_len = self.document.line_code_units(pos.line);
    let target = if pos.code_unit < line_len {
      let text = self.document.line(pos.line);
      Position::new(pos.line, grapheme::next_grapheme_boundary(text, pos.code_unit))
    } else if pos.line + 1 < self.document.line_count() {
      Position::new(pos.line + 1, 0)
    } else {
      pos
    };
    self.commit_motion(target, extend_selection, None);
  }

  pub fn move_word_left(&mut self, extend_selection: bool) {
    let target = self.word_left_target();
    self.commit_motion(target, extend_selection, None);
  }

  pub fn move_word_right(&mut self, extend_selection: bool) {
    let target = self.word_right_target();
    self.commit_motion(target, extend_selection, None);
  }

  pub fn move_up(&mut self, extend_selection: bool, layout: &dyn LineLayout) {
    self.move_vertical(extend_selection, layout, true);
  }

  pub fn move_down(&mut self, extend_selection: bool, layout: &dyn LineLayout) {
    self.move_vertical(extend_selection, layout, false);
  }

  fn move_vertical(&mut self, extend_selection: bool, layout: &dyn LineLayout, up: bool) {
    let state = self.document.cursors[self.id];
    let pos = state.position;
    let column = state.vertical_column.unwrap_or_else(|| {
      layout.column_at(pos.line, self.document.line(pos.line), pos.code_unit)
    });

    let target_line = if up {
      if pos.line == 0 {
        self.commit_motion(pos, extend_selection, Some(column));
        return;
      }
      pos.line - 1
    } else {
      if pos.line + 1 >= self.document.line_count() {
        self.commit_motion(pos, extend_selection, Some(column));
        return;
      }
      pos.line + 1
    };

    let code_unit = layout.code_unit_at(target_line, self.document.line(target_line), column);
    let target = self
      .document
      .clamp_position(Position::new(target_line, code_unit));
    self.commit_motion(target, extend_selection, Some(column));
  }

  pub fn move_to_start_of_line(&mut self, extend_selection: bool) {
    let pos = self.position();
    self.commit_motion(Position::new(pos.line, 0), extend_selection, None);
  }

  pub fn move_to_end_of_line(&mut self, extend_selection: bool) {
    let pos = self.position();
    let len = self.document.line_code_units(pos.line);
    self.commit_motion(Position::new(pos.line, len), extend_selection, None);
  }

  pub fn move_to_start_of_document(&mut self, extend_selection: bool) {
    self.commit_motion(Position::zero(), extend_selection, None);
  }

  pub fn move_to_end_of_document(&mut self, extend_selection: bool) {
    let end = self.document.end_position();
    self.commit_motion(end, extend_selection, None);
  }

  // Editing.
  //

  /// Insert `text` at the cursor, replacing the selection if one is active.
  /// `\n` in the payload splits lines. Plain single-line insertions are
  /// collapsible so typing merges into one undo step.
  pub fn insert_text(&mut self, text: &str) {
    let had_selection = self.has_selection();
    if text.is_empty() && !had_selection {
      return;
    }
    self.document.prepare_modification(self.id);
    if had_selection {
      self.remove_selection_primitives();
    }
    let start = self.document.cursors[self.id].position;
    let end = self.insert_primitives(start, text);
    self.place_driver(end);
    let collapsible = !had_selection && !text.contains('\n');
    self.document.save_undo_step(self.id, collapsible, true);
  }

  /// Insert `text`, consuming as many grapheme clusters ahead on the current
  /// line as the payload's first line contains.
  pub fn overwrite_text(&mut self, text: &str) {
    let had_selection = self.has_selection();
    if text.is_empty() && !had_selection {
      return;
    }
    self.document.prepare_modification(self.id);
    if had_selection {
      self.remove_selection_primitives();
    } else {
      let pos = self.document.cursors[self.id].position;
      let first_segment = text.split('\n').next().unwrap_or("");
      let clusters = cluster_count(first_segment);
      let line_text = self.document.line(pos.line);
      let mut end = pos.code_unit;
      for _ in 0..clusters {
        let next = grapheme::next_grapheme_boundary(line_text, end);
        if next == end {
          break;
        }
        end = next;
      }
      let len = end - pos.code_unit;
      if len > 0 {
        self.document.remove_from_line(pos.line, pos.code_unit, len);
      }
    }
    let start = self.document.cursors[self.id].position;
    let end = self.insert_primitives(start, text);
    self.place_driver(end);
    let collapsible = !had_selection && !text.contains('\n');
    self.document.save_undo_step(self.id, collapsible, true);
  }

  /// Delete the grapheme cluster after the cursor, merging with the next
  /// line at a line end. With a selection, removes the selection instead.
  pub fn delete_character(&mut self) {
    if self.has_selection() {
      self.remove_selected_text();
      return;
    }
    let pos = self.position();
    let line_len = self.document.line_code_units(pos.line);
    if pos.code_unit < line_len {
      let end = grapheme::next_grapheme_boundary(self.document.line(pos.line), pos.code_unit);
      self.document.prepare_modification(self.id);
      self
        .document
        .remove_from_line(pos.line, pos.code_unit, end - pos.code_unit);
    } else if pos.line + 1 < self.document.line_count() {
      self.document.prepare_modification(self.id);
      self.document.merge_lines(pos.line);
    } else {
      return;
    }
    self.place_driver(pos);
    self.document.save_undo_step(self.id, true, true);
  }

  /// Delete the grapheme cluster before the cursor, merging with the
  /// previous line at a line start. With a selection, removes the selection
  /// instead.
  pub fn delete_previous_character(&mut self) {
    if self.has_selection() {
      self.remove_selected_text();
      return;
    }
    let pos = self.position();
    let target;
    if pos.code_unit > 0 {
      let start = grapheme::prev_grapheme_boundary(self.document.line(pos.line), pos.code_unit);
      self.document.prepare_modification(self.id);
      self
        .document
        .remove_from_line(pos.line, start, pos.code_unit - start);
      target = Position::new(pos.line, start);
    } else if pos.line > 0 {
      let previous_len = self.document.line_code_units(pos.line - 1);
      self.document.prepare_modification(self.id);
      self.document.merge_lines(pos.line - 1);
      target = Position::new(pos.line - 1, previous_len);
    } else {
      return;
    }
    self.place_driver(target);
    self.document.save_undo_step(self.id, true, true);
  }

  /// Delete from the cursor to the next word start (across a line boundary
  /// at a line end).
  pub fn delete_word(&mut self) {
    if self.has_selection() {
      self.remove_selected_text();
      return;
    }
    let pos = self.position();
    let target = self.word_right_target();
    if target == pos {
      return;
    }
    self.document.prepare_modification(self.id);
    self.document.remove_range_primitives(pos, target);
    self.place_driver(pos);
    self.document.save_undo_step(self.id, false, false);
  }

  /// Delete from the previous word start to the cursor.
  pub fn delete_previous_word(&mut self) {
    if self.has_selection() {
      self.remove_selected_text();
      return;
    }
    let pos = self.position();
    let target = self.word_left_target();
    if target == pos {
      return;
    }
    self.document.prepare_modification(self.id);
    self.document.remove_range_primitives(target, pos);
    self.place_driver(target);
    self.document.save_undo_step(self.id, false, false);
  }

  /// Remove the selected text; no-op without a selection.
  pub fn remove_selected_text(&mut self) {
    if !self.has_selection() {
      return;
    }
    self.document.prepare_modification(self.id);
    self.remove_selection_primitives();
    self.document.save_undo_step(self.id, false, false);
  }

  // Internals.
  //

  fn commit_motion(&mut self, target: Position, extend_selection: bool, vertical: Option<usize>) {
    let state = &mut self.document.cursors[self.id];
    state.position = target;
    if !extend_selection {
      state.anchor = target;
    }
    state.vertical_column = vertical;
    self.document.note_cursor_moved(self.id);
  }

  /// Position the driving cursor after an edit, collapsing its selection.
  fn place_driver(&mut self, target: Position) {
    let state = &mut self.document.cursors[self.id];
    state.position = target;
    state.anchor = target;
    state.vertical_column = None;
    self.document.events.push(DocumentEvent::CursorChanged(self.id));
  }

  fn insert_primitives(&mut self, start: Position, text: &str) -> Position {
    let mut pos = start;
    let mut first = true;
    for segment in text.split('\n') {
      if !first {
        self.document.split_line(pos.line, pos.code_unit);
        pos = Position::new(pos.line + 1, 0);
      }
      first = false;
      if !segment.is_empty() {
        self.document.insert_into_line(pos.line, pos.code_unit, segment);
        pos.code_unit += segment.len();
      }
    }
    pos
  }

  fn remove_selection_primitives(&mut self) {
    let state = self.document.cursors[self.id];
    let start = state.position.min(state.anchor);
    let end = state.position.max(state.anchor);
    if start == end {
      return;
    }
    self.document.remove_range_primitives(start, end);
    self.place_driver(start);
  }

  fn word_right_target(&self) -> Position {
    let pos = self.document.cursors[self.id].position;
    let text = self.document.line(pos.line);
    if pos.code_unit >= text.len() {
      if pos.line + 1 < self.document.line_count() {
        Position::new(pos.line + 1, 0)
      } else {
        pos
      }
    } else {
      Position::new(pos.line, next_word_boundary(text, pos.code_unit))
    }
  }

  fn word_left_target(&self) -> Position {
    let pos = self.document.cursors[self.id].position;
    if pos.code_unit == 0 {
      if pos.line > 0 {
        Position::new(pos.line - 1, self.document.line_code_units(pos.line - 1))
      } else {
        pos
      }
    } else {
      let text = self.document.line(pos.line);
      Position::new(pos.line, prev_word_boundary(text, pos.code_unit))
    }
  }
}

/// Next word start after `from`: skip the run under the cursor (unless it is
/// whitespace), then any whitespace.
fn next_word_boundary(text: &str, from: usize) -> usize {
  let mut i = from;
  let mut chars = text[from..].chars().peekable();
  if let Some(&ch) = chars.peek() {
    let category = categorize_char(ch);
    if category != CharCategory::Whitespace {
      while let Some(&ch) = chars.peek() {
        if categorize_char(ch) != category {
          break;
        }
        i += ch.len_utf8();
        chars.next();
      }
    }
  }
  while let Some(&ch) = chars.peek() {
    if !ch.is_whitespace() {
      break;
    }
    i += ch.len_utf8();
    chars.next();
  }
  i
}

/// Previous word start before `from`: skip whitespace leftwards, then the
/// run it lands on.
fn prev_word_boundary(text: &str, from: usize) -> usize {
  let mut i = from;
  let mut chars = text[..from].chars().rev().peekable();
  while let Some(&ch) = chars.peek() {
    if !ch.is_whitespace() {
      break;
    }
    i -= ch.len_utf8();
    chars.next();
  }
  if let Some(&ch) = chars.peek() {
    let category = categorize_char(ch);
    while let Some(&ch) = chars.peek() {
      if categorize_char(ch) != category {
        break;
      }
      i -= ch.len_utf8();
      chars.next();
    }
  }
  i
}

fn cluster_count(text: &str) -> usize {
  let mut count = 0;
  let mut i = 0;
  loop {
    let next = grapheme::next_grapheme_boundary(text, i);
    if next == i {
      return count;
    }
    count += 1;
    i = next;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::layout::TerminalLayout;

  fn doc_with(text: &str) -> (Document, CursorId) {
    let mut doc = Document::new();
    doc.load(text, None);
    let cursor = doc.add_cursor();
    (doc, cursor)
  }

  #[test]
  fn typing_and_selection_basics() {
    let (mut doc, id) = doc_with("hello world\n");
    doc.cursor_mut(id).set_position((0, 5), false);
    doc.cursor_mut(id).insert_text(",");
    assert_eq!(doc.line(0), "hello, world");
    assert_eq!(doc.cursor(id).position(), Position::new(0, 6));

    doc.cursor_mut(id).set_position((0, 7), false);
    doc.cursor_mut(id).set_position((0, 12), true);
    assert!(doc.cursor(id).has_selection());
    assert_eq!(doc.cursor(id).selected_text(), "world");

    doc.cursor_mut(id).insert_text("rust");
    assert_eq!(doc.line(0), "hello, rust");
    assert!(!doc.cursor(id).has_selection());
  }

  #[test]
  fn multi_line_insert_splits_lines() {
    let (mut doc, id) = doc_with("ab\n");
    doc.cursor_mut(id).set_position((0, 1), false);
    doc.cursor_mut(id).insert_text("1\n2\n3");
    assert_eq!(doc.serialize(), "a1\n2\n3b\n");
    assert_eq!(doc.cursor(id).position(), Position::new(2, 1));
  }

  #[test]
  fn multi_line_selection_text_and_removal() {
    let (mut doc, id) = doc_with("one\ntwo\nthree\n");
    doc.cursor_mut(id).set_position((0, 2), false);
    doc.cursor_mut(id).set_position((2, 3), true);
    assert_eq!(doc.cursor(id).selected_text(), "e\ntwo\nthr");

    doc.cursor_mut(id).remove_selected_text();
    assert_eq!(doc.serialize(), "onee\n");
    assert_eq!(doc.cursor(id).position(), Position::new(0, 2));
  }

  #[test]
  fn delete_character_joins_lines_at_line_end() {
    let (mut doc, id) = doc_with("ab\ncd\n");
    doc.cursor_mut(id).set_position((0, 2), false);
    doc.cursor_mut(id).delete_character();
    assert_eq!(doc.serialize(), "abcd\n");
    assert_eq!(doc.cursor(id).position(), Position::new(0, 2));
  }

  #[test]
  fn delete_previous_character_joins_lines_at_line_start() {
    let (mut doc, id) = doc_with("ab\ncd\n");
    doc.cursor_mut(id).set_position((1, 0), false);
    doc.cursor_mut(id).delete_previous_character();
    assert_eq!(doc.serialize(), "abcd\n");
    assert_eq!(doc.cursor(id).position(), Position::new(0, 2));
  }

  #[test]
  fn grapheme_wise_deletion() {
    // "é" as e + combining accent: one backspace removes the whole cluster.
    let (mut doc, id) = doc_with("e\u{301}x\n");
    doc.cursor_mut(id).set_position((0, 3), false);
    doc.cursor_mut(id).delete_previous_character();
    assert_eq!(doc.line(0), "e\u{301}");
    doc.cursor_mut(id).delete_previous_character();
    assert_eq!(doc.line(0), "");
  }

  #[test]
  fn word_motion_and_deletion() {
    let (mut doc, id) = doc_with("foo bar() baz\n");
    doc.cursor_mut(id).move_word_right(false);
    assert_eq!(doc.cursor(id).position(), Position::new(0, 4));
    doc.cursor_mut(id).move_word_right(false);
    assert_eq!(doc.cursor(id).position(), Position::new(0, 7));

    doc.cursor_mut(id).move_to_end_of_line(false);
    doc.cursor_mut(id).move_word_left(false);
    assert_eq!(doc.cursor(id).position(), Position::new(0, 10));

    // Deletes the punctuation run and the space before the cursor.
    doc.cursor_mut(id).delete_previous_word();
    assert_eq!(doc.line(0), "foo barbaz");

    doc.cursor_mut(id).set_position((0, 3), false);
    doc.cursor_mut(id).delete_previous_word();
    assert_eq!(doc.line(0), " barbaz");
  }

  #[test]
  fn delete_word_forward() {
    let (mut doc, id) = doc_with("foo bar\n");
    doc.cursor_mut(id).delete_word();
    assert_eq!(doc.line(0), "bar");
    // At the end of a line the next word starts on the following line.
    let (mut doc, id) = doc_with("ab\ncd\n");
    doc.cursor_mut(id).move_to_end_of_line(false);
    doc.cursor_mut(id).delete_word();
    assert_eq!(doc.serialize(), "abcd\n");
  }

  #[test]
  fn overwrite_replaces_clusters() {
    let (mut doc, id) = doc_with("abcdef\n");
    doc.cursor_mut(id).set_position((0, 1), false);
    doc.cursor_mut(id).overwrite_text("XY");
    assert_eq!(doc.line(0), "aXYdef");
    assert_eq!(doc.cursor(id).position(), Position::new(0, 3));

    // Overwriting never eats past the end of the line.
    doc.cursor_mut(id).set_position((0, 5), false);
    doc.cursor_mut(id).overwrite_text("ZZZ");
    assert_eq!(doc.line(0), "aXYdeZZZ");
  }

  #[test]
  fn vertical_motion_keeps_visual_column() {
    let (mut doc, id) = doc_with("long line here\nab\nlonger again\n");
    let layout = TerminalLayout;
    doc.cursor_mut(id).set_position((0, 9), false);
    doc.cursor_mut(id).move_down(false, &layout);
    assert_eq!(doc.cursor(id).position(), Position::new(1, 2));
    doc.cursor_mut(id).move_down(false, &layout);
    // The preferred column survives the short line.
    assert_eq!(doc.cursor(id).position(), Position::new(2, 9));
    doc.cursor_mut(id).move_up(false, &layout);
    doc.cursor_mut(id).move_up(false, &layout);
    assert_eq!(doc.cursor(id).position(), Position::new(0, 9));
  }

  #[test]
  fn document_edges() {
    let (mut doc, id) = doc_with("ab\ncd");
    assert!(doc.cursor(id).at_start());
    doc.cursor_mut(id).move_to_end_of_document(false);
    assert!(doc.cursor(id).at_end());
    assert_eq!(doc.cursor(id).position(), Position::new(1, 2));
    doc.cursor_mut(id).select_all();
    assert_eq!(doc.cursor(id).selected_text(), "ab\ncd");
    doc.cursor_mut(id).clear_selection();
    assert!(!doc.cursor(id).has_selection());
  }

  #[test]
  fn moving_at_boundaries_is_a_no_op() {
    let (mut doc, id) = doc_with("ab\n");
    doc.cursor_mut(id).move_character_left(false);
    assert!(doc.cursor(id).at_start());
    doc.cursor_mut(id).move_word_left(false);
    assert!(doc.cursor(id).at_start());
    doc.cursor_mut(id).move_to_end_of_document(false);
    let end = doc.cursor(id).position();
    doc.cursor_mut(id).move_character_right(false);
    assert_eq!(doc.cursor(id).position(), end);
  }
}

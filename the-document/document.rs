//! Document core: line store, cursor/marker registries, mutation protocol
//! and undo/redo drive.
//!
//! # Design
//!
//! - The document owns everything: lines, cursor state, marker state and the
//!   undo history. Cursors and markers are addressed through slot-map handles
//!   ([`CursorId`], [`MarkerId`]), so a cursor cannot outlive its document
//!   and teardown order cannot corrupt state.
//! - Every structural edit goes through one of the mutation primitives below.
//!   A primitive mutates the line store, repositions every registered cursor
//!   and marker, and records a forward/inverse [`Adjustment`] pair into the
//!   currently open undo step. Calling a primitive without an open step is a
//!   contract violation and panics.
//! - Reads do not clamp: indexing a line past the end panics so collaborator
//!   bugs surface immediately. Write paths, by contrast, defensively re-clamp
//!   derived cursor/marker positions, because the engine owns their validity.
//! - Change notifications are coalesced into an event queue the owner drains
//!   once per event-loop iteration ([`Document::drain_events`]).

use std::{
  io,
  ops::{
    Deref,
    DerefMut,
  },
  sync::{
    Arc,
    atomic::{
      AtomicU64,
      Ordering,
    },
  },
};

use slotmap::HopSlotMap;
use thiserror::Error;

use crate::{
  adjustment::{
    Adjustment,
    AdjustmentList,
    invert_mapping,
  },
  cursor::{
    Cursor,
    CursorId,
    CursorMut,
    CursorState,
  },
  event::{
    DocumentEvent,
    EventQueue,
  },
  history::{
    RestoreStep,
    UndoStack,
    UndoStep,
  },
  line::{
    Line,
    LineAnnotation,
  },
  marker::{
    MarkerId,
    MarkerState,
  },
  position::Position,
  search::{
    self,
    FindAsyncHandle,
    FindFlags,
    FindMatch,
    SearchQuery,
  },
  snapshot::{
    Snapshot,
    SnapshotLine,
  },
};

pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Error)]
pub enum DocumentError {
  #[error("document I/O failed: {0}")]
  Io(#[from] io::Error),
}

/// Step under construction between `prepare_modification` and
/// `save_undo_step`.
#[derive(Debug)]
struct PendingStep {
  start_cursor: Position,
  redo:         AdjustmentList,
  undo:         AdjustmentList,
  mutated:      bool,
}

pub struct Document {
  pub(crate) lines:      Vec<Line>,
  newline_missing:       bool,
  crlf_mode:             bool,
  revision:              Arc<AtomicU64>,
  line_revision_counter: u64,
  pub(crate) cursors:    HopSlotMap<CursorId, CursorState>,
  pub(crate) markers:    HopSlotMap<MarkerId, MarkerState>,
  history:               UndoStack,
  pending:               Option<PendingStep>,
  group_depth:           u32,
  pub(crate) events:     EventQueue,
  undo_available:        bool,
  redo_available:        bool,
  modified:              bool,
}

impl Default for Document {
  fn default() -> Self {
    Self::new()
  }
}

impl Document {
  pub fn new() -> Self {
    let lines = vec![Line::new(String::new(), 1)];
    let initial = UndoStep {
      lines:            lines.clone(),
      newline_missing:  true,
      start_cursor:     Position::zero(),
      end_cursor:       Position::zero(),
      redo_adjustments: AdjustmentList::new(),
      undo_adjustments: AdjustmentList::new(),
      collapsible:      false,
    };
    Self {
      lines,
      newline_missing: true,
      crlf_mode: false,
      revision: Arc::new(AtomicU64::new(0)),
      line_revision_counter: 1,
      cursors: HopSlotMap::with_key(),
      markers: HopSlotMap::with_key(),
      history: UndoStack::new(initial),
      pending: None,
      group_depth: 0,
      events: EventQueue::default(),
      undo_available: false,
      redo_available: false,
      modified: false,
    }
  }

  // Loading and serialization.
  //

  /// Replace the whole content from an in-memory string.
  ///
  /// Splits on line feed and detects a uniformly CRLF document: at least one
  /// terminated segment exists and every terminated segment ends with a
  /// carriage return (a final unterminated segment is exempt). On detection
  /// the structural `\r` is stripped from each terminated line and
  /// [`Document::crlf_mode`] is set, so `serialize` round-trips every input
  /// byte for byte.
  ///
  /// All registered cursors move to `initial_cursor` (clamped); markers are
  /// clamped into the new line range. Undo history restarts with a single
  /// fresh step.
  pub fn load(&mut self, text: &str, initial_cursor: Option<Position>) {
    assert!(
      self.pending.is_none() && self.group_depth == 0,
      "load during an open modification"
    );

    let newline_missing = !text.ends_with('\n');
    let mut segments: Vec<&str> = text.split('\n').collect();
    if !newline_missing {
      segments.pop();
    }

    let terminated = if newline_missing {
      segments.len() - 1
    } else {
      segments.len()
    };
    let crlf = terminated > 0 && segments[..terminated].iter().all(|s| s.ends_with('\r'));

    let base_revision = self.line_revision_counter;
    self.lines = segments
      .iter()
      .enumerate()
      .map(|(i, segment)| {
        let text = if crlf && i < terminated {
          &segment[..segment.len() - 1]
        } else {
          *segment
        };
        Line::new(text.to_string(), base_revision + 1 + i as u64)
      })
      .collect();
    self.line_revision_counter += self.lines.len() as u64;
    self.newline_missing = newline_missing;

    if self.crlf_mode != crlf {
      self.crlf_mode = crlf;
      self.events.push(DocumentEvent::CrlfModeChanged(crlf));
    }

    let start = self.clamp_position(initial_cursor.unwrap_or(Position::zero()));
    let cursor_ids: Vec<CursorId> = self.cursors.keys().collect();
    for id in cursor_ids {
      let state = &mut self.cursors[id];
      state.position = start;
      state.anchor = start;
      state.vertical_column = None;
      self.events.push(DocumentEvent::CursorChanged(id));
    }
    let last = self.lines.len() - 1;
    let marker_ids: Vec<MarkerId> = self.markers.keys().collect();
    for id in marker_ids {
      let state = &mut self.markers[id];
      if state.line > last {
        state.line = last;
      }
      self.events.push(DocumentEvent::MarkerChanged(id));
    }

    self.history.reset(UndoStep {
      lines:            self.lines.clone(),
      newline_missing:  self.newline_missing,
      start_cursor:     start,
      end_cursor:       start,
      redo_adjustments: AdjustmentList::new(),
      undo_adjustments: AdjustmentList::new(),
      collapsible:      false,
    });
    self.touch();
    self.refresh_status_events();
  }

  /// Serialize honoring `crlf_mode` and the missing-trailing-newline flag.
  pub fn serialize(&self) -> String {
    let terminator = if self.crlf_mode { "\r\n" } else { "\n" };
    let mut out = String::new();
    for (i, line) in self.lines.iter().enumerate() {
      if i > 0 {
        out.push_str(terminator);
      }
      out.push_str(line.text());
    }
    if !self.newline_missing {
      out.push_str(terminator);
    }
    out
  }

  /// Fill from a reader of already-decoded text. On failure the document is
  /// left untouched.
  pub fn read_from<R: io::Read>(
    &mut self,
    mut reader: R,
    initial_cursor: Option<Position>,
  ) -> Result<()> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    self.load(&text, initial_cursor);
    Ok(())
  }

  /// Write the serialized document to `writer`.
  pub fn write_to<W: io::Write>(&self, mut writer: W) -> Result<()> {
    writer.write_all(self.serialize().as_bytes())?;
    writer.flush()?;
    Ok(())
  }

  /// Back to the initial state: one empty line, fresh history.
  pub fn reset(&mut self) {
    self.load("", None);
  }

  // Line store accessors. Reads are not clamped: a bad index is a
  // collaborator bug and panics.
  //

  pub fn line_count(&self) -> usize {
    self.lines.len()
  }

  pub fn line(&self, line: usize) -> &str {
    self.lines[line].text()
  }

  /// Length of `line` in code units (bytes).
  pub fn line_code_units(&self, line: usize) -> usize {
    self.lines[line].code_units()
  }

  pub fn line_revision(&self, line: usize) -> u64 {
    self.lines[line].revision()
  }

  pub fn line_annotation(&self, line: usize) -> Option<&LineAnnotation> {
    self.lines[line].annotation()
  }

  /// Annotations are metadata: setting one does not bump the line revision
  /// and records nothing in undo history.
  pub fn set_line_annotation(&mut self, line: usize, annotation: Option<LineAnnotation>) {
    self.lines[line].set_annotation(annotation);
  }

  pub fn crlf_mode(&self) -> bool {
    self.crlf_mode
  }

  pub fn set_crlf_mode(&mut self, crlf_mode: bool) {
    if self.crlf_mode != crlf_mode {
      self.crlf_mode = crlf_mode;
      self.events.push(DocumentEvent::CrlfModeChanged(crlf_mode));
    }
  }

  pub fn newline_after_last_line_missing(&self) -> bool {
    self.newline_missing
  }

  pub fn set_newline_after_last_line_missing(&mut self, missing: bool) {
    if self.newline_missing != missing {
      self.newline_missing = missing;
      self.touch();
    }
  }

  pub fn revision(&self) -> u64 {
    self.revision.load(Ordering::SeqCst)
  }

  /// Immutable copy of the line contents for cross-thread reads.
  pub fn snapshot(&self) -> Snapshot {
    let lines = self
      .lines
      .iter()
      .map(|line| SnapshotLine::new(line.text().to_string(), line.revision()))
      .collect();
    Snapshot::new(lines, self.revision(), Arc::clone(&self.revision))
  }

  pub(crate) fn end_position(&self) -> Position {
    let line = self.lines.len() - 1;
    Position::new(line, self.lines[line].code_units())
  }

  // Cursor and marker registries.
  //

  pub fn add_cursor(&mut self) -> CursorId {
    self.add_cursor_at(Position::zero())
  }

  pub fn add_cursor_at(&mut self, position: Position) -> CursorId {
    let position = self.clamp_position(position);
    self.cursors.insert(CursorState {
      position,
      anchor: position,
      vertical_column: None,
    })
  }

  pub fn remove_cursor(&mut self, cursor: CursorId) {
    self
      .cursors
      .remove(cursor)
      .expect("removing a cursor that is not registered");
  }

  pub fn cursor(&self, cursor: CursorId) -> Cursor<'_> {
    assert!(
      self.cursors.contains_key(cursor),
      "unknown cursor handle"
    );
    Cursor {
      document: self,
      id: cursor,
    }
  }

  pub fn cursor_mut(&mut self, cursor: CursorId) -> CursorMut<'_> {
    assert!(
      self.cursors.contains_key(cursor),
      "unknown cursor handle"
    );
    CursorMut {
      document: self,
      id: cursor,
    }
  }

  pub fn add_marker(&mut self, line: usize) -> MarkerId {
    let line = line.min(self.lines.len() - 1);
    self.markers.insert(MarkerState { line })
  }

  pub fn remove_marker(&mut self, marker: MarkerId) {
    self
      .markers
      .remove(marker)
      .expect("removing a marker that is not registered");
  }

  pub fn marker_line(&self, marker: MarkerId) -> usize {
    self.markers[marker].line
  }

  pub fn set_marker_line(&mut self, marker: MarkerId, line: usize) {
    let line = line.min(self.lines.len() - 1);
    let state = &mut self.markers[marker];
    if state.line != line {
      state.line = line;
      self.events.push(DocumentEvent::MarkerChanged(marker));
    }
  }

  // Undo/redo.
  //

  pub fn is_modified(&self) -> bool {
    self.history.is_modified()
  }

  pub fn mark_undo_state_as_saved(&mut self) {
    self.history.mark_saved();
    self.refresh_status_events();
  }

  pub fn is_undo_available(&self) -> bool {
    self.history.is_undo_available()
  }

  pub fn is_redo_available(&self) -> bool {
    self.history.is_redo_available()
  }

  pub fn undo(&mut self, cursor: CursorId) -> bool {
    assert!(self.pending.is_none(), "undo during an open modification");
    let Some(restore) = self.history.undo() else {
      return false;
    };
    self.apply_restore(cursor, restore);
    true
  }

  pub fn redo(&mut self, cursor: CursorId) -> bool {
    assert!(self.pending.is_none(), "redo during an open modification");
    let Some(restore) = self.history.redo() else {
      return false;
    };
    self.apply_restore(cursor, restore);
    true
  }

  fn apply_restore(&mut self, cursor: CursorId, restore: RestoreStep) {
    self.lines = restore.lines;
    self.newline_missing = restore.newline_missing;

    let target = self.clamp_position(restore.cursor);
    {
      let state = &mut self.cursors[cursor];
      state.position = target;
      state.anchor = target;
      state.vertical_column = None;
    }
    self.events.push(DocumentEvent::CursorChanged(cursor));

    for adjustment in &restore.adjustments {
      self.adjust_registered_except(adjustment, Some(cursor));
    }
    // The engine owns derived-position validity on every write path.
    self.clamp_all_registered();

    self.touch();
    self.refresh_status_events();
  }

  /// Start a grouped edit: every mutation until the returned guard closes is
  /// merged into exactly one undo step. Groups nest; only the outermost
  /// close finalizes the step. Closing the outermost group without any
  /// recorded mutation is a contract violation.
  pub fn start_undo_group(&mut self, cursor: CursorId) -> UndoGroup<'_> {
    if self.group_depth == 0 {
      assert!(
        self.pending.is_none(),
        "undo group opened while a step is already open"
      );
      self.prepare_modification(cursor);
    }
    self.group_depth += 1;
    UndoGroup {
      document: self,
      cursor,
      closed: false,
    }
  }

  fn end_undo_group(&mut self, cursor: CursorId) {
    assert!(self.group_depth > 0, "closing an undo group that was never opened");
    self.group_depth -= 1;
    if self.group_depth > 0 {
      return;
    }
    assert!(
      self.pending.as_ref().is_some_and(|pending| pending.mutated),
      "undo group closed with an open step and no recorded mutation"
    );
    self.finish_step(cursor, false, false);
  }

  pub(crate) fn prepare_modification(&mut self, cursor: CursorId) {
    if self.pending.is_some() {
      assert!(
        self.group_depth > 0,
        "prepare_modification while a step is already open"
      );
      return;
    }
    self.pending = Some(PendingStep {
      start_cursor: self.cursors[cursor].position,
      redo:         AdjustmentList::new(),
      undo:         AdjustmentList::new(),
      mutated:      false,
    });
  }

  pub(crate) fn save_undo_step(&mut self, cursor: CursorId, collapsible: bool, collapse: bool) {
    if self.group_depth > 0 {
      return;
    }
    self.finish_step(cursor, collapsible, collapse);
  }

  fn finish_step(&mut self, cursor: CursorId, collapsible: bool, collapse: bool) {
    let pending = self
      .pending
      .take()
      .expect("undo step closed without prepare_modification");
    assert!(pending.mutated, "undo step closed without any recorded mutation");

    let step = UndoStep {
      lines:            self.lines.clone(),
      newline_missing:  self.newline_missing,
      start_cursor:     pending.start_cursor,
      end_cursor:       self.cursors[cursor].position,
      redo_adjustments: pending.redo,
      undo_adjustments: pending.undo,
      collapsible,
    };
    self.history.push(step, collapse);
    self.refresh_status_events();
  }

  /// Pure cursor motion: breaks undo collapsing and queues a notification.
  pub(crate) fn note_cursor_moved(&mut self, cursor: CursorId) {
    self.history.break_collapsing();
    self.events.push(DocumentEvent::CursorChanged(cursor));
  }

  // Mutation primitives. Each one mutates the store, repositions every
  // registered cursor/marker, records the forward/inverse adjustment pair
  // and bumps the shared revision.
  //

  pub(crate) fn insert_into_line(&mut self, line: usize, column: usize, text: &str) {
    if text.is_empty() {
      return;
    }
    let revision = self.bump_line_revision();
    let entry = &mut self.lines[line];
    entry.text.insert_str(column, text);
    entry.revision = revision;

    let len = text.len();
    self.adjust_registered(&Adjustment::InsertColumns { line, column, len });
    self.record(
      Adjustment::InsertColumns { line, column, len },
      Adjustment::CollapseColumns {
        line,
        start: column,
        len,
      },
    );
    self.touch();
  }

  pub(crate) fn remove_from_line(&mut self, line: usize, start: usize, len: usize) {
    if len == 0 {
      return;
    }
    let revision = self.bump_line_revision();
    let entry = &mut self.lines[line];
    entry.text.replace_range(start..start + len, "");
    entry.revision = revision;

    self.adjust_registered(&Adjustment::CollapseColumns { line, start, len });
    self.record(
      Adjustment::CollapseColumns { line, start, len },
      Adjustment::ShiftColumns { line, start, len },
    );
    self.touch();
  }

  pub(crate) fn split_line(&mut self, line: usize, column: usize) {
    let revision = self.bump_line_revision();
    let tail = self.lines[line].text.split_off(column);
    self.lines[line].revision = revision;
    let tail_revision = self.bump_line_revision();
    self.lines.insert(line + 1, Line::new(tail, tail_revision));

    self.adjust_registered(&Adjustment::SplitLine { line, column });
    self.record(
      Adjustment::SplitLine { line, column },
      Adjustment::MergeLines { line, column },
    );
    self.touch();
  }

  pub(crate) fn merge_lines(&mut self, line: usize) {
    let removed = self.lines.remove(line + 1);
    let column = self.lines[line].code_units();
    let revision = self.bump_line_revision();
    self.lines[line].text.push_str(removed.text());
    self.lines[line].revision = revision;

    self.adjust_registered(&Adjustment::MergeLines { line, column });
    self.record(
      Adjustment::MergeLines { line, column },
      Adjustment::SplitLine { line, column },
    );
    self.touch();
  }

  pub(crate) fn remove_lines(&mut self, start: usize, len: usize) {
    if len == 0 {
      return;
    }
    self.lines.drain(start..start + len);
    if self.lines.is_empty() {
      let revision = self.bump_line_revision();
      self.lines.push(Line::new(String::new(), revision));
    }

    self.adjust_registered(&Adjustment::CollapseLines { start, len });
    self.record(
      Adjustment::CollapseLines { start, len },
      Adjustment::OpenLines { start, len },
    );
    self.touch();
  }

  pub(crate) fn permute_lines(&mut self, start: usize, mapping: Vec<usize>) {
    let count = mapping.len();
    let inverse = invert_mapping(&mapping);

    let moved: Vec<Line> = self
      .lines
      .splice(start..start + count, std::iter::empty())
      .collect();
    let mut slots: Vec<Option<Line>> = moved.into_iter().map(Some).collect();
    let reordered: Vec<Line> = inverse
      .iter()
      .map(|&old| slots[old].take().expect("mapping is a permutation"))
      .collect();
    self.lines.splice(start..start, reordered);

    let forward = Adjustment::PermuteLines {
      start,
      mapping: mapping.clone(),
    };
    self.adjust_registered(&forward);
    self.record(forward, Adjustment::PermuteLines {
      start,
      mapping: inverse,
    });
    self.touch();
  }

  /// Remove the text between two positions, joining partial first/last lines.
  pub(crate) fn remove_range_primitives(&mut self, start: Position, end: Position) {
    debug_assert!(start <= end);
    if start == end {
      return;
    }
    if start.line == end.line {
      self.remove_from_line(start.line, start.code_unit, end.code_unit - start.code_unit);
      return;
    }
    let first_len = self.lines[start.line].code_units();
    if start.code_unit < first_len {
      self.remove_from_line(start.line, start.code_unit, first_len - start.code_unit);
    }
    if end.code_unit > 0 {
      self.remove_from_line(end.line, 0, end.code_unit);
    }
    if end.line - start.line > 1 {
      self.remove_lines(start.line + 1, end.line - start.line - 1);
    }
    self.merge_lines(start.line);
  }

  // Row reordering operations.
  //

  /// Stable-sort rows `first .. last` by their text. Cursors and markers in
  /// the range follow their row; everything outside is untouched. One undo
  /// step.
  pub fn sort_lines(&mut self, first: usize, last: usize, cursor: CursorId) {
    assert!(first <= last && last <= self.lines.len(), "sort range out of bounds");
    if last - first < 2 {
      return;
    }

    let count = last - first;
    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by(|&a, &b| self.lines[first + a].text().cmp(self.lines[first + b].text()));
    if order.iter().enumerate().all(|(new, &old)| new == old) {
      return;
    }
    // order[new] = old; the permutation maps old rows to new rows.
    let mapping = invert_mapping(&order);

    self.prepare_modification(cursor);
    self.permute_lines(first, mapping);
    self.save_undo_step(cursor, false, false);
  }

  /// Move the row at `from` so it ends up at `to`. One undo step.
  pub fn move_line(&mut self, from: usize, to: usize, cursor: CursorId) {
    assert!(
      from < self.lines.len() && to < self.lines.len(),
      "move_line out of bounds"
    );
    if from == to {
      return;
    }

    let start = from.min(to);
    let count = from.abs_diff(to) + 1;
    let mut mapping = vec![0; count];
    if from < to {
      mapping[0] = count - 1;
      for (i, slot) in mapping.iter_mut().enumerate().skip(1) {
        *slot = i - 1;
      }
    } else {
      mapping[count - 1] = 0;
      for (i, slot) in mapping.iter_mut().enumerate().take(count - 1) {
        *slot = i + 1;
      }
    }

    self.prepare_modification(cursor);
    self.permute_lines(start, mapping);
    self.save_undo_step(cursor, false, false);
  }

  // Search.
  //

  /// Synchronous search over the live buffer, scanning from the cursor's
  /// active edge. Returns `None` for an empty needle, an invalid pattern, or
  /// no match.
  pub fn find(&self, query: &SearchQuery, flags: FindFlags, cursor: CursorId) -> Option<FindMatch> {
    let origin = self.search_origin(cursor, flags);
    let lines: Vec<&str> = self.lines.iter().map(|line| line.text()).collect();
    search::find_in_lines(&lines, origin, query, flags, None)
  }

  /// Asynchronous search against a snapshot taken now, on a worker pool.
  /// The returned handle can be cancelled, polled, or waited on.
  pub fn find_async(
    &self,
    query: SearchQuery,
    flags: FindFlags,
    cursor: CursorId,
  ) -> FindAsyncHandle {
    let origin = self.search_origin(cursor, flags);
    search::find_async(self.snapshot(), origin, query, flags)
  }

  fn search_origin(&self, cursor: CursorId, flags: FindFlags) -> Position {
    let state = self.cursors[cursor];
    if flags.contains(FindFlags::BACKWARD) {
      state.position.min(state.anchor)
    } else {
      state.position.max(state.anchor)
    }
  }

  // Events.
  //

  /// Drain the coalesced notifications accumulated since the last call, in
  /// first-occurrence order.
  pub fn drain_events(&mut self) -> Vec<DocumentEvent> {
    self.events.drain()
  }

  pub fn has_pending_events(&self) -> bool {
    !self.events.is_empty()
  }

  // Internals.
  //

  fn bump_line_revision(&mut self) -> u64 {
    self.line_revision_counter += 1;
    self.line_revision_counter
  }

  fn record(&mut self, forward: Adjustment, inverse: Adjustment) {
    let pending = self
      .pending
      .as_mut()
      .expect("structural edit outside of prepare_modification");
    pending.redo.push(forward);
    pending.undo.insert(0, inverse);
    pending.mutated = true;
  }

  fn touch(&mut self) {
    self.revision.fetch_add(1, Ordering::SeqCst);
    self.events.push(DocumentEvent::ContentChanged);
  }

  fn refresh_status_events(&mut self) {
    let undo = self.history.is_undo_available();
    if undo != self.undo_available {
      self.undo_available = undo;
      self.events.push(DocumentEvent::UndoAvailable(undo));
    }
    let redo = self.history.is_redo_available();
    if redo != self.redo_available {
      self.redo_available = redo;
      self.events.push(DocumentEvent::RedoAvailable(redo));
    }
    let modified = self.history.is_modified();
    if modified != self.modified {
      self.modified = modified;
      self.events.push(DocumentEvent::ModificationChanged(modified));
    }
  }

  fn adjust_registered(&mut self, adjustment: &Adjustment) {
    self.adjust_registered_except(adjustment, None);
  }

  fn adjust_registered_except(&mut self, adjustment: &Adjustment, skip: Option<CursorId>) {
    for (id, state) in self.cursors.iter_mut() {
      if Some(id) == skip {
        continue;
      }
      let before = (state.position, state.anchor);
      adjustment.apply_to_cursor(&mut state.position, &mut state.anchor);
      if (state.position, state.anchor) != before {
        self.events.push(DocumentEvent::CursorChanged(id));
      }
    }
    for (id, state) in self.markers.iter_mut() {
      let before = state.line;
      adjustment.apply_to_marker(&mut state.line);
      if state.line != before {
        self.events.push(DocumentEvent::MarkerChanged(id));
      }
    }
  }

  pub(crate) fn clamp_position(&self, position: Position) -> Position {
    if position.line >= self.lines.len() {
      return self.end_position();
    }
    let text = self.lines[position.line].text();
    let code_unit =
      the_text::grapheme::floor_grapheme_boundary(text, position.code_unit.min(text.len()));
    Position::new(position.line, code_unit)
  }

  fn clamp_all_registered(&mut self) {
    let cursor_ids: Vec<CursorId> = self.cursors.keys().collect();
    for id in cursor_ids {
      let state = self.cursors[id];
      let position = self.clamp_position(state.position);
      let anchor = self.clamp_position(state.anchor);
      if (position, anchor) != (state.position, state.anchor) {
        let entry = &mut self.cursors[id];
        entry.position = position;
        entry.anchor = anchor;
        self.events.push(DocumentEvent::CursorChanged(id));
      }
    }

    let last = self.lines.len() - 1;
    for (id, state) in self.markers.iter_mut() {
      if state.line > last {
        state.line = last;
        self.events.push(DocumentEvent::MarkerChanged(id));
      }
    }
  }
}

impl std::fmt::Debug for Document {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Document")
      .field("lines", &self.lines.len())
      .field("revision", &self.revision())
      .field("cursors", &self.cursors.len())
      .field("markers", &self.markers.len())
      .field("modified", &self.is_modified())
      .finish()
  }
}

/// RAII guard for a grouped edit, from [`Document::start_undo_group`].
///
/// Derefs to the document so edits run through the guard; dropping (or
/// calling [`UndoGroup::close`]) finalizes the group.
pub struct UndoGroup<'a> {
  document: &'a mut Document,
  cursor:   CursorId,
  closed:   bool,
}

impl UndoGroup<'_> {
  pub fn close(mut self) {
    self.finish();
  }

  fn finish(&mut self) {
    if !self.closed {
      self.closed = true;
      self.document.end_undo_group(self.cursor);
    }
  }
}

impl Drop for UndoGroup<'_> {
  fn drop(&mut self) {
    self.finish();
  }
}

impl Deref for UndoGroup<'_> {
  type Target = Document;

  fn deref(&self) -> &Document {
    self.document
  }
}

impl DerefMut for UndoGroup<'_> {
  fn deref_mut(&mut self) -> &mut Document {
    self.document
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn starts_with_one_empty_line() {
    let doc = Document::new();
    assert_eq!(doc.line_count(), 1);
    assert_eq!(doc.line(0), "");
    assert!(doc.newline_after_last_line_missing());
    assert!(!doc.crlf_mode());
    assert!(!doc.is_modified());
  }

  #[test]
  fn load_round_trips() {
    let cases = [
      "",
      "single line",
      "single line\n",
      "a\nb\nc\n",
      "a\r\nb\r\n",
      "a\r\nb",
      "mixed\r\nterminators\n",
      "trailing cr\r",
      "interior\rcr\r\n",
    ];
    let mut doc = Document::new();
    for case in cases {
      doc.load(case, None);
      assert_eq!(doc.serialize(), case, "round trip of {case:?}");
    }
  }

  #[test]
  fn load_detects_uniform_crlf() {
    let mut doc = Document::new();
    doc.load("a\r\nb\r\n", None);
    assert!(doc.crlf_mode());
    assert_eq!(doc.line(0), "a");
    assert_eq!(doc.line(1), "b");

    doc.load("a\r\nb\n", None);
    assert!(!doc.crlf_mode());
    assert_eq!(doc.line(0), "a\r");
  }

  #[test]
  fn load_clamps_initial_cursor() {
    let mut doc = Document::new();
    let cursor = doc.add_cursor();
    doc.load("ab\ncd", Some(Position::new(9, 9)));
    assert_eq!(doc.cursor(cursor).position(), Position::new(1, 2));
  }

  #[test]
  fn serialize_respects_crlf_mode_switch() {
    let mut doc = Document::new();
    doc.load("a\nb\n", None);
    doc.set_crlf_mode(true);
    assert_eq!(doc.serialize(), "a\r\nb\r\n");
  }

  #[test]
  fn annotations_do_not_bump_revision() {
    let mut doc = Document::new();
    doc.load("hello\n", None);
    let before = doc.line_revision(0);
    doc.set_line_annotation(0, Some(Arc::new(42usize)));
    assert_eq!(doc.line_revision(0), before);
    let annotation = doc.line_annotation(0).expect("annotation present");
    assert_eq!(annotation.downcast_ref::<usize>(), Some(&42));
  }

  #[test]
  fn sort_lines_remaps_range_only() {
    let mut doc = Document::new();
    doc.load("h\ni\nc\na\nb\nf\ng\nd\ne\n", None);
    let cursor = doc.add_cursor();
    let inside = doc.add_marker(3); // "a"
    let outside = doc.add_marker(6); // "g"
    let inside_cursor = doc.add_cursor_at(Position::new(2, 1)); // on "c"

    doc.sort_lines(2, 5, cursor);

    assert_eq!(doc.serialize(), "h\ni\na\nb\nc\nf\ng\nd\ne\n");
    // "a" moved from row 3 to row 2; "c" moved from row 2 to row 4.
    assert_eq!(doc.marker_line(inside), 2);
    assert_eq!(doc.marker_line(outside), 6);
    assert_eq!(doc.cursor(inside_cursor).position(), Position::new(4, 1));

    assert!(doc.undo(cursor));
    assert_eq!(doc.serialize(), "h\ni\nc\na\nb\nf\ng\nd\ne\n");
    assert_eq!(doc.marker_line(inside), 3);
    assert_eq!(doc.marker_line(outside), 6);
    assert_eq!(doc.cursor(inside_cursor).position(), Position::new(2, 1));
  }

  #[test]
  fn move_line_down_and_up() {
    let mut doc = Document::new();
    doc.load("a\nb\nc\nd\n", None);
    let cursor = doc.add_cursor();
    let marker = doc.add_marker(0);

    doc.move_line(0, 2, cursor);
    assert_eq!(doc.serialize(), "b\nc\na\nd\n");
    assert_eq!(doc.marker_line(marker), 2);

    doc.move_line(2, 0, cursor);
    assert_eq!(doc.serialize(), "a\nb\nc\nd\n");
    assert_eq!(doc.marker_line(marker), 0);
  }

  #[test]
  fn undo_group_produces_single_step() {
    let mut doc = Document::new();
    doc.load("one\ntwo\nthree\n", None);
    let cursor = doc.add_cursor();

    {
      let mut group = doc.start_undo_group(cursor);
      let id = cursor;
      group.cursor_mut(id).set_position(Position::new(0, 0), false);
      group.cursor_mut(id).insert_text("> ");
      group.cursor_mut(id).set_position(Position::new(1, 0), false);
      group.cursor_mut(id).insert_text("> ");
      group.close();
    }
    assert_eq!(doc.serialize(), "> one\n> two\nthree\n");

    assert!(doc.undo(cursor));
    assert_eq!(doc.serialize(), "one\ntwo\nthree\n");
    assert!(!doc.is_undo_available());

    assert!(doc.redo(cursor));
    assert_eq!(doc.serialize(), "> one\n> two\nthree\n");
  }

  #[test]
  fn events_are_coalesced_and_drained() {
    let mut doc = Document::new();
    doc.load("hello\n", None);
    let cursor = doc.add_cursor();
    doc.drain_events();

    doc.cursor_mut(cursor).insert_text("a");
    doc.cursor_mut(cursor).insert_text("b");

    let events = doc.drain_events();
    let content: Vec<_> = events
      .iter()
      .filter(|e| matches!(e, DocumentEvent::ContentChanged))
      .collect();
    assert_eq!(content.len(), 1);
    assert!(events.contains(&DocumentEvent::CursorChanged(cursor)));
    assert!(events.contains(&DocumentEvent::UndoAvailable(true)));
    assert!(!doc.has_pending_events());
  }

  #[test]
  fn read_and_write_round_trip() {
    let mut doc = Document::new();
    doc
      .read_from(io::Cursor::new("alpha\nbeta\n"), None)
      .expect("read");
    assert_eq!(doc.line_count(), 2);

    let mut out = Vec::new();
    doc.write_to(&mut out).expect("write");
    assert_eq!(out, b"alpha\nbeta\n");
  }

  #[test]
  fn revision_bumps_on_every_edit() {
    let mut doc = Document::new();
    doc.load("x\n", None);
    let cursor = doc.add_cursor();
    let before = doc.revision();
    doc.cursor_mut(cursor).insert_text("y");
    assert!(doc.revision() > before);
  }
}

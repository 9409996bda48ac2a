//! Document/text-buffer engine for a terminal text-editing widget.
//!
//! The [`Document`] owns the text content, all live cursors and line
//! markers, the undo/redo history, and the search facility. Every structural
//! edit repositions every other live cursor and marker consistently, and
//! every undo/redo step replays those exact repositionings.

pub mod adjustment;
pub mod cursor;
pub mod document;
pub mod event;
mod history;
pub mod layout;
pub mod line;
pub mod marker;
pub mod position;
pub mod search;
pub mod snapshot;

pub use crate::{
  cursor::{
    Cursor,
    CursorId,
    CursorMut,
  },
  document::{
    Document,
    DocumentError,
    UndoGroup,
  },
  event::DocumentEvent,
  layout::{
    LineLayout,
    TerminalLayout,
  },
  line::{
    Line,
    LineAnnotation,
  },
  marker::MarkerId,
  position::Position,
  search::{
    Capture,
    FindAsyncHandle,
    FindAsyncResult,
    FindFlags,
    FindMatch,
    SearchQuery,
  },
  snapshot::Snapshot,
};

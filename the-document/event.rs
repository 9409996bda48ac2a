//! Coalesced change notifications.
//!
//! Mutations mark what changed; the owning widget drains the queue once per
//! event-loop iteration. Events keep the order of first occurrence within a
//! batch but are coalesced: content/cursor/marker events appear at most once
//! per subject, and value-carrying events keep only the latest value.

use crate::{
  cursor::CursorId,
  marker::MarkerId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
  ContentChanged,
  CursorChanged(CursorId),
  MarkerChanged(MarkerId),
  UndoAvailable(bool),
  RedoAvailable(bool),
  ModificationChanged(bool),
  CrlfModeChanged(bool),
}

#[derive(Debug, Default)]
pub(crate) struct EventQueue {
  events: Vec<DocumentEvent>,
}

impl EventQueue {
  pub fn push(&mut self, event: DocumentEvent) {
    use DocumentEvent::*;

    let slot = match event {
      ContentChanged | CursorChanged(_) | MarkerChanged(_) => {
        if self.events.contains(&event) {
          return;
        }
        None
      },
      UndoAvailable(_) => self.position_of(|e| matches!(e, UndoAvailable(_))),
      RedoAvailable(_) => self.position_of(|e| matches!(e, RedoAvailable(_))),
      ModificationChanged(_) => self.position_of(|e| matches!(e, ModificationChanged(_))),
      CrlfModeChanged(_) => self.position_of(|e| matches!(e, CrlfModeChanged(_))),
    };

    match slot {
      Some(i) => self.events[i] = event,
      None => self.events.push(event),
    }
  }

  fn position_of(&self, pred: impl Fn(&DocumentEvent) -> bool) -> Option<usize> {
    self.events.iter().position(pred)
  }

  pub fn drain(&mut self) -> Vec<DocumentEvent> {
    std::mem::take(&mut self.events)
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }
}

use std::{
  any::Any,
  fmt,
  sync::Arc,
};

/// Opaque caller-attached payload carried by a line.
///
/// The engine never inspects it; it rides along with the line through edits
/// and undo/redo.
pub type LineAnnotation = Arc<dyn Any + Send + Sync>;

/// One line of document text, stored without its terminator.
///
/// The revision is bumped (from a document-wide counter, so values are never
/// reused) on every content edit touching the line; annotations are metadata
/// and do not bump it.
#[derive(Clone)]
pub struct Line {
  pub(crate) text:       String,
  pub(crate) revision:   u64,
  pub(crate) annotation: Option<LineAnnotation>,
}

impl Line {
  pub(crate) fn new(text: String, revision: u64) -> Self {
    Self {
      text,
      revision,
      annotation: None,
    }
  }

  #[inline]
  pub fn text(&self) -> &str {
    &self.text
  }

  /// Length in code units (bytes).
  #[inline]
  pub fn code_units(&self) -> usize {
    self.text.len()
  }

  #[inline]
  pub fn revision(&self) -> u64 {
    self.revision
  }

  pub fn annotation(&self) -> Option<&LineAnnotation> {
    self.annotation.as_ref()
  }

  pub fn set_annotation(&mut self, annotation: Option<LineAnnotation>) {
    self.annotation = annotation;
  }
}

impl fmt::Debug for Line {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Line")
      .field("text", &self.text)
      .field("revision", &self.revision)
      .field("annotation", &self.annotation.is_some())
      .finish()
  }
}

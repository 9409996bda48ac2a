slotmap::new_key_type! {
  /// Stable handle to a line marker registered on a document.
  pub struct MarkerId;
}

/// A line marker tracks a single row through structural edits. No column, no
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MarkerState {
  pub line: usize,
}

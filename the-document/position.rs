use serde::{
  Deserialize,
  Serialize,
};

/// A single point in a document.
///
/// `code_unit` is a byte offset into the UTF-8 text of `line` (the
/// addressable unit of the line's representation, not a codepoint and not a
/// grapheme cluster). Ordering is lexicographic on `(line, code_unit)`.
#[derive(
  Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
  pub line:      usize,
  pub code_unit: usize,
}

impl Position {
  pub const fn new(line: usize, code_unit: usize) -> Self {
    Self { line, code_unit }
  }

  pub const fn zero() -> Self {
    Self {
      line:      0,
      code_unit: 0,
    }
  }
}

impl From<(usize, usize)> for Position {
  fn from((line, code_unit): (usize, usize)) -> Self {
    Position::new(line, code_unit)
  }
}

use the_text::grapheme;

/// Layout oracle supplied by the widget embedding the engine.
///
/// Vertical cursor motion needs to know how a line renders; the engine only
/// asks for the mapping between byte offsets and visual columns on a given
/// line and stays ignorant of wrapping, tab stops and glyph metrics.
pub trait LineLayout {
  /// Visual column of the boundary at `code_unit` within `text` (line `line`).
  fn column_at(&self, line: usize, text: &str, code_unit: usize) -> usize;

  /// Boundary within `text` (line `line`) nearest to, and not right of,
  /// visual `column`.
  fn code_unit_at(&self, line: usize, text: &str, column: usize) -> usize;
}

/// Plain terminal-cell layout: one column per cell, wide graphemes take two.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalLayout;

impl LineLayout for TerminalLayout {
  fn column_at(&self, _line: usize, text: &str, code_unit: usize) -> usize {
    grapheme::width_until(text, code_unit)
  }

  fn code_unit_at(&self, _line: usize, text: &str, column: usize) -> usize {
    let mut width = 0;
    let mut boundary = 0;
    loop {
      let next = grapheme::next_grapheme_boundary(text, boundary);
      if next == boundary {
        return boundary;
      }
      let cell = grapheme::grapheme_width(&text[boundary..next]);
      if width + cell > column {
        return boundary;
      }
      width += cell;
      boundary = next;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_ascii() {
    let layout = TerminalLayout;
    assert_eq!(layout.column_at(0, "hello", 3), 3);
    assert_eq!(layout.code_unit_at(0, "hello", 3), 3);
    assert_eq!(layout.code_unit_at(0, "hi", 10), 2);
  }

  #[test]
  fn wide_graphemes_snap_left() {
    let layout = TerminalLayout;
    // Each CJK char is 3 bytes, 2 cells.
    assert_eq!(layout.column_at(0, "世界", 3), 2);
    assert_eq!(layout.code_unit_at(0, "世界", 2), 3);
    // Column 1 falls inside the first wide char.
    assert_eq!(layout.code_unit_at(0, "世界", 1), 0);
  }
}

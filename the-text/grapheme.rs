//! Grapheme cluster helpers over `&str` line text.
//!
//! Positions within a line are byte offsets; user-visible cursor motion
//! happens on grapheme cluster boundaries. These helpers translate between
//! the two without allocating.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// The next grapheme boundary strictly after `byte_idx`, capped at
/// `text.len()`.
pub fn next_grapheme_boundary(text: &str, byte_idx: usize) -> usize {
  text
    .grapheme_indices(true)
    .map(|(i, _)| i)
    .chain(std::iter::once(text.len()))
    .find(|&i| i > byte_idx)
    .unwrap_or(text.len())
}

/// The previous grapheme boundary strictly before `byte_idx` (0 if there is
/// none).
pub fn prev_grapheme_boundary(text: &str, byte_idx: usize) -> usize {
  let mut prev = 0;
  for (i, _) in text.grapheme_indices(true) {
    if i >= byte_idx {
      break;
    }
    prev = i;
  }
  prev
}

/// The nearest grapheme boundary at or before `byte_idx`.
pub fn floor_grapheme_boundary(text: &str, byte_idx: usize) -> usize {
  if byte_idx >= text.len() {
    return text.len();
  }
  let mut floor = 0;
  for (i, _) in text.grapheme_indices(true) {
    if i > byte_idx {
      break;
    }
    floor = i;
  }
  floor
}

/// Whether `byte_idx` sits on a grapheme boundary of `text`.
pub fn is_grapheme_boundary(text: &str, byte_idx: usize) -> bool {
  byte_idx == text.len() || text.grapheme_indices(true).any(|(i, _)| i == byte_idx)
}

/// Terminal cell width of a single grapheme cluster.
///
/// Tabs have no intrinsic width here; layouts that render tabs expand them
/// before measuring.
pub fn grapheme_width(grapheme: &str) -> usize {
  if grapheme.starts_with('\t') {
    1
  } else {
    UnicodeWidthStr::width(grapheme)
  }
}

/// Terminal cell width of `text` up to (not including) `byte_idx`.
pub fn width_until(text: &str, byte_idx: usize) -> usize {
  text
    .grapheme_indices(true)
    .take_while(|&(i, _)| i < byte_idx)
    .map(|(_, g)| grapheme_width(g))
    .sum()
}

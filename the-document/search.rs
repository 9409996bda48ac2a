//! Substring and regex search, synchronous and asynchronous.
//!
//! Matching always runs over a virtual single-stream view of the document:
//! lines joined by `\n`, no terminator after the last line. The stream is
//! never materialized; a [`regex_cursor::Cursor`] implementation feeds the
//! regex engine line chunks and separator chunks directly, so matches may
//! span lines and a pattern can match a bare line terminator. Literal
//! needles are escaped into regex syntax, keeping a single matching code
//! path.
//!
//! `.` does not cross line boundaries (the default), an explicit `\n` in a
//! pattern does, and `^`/`$` anchor at line boundaries.
//!
//! The asynchronous variant runs the identical algorithm against a
//! [`Snapshot`] on a small lazily-started worker pool. Cancellation is a
//! shared flag polled by the stream cursor on every chunk advance and
//! between candidate matches, so cancel latency is bounded by line length,
//! not document size.

use std::{
  ops::Range,
  sync::{
    Arc,
    atomic::{
      AtomicBool,
      Ordering,
    },
  },
};

use crossbeam::channel::{
  Receiver,
  Sender,
};
use once_cell::sync::Lazy;
use regex_automata::util::{
  captures::Captures,
  syntax,
};
use regex_cursor::{
  Cursor,
  Input,
  engines::meta::{
    Builder,
    Regex,
  },
};

use crate::{
  position::Position,
  snapshot::Snapshot,
};

bitflags::bitflags! {
  /// Search options. The default is a forward, non-wrapping,
  /// case-insensitive search.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
  pub struct FindFlags: u8 {
    const BACKWARD       = 1;
    const WRAP           = 1 << 1;
    const CASE_SENSITIVE = 1 << 2;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
  Literal,
  Regex,
}

/// A needle: either a literal substring or a regular expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
  pattern: String,
  kind:    QueryKind,
}

impl SearchQuery {
  pub fn literal(pattern: impl Into<String>) -> Self {
    Self {
      pattern: pattern.into(),
      kind:    QueryKind::Literal,
    }
  }

  pub fn regex(pattern: impl Into<String>) -> Self {
    Self {
      pattern: pattern.into(),
      kind:    QueryKind::Regex,
    }
  }

  pub fn pattern(&self) -> &str {
    &self.pattern
  }

  pub fn is_regex(&self) -> bool {
    self.kind == QueryKind::Regex
  }

  /// An invalid pattern is not an error, it just never matches.
  fn compile(&self, flags: FindFlags) -> Option<Regex> {
    let pattern = match self.kind {
      QueryKind::Literal => escape_literal(&self.pattern),
      QueryKind::Regex => self.pattern.clone(),
    };
    let result = Builder::new()
      .syntax(
        syntax::Config::new()
          .case_insensitive(!flags.contains(FindFlags::CASE_SENSITIVE))
          .multi_line(true),
      )
      .build(&pattern);
    match result {
      Ok(regex) => Some(regex),
      Err(err) => {
        tracing::debug!(%err, pattern = %self.pattern, "invalid search pattern");
        None
      },
    }
  }
}

impl From<&str> for SearchQuery {
  fn from(pattern: &str) -> Self {
    SearchQuery::literal(pattern)
  }
}

fn escape_literal(pattern: &str) -> String {
  const META: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$', '#', '&', '-', '~',
  ];
  let mut out = String::with_capacity(pattern.len());
  for ch in pattern.chars() {
    if META.contains(&ch) {
      out.push('\\');
    }
    out.push(ch);
  }
  out
}

/// One capture group of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
  pub start: Position,
  pub end:   Position,
  pub text:  String,
}

/// A search hit: overall span plus indexed and named capture groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindMatch {
  pub start:   Position,
  pub end:     Position,
  captures:    Vec<Option<Capture>>,
  group_names: Vec<Option<String>>,
}

impl FindMatch {
  /// Capture group by index; group 0 is the whole match.
  pub fn capture(&self, index: usize) -> Option<&Capture> {
    self.captures.get(index)?.as_ref()
  }

  /// Capture group by name.
  pub fn capture_by_name(&self, name: &str) -> Option<&Capture> {
    let index = self
      .group_names
      .iter()
      .position(|n| n.as_deref() == Some(name))?;
    self.capture(index)
  }

  pub fn capture_count(&self) -> usize {
    self.captures.len()
  }
}

/// Outcome of an asynchronous search.
#[derive(Debug, Clone)]
pub enum FindAsyncResult {
  Found { found: FindMatch, revision: u64 },
  NotFound { revision: u64 },
  Cancelled,
}

/// Cancellable handle to an in-flight asynchronous search.
pub struct FindAsyncHandle {
  cancel:  Arc<AtomicBool>,
  results: Receiver<FindAsyncResult>,
}

impl FindAsyncHandle {
  /// Request cancellation. The worker stops scanning promptly; the handle
  /// resolves to [`FindAsyncResult::Cancelled`].
  pub fn cancel(&self) {
    self.cancel.store(true, Ordering::Relaxed);
  }

  pub fn is_cancel_requested(&self) -> bool {
    self.cancel.load(Ordering::Relaxed)
  }

  /// Non-blocking poll.
  pub fn try_result(&self) -> Option<FindAsyncResult> {
    self.results.try_recv().ok()
  }

  pub fn is_finished(&self) -> bool {
    !self.results.is_empty()
  }

  /// Block until the search resolves.
  pub fn wait(self) -> FindAsyncResult {
    self.results.recv().unwrap_or(FindAsyncResult::Cancelled)
  }
}

// Worker pool. Started on first use; sized for search work, not for the
// whole machine.

type Job = Box<dyn FnOnce() + Send + 'static>;

struct SearchPool {
  jobs: Sender<Job>,
}

static POOL: Lazy<SearchPool> = Lazy::new(SearchPool::start);

impl SearchPool {
  fn start() -> Self {
    let (jobs, queue) = crossbeam::channel::unbounded::<Job>();
    let workers = std::thread::available_parallelism()
      .map(|n| n.get())
      .unwrap_or(2)
      .min(4);
    for index in 0..workers {
      let queue = queue.clone();
      std::thread::Builder::new()
        .name(format!("doc-search-{index}"))
        .spawn(move || {
          while let Ok(job) = queue.recv() {
            job();
          }
        })
        .expect("failed to spawn search worker");
    }
    Self { jobs }
  }
}

pub(crate) fn find_async(
  snapshot: Snapshot,
  origin: Position,
  query: SearchQuery,
  flags: FindFlags,
) -> FindAsyncHandle {
  let cancel = Arc::new(AtomicBool::new(false));
  let (tx, rx) = crossbeam::channel::bounded(1);
  let flag = Arc::clone(&cancel);
  let job: Job = Box::new(move || {
    let revision = snapshot.revision();
    let lines: Vec<&str> = (0..snapshot.line_count()).map(|i| snapshot.line(i)).collect();
    let found = find_in_lines(&lines, origin, &query, flags, Some(&flag));
    let result = if flag.load(Ordering::Relaxed) {
      FindAsyncResult::Cancelled
    } else {
      match found {
        Some(found) => FindAsyncResult::Found { found, revision },
        None => FindAsyncResult::NotFound { revision },
      }
    };
    let _ = tx.send(result);
  });
  POOL.jobs.send(job).expect("search pool is alive");
  FindAsyncHandle {
    cancel,
    results: rx,
  }
}

/// Core search over a line array.
///
/// Forward: first match starting at or after `origin`; with `WRAP`, retries
/// over the whole document once. Backward: the match ending nearest to but
/// not after `origin`; with `WRAP`, falls back to the last match in the
/// document.
pub(crate) fn find_in_lines(
  lines: &[&str],
  origin: Position,
  query: &SearchQuery,
  flags: FindFlags,
  cancel: Option<&AtomicBool>,
) -> Option<FindMatch> {
  if query.pattern.is_empty() {
    return None;
  }
  let regex = query.compile(flags)?;
  let total = total_bytes(lines);
  let origin_offset = offset_of_position(lines, origin).min(total);

  let captures = if flags.contains(FindFlags::BACKWARD) {
    last_capture(&regex, lines, 0..origin_offset, cancel).or_else(|| {
      if flags.contains(FindFlags::WRAP) {
        last_capture(&regex, lines, 0..total, cancel)
      } else {
        None
      }
    })
  } else {
    first_capture(&regex, lines, origin_offset..total, cancel).or_else(|| {
      if flags.contains(FindFlags::WRAP) {
        first_capture(&regex, lines, 0..total, cancel)
      } else {
        None
      }
    })
  }?;

  Some(build_match(lines, &captures))
}

fn first_capture(
  regex: &Regex,
  lines: &[&str],
  range: Range<usize>,
  cancel: Option<&AtomicBool>,
) -> Option<Captures> {
  let input = Input::new(LinesCursor::new(lines, cancel)).range(range);
  regex.captures_iter(input).next()
}

fn last_capture(
  regex: &Regex,
  lines: &[&str],
  range: Range<usize>,
  cancel: Option<&AtomicBool>,
) -> Option<Captures> {
  let input = Input::new(LinesCursor::new(lines, cancel)).range(range);
  let mut last = None;
  for captures in regex.captures_iter(input) {
    if cancelled(cancel) {
      return None;
    }
    last = Some(captures);
  }
  last
}

fn build_match(lines: &[&str], caps: &Captures) -> FindMatch {
  let overall = caps.get_group(0).expect("a match always has group 0");
  let group_names: Vec<Option<String>> = match caps.pattern() {
    Some(pattern) => caps
      .group_info()
      .pattern_names(pattern)
      .map(|name| name.map(str::to_string))
      .collect(),
    None => Vec::new(),
  };
  let captures = (0..caps.group_len())
    .map(|index| {
      caps.get_group(index).map(|span| Capture {
        start: position_of_offset(lines, span.start),
        end:   position_of_offset(lines, span.end),
        text:  text_between(lines, span.start, span.end),
      })
    })
    .collect();

  FindMatch {
    start: position_of_offset(lines, overall.start),
    end: position_of_offset(lines, overall.end),
    captures,
    group_names,
  }
}

fn cancelled(cancel: Option<&AtomicBool>) -> bool {
  cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

// Offset mapping between the virtual stream and line/code-unit positions.

fn total_bytes(lines: &[&str]) -> usize {
  lines.iter().map(|line| line.len() + 1).sum::<usize>() - 1
}

fn offset_of_position(lines: &[&str], position: Position) -> usize {
  let line = position.line.min(lines.len().saturating_sub(1));
  let mut offset = 0;
  for text in &lines[..line] {
    offset += text.len() + 1;
  }
  offset + position.code_unit
}

fn position_of_offset(lines: &[&str], mut offset: usize) -> Position {
  for (line, text) in lines.iter().enumerate() {
    if offset <= text.len() {
      return Position::new(line, offset);
    }
    offset -= text.len() + 1;
  }
  Position::new(
    lines.len() - 1,
    lines.last().map(|text| text.len()).unwrap_or(0),
  )
}

fn text_between(lines: &[&str], start: usize, end: usize) -> String {
  fn push_overlap(out: &mut String, chunk: &str, chunk_start: usize, start: usize, end: usize) {
    let chunk_end = chunk_start + chunk.len();
    let from = start.max(chunk_start);
    let to = end.min(chunk_end);
    if from < to {
      out.push_str(&chunk[from - chunk_start..to - chunk_start]);
    }
  }

  let mut out = String::with_capacity(end.saturating_sub(start));
  let mut offset = 0;
  for (i, line) in lines.iter().enumerate() {
    push_overlap(&mut out, line, offset, start, end);
    offset += line.len();
    if i + 1 < lines.len() {
      push_overlap(&mut out, "\n", offset, start, end);
      offset += 1;
    }
    if offset >= end {
      break;
    }
  }
  out
}

/// Stream cursor over the line array: line chunks interleaved with `\n`
/// separator chunks, empty line chunks skipped (the engine requires
/// non-empty chunks except for an empty haystack). Optionally polls a
/// cancellation flag on every advance and reports end-of-stream once it is
/// set; the worker discards the scan result in that case.
struct LinesCursor<'a> {
  lines:  &'a [&'a str],
  chunk:  usize,
  offset: usize,
  total:  usize,
  cancel: Option<&'a AtomicBool>,
}

impl<'a> LinesCursor<'a> {
  fn new(lines: &'a [&'a str], cancel: Option<&'a AtomicBool>) -> Self {
    debug_assert!(!lines.is_empty());
    let total = total_bytes(lines);
    let mut cursor = Self {
      lines,
      chunk: 0,
      offset: 0,
      total,
      cancel,
    };
    if cursor.chunk_bytes_at(0).is_empty() {
      cursor.advance();
    }
    cursor
  }

  fn chunk_count(&self) -> usize {
    self.lines.len() * 2 - 1
  }

  fn chunk_bytes_at(&self, chunk: usize) -> &'a [u8] {
    if chunk % 2 == 0 {
      self.lines[chunk / 2].as_bytes()
    } else {
      b"\n"
    }
  }
}

impl Cursor for LinesCursor<'_> {
  fn chunk(&self) -> &[u8] {
    self.chunk_bytes_at(self.chunk)
  }

  fn utf8_aware(&self) -> bool {
    true
  }

  fn advance(&mut self) -> bool {
    if cancelled(self.cancel) {
      return false;
    }
    // Empty chunks contribute no bytes, so the next chunk's offset is fixed
    // before the skip loop.
    let offset = self.offset + self.chunk_bytes_at(self.chunk).len();
    let mut next = self.chunk;
    loop {
      next += 1;
      if next >= self.chunk_count() {
        return false;
      }
      let bytes = self.chunk_bytes_at(next);
      if bytes.is_empty() {
        continue;
      }
      self.chunk = next;
      self.offset = offset;
      return true;
    }
  }

  fn backtrack(&mut self) -> bool {
    let mut previous = self.chunk;
    while previous > 0 {
      previous -= 1;
      let bytes = self.chunk_bytes_at(previous);
      if bytes.is_empty() {
        continue;
      }
      self.offset -= bytes.len();
      self.chunk = previous;
      return true;
    }
    false
  }

  fn total_bytes(&self) -> Option<usize> {
    Some(self.total)
  }

  fn offset(&self) -> usize {
    self.offset
  }
}

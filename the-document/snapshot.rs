use std::sync::{
  Arc,
  atomic::{
    AtomicU64,
    Ordering,
  },
};

/// One line of a snapshot: text plus the per-line revision it carried when
/// the snapshot was taken.
#[derive(Debug, Clone)]
pub struct SnapshotLine {
  text:     String,
  revision: u64,
}

impl SnapshotLine {
  pub(crate) fn new(text: String, revision: u64) -> Self {
    Self { text, revision }
  }

  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn revision(&self) -> u64 {
    self.revision
  }
}

/// Immutable point-in-time copy of the line contents, safe to read from any
/// thread. Holds a handle to the live revision cell so staleness is a cheap
/// atomic comparison.
#[derive(Debug, Clone)]
pub struct Snapshot {
  lines:    Arc<[SnapshotLine]>,
  revision: u64,
  live:     Arc<AtomicU64>,
}

impl Snapshot {
  pub(crate) fn new(lines: Vec<SnapshotLine>, revision: u64, live: Arc<AtomicU64>) -> Self {
    Self {
      lines: lines.into(),
      revision,
      live,
    }
  }

  pub fn line_count(&self) -> usize {
    self.lines.len()
  }

  pub fn line(&self, line: usize) -> &str {
    self.lines[line].text()
  }

  pub fn line_code_units(&self, line: usize) -> usize {
    self.lines[line].text().len()
  }

  pub fn line_revision(&self, line: usize) -> u64 {
    self.lines[line].revision()
  }

  /// Document revision at the time the snapshot was taken.
  pub fn revision(&self) -> u64 {
    self.revision
  }

  /// Whether the live document still is at this snapshot's revision.
  pub fn is_up_to_date(&self) -> bool {
    self.live.load(Ordering::SeqCst) == self.revision
  }
}

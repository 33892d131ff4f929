//! Position mapping through edits
//!
//! Every applied step produces a [`StepMap`] describing which position
//! ranges were replaced. Positions captured before a transaction must be
//! passed through its [`Mapping`] before being used against the new document.

use serde::{Deserialize, Serialize};

/// A replaced range: `old_size` units at `start` became `new_size` units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRange {
    pub start: usize,
    pub old_size: usize,
    pub new_size: usize,
}

/// Which side a position sticks to when content is inserted exactly at it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Assoc {
    /// Stay before inserted content
    Before,
    /// Move after inserted content
    #[default]
    After,
}

/// Result of mapping a single position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapResult {
    /// The mapped position
    pub pos: usize,
    /// Whether the content on the associated side of the position was deleted
    pub deleted: bool,
}

/// The position changes made by a single step.
///
/// Ranges are sorted by `start`, non-overlapping, and expressed in the
/// coordinates of the document before the step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepMap {
    ranges: Vec<MapRange>,
}

impl StepMap {
    /// A map that changes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// A map with a single replaced range
    pub fn single(start: usize, old_size: usize, new_size: usize) -> Self {
        let mut map = Self::empty();
        map.push(start, old_size, new_size);
        map
    }

    /// Append a replaced range. Adjacent ranges are merged.
    pub(crate) fn push(&mut self, start: usize, old_size: usize, new_size: usize) {
        if old_size == 0 && new_size == 0 {
            return;
        }
        if let Some(last) = self.ranges.last_mut() {
            if last.start + last.old_size == start {
                last.old_size += old_size;
                last.new_size += new_size;
                return;
            }
        }
        self.ranges.push(MapRange {
            start,
            old_size,
            new_size,
        });
    }

    /// Get the replaced ranges
    pub fn ranges(&self) -> &[MapRange] {
        &self.ranges
    }

    /// Check if this map leaves every position unchanged
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Map a position
    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.map_result(pos, assoc).pos
    }

    /// Map a position and report whether it was deleted
    pub fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        let mut diff: isize = 0;
        for range in &self.ranges {
            if range.start > pos {
                break;
            }
            let end = range.start + range.old_size;
            if pos <= end {
                let after = if range.old_size == 0 {
                    assoc == Assoc::After
                } else if pos == range.start {
                    false
                } else if pos == end {
                    true
                } else {
                    assoc == Assoc::After
                };
                let base = shift(range.start, diff);
                let mapped = if after { base + range.new_size } else { base };
                let deleted = range.old_size > 0
                    && !(pos == range.start && assoc == Assoc::Before)
                    && !(pos == end && assoc == Assoc::After);
                return MapResult {
                    pos: mapped,
                    deleted,
                };
            }
            diff += range.new_size as isize - range.old_size as isize;
        }
        MapResult {
            pos: shift(pos, diff),
            deleted: false,
        }
    }
}

fn shift(pos: usize, diff: isize) -> usize {
    (pos as isize + diff).max(0) as usize
}

/// A sequence of step maps, applied in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    maps: Vec<StepMap>,
}

impl Mapping {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step map
    pub fn push(&mut self, map: StepMap) {
        if !map.is_empty() {
            self.maps.push(map);
        }
    }

    /// Append every map of another mapping
    pub fn extend(&mut self, other: &Mapping) {
        for map in &other.maps {
            self.push(map.clone());
        }
    }

    /// Get the step maps
    pub fn maps(&self) -> &[StepMap] {
        &self.maps
    }

    /// Map a position through every step map
    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.map_result(pos, assoc).pos
    }

    /// Map a position through every step map, reporting whether it was deleted
    /// in any of them
    pub fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        let mut deleted = false;
        let mut pos = pos;
        for map in &self.maps {
            let result = map.map_result(pos, assoc);
            deleted |= result.deleted;
            pos = result.pos;
        }
        MapResult { pos, deleted }
    }
}

/// Remap a position captured before a set of edits
pub fn map_position(pos: usize, mapping: &Mapping) -> usize {
    mapping.map(pos, Assoc::After)
}

//! Per-file cursors and the k-way merge over them.
//!
//! Every record leaving a cursor carries its offset inside the run of
//! consecutive records sharing its coordinate. The merge orders records by
//! `(coordinate, offset, file ordinal)`, which is a total order, so a scan can
//! be cut anywhere and resumed from `(start, offset)` per file.

use super::ResumePosition;
use crate::Result;
use crate::formats::{AlignmentRecord, Coordinate, RecordIter};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Merge key. Field order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct MergeKey {
    pub coordinate: Coordinate,
    pub skip: u64,
    pub ordinal: usize,
}

/// Records of one open file, annotated with their run offsets.
pub(crate) struct Cursor<'a> {
    ordinal: usize,
    records: RecordIter<'a>,
    previous: Option<Coordinate>,
    run_offset: u64,
    /// Records starting before this must still reach it
    overlap_floor: Option<u64>,
    resume: Option<(u64, u64)>,
}

impl<'a> Cursor<'a> {
    /// A cursor over a query issued at the start of the searched range.
    pub fn fresh(ordinal: usize, records: RecordIter<'a>) -> Self {
        Self {
            ordinal,
            records,
            previous: None,
            run_offset: 0,
            overlap_floor: None,
            resume: None,
        }
    }

    /// A cursor continuing a scan of a range starting at `range_start`.
    ///
    /// `records` must come from a query issued at `position.start`. Records
    /// that start before the position overlap it but were returned by an
    /// earlier page; they are dropped along with the first `position.skip`
    /// records of the run at the position.
    pub fn resumed(
        ordinal: usize,
        records: RecordIter<'a>,
        position: &ResumePosition,
        range_start: u64,
    ) -> Self {
        Self {
            ordinal,
            records,
            previous: None,
            run_offset: 0,
            overlap_floor: (position.start < range_start).then_some(range_start),
            resume: Some((position.start, position.skip)),
        }
    }

    fn in_range(&self, record: &AlignmentRecord) -> bool {
        match self.overlap_floor {
            Some(floor) => record.alignment_start >= floor || record.reference_end() > floor,
            None => true,
        }
    }

    /// Next record with its merge key
    pub fn next_entry(&mut self) -> Result<Option<HeapEntry>> {
        while let Some(record) = self.records.next().transpose()? {
            if !self.in_range(&record) {
                continue;
            }

            let coordinate = record.coordinate();
            let skip = if self.previous == Some(coordinate) {
                self.run_offset + 1
            } else {
                0
            };
            self.previous = Some(coordinate);
            self.run_offset = skip;

            if let Some((start, resume_skip)) = self.resume {
                if record.alignment_start < start
                    || (record.alignment_start == start && skip < resume_skip)
                {
                    continue;
                }
                self.resume = None;
            }

            return Ok(Some(HeapEntry {
                key: MergeKey {
                    coordinate,
                    skip,
                    ordinal: self.ordinal,
                },
                record,
            }));
        }
        Ok(None)
    }
}

/// Entry in the merge heap.
pub(crate) struct HeapEntry {
    pub key: MergeKey,
    pub record: AlignmentRecord,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// Merge of several cursors into one ascending stream.
pub(crate) struct Merge<'a> {
    cursors: Vec<Cursor<'a>>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
}

impl<'a> Merge<'a> {
    /// Cursor ordinals must be their positions in `cursors`.
    pub fn new(mut cursors: Vec<Cursor<'a>>) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(cursors.len());
        for cursor in &mut cursors {
            if let Some(entry) = cursor.next_entry()? {
                heap.push(Reverse(entry));
            }
        }
        Ok(Self { cursors, heap })
    }

    /// Pop the smallest record and advance the cursor it came from.
    pub fn next_entry(&mut self) -> Result<Option<HeapEntry>> {
        let Some(Reverse(entry)) = self.heap.pop() else {
            return Ok(None);
        };
        if let Some(next) = self.cursors[entry.key.ordinal].next_entry()? {
            self.heap.push(Reverse(next));
        }
        Ok(Some(entry))
    }

    /// Where each unexhausted cursor stands: `(ordinal, start, skip)`,
    /// ordered by ordinal.
    pub fn heads(&self) -> Vec<(usize, u64, u64)> {
        let mut heads: Vec<_> = self
            .heap
            .iter()
            .map(|Reverse(entry)| {
                (
                    entry.key.ordinal,
                    entry.record.alignment_start,
                    entry.key.skip,
                )
            })
            .collect();
        heads.sort_unstable();
        heads
    }
}

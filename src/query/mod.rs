//! Paginated read search across many indexed files.
//!
//! A search runs through five steps:
//!
//! 1. resolve the target files, from the request's datasets and readsets or
//!    from the page token
//! 2. open one reader per file; files that fail to open are logged and left out
//! 3. wrap each reader's overlap query in a [`cursor::Cursor`]
//! 4. merge the cursors, keep records whose readset was requested, and stop
//!    after `page_size` merged records
//! 5. describe where every unexhausted cursor stands as the next page token
//!
//! Page size bounds the records consumed from the merge, not the records
//! returned, so a page may hold fewer reads than the page size.

mod cursor;
mod descriptor;

pub use descriptor::{Fingerprint, QueryDescriptor, ResumePosition};

use crate::catalog::{Catalog, CatalogReadset};
use crate::formats::{
    AlignmentReader, AlignmentRecord, IndexedAlignmentFile, UNSET_MAPPING_QUALITY, UNSET_POSITION,
    UNSET_STRING,
};
use crate::types::{Read, SearchReadsRequest, SearchReadsResponse};
use crate::{Error, Result};
use cursor::{Cursor, Merge};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Request-scoped cancellation flag, checked between reader opens and on
/// every merge step.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// A guard that cancels when dropped, e.g. together with an abandoned
    /// request future.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

pub struct CancelOnDrop(Cancellation);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// One file taking part in a search.
struct Target {
    file: Arc<IndexedAlignmentFile>,
    position: ResumePosition,
    /// Read group id -> id of a requested readset
    readsets: HashMap<String, String>,
}

pub struct QueryEngine<'a> {
    catalog: &'a Catalog,
    cancel: &'a Cancellation,
}

impl<'a> QueryEngine<'a> {
    pub fn new(catalog: &'a Catalog, cancel: &'a Cancellation) -> Self {
        Self { catalog, cancel }
    }

    pub fn search(&self, request: &SearchReadsRequest) -> Result<SearchReadsResponse> {
        let sequence_name = request
            .sequence_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::InvalidInput("sequenceName is required".to_string()))?;
        let (start, end) = sequence_range(request.sequence_start, request.sequence_end)?;

        let requested = self
            .catalog
            .resolve_readsets(&request.dataset_ids, &request.readset_ids)?;

        let page_token = request.page_token.as_deref().filter(|t| !t.is_empty());
        let descriptor = match page_token {
            Some(token) => self.catalog.decode_page_token(token)?,
            None => start_of_search(&requested, sequence_name, start, end),
        };
        debug!(
            "searching {} file(s) on {} from {} to {:?} (resumed: {})",
            descriptor.starts.len(),
            sequence_name,
            descriptor.start,
            descriptor.end,
            page_token.is_some()
        );

        let requested_ids: HashSet<&str> = requested.iter().map(|r| r.id()).collect();
        let (targets, mut readers) = self.open(&descriptor, &requested_ids)?;

        let mut cursors = Vec::with_capacity(readers.len());
        for (ordinal, (reader, target)) in readers.iter_mut().zip(&targets).enumerate() {
            self.cancel.check()?;
            let position = &target.position;
            let cursor = if page_token.is_some() {
                let records =
                    reader.query_overlapping(&position.sequence_name, position.start, descriptor.end)?;
                Cursor::resumed(ordinal, records, position, descriptor.start)
            } else {
                let records =
                    reader.query_overlapping(&position.sequence_name, descriptor.start, descriptor.end)?;
                Cursor::fresh(ordinal, records)
            };
            cursors.push(cursor);
        }

        let mut merge = Merge::new(cursors)?;
        let mut reads = Vec::new();
        for _ in 0..self.catalog.page_size() {
            self.cancel.check()?;
            let Some(entry) = merge.next_entry()? else {
                break;
            };
            let target = &targets[entry.key.ordinal];
            let readset_id = entry
                .record
                .read_group()
                .and_then(|read_group| target.readsets.get(read_group))
                .cloned();
            if let Some(readset_id) = readset_id {
                reads.push(to_read(entry.record, readset_id));
            }
        }

        let heads = merge.heads();
        let starts = heads
            .into_iter()
            .map(|(ordinal, start, skip)| {
                let target = &targets[ordinal];
                (
                    target.file.path().to_path_buf(),
                    ResumePosition::new(target.position.sequence_name.clone(), start, skip),
                )
            })
            .collect();
        let next = QueryDescriptor {
            starts,
            start: descriptor.start,
            end: descriptor.end,
        };
        let next_page_token = if next.is_exhausted() {
            None
        } else {
            Some(next.to_page_token(self.catalog.fingerprint())?)
        };

        Ok(SearchReadsResponse {
            reads,
            next_page_token,
        })
    }

    /// Open a reader per file, in path order. Readers are closed on drop.
    fn open(
        &self,
        descriptor: &QueryDescriptor,
        requested_ids: &HashSet<&str>,
    ) -> Result<(Vec<Target>, Vec<Box<dyn AlignmentReader>>)> {
        let mut targets = Vec::with_capacity(descriptor.starts.len());
        let mut readers = Vec::with_capacity(descriptor.starts.len());

        for (path, position) in &descriptor.starts {
            self.cancel.check()?;
            let file = self.catalog.file(path).ok_or_else(|| {
                Error::InvalidPageToken(format!("unknown file {}", path.display()))
            })?;

            match self.catalog.source().open(file) {
                Ok(reader) => {
                    targets.push(Target {
                        file: Arc::clone(file),
                        position: position.clone(),
                        readsets: self.catalog.readsets_by_read_group(file, requested_ids),
                    });
                    readers.push(reader);
                }
                Err(e) => warn!("skipping {}: {}", path.display(), e),
            }
        }

        Ok((targets, readers))
    }
}

/// Validate a 1-based `[start, end)` range.
fn sequence_range(start: Option<u64>, end: Option<u64>) -> Result<(u64, Option<u64>)> {
    match (start, end) {
        (None, Some(_)) => Err(Error::InvalidRange(
            "sequenceEnd requires sequenceStart".to_string(),
        )),
        (Some(0), _) => Err(Error::InvalidRange(
            "sequenceStart must be at least 1".to_string(),
        )),
        (Some(start), Some(end)) if end <= start => Err(Error::InvalidRange(format!(
            "sequenceEnd {} is not after sequenceStart {}",
            end, start
        ))),
        (start, end) => Ok((start.unwrap_or(1), end)),
    }
}

fn start_of_search(
    readsets: &[&CatalogReadset],
    sequence_name: &str,
    start: u64,
    end: Option<u64>,
) -> QueryDescriptor {
    let starts: BTreeMap<_, _> = readsets
        .iter()
        .flat_map(|readset| readset.files())
        .map(|file| {
            (
                file.path().to_path_buf(),
                ResumePosition::new(sequence_name, start, 0),
            )
        })
        .collect();
    QueryDescriptor { starts, start, end }
}

fn text(value: String) -> Option<String> {
    (value != UNSET_STRING).then_some(value)
}

fn to_read(record: AlignmentRecord, readset_id: String) -> Read {
    let name = text(record.name);
    Read {
        id: name.clone(),
        name,
        readset_id: Some(readset_id),
        flags: record.flags,
        reference_sequence_name: text(record.reference_name),
        position: (record.alignment_start != UNSET_POSITION).then_some(record.alignment_start),
        mapping_quality: (record.mapping_quality != UNSET_MAPPING_QUALITY)
            .then_some(record.mapping_quality),
        cigar: text(record.cigar),
        mate_reference_sequence_name: text(record.mate_reference_name),
        mate_position: (record.mate_alignment_start != UNSET_POSITION)
            .then_some(record.mate_alignment_start),
        template_length: (record.template_length != 0).then_some(record.template_length),
        original_bases: text(record.sequence),
        aligned_bases: None,
        base_quality: text(record.quality),
        tags: record.tags,
    }
}

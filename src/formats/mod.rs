//! Alignment file access.
//!
//! The record codec and the index format are external collaborators. This
//! module describes what the catalog and the query engine need from them:
//!
//! - [`AlignmentSource`] - recognizes alignment files, locates their companion
//!   index, reads header metadata and opens readers
//! - [`AlignmentReader`] - answers "records overlapping a range, in coordinate
//!   order" for one open file
//!
//! # Implementations
//!
//! - [`BamSource`] - BAM files with `.bai` indexes, backed by noodles
//! - `MemorySource` - in-memory test double, compiled for unit tests only
//!
//! Records are handed over in their source-format representation, sentinels
//! included (`"*"`, `0`, `255`); translating those is the caller's job.

mod bam;
#[cfg(test)]
mod memory;

pub use bam::BamSource;
#[cfg(test)]
pub(crate) use memory::{MemoryFile, MemorySource};

use crate::Result;
use crate::types::{FileData, HeaderLine, Program, ReadGroup, RefSequence};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Boxed stream of records returned by [`AlignmentReader::query_overlapping`].
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<AlignmentRecord>> + 'a>;

/// Source-format string sentinel for "unset".
pub const UNSET_STRING: &str = "*";
/// Source-format sentinel for an unset position or template length.
pub const UNSET_POSITION: u64 = 0;
/// Source-format sentinel for an unset mapping quality.
pub const UNSET_MAPPING_QUALITY: u8 = 255;

/// Storage-format capability used by the catalog builder and the query engine.
pub trait AlignmentSource: Send + Sync {
    /// Whether `path` looks like an alignment file this source can read
    fn recognizes(&self, path: &Path) -> bool;

    /// Location of the companion index for `path`, if one is present
    fn index_path(&self, path: &Path) -> Option<PathBuf>;

    /// Read the header metadata of an alignment file
    fn read_header(&self, path: &Path) -> Result<FileHeader>;

    /// Open a reader over an indexed file. The reader is released on drop.
    fn open(&self, file: &IndexedAlignmentFile) -> Result<Box<dyn AlignmentReader>>;
}

/// An open, indexed alignment file.
pub trait AlignmentReader {
    /// Records on `sequence_name` overlapping `[start, end)` (1-based, `end`
    /// unbounded when `None`), in ascending coordinate order.
    fn query_overlapping<'a>(
        &'a mut self,
        sequence_name: &str,
        start: u64,
        end: Option<u64>,
    ) -> Result<RecordIter<'a>>;
}

/// One alignment record in source-format terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub name: String,
    pub flags: u16,
    /// Index of the reference sequence in the file header, `None` if unmapped
    pub reference_index: Option<usize>,
    pub reference_name: String,
    /// 1-based
    pub alignment_start: u64,
    pub mapping_quality: u8,
    pub cigar: String,
    pub mate_reference_name: String,
    pub mate_alignment_start: u64,
    pub template_length: i32,
    pub sequence: String,
    pub quality: String,
    pub tags: BTreeMap<String, String>,
}

impl Default for AlignmentRecord {
    fn default() -> Self {
        Self {
            name: UNSET_STRING.to_string(),
            flags: 0,
            reference_index: None,
            reference_name: UNSET_STRING.to_string(),
            alignment_start: UNSET_POSITION,
            mapping_quality: UNSET_MAPPING_QUALITY,
            cigar: UNSET_STRING.to_string(),
            mate_reference_name: UNSET_STRING.to_string(),
            mate_alignment_start: UNSET_POSITION,
            template_length: 0,
            sequence: UNSET_STRING.to_string(),
            quality: UNSET_STRING.to_string(),
            tags: BTreeMap::new(),
        }
    }
}

impl AlignmentRecord {
    /// The `RG` tag
    pub fn read_group(&self) -> Option<&str> {
        self.tags.get("RG").map(String::as_str)
    }

    /// Exclusive end on the reference. Records without reference-consuming
    /// CIGAR operations cover their start position only.
    pub fn reference_end(&self) -> u64 {
        self.alignment_start + reference_span(&self.cigar).max(1)
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            reference: self.reference_index.unwrap_or(usize::MAX),
            start: self.alignment_start,
        }
    }
}

/// Reference bases covered by a CIGAR string (`M`, `D`, `N`, `=`, `X`).
pub fn reference_span(cigar: &str) -> u64 {
    let mut span = 0;
    let mut len = 0u64;
    for c in cigar.chars() {
        if let Some(digit) = c.to_digit(10) {
            len = len * 10 + u64::from(digit);
            continue;
        }
        if matches!(c, 'M' | 'D' | 'N' | '=' | 'X') {
            span += len;
        }
        len = 0;
    }
    span
}

/// Coordinate sort key: reference index (unmapped last), then alignment start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coordinate {
    reference: usize,
    start: u64,
}

/// Header metadata of one alignment file, computed once at discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub header_line: Option<HeaderLine>,
    pub ref_sequences: Vec<RefSequence>,
    pub read_groups: Vec<ReadGroup>,
    pub programs: Vec<Program>,
    pub comments: Vec<String>,
}

impl FileHeader {
    /// Samples declared by the read groups
    pub fn samples(&self) -> BTreeSet<String> {
        self.read_groups
            .iter()
            .filter_map(|rg| rg.sample.clone())
            .collect()
    }
}

/// A candidate alignment file found on disk. Equality is by path.
#[derive(Debug, Clone)]
pub struct AlignmentFile {
    path: PathBuf,
    index_path: Option<PathBuf>,
}

impl AlignmentFile {
    /// Interpret `path` as an alignment file, or `None` if the source does not
    /// recognize it.
    pub fn discover(source: &dyn AlignmentSource, path: &Path) -> Option<Self> {
        if !source.recognizes(path) {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
            index_path: source.index_path(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_index(&self) -> bool {
        self.index_path.is_some()
    }

    /// Promote to an indexed file. Reads the header once; `None` without an index.
    pub fn into_indexed(self, source: &dyn AlignmentSource) -> Result<Option<IndexedAlignmentFile>> {
        let Some(index_path) = self.index_path else {
            return Ok(None);
        };
        let header = source.read_header(&self.path)?;
        Ok(Some(IndexedAlignmentFile {
            path: self.path,
            index_path,
            header,
        }))
    }
}

impl PartialEq for AlignmentFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for AlignmentFile {}

impl Hash for AlignmentFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

/// An alignment file proven to have a companion index at discovery time.
#[derive(Debug, Clone)]
pub struct IndexedAlignmentFile {
    path: PathBuf,
    index_path: PathBuf,
    header: FileHeader,
}

impl IndexedAlignmentFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn file_uri(&self) -> String {
        url::Url::from_file_path(&self.path)
            .map(String::from)
            .unwrap_or_else(|_| format!("file://{}", self.path.display()))
    }

    pub fn file_data(&self) -> FileData {
        FileData {
            file_uri: self.file_uri(),
            headers: self.header.header_line.iter().cloned().collect(),
            ref_sequences: self.header.ref_sequences.clone(),
            read_groups: self.header.read_groups.clone(),
            programs: self.header.programs.clone(),
            comments: self.header.comments.clone(),
        }
    }
}

impl PartialEq for IndexedAlignmentFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for IndexedAlignmentFile {}

impl PartialOrd for IndexedAlignmentFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexedAlignmentFile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl Hash for IndexedAlignmentFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

use super::{
    AlignmentReader, AlignmentRecord, AlignmentSource, FileHeader, IndexedAlignmentFile,
    RecordIter,
};
use crate::types::{ReadGroup, RefSequence};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Contents of one in-memory alignment file.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    header: FileHeader,
    records: Vec<AlignmentRecord>,
    indexed: bool,
    fail_open: bool,
}

impl Default for MemoryFile {
    fn default() -> Self {
        Self {
            header: FileHeader::default(),
            records: Vec::new(),
            indexed: true,
            fail_open: false,
        }
    }
}

impl MemoryFile {
    pub fn with_reference(mut self, name: &str, length: u64) -> Self {
        self.header.ref_sequences.push(RefSequence {
            name: name.to_string(),
            length,
            ..RefSequence::default()
        });
        self
    }

    pub fn with_read_group(mut self, id: &str, sample: &str) -> Self {
        self.header.read_groups.push(ReadGroup {
            id: id.to_string(),
            sample: Some(sample.to_string()),
            ..ReadGroup::default()
        });
        self
    }

    /// Add a record; its reference index is resolved against the header.
    pub fn with_record(mut self, mut record: AlignmentRecord) -> Self {
        record.reference_index = self
            .header
            .ref_sequences
            .iter()
            .position(|seq| seq.name == record.reference_name);
        self.records.push(record);
        self.records.sort_by_key(AlignmentRecord::coordinate);
        self
    }

    /// Add a mapped read tagged with `read_group`.
    pub fn with_read(
        self,
        name: &str,
        reference_name: &str,
        start: u64,
        cigar: &str,
        read_group: &str,
    ) -> Self {
        let mut record = AlignmentRecord {
            name: name.to_string(),
            reference_name: reference_name.to_string(),
            alignment_start: start,
            cigar: cigar.to_string(),
            ..AlignmentRecord::default()
        };
        record
            .tags
            .insert("RG".to_string(), read_group.to_string());
        self.with_record(record)
    }

    pub fn without_index(mut self) -> Self {
        self.indexed = false;
        self
    }

    /// Make every attempt to open this file fail.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

/// [`AlignmentSource`] over files held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<PathBuf, Arc<MemoryFile>>,
}

impl MemorySource {
    pub fn insert(&mut self, path: impl Into<PathBuf>, file: MemoryFile) {
        self.files.insert(path.into(), Arc::new(file));
    }

    fn get(&self, path: &Path) -> Result<&Arc<MemoryFile>> {
        self.files
            .get(path)
            .ok_or_else(|| Error::NotFound(format!("no in-memory file at {}", path.display())))
    }
}

impl AlignmentSource for MemorySource {
    fn recognizes(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn index_path(&self, path: &Path) -> Option<PathBuf> {
        let file = self.files.get(path)?;
        file.indexed
            .then(|| PathBuf::from(format!("{}.bai", path.display())))
    }

    fn read_header(&self, path: &Path) -> Result<FileHeader> {
        Ok(self.get(path)?.header.clone())
    }

    fn open(&self, file: &IndexedAlignmentFile) -> Result<Box<dyn AlignmentReader>> {
        let contents = self.get(file.path())?;
        if contents.fail_open {
            return Err(Error::Io(std::io::Error::other(format!(
                "cannot open {}",
                file.path().display()
            ))));
        }
        Ok(Box::new(MemoryReader {
            file: Arc::clone(contents),
        }))
    }
}

struct MemoryReader {
    file: Arc<MemoryFile>,
}

impl AlignmentReader for MemoryReader {
    fn query_overlapping<'a>(
        &'a mut self,
        sequence_name: &str,
        start: u64,
        end: Option<u64>,
    ) -> Result<RecordIter<'a>> {
        let sequence_name = sequence_name.to_string();
        let records = self.file.records.iter().filter(move |record| {
            if record.reference_name != sequence_name {
                return false;
            }
            let before_end = end.is_none_or(|end| record.alignment_start < end);
            before_end && record.reference_end() > start
        });
        Ok(Box::new(records.cloned().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(records: RecordIter<'_>) -> Vec<String> {
        records.map(|r| r.unwrap().name).collect()
    }

    #[test]
    fn test_query_overlapping_includes_reads_starting_before_range() {
        let file = MemoryFile::default()
            .with_reference("chr1", 1000)
            .with_read_group("rg1", "sample1")
            .with_read("long", "chr1", 5, "10M", "rg1")
            .with_read("short", "chr1", 5, "2M", "rg1")
            .with_read("inside", "chr1", 12, "2M", "rg1")
            .with_read("after", "chr1", 20, "2M", "rg1");
        let mut source = MemorySource::default();
        source.insert("/mem/a.bam", file);

        let indexed = super::super::AlignmentFile::discover(&source, Path::new("/mem/a.bam"))
            .unwrap()
            .into_indexed(&source)
            .unwrap()
            .unwrap();
        let mut reader = source.open(&indexed).unwrap();

        let found = names(reader.query_overlapping("chr1", 10, Some(20)).unwrap());
        assert_eq!(found, vec!["long", "inside"]);

        let found = names(reader.query_overlapping("chr1", 1, None).unwrap());
        assert_eq!(found, vec!["long", "short", "inside", "after"]);

        let found = names(reader.query_overlapping("chr2", 1, None).unwrap());
        assert!(found.is_empty());
    }

    #[test]
    fn test_failing_open() {
        let mut source = MemorySource::default();
        source.insert("/mem/bad.bam", MemoryFile::default().failing_open());
        let indexed = super::super::AlignmentFile::discover(&source, Path::new("/mem/bad.bam"))
            .unwrap()
            .into_indexed(&source)
            .unwrap()
            .unwrap();
        assert!(source.open(&indexed).is_err());
    }
}

use super::{
    AlignmentReader, AlignmentRecord, AlignmentSource, FileHeader, IndexedAlignmentFile,
    RecordIter, UNSET_MAPPING_QUALITY, UNSET_POSITION, UNSET_STRING,
};
use crate::types::{HeaderLine, Program, ReadGroup, RefSequence};
use crate::{Error, Result};
use noodles::bam;
use noodles::bam::bai;
use noodles::bgzf;
use noodles::core::region::Interval;
use noodles::core::{Position, Region};
use noodles::sam;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::data::field::value::Array;
use std::fs::File;
use std::path::{Path, PathBuf};

/// BAM files with a BAI companion index.
#[derive(Debug, Clone, Copy, Default)]
pub struct BamSource;

impl BamSource {
    /// Appended (`file.bam.bai`) and replaced (`file.bai`) conventions, in that order
    fn index_candidates(path: &Path) -> [PathBuf; 2] {
        [
            PathBuf::from(format!("{}.bai", path.display())),
            path.with_extension("bai"),
        ]
    }
}

impl AlignmentSource for BamSource {
    fn recognizes(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bam"))
    }

    fn index_path(&self, path: &Path) -> Option<PathBuf> {
        Self::index_candidates(path)
            .into_iter()
            .find(|candidate| candidate.is_file())
    }

    fn read_header(&self, path: &Path) -> Result<FileHeader> {
        // bam::io::Reader::new wraps the file in a BGZF reader internally - don't double-wrap
        let mut reader = File::open(path).map(bam::io::Reader::new)?;

        let header = reader.read_header().map_err(|e| {
            Error::Internal(format!(
                "failed to read BAM header of {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(header_metadata(&header))
    }

    fn open(&self, file: &IndexedAlignmentFile) -> Result<Box<dyn AlignmentReader>> {
        let index = bai::fs::read(file.index_path()).map_err(|e| {
            Error::Internal(format!(
                "failed to read BAI index {}: {}",
                file.index_path().display(),
                e
            ))
        })?;

        let mut reader = bam::io::indexed_reader::Builder::default()
            .set_index(index)
            .build_from_path(file.path())?;

        let header = reader.read_header().map_err(|e| {
            Error::Internal(format!(
                "failed to read BAM header of {}: {}",
                file.path().display(),
                e
            ))
        })?;

        Ok(Box::new(BamReader { reader, header }))
    }
}

struct BamReader {
    reader: bam::io::IndexedReader<bgzf::io::Reader<File>>,
    header: sam::Header,
}

impl AlignmentReader for BamReader {
    fn query_overlapping<'a>(
        &'a mut self,
        sequence_name: &str,
        start: u64,
        end: Option<u64>,
    ) -> Result<RecordIter<'a>> {
        let Self { reader, header } = self;

        if header
            .reference_sequences()
            .get_index_of(sequence_name.as_bytes())
            .is_none()
        {
            return Ok(Box::new(std::iter::empty()));
        }

        let region = Region::new(sequence_name, interval(start, end)?);
        let query = reader
            .query(header, &region)
            .map_err(|e| Error::Internal(format!("index query failed: {}", e)))?;

        let header: &'a sam::Header = header;
        Ok(Box::new(query.map(move |result| {
            let record = result?;
            to_alignment_record(header, &record)
        })))
    }
}

fn position(value: u64) -> Result<Position> {
    usize::try_from(value)
        .ok()
        .and_then(|n| Position::try_from(n).ok())
        .ok_or_else(|| Error::InvalidRange(format!("invalid position: {}", value)))
}

/// `[start, end)` as a noodles interval (1-based, closed)
fn interval(start: u64, end: Option<u64>) -> Result<Interval> {
    let start = position(start)?;
    match end {
        Some(end) => {
            let last = position(end.saturating_sub(1))?;
            if last < start {
                return Err(Error::InvalidRange(format!(
                    "empty range ending at {}",
                    end
                )));
            }
            Ok(Interval::from(start..=last))
        }
        None => Ok(Interval::from(start..)),
    }
}

fn to_alignment_record(header: &sam::Header, record: &bam::Record) -> Result<AlignmentRecord> {
    let record = RecordBuf::try_from_alignment_record(header, record)?;

    let reference_name = |id: Option<usize>| {
        id.and_then(|id| header.reference_sequences().get_index(id))
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| UNSET_STRING.to_string())
    };
    let start_of = |position: Option<Position>| {
        position
            .map(|p| usize::from(p) as u64)
            .unwrap_or(UNSET_POSITION)
    };

    Ok(AlignmentRecord {
        name: record
            .name()
            .map(|name| name.to_string())
            .unwrap_or_else(|| UNSET_STRING.to_string()),
        flags: u16::from(record.flags()),
        reference_index: record.reference_sequence_id(),
        reference_name: reference_name(record.reference_sequence_id()),
        alignment_start: start_of(record.alignment_start()),
        mapping_quality: record
            .mapping_quality()
            .map(u8::from)
            .unwrap_or(UNSET_MAPPING_QUALITY),
        cigar: format_cigar(record.cigar().as_ref()),
        mate_reference_name: reference_name(record.mate_reference_sequence_id()),
        mate_alignment_start: start_of(record.mate_alignment_start()),
        template_length: record.template_length(),
        sequence: format_sequence(record.sequence().as_ref()),
        quality: format_quality(record.quality_scores().as_ref()),
        tags: record
            .data()
            .iter()
            .map(|(tag, value)| (format_tag(tag), format_value(value)))
            .collect(),
    })
}

fn format_cigar(ops: &[Op]) -> String {
    if ops.is_empty() {
        return UNSET_STRING.to_string();
    }
    ops.iter()
        .map(|op| {
            let code = match op.kind() {
                Kind::Match => 'M',
                Kind::Insertion => 'I',
                Kind::Deletion => 'D',
                Kind::Skip => 'N',
                Kind::SoftClip => 'S',
                Kind::HardClip => 'H',
                Kind::Pad => 'P',
                Kind::SequenceMatch => '=',
                Kind::SequenceMismatch => 'X',
            };
            format!("{}{}", op.len(), code)
        })
        .collect()
}

fn format_sequence(bases: &[u8]) -> String {
    if bases.is_empty() {
        return UNSET_STRING.to_string();
    }
    String::from_utf8_lossy(bases).into_owned()
}

/// Phred scores as a `+33` ASCII string; missing scores are `*`.
fn format_quality(scores: &[u8]) -> String {
    if scores.is_empty() || scores.iter().any(|&q| q == 0xff) {
        return UNSET_STRING.to_string();
    }
    scores.iter().map(|&q| char::from(q.saturating_add(33))).collect()
}

fn format_tag<T: AsRef<[u8; 2]>>(tag: T) -> String {
    String::from_utf8_lossy(tag.as_ref()).into_owned()
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Character(c) => char::from(*c).to_string(),
        Value::Int8(n) => n.to_string(),
        Value::UInt8(n) => n.to_string(),
        Value::Int16(n) => n.to_string(),
        Value::UInt16(n) => n.to_string(),
        Value::Int32(n) => n.to_string(),
        Value::UInt32(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::String(s) | Value::Hex(s) => s.to_string(),
        Value::Array(array) => match array {
            Array::Int8(values) => join(values),
            Array::UInt8(values) => join(values),
            Array::Int16(values) => join(values),
            Array::UInt16(values) => join(values),
            Array::Int32(values) => join(values),
            Array::UInt32(values) => join(values),
            Array::Float(values) => join(values),
        },
    }
}

fn field<V: ToString>(value: Option<V>) -> Option<String> {
    value.map(|v| v.to_string())
}

/// Flatten a noodles header into catalog metadata.
pub(crate) fn header_metadata(header: &sam::Header) -> FileHeader {
    use noodles::sam::header::record::value::map::header::tag as header_tag;
    use noodles::sam::header::record::value::map::program::tag as pg_tag;
    use noodles::sam::header::record::value::map::read_group::tag as rg_tag;
    use noodles::sam::header::record::value::map::reference_sequence::tag as sq_tag;

    let header_line = header.header().map(|map| {
        HeaderLine {
            version: Some(map.version().to_string()),
            sorting_order: field(map.other_fields().get(&header_tag::SORT_ORDER)),
        }
    });

    let ref_sequences = header
        .reference_sequences()
        .iter()
        .map(|(name, map)| {
            let fields = map.other_fields();
            RefSequence {
                name: name.to_string(),
                length: map.length().get() as u64,
                assembly_id: field(fields.get(&sq_tag::ASSEMBLY_ID)),
                md5_checksum: field(fields.get(&sq_tag::MD5_CHECKSUM)),
                species: field(fields.get(&sq_tag::SPECIES)),
                uri: field(fields.get(&sq_tag::URI)),
            }
        })
        .collect();

    let read_groups = header
        .read_groups()
        .iter()
        .map(|(id, map)| {
            let fields = map.other_fields();
            ReadGroup {
                id: id.to_string(),
                sequencing_center_name: field(fields.get(&rg_tag::SEQUENCING_CENTER)),
                description: field(fields.get(&rg_tag::DESCRIPTION)),
                date: field(fields.get(&rg_tag::PRODUCED_AT)),
                flow_order: field(fields.get(&rg_tag::FLOW_ORDER)),
                key_sequence: field(fields.get(&rg_tag::KEY_SEQUENCE)),
                library: field(fields.get(&rg_tag::LIBRARY)),
                processing_program: field(fields.get(&rg_tag::PROGRAM)),
                predicted_insert_size: fields
                    .get(&rg_tag::PREDICTED_MEDIAN_INSERT_SIZE)
                    .and_then(|v| v.to_string().parse().ok()),
                sequencing_technology: field(fields.get(&rg_tag::PLATFORM)),
                platform_unit: field(fields.get(&rg_tag::PLATFORM_UNIT)),
                sample: field(fields.get(&rg_tag::SAMPLE)),
            }
        })
        .collect();

    let programs = header
        .programs()
        .as_ref()
        .iter()
        .map(|(id, map)| {
            let fields = map.other_fields();
            Program {
                id: id.to_string(),
                name: field(fields.get(&pg_tag::NAME)),
                command_line: field(fields.get(&pg_tag::COMMAND_LINE)),
                prev_program_id: field(fields.get(&pg_tag::PREVIOUS_PROGRAM_ID)),
                version: field(fields.get(&pg_tag::VERSION)),
            }
        })
        .collect();

    FileHeader {
        header_line,
        ref_sequences,
        read_groups,
        programs,
        comments: header.comments().iter().map(|c| c.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use noodles::sam::header::record::value::Map;
    use noodles::sam::header::record::value::map::read_group::tag as rg_tag;
    use noodles::sam::header::record::value::map::{ReadGroup as ReadGroupMap, ReferenceSequence};
    use std::num::NonZeroUsize;

    #[test]
    fn test_recognizes_bam_extension() {
        assert!(BamSource.recognizes(Path::new("/data/sample.bam")));
        assert!(BamSource.recognizes(Path::new("/data/SAMPLE.BAM")));
        assert!(!BamSource.recognizes(Path::new("/data/sample.bam.bai")));
        assert!(!BamSource.recognizes(Path::new("/data/sample.cram")));
    }

    #[test]
    fn test_index_path_conventions() {
        let dir = tempfile::tempdir().unwrap();
        let appended = dir.path().join("a.bam");
        let replaced = dir.path().join("b.bam");
        let missing = dir.path().join("c.bam");
        std::fs::write(dir.path().join("a.bam.bai"), b"").unwrap();
        std::fs::write(dir.path().join("b.bai"), b"").unwrap();

        assert_eq!(
            BamSource.index_path(&appended),
            Some(dir.path().join("a.bam.bai"))
        );
        assert_eq!(BamSource.index_path(&replaced), Some(dir.path().join("b.bai")));
        assert_eq!(BamSource.index_path(&missing), None);
    }

    #[test]
    fn test_format_cigar() {
        let ops = [
            Op::new(Kind::SoftClip, 2),
            Op::new(Kind::Match, 10),
            Op::new(Kind::Deletion, 1),
            Op::new(Kind::Match, 5),
        ];
        assert_eq!(format_cigar(&ops), "2S10M1D5M");
        assert_eq!(format_cigar(&[]), "*");
    }

    #[test]
    fn test_format_quality() {
        assert_eq!(format_quality(&[0, 30, 40]), "!?I");
        assert_eq!(format_quality(&[]), "*");
        assert_eq!(format_quality(&[0xff, 0xff]), "*");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::from("readgroup1")), "readgroup1");
        assert_eq!(format_value(&Value::Int32(-7)), "-7");
        assert_eq!(format_value(&Value::Character(b'Z')), "Z");
        assert_eq!(
            format_value(&Value::Array(Array::UInt16(vec![1, 2, 3]))),
            "1,2,3"
        );
    }

    #[test]
    fn test_interval_rejects_empty_range() {
        assert!(interval(10, Some(10)).is_err());
        assert!(interval(0, None).is_err());
        assert!(interval(10, Some(11)).is_ok());
        assert!(interval(1, None).is_ok());
    }

    #[test]
    fn test_header_metadata() {
        let read_group = Map::<ReadGroupMap>::builder()
            .insert(rg_tag::SAMPLE, String::from("sample1"))
            .insert(rg_tag::LIBRARY, String::from("lib1"))
            .build()
            .unwrap();
        let reference = Map::<ReferenceSequence>::new(NonZeroUsize::new(10).unwrap());
        let header = sam::Header::builder()
            .add_reference_sequence(BString::from("reference"), reference)
            .add_read_group(BString::from("readgroup1"), read_group)
            .add_comment("made by a test")
            .build();

        let metadata = header_metadata(&header);
        assert_eq!(metadata.ref_sequences.len(), 1);
        assert_eq!(metadata.ref_sequences[0].name, "reference");
        assert_eq!(metadata.ref_sequences[0].length, 10);
        assert_eq!(metadata.read_groups[0].id, "readgroup1");
        assert_eq!(metadata.read_groups[0].sample.as_deref(), Some("sample1"));
        assert_eq!(metadata.read_groups[0].library.as_deref(), Some("lib1"));
        assert_eq!(metadata.comments, vec!["made by a test"]);
        assert!(metadata.programs.is_empty());
    }

    #[test]
    fn test_header_metadata_sort_order() {
        use noodles::sam::header::record::value::map::Header as HeaderMap;
        use noodles::sam::header::record::value::map::header::tag as header_tag;

        let hd = Map::<HeaderMap>::builder()
            .insert(header_tag::SORT_ORDER, BString::from("coordinate"))
            .build()
            .unwrap();
        let header = sam::Header::builder().set_header(hd).build();

        let metadata = header_metadata(&header);
        let header_line = metadata.header_line.unwrap();
        assert_eq!(header_line.sorting_order.as_deref(), Some("coordinate"));
        assert!(header_line.version.is_some());
    }
}

use super::CatalogReadset;
use crate::formats::{AlignmentFile, AlignmentSource, IndexedAlignmentFile};
use crate::types::Readset;
use crate::Result;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns dataset directories into readsets, one per sample.
///
/// Readset IDs come from a counter owned by the builder, so IDs are unique
/// across every dataset built by the same builder.
pub struct ReadsetCatalogBuilder<'a> {
    source: &'a dyn AlignmentSource,
    next_id: u64,
}

impl<'a> ReadsetCatalogBuilder<'a> {
    pub fn new(source: &'a dyn AlignmentSource) -> Self {
        Self { source, next_id: 1 }
    }

    fn next_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }

    /// Scan `root` and group its indexed alignment files by sample.
    ///
    /// Failing to read a directory is fatal; files without an index or with
    /// an unreadable header are skipped.
    pub fn build_dataset(&mut self, dataset_id: &str, root: &Path) -> Result<Vec<CatalogReadset>> {
        let root = fs::canonicalize(root)?;
        let files = self.discover(&root)?;

        let mut by_sample: BTreeMap<String, Vec<Arc<IndexedAlignmentFile>>> = BTreeMap::new();
        for file in &files {
            let samples = file.header().samples();
            if samples.is_empty() {
                warn!("{} declares no sample, skipping", file.path().display());
            }
            for sample in samples {
                by_sample.entry(sample).or_default().push(Arc::clone(file));
            }
        }

        let created = chrono::Utc::now().timestamp_millis();
        let readsets: Vec<_> = by_sample
            .into_iter()
            .map(|(sample, files)| {
                let mut file_data: Vec<_> = files.iter().map(|f| f.file_data()).collect();
                file_data.sort_by(|a, b| a.file_uri.cmp(&b.file_uri));
                CatalogReadset {
                    readset: Readset {
                        id: self.next_id(),
                        name: sample,
                        dataset_id: dataset_id.to_string(),
                        created,
                        file_data,
                    },
                    files,
                }
            })
            .collect();

        info!(
            "dataset {}: {} readset(s) from {} indexed file(s) under {}",
            dataset_id,
            readsets.len(),
            files.len(),
            root.display()
        );
        Ok(readsets)
    }

    /// Indexed alignment files under `root`, in path order.
    fn discover(&self, root: &Path) -> Result<Vec<Arc<IndexedAlignmentFile>>> {
        let mut paths = Vec::new();
        collect_files(root, &mut paths)?;

        let mut files = Vec::new();
        for path in paths {
            let Some(file) = AlignmentFile::discover(self.source, &path) else {
                continue;
            };
            if !file.has_index() {
                warn!("no index for {}, skipping", path.display());
                continue;
            }
            match file.into_indexed(self.source) {
                Ok(Some(indexed)) => files.push(Arc::new(indexed)),
                Ok(None) => {}
                Err(e) => warn!("cannot read header of {}, skipping: {}", path.display(), e),
            }
        }
        Ok(files)
    }
}

/// Depth-first walk collecting regular, readable files. Entries are visited
/// in name order and symbolic links are not followed.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let metadata = fs::symlink_metadata(&path)?;
        if metadata.is_dir() {
            collect_files(&path, out)?;
        } else if metadata.is_file() {
            if File::open(&path).is_ok() {
                out.push(path);
            } else {
                debug!("{} is not readable, skipping", path.display());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::MemoryFile;
    use crate::test_support::Fixture;

    fn sample_file(read_groups: &[(&str, &str)]) -> MemoryFile {
        read_groups
            .iter()
            .fold(MemoryFile::default(), |file, (id, sample)| {
                file.with_read_group(id, sample)
            })
    }

    #[test]
    fn test_groups_files_by_sample() {
        let mut fixture = Fixture::new();
        let a = fixture.add("data/a.bam", sample_file(&[("rg1", "s1"), ("rg2", "s2")]));
        let b = fixture.add("data/nested/b.bam", sample_file(&[("rg1", "s1")]));
        fixture.touch("data/notes.txt");

        let mut builder = ReadsetCatalogBuilder::new(&fixture.source);
        let readsets = builder
            .build_dataset("dataset", &fixture.root().join("data"))
            .unwrap();

        assert_eq!(readsets.len(), 2);
        assert_eq!(readsets[0].sample(), "s1");
        assert_eq!(readsets[0].id(), "1");
        assert_eq!(readsets[0].dataset_id(), "dataset");
        let s1_files: Vec<_> = readsets[0].files().iter().map(|f| f.path().to_path_buf()).collect();
        assert_eq!(s1_files, vec![a.clone(), b]);

        assert_eq!(readsets[1].sample(), "s2");
        assert_eq!(readsets[1].id(), "2");
        assert_eq!(readsets[1].files().len(), 1);
        assert_eq!(readsets[1].files()[0].path(), a);
    }

    #[test]
    fn test_ids_continue_across_datasets() {
        let mut fixture = Fixture::new();
        fixture.add("one/a.bam", sample_file(&[("rg1", "s1")]));
        fixture.add("two/a.bam", sample_file(&[("rg1", "s1")]));

        let mut builder = ReadsetCatalogBuilder::new(&fixture.source);
        let first = builder.build_dataset("one", &fixture.root().join("one")).unwrap();
        let second = builder.build_dataset("two", &fixture.root().join("two")).unwrap();
        assert_eq!(first[0].id(), "1");
        assert_eq!(second[0].id(), "2");
        assert_eq!(second[0].sample(), "s1");
    }

    #[test]
    fn test_skips_files_without_index_or_sample() {
        let mut fixture = Fixture::new();
        fixture.add("data/indexed.bam", sample_file(&[("rg1", "s1")]));
        fixture.add(
            "data/unindexed.bam",
            sample_file(&[("rg1", "s2")]).without_index(),
        );
        fixture.add("data/anonymous.bam", MemoryFile::default());

        let mut builder = ReadsetCatalogBuilder::new(&fixture.source);
        let readsets = builder
            .build_dataset("dataset", &fixture.root().join("data"))
            .unwrap();
        assert_eq!(readsets.len(), 1);
        assert_eq!(readsets[0].sample(), "s1");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let mut fixture = Fixture::new();
        let target = fixture.add("elsewhere/a.bam", sample_file(&[("rg1", "s1")]));
        std::fs::create_dir_all(fixture.root().join("data")).unwrap();
        let link = fixture.root().join("data/link.bam");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        std::os::unix::fs::symlink(
            fixture.root().join("elsewhere"),
            fixture.root().join("data/linked_dir"),
        )
        .unwrap();
        // recognizable through either link if links were followed
        fixture.source.insert(link, sample_file(&[("rg1", "s1")]));
        fixture.source.insert(
            fixture.root().join("data/linked_dir/a.bam"),
            sample_file(&[("rg1", "s1")]),
        );

        let mut builder = ReadsetCatalogBuilder::new(&fixture.source);
        let readsets = builder
            .build_dataset("dataset", &fixture.root().join("data"))
            .unwrap();
        assert!(readsets.is_empty());
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let fixture = Fixture::new();
        let mut builder = ReadsetCatalogBuilder::new(&fixture.source);
        assert!(
            builder
                .build_dataset("dataset", &fixture.root().join("missing"))
                .is_err()
        );
    }

    #[test]
    fn test_file_data_is_attached() {
        let mut fixture = Fixture::new();
        fixture.add(
            "data/a.bam",
            sample_file(&[("rg1", "s1")]).with_reference("reference", 100),
        );
        let mut builder = ReadsetCatalogBuilder::new(&fixture.source);
        let readsets = builder
            .build_dataset("dataset", &fixture.root().join("data"))
            .unwrap();

        let file_data = &readsets[0].readset().file_data;
        assert_eq!(file_data.len(), 1);
        assert!(file_data[0].file_uri.starts_with("file://"));
        assert!(file_data[0].file_uri.ends_with("/data/a.bam"));
        assert_eq!(file_data[0].ref_sequences[0].name, "reference");
        assert_eq!(file_data[0].read_groups[0].sample.as_deref(), Some("s1"));
    }
}

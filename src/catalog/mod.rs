//! The read-only catalog of datasets and readsets.
//!
//! Built once at startup from `(dataset id, directory)` pairs and shared by
//! every request afterwards. Nothing in it changes after [`Catalog::build`].

mod builder;

pub use builder::ReadsetCatalogBuilder;

use crate::config::DatasetSpec;
use crate::formats::{AlignmentSource, IndexedAlignmentFile};
use crate::query::{Cancellation, Fingerprint, QueryDescriptor, QueryEngine};
use crate::types::{Dataset, Readset, SearchReadsRequest, SearchReadsResponse};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A readset together with the files backing it.
#[derive(Debug, Clone)]
pub struct CatalogReadset {
    readset: Readset,
    files: Vec<Arc<IndexedAlignmentFile>>,
}

impl CatalogReadset {
    pub fn id(&self) -> &str {
        &self.readset.id
    }

    pub fn sample(&self) -> &str {
        &self.readset.name
    }

    pub fn dataset_id(&self) -> &str {
        &self.readset.dataset_id
    }

    /// Never empty, in path order
    pub fn files(&self) -> &[Arc<IndexedAlignmentFile>] {
        &self.files
    }

    pub fn readset(&self) -> &Readset {
        &self.readset
    }
}

#[derive(Debug)]
struct CatalogFile {
    file: Arc<IndexedAlignmentFile>,
    datasets: BTreeSet<String>,
}

pub struct Catalog {
    datasets: BTreeMap<String, Dataset>,
    /// In ID order
    readsets: Vec<CatalogReadset>,
    readset_index: HashMap<String, usize>,
    /// dataset id -> sample -> readset
    readsets_by_sample: BTreeMap<String, BTreeMap<String, usize>>,
    files: BTreeMap<PathBuf, CatalogFile>,
    fingerprint: Fingerprint,
    source: Arc<dyn AlignmentSource>,
    page_size: usize,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("datasets", &self.datasets.len())
            .field("readsets", &self.readsets.len())
            .field("files", &self.files.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl Catalog {
    pub fn build(
        datasets: &[DatasetSpec],
        source: Arc<dyn AlignmentSource>,
        page_size: usize,
    ) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::InvalidInput("page size must be at least 1".to_string()));
        }

        let mut dataset_map = BTreeMap::new();
        let mut readsets = Vec::new();
        {
            let mut builder = ReadsetCatalogBuilder::new(source.as_ref());
            for spec in datasets {
                if dataset_map.contains_key(&spec.id) {
                    return Err(Error::InvalidInput(format!(
                        "dataset {} is configured twice",
                        spec.id
                    )));
                }
                dataset_map.insert(spec.id.clone(), Dataset::new(spec.id.clone()));
                readsets.extend(builder.build_dataset(&spec.id, &spec.directory)?);
            }
        }

        let mut readset_index = HashMap::new();
        let mut readsets_by_sample: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        let mut files: BTreeMap<PathBuf, CatalogFile> = BTreeMap::new();
        for (i, readset) in readsets.iter().enumerate() {
            readset_index.insert(readset.id().to_string(), i);
            readsets_by_sample
                .entry(readset.dataset_id().to_string())
                .or_default()
                .insert(readset.sample().to_string(), i);
            for file in readset.files() {
                files
                    .entry(file.path().to_path_buf())
                    .or_insert_with(|| CatalogFile {
                        file: Arc::clone(file),
                        datasets: BTreeSet::new(),
                    })
                    .datasets
                    .insert(readset.dataset_id().to_string());
            }
        }

        let fingerprint = fingerprint(&dataset_map, &readsets_by_sample, &readsets);
        info!(
            "catalog ready: {} dataset(s), {} readset(s), {} file(s)",
            dataset_map.len(),
            readsets.len(),
            files.len()
        );

        Ok(Self {
            datasets: dataset_map,
            readsets,
            readset_index,
            readsets_by_sample,
            files,
            fingerprint,
            source,
            page_size,
        })
    }

    pub fn get_dataset(&self, id: &str) -> Result<Dataset> {
        self.datasets
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("dataset {}", id)))
    }

    pub fn get_readset(&self, id: &str) -> Result<Readset> {
        self.readset_index
            .get(id)
            .map(|&i| self.readsets[i].readset.clone())
            .ok_or_else(|| Error::NotFound(format!("readset {}", id)))
    }

    /// Datasets, optionally restricted to one project
    pub fn list_datasets(&self, project_id: Option<i64>) -> Vec<Dataset> {
        self.datasets
            .values()
            .filter(|dataset| project_id.is_none_or(|id| dataset.project_id == id))
            .cloned()
            .collect()
    }

    /// Readsets of the given datasets, or of all datasets when none are given.
    pub fn search_readsets(&self, dataset_ids: &[String]) -> Result<Vec<Readset>> {
        Ok(self
            .resolve_readsets(dataset_ids, &[])?
            .into_iter()
            .map(|readset| readset.readset.clone())
            .collect())
    }

    pub fn search_reads(
        &self,
        request: &SearchReadsRequest,
        cancel: &Cancellation,
    ) -> Result<SearchReadsResponse> {
        QueryEngine::new(self, cancel).search(request)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub(crate) fn source(&self) -> &dyn AlignmentSource {
        self.source.as_ref()
    }

    pub(crate) fn file(&self, path: &Path) -> Option<&Arc<IndexedAlignmentFile>> {
        self.files.get(path).map(|entry| &entry.file)
    }

    /// Readsets selected by a request. Dataset and readset filters are
    /// exclusive; with neither, every readset is selected.
    pub(crate) fn resolve_readsets(
        &self,
        dataset_ids: &[String],
        readset_ids: &[String],
    ) -> Result<Vec<&CatalogReadset>> {
        match (dataset_ids.is_empty(), readset_ids.is_empty()) {
            (false, false) => Err(Error::InvalidInput(
                "datasetIds and readsetIds cannot both be given".to_string(),
            )),
            (true, true) => Ok(self.readsets.iter().collect()),
            (false, true) => {
                for id in dataset_ids {
                    if !self.datasets.contains_key(id) {
                        return Err(Error::NotFound(format!("dataset {}", id)));
                    }
                }
                Ok(self
                    .readsets
                    .iter()
                    .filter(|readset| {
                        dataset_ids
                            .iter()
                            .any(|id| id.as_str() == readset.dataset_id())
                    })
                    .collect())
            }
            (true, false) => {
                let mut selected = BTreeSet::new();
                for id in readset_ids {
                    let i = self
                        .readset_index
                        .get(id)
                        .ok_or_else(|| Error::NotFound(format!("readset {}", id)))?;
                    selected.insert(*i);
                }
                Ok(selected.into_iter().map(|i| &self.readsets[i]).collect())
            }
        }
    }

    /// Decode a page token and check that it only names files of this catalog.
    pub(crate) fn decode_page_token(&self, token: &str) -> Result<QueryDescriptor> {
        let descriptor = QueryDescriptor::from_page_token(token, &self.fingerprint)?;
        if let Some(path) = descriptor.starts.keys().find(|p| !self.files.contains_key(*p)) {
            return Err(Error::InvalidPageToken(format!(
                "unknown file {}",
                path.display()
            )));
        }
        Ok(descriptor)
    }

    /// Map the read groups of `file` to the requested readset they belong to.
    /// Read groups outside the requested readsets are left out.
    pub(crate) fn readsets_by_read_group(
        &self,
        file: &IndexedAlignmentFile,
        requested: &HashSet<&str>,
    ) -> HashMap<String, String> {
        let Some(entry) = self.files.get(file.path()) else {
            return HashMap::new();
        };

        file.header()
            .read_groups
            .iter()
            .filter_map(|read_group| {
                let sample = read_group.sample.as_deref()?;
                entry
                    .datasets
                    .iter()
                    .filter_map(|dataset| self.readsets_by_sample.get(dataset)?.get(sample))
                    .map(|&i| self.readsets[i].id())
                    .find(|id| requested.contains(id))
                    .map(|id| (read_group.id.clone(), id.to_string()))
            })
            .collect()
    }
}

/// Digest of dataset ids, samples and file paths.
fn fingerprint(
    datasets: &BTreeMap<String, Dataset>,
    readsets_by_sample: &BTreeMap<String, BTreeMap<String, usize>>,
    readsets: &[CatalogReadset],
) -> Fingerprint {
    let mut hasher = Sha256::new();
    for dataset_id in datasets.keys() {
        hasher.update(dataset_id.as_bytes());
        hasher.update([0]);
        let Some(samples) = readsets_by_sample.get(dataset_id) else {
            continue;
        };
        for (sample, &i) in samples {
            hasher.update([1]);
            hasher.update(sample.as_bytes());
            for file in readsets[i].files() {
                hasher.update([2]);
                hasher.update(file.path().as_os_str().as_encoded_bytes());
            }
        }
    }
    hasher.finalize().into()
}

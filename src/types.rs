use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: String,
    pub project_id: i64,
    pub is_public: bool,
}

impl Dataset {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_id: 0,
            is_public: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readset {
    pub id: String,
    pub name: String,
    pub dataset_id: String,
    pub created: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_data: Vec<FileData>,
}

/// Header metadata of one file backing a readset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub file_uri: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: Vec<HeaderLine>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ref_sequences: Vec<RefSequence>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub read_groups: Vec<ReadGroup>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub programs: Vec<Program>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: Vec<String>,
}

/// The `@HD` line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorting_order: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefSequence {
    pub name: String,
    pub length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembly_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadGroup {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequencing_center_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_sequence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_insert_size: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequencing_technology: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_program_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// One aligned read as returned by a search. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Read {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readset_id: Option<String>,
    pub flags: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_sequence_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cigar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate_reference_sequence_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate_position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_length: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_bases: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aligned_bases: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_quality: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: BTreeMap<String, String>,
}

/// Query parameters for `GET /datasets`
#[derive(Debug, Deserialize, Default)]
pub struct ListDatasetsQuery {
    #[serde(rename = "projectId")]
    pub project_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDatasetsResponse {
    pub datasets: Vec<Dataset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReadsetsRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub dataset_ids: Vec<String>,
    #[serde(default)]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReadsetsResponse {
    pub readsets: Vec<Readset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReadsRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub dataset_ids: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub readset_ids: Vec<String>,
    #[serde(default)]
    pub sequence_name: Option<String>,
    #[serde(default)]
    pub sequence_start: Option<u64>,
    #[serde(default)]
    pub sequence_end: Option<u64>,
    #[serde(default)]
    pub page_token: Option<String>,
}

impl SearchReadsRequest {
    pub fn for_sequence(sequence_name: impl Into<String>) -> Self {
        Self {
            sequence_name: Some(sequence_name.into()),
            ..Self::default()
        }
    }

    pub fn with_page_token(mut self, page_token: Option<String>) -> Self {
        self.page_token = page_token;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReadsResponse {
    pub reads: Vec<Read>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

//! Turning JSON dataset records into [`Document`]s.
//!
//! A dataset is a JSON array of objects. One key holds the document text;
//! the remaining keys (or an explicit allow-list of them) become metadata.
//!
//! Invalid records are skipped and reported individually in a
//! [`LoadReport`]. Loading only fails outright when no record in the batch
//! is usable.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::document::{CHUNK_INDEX_KEY, Document};
use crate::error::{RagError, Result};

/// How records are mapped onto documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatasetOptions {
    /// Key holding the primary text.
    pub text_field: String,
    /// Keys copied into metadata. `None` copies every key except the text
    /// and id fields.
    pub metadata_fields: Option<Vec<String>>,
    /// Key holding the document id. Records without it use their position.
    pub id_field: Option<String>,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self { text_field: "content".to_string(), metadata_fields: None, id_field: None }
    }
}

impl DatasetOptions {
    /// Use `field` as the text field.
    pub fn with_text_field(mut self, field: impl Into<String>) -> Self {
        self.text_field = field.into();
        self
    }

    /// Restrict metadata to the given keys.
    pub fn with_metadata_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Take document ids from `field`.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }
}

/// A record that was skipped during loading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    /// Position of the record in the input.
    pub index: usize,
    /// Why the record was rejected.
    pub reason: String,
}

/// The outcome of converting a batch of records.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Documents built from valid records, in input order.
    pub documents: Vec<Document>,
    /// Records that were skipped.
    pub rejected: Vec<RejectedRecord>,
}

/// Convert one JSON record into a document.
///
/// `index` is the record's position and becomes the document id unless
/// `options.id_field` names a present key.
///
/// # Errors
///
/// Returns [`RagError::DatasetError`] if the record is not an object, the
/// text field is missing, not a string or blank, a metadata value is
/// `null`, an array or an object, or the record carries the reserved
/// `chunk_index` metadata key.
pub fn parse_record(index: usize, record: &Value, options: &DatasetOptions) -> Result<Document> {
    convert(record, index, options).map_err(|reason| RagError::dataset(Some(index), reason))
}

fn convert(
    record: &Value,
    position: usize,
    options: &DatasetOptions,
) -> std::result::Result<Document, String> {
    let object = record.as_object().ok_or("record is not a JSON object")?;

    let text = match object.get(&options.text_field) {
        Some(Value::String(text)) if !text.trim().is_empty() => text.clone(),
        Some(Value::String(_)) => {
            return Err(format!("text field '{}' is empty", options.text_field));
        }
        Some(other) => {
            return Err(format!(
                "text field '{}' has type {}, expected a string",
                options.text_field,
                kind(other)
            ));
        }
        None => return Err(format!("missing text field '{}'", options.text_field)),
    };

    let id = match options.id_field.as_deref().and_then(|field| object.get(field)) {
        Some(value) => scalar_to_string(value)
            .ok_or_else(|| format!("id field has type {}, expected a scalar", kind(value)))?,
        None => position.to_string(),
    };

    let mut metadata = HashMap::new();
    for (key, value) in object {
        if *key == options.text_field || options.id_field.as_deref() == Some(key.as_str()) {
            continue;
        }
        if let Some(allowed) = &options.metadata_fields {
            if !allowed.iter().any(|f| f == key) {
                continue;
            }
        }
        if key == CHUNK_INDEX_KEY {
            return Err(format!(
                "metadata field '{CHUNK_INDEX_KEY}' is reserved for chunk positions"
            ));
        }
        let value = scalar_to_string(value).ok_or_else(|| {
            format!(
                "metadata field '{key}' has type {}, expected a string, number or boolean",
                kind(value)
            )
        })?;
        metadata.insert(key.clone(), value);
    }

    Ok(Document { id, text, metadata })
}

/// Converts record batches into documents with ids unique across batches.
///
/// Records without an id field are named after their overall position, so
/// the third record of a second batch of ten is document `"12"`.
#[derive(Debug, Clone, Default)]
pub struct DatasetLoader {
    options: DatasetOptions,
    next_position: usize,
    seen_ids: HashSet<String>,
}

impl DatasetLoader {
    /// Create a loader that maps records with `options`.
    pub fn new(options: DatasetOptions) -> Self {
        Self { options, next_position: 0, seen_ids: HashSet::new() }
    }

    /// The record mapping in use.
    pub fn options(&self) -> &DatasetOptions {
        &self.options
    }

    /// Convert a batch of records, skipping and reporting invalid ones.
    ///
    /// A record whose id was already produced by this loader is rejected as
    /// a duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DatasetError`] if the batch is empty or every
    /// record is invalid. The message includes the first rejection.
    pub fn parse_records(&mut self, records: &[Value]) -> Result<LoadReport> {
        if records.is_empty() {
            return Err(RagError::dataset(None, "dataset contains no records"));
        }

        let mut report = LoadReport::default();
        for (index, record) in records.iter().enumerate() {
            let converted = convert(record, self.next_position + index, &self.options)
                .and_then(|doc| {
                    if self.seen_ids.contains(&doc.id) {
                        Err(format!("duplicate document id '{}'", doc.id))
                    } else {
                        Ok(doc)
                    }
                });
            match converted {
                Ok(document) => {
                    self.seen_ids.insert(document.id.clone());
                    report.documents.push(document);
                }
                Err(reason) => {
                    warn!(record = index, %reason, "skipping invalid dataset record");
                    report.rejected.push(RejectedRecord { index, reason });
                }
            }
        }

        if report.documents.is_empty() {
            let first = report.rejected.first().map(|r| r.reason.as_str()).unwrap_or_default();
            return Err(RagError::dataset(
                None,
                format!("all {} records are invalid; first error: {first}", records.len()),
            ));
        }
        self.next_position += records.len();

        info!(
            documents = report.documents.len(),
            rejected = report.rejected.len(),
            "parsed dataset records"
        );
        Ok(report)
    }

    /// Read and convert a JSON dataset file.
    ///
    /// # Errors
    ///
    /// See [`read_json_file`] and [`DatasetLoader::parse_records`].
    pub fn load_json_file(&mut self, path: impl AsRef<Path>) -> Result<LoadReport> {
        self.parse_records(&read_json_file(path)?)
    }
}

/// Read a JSON array of records from `path`.
///
/// # Errors
///
/// Returns [`RagError::DatasetError`] if the file cannot be read, is not
/// valid JSON, or is not an array.
pub fn read_json_file(path: impl AsRef<Path>) -> Result<Vec<Value>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| RagError::dataset(None, format!("failed to read {}: {e}", path.display())))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| RagError::dataset(None, format!("invalid JSON in {}: {e}", path.display())))?;
    match value {
        Value::Array(records) => Ok(records),
        other => Err(RagError::dataset(
            None,
            format!("{} must contain a JSON array, found {}", path.display(), kind(&other)),
        )),
    }
}

/// Strings are kept verbatim; numbers and booleans use their JSON rendering.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

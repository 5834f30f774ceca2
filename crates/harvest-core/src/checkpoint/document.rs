//! Typed layer over a [`CheckpointStore`]: versioned job documents and
//! migration of the legacy bare-array shape.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

use super::error::CheckpointError;
use super::store::CheckpointStore;
use crate::services::LinkItem;

/// Version tag written into every structured document.
pub const DOCUMENT_VERSION: &str = "1.0";

#[derive(Serialize)]
struct DocumentRef<'a, J> {
    version: &'a str,
    jobs: &'a [J],
}

enum Decoded {
    Structured { version: String, jobs: Vec<Value> },
    Legacy(Vec<LinkItem>),
}

fn decode(value: Value) -> Result<Decoded, CheckpointError> {
    match value {
        Value::Array(entries) => {
            let items = entries
                .into_iter()
                .filter_map(|entry| match serde_json::from_value::<LinkItem>(entry) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        tracing::warn!("skipping malformed legacy checkpoint item: {}", e);
                        None
                    }
                })
                .collect();
            Ok(Decoded::Legacy(items))
        }
        Value::Object(mut map) => {
            let version = match map.remove("version") {
                Some(Value::String(v)) => v,
                Some(Value::Number(n)) => n.to_string(),
                _ => DOCUMENT_VERSION.to_string(),
            };
            let jobs = match map.remove("jobs") {
                Some(Value::Array(jobs)) => jobs,
                None | Some(Value::Null) => Vec::new(),
                Some(other) => {
                    return Err(CheckpointError::Malformed(format!(
                        "`jobs` must be an array, found {}",
                        json_kind(&other)
                    )))
                }
            };
            Ok(Decoded::Structured { version, jobs })
        }
        other => Err(CheckpointError::Malformed(format!(
            "expected an object or array, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Load the job collection stored at `path`.
///
/// A missing document yields an empty collection. Job entries that fail to
/// parse are skipped with a warning; absent fields take their defaults. A
/// legacy bare array is converted by `migrate` and the structured form is
/// written back before returning.
pub async fn load_jobs<J, F>(
    store: &dyn CheckpointStore,
    path: &Path,
    migrate: F,
) -> Result<Vec<J>, CheckpointError>
where
    J: Serialize + DeserializeOwned,
    F: FnOnce(Vec<LinkItem>) -> Vec<J>,
{
    let Some(value) = store.read_document(path).await? else {
        return Ok(Vec::new());
    };

    match decode(value)? {
        Decoded::Structured { version, jobs } => {
            if version != DOCUMENT_VERSION {
                tracing::debug!(path = %path.display(), %version, "reading checkpoint with different version tag");
            }
            let jobs = jobs
                .into_iter()
                .filter_map(|entry| match serde_json::from_value::<J>(entry) {
                    Ok(job) => Some(job),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "skipping malformed checkpoint job: {}", e);
                        None
                    }
                })
                .collect();
            Ok(jobs)
        }
        Decoded::Legacy(items) => {
            let count = items.len();
            let jobs = migrate(items);
            save_jobs(store, path, &jobs).await?;
            tracing::info!(
                path = %path.display(),
                "migrated {} item(s) from legacy checkpoint format",
                count
            );
            Ok(jobs)
        }
    }
}

/// Replace the document at `path` with `jobs`.
pub async fn save_jobs<J: Serialize>(
    store: &dyn CheckpointStore,
    path: &Path,
    jobs: &[J],
) -> Result<(), CheckpointError> {
    let document = serde_json::to_value(DocumentRef {
        version: DOCUMENT_VERSION,
        jobs,
    })?;
    store.write_document(path, &document).await
}

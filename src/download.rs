//! Download orchestrator.
//!
//! Retrieves the binary artifact of one COMPLETED job, derives a
//! deterministic filename, and hands the payload to a [`SaveSink`] — the
//! host's "save as" flow behind a capability so the logic stays testable.

use crate::api::{ApiClient, ApiError};
use crate::model::{Job, JobStatus};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const FILE_TAG: &str = "clipit";
const FILE_EXT: &str = ".mp4";

/// How many trailing characters of the source URL go into the filename.
const URL_STEM_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum RetrieveError {
    /// The artifact only exists once the job reaches COMPLETED.
    #[error("job {0} is not finished yet; try again once it completes")]
    NotReady(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("could not save artifact: {0}")]
    Save(#[source] anyhow::Error),
}

/// Materializes a finished artifact for the user. Implementations must
/// release any transient resource before returning, whether or not the user
/// keeps the file.
pub trait SaveSink: Send + Sync {
    fn trigger_save(&self, bytes: &[u8], filename: &str) -> anyhow::Result<PathBuf>;
}

/// Writes artifacts into a target directory — the terminal's native save flow.
pub struct DirSaveSink {
    dir: PathBuf,
}

impl DirSaveSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl SaveSink for DirSaveSink {
    fn trigger_save(&self, bytes: &[u8], filename: &str) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(filename);
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

pub struct Retriever {
    api: Arc<ApiClient>,
    sink: Arc<dyn SaveSink>,
}

impl Retriever {
    pub fn new(api: Arc<ApiClient>, sink: Arc<dyn SaveSink>) -> Self {
        Self { api, sink }
    }

    /// Fetch and save the artifact of `job`. A no-op error for anything not
    /// COMPLETED; failures never mutate job state — status truth lives
    /// server-side and self-corrects on the next poll.
    pub async fn retrieve(&self, job: &Job) -> Result<PathBuf, RetrieveError> {
        if job.status != JobStatus::Completed {
            return Err(RetrieveError::NotReady(job.external_id.clone()));
        }
        let payload = self.api.download_artifact(&job.external_id).await?;
        let filename = artifact_filename(job.original_url.as_deref(), &job.external_id);
        let path = self
            .sink
            .trigger_save(&payload, &filename)
            .map_err(RetrieveError::Save)?;
        info!(job = %job.external_id, file = %path.display(), "artifact saved");
        Ok(path)
    }
}

/// Deterministic artifact filename: `clipit-<stem>.mp4`, where the stem is
/// the tail of the source URL, or the job's external id when no URL was
/// recorded. Same `(originalUrl, externalId)` always yields the same name.
pub fn artifact_filename(original_url: Option<&str>, external_id: &str) -> String {
    let stem = match original_url.map(str::trim) {
        Some(url) if !url.is_empty() => tail_chars(url, URL_STEM_LEN),
        _ => external_id.to_string(),
    };
    format!("{FILE_TAG}-{}{FILE_EXT}", sanitize(&stem))
}

fn tail_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    chars[chars.len().saturating_sub(n)..].iter().collect()
}

/// Map filesystem-hostile characters to underscores, deterministically.
fn sanitize(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

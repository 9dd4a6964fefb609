use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub output_dir: PathBuf,
    pub user_agent: String,
}

/// Server-reported lifecycle state of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    // The job service writes QUEUED for freshly created jobs.
    #[serde(alias = "QUEUED")]
    Pending,
    Downloading,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Progress percentages are only meaningful in these states.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Downloading | JobStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Downloading => "DOWNLOADING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One job snapshot as reported by the server. The client never constructs
/// these itself; each poll result fully replaces the previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub external_id: String,
    #[serde(default)]
    pub original_url: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFormat {
    pub id: String,
    pub extension: String,
    pub resolution: String,
    pub fps: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub id: String,
    pub bit_rate: String,
    pub codec: String,
}

/// Formats offered for one media URL. Fetched on demand and owned by the
/// querying command; not cached across queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatCatalog {
    #[serde(default)]
    pub video_formats: Vec<VideoFormat>,
    #[serde(default)]
    pub audio_formats: Vec<AudioFormat>,
}

/// Render a WxH resolution string as the usual short label ("1080p").
pub fn resolution_label(resolution: &str) -> String {
    match resolution.split_once('x') {
        Some((_, height)) if !height.is_empty() => format!("{height}p"),
        _ => resolution.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    Combined,
    AudioOnly,
    VideoOnly,
}

/// Request body for `/jobs/start-job`. Built once from the user's selections
/// and discarded after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub youtube_url: String,
    pub video_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub resolution: Option<String>,
    pub format: String,
    pub audio_only: bool,
    pub video_only: bool,
}

impl JobSubmission {
    pub fn from_selection(
        url: &str,
        mode: DownloadMode,
        format: Option<&VideoFormat>,
        trim: Option<(String, String)>,
    ) -> Self {
        let (start_time, end_time) = match trim {
            Some((start, end)) => (Some(start), Some(end)),
            None => (None, None),
        };
        // Audio-only jobs always come out as mp3 and carry no video format id.
        let container = match mode {
            DownloadMode::AudioOnly => "mp3".to_string(),
            _ => format
                .map(|f| f.extension.clone())
                .unwrap_or_else(|| "mp4".to_string()),
        };
        Self {
            youtube_url: url.to_string(),
            video_id: match mode {
                DownloadMode::AudioOnly => None,
                _ => format.map(|f| f.id.clone()),
            },
            start_time,
            end_time,
            resolution: format.map(|f| f.resolution.clone()),
            format: container,
            audio_only: mode == DownloadMode::AudioOnly,
            video_only: mode == DownloadMode::VideoOnly,
        }
    }
}

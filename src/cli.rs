use crate::api::{ApiClient, TerminalNavigator};
use crate::download::{DirSaveSink, Retriever};
use crate::model::{
    resolution_label, ClientConfig, DownloadMode, FormatCatalog, Job, JobSubmission,
};
use crate::poller::{JobPoller, MissingJobs, DEFAULT_POLL_INTERVAL};
use crate::session::SessionStore;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for the stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr so rendering never blocks the
/// async tasks feeding it.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser)]
#[command(
    name = "clipit",
    version,
    about = "Terminal client for the ClipIt media conversion service"
)]
pub struct Cli {
    /// Base URL of the ClipIt API
    #[arg(long, global = true, default_value = "http://localhost:8080/api")]
    pub base_url: String,

    /// Directory where saved artifacts are written
    #[arg(long, global = true, default_value = ".")]
    pub output_dir: PathBuf,

    /// Request timeout for API calls
    #[arg(long, global = true, default_value = "30s")]
    pub request_timeout: humantime::Duration,

    /// Override the token file location (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub token_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Log in and persist the session token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Clear the persisted session token
    Logout,
    /// List the formats available for a media URL
    Formats { url: String },
    /// Submit a new conversion job
    Submit {
        url: String,
        /// Format id as reported by `formats` (required unless --audio-only)
        #[arg(long)]
        format_id: Option<String>,
        /// Extract audio only (mp3)
        #[arg(long, conflicts_with = "video_only")]
        audio_only: bool,
        /// Keep the video stream only
        #[arg(long)]
        video_only: bool,
        /// Trim start timestamp, e.g. 00:00:10
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// Trim end timestamp, e.g. 00:01:30
        #[arg(long, requires = "start")]
        end: Option<String>,
    },
    /// List your jobs once, newest first
    Jobs,
    /// Follow the job list until interrupted
    Watch {
        /// Poll cadence (defaults to 2s)
        #[arg(long)]
        interval: Option<humantime::Duration>,
        /// Keep showing jobs the server no longer reports
        #[arg(long)]
        retain_missing: bool,
    },
    /// Save the artifact of a completed job to the output directory
    Save { external_id: String },
}

/// Build the client configuration from CLI arguments.
pub fn build_config(args: &Cli) -> ClientConfig {
    ClientConfig {
        base_url: args.base_url.trim_end_matches('/').to_string(),
        poll_interval: DEFAULT_POLL_INTERVAL,
        request_timeout: args.request_timeout.into(),
        output_dir: args.output_dir.clone(),
        user_agent: format!("clipit-cli/{}", env!("CARGO_PKG_VERSION")),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let session = match &args.token_file {
        Some(path) => SessionStore::open(path.clone()),
        None => SessionStore::open_default()?,
    };
    let navigator = Arc::new(TerminalNavigator::default());
    let api = Arc::new(ApiClient::new(&cfg, session.clone(), navigator)?);

    match args.command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let message = api
                .register(&username, &email, &password)
                .await
                .context("registration failed")?;
            println!("{message}");
            println!("Log in with `clipit login --username {username}`.");
        }
        Command::Login { username, password } => {
            let token = api
                .login(&username, &password)
                .await
                .context("login failed; check username and password")?;
            session.login(token.trim())?;
            println!("Logged in as {username}.");
        }
        Command::Logout => {
            session.logout();
            println!("Logged out.");
        }
        Command::Formats { url } => {
            let catalog = api
                .formats(&url)
                .await
                .context("could not fetch video details; check the URL")?;
            print_catalog(&catalog);
        }
        Command::Submit {
            url,
            format_id,
            audio_only,
            video_only,
            start,
            end,
        } => {
            let mode = if audio_only {
                DownloadMode::AudioOnly
            } else if video_only {
                DownloadMode::VideoOnly
            } else {
                DownloadMode::Combined
            };
            if mode != DownloadMode::AudioOnly && format_id.is_none() {
                bail!("--format-id is required unless --audio-only is set");
            }
            // Resolve the chosen format against a fresh catalog so the
            // submission carries its resolution and container.
            let format = match &format_id {
                Some(id) => {
                    let catalog = api
                        .formats(&url)
                        .await
                        .context("could not fetch video details; check the URL")?;
                    let found = catalog
                        .video_formats
                        .into_iter()
                        .find(|f| f.id == *id)
                        .with_context(|| format!("format {id} is not offered for this URL"))?;
                    Some(found)
                }
                None => None,
            };
            let trim = start.zip(end);
            let submission = JobSubmission::from_selection(&url, mode, format.as_ref(), trim);
            let job_id = api
                .start_job(&submission)
                .await
                .context("failed to start job")?;
            println!("Job started: {job_id}");
        }
        Command::Jobs => {
            let mut jobs = api.list_jobs().await?;
            jobs.reverse();
            if jobs.is_empty() {
                println!("No jobs yet. Submit a URL to get started.");
            }
            for job in &jobs {
                println!("{}", format_job_line(job));
            }
        }
        Command::Watch {
            interval,
            retain_missing,
        } => {
            let policy = if retain_missing {
                MissingJobs::Retain
            } else {
                MissingJobs::Drop
            };
            let interval = interval.map(Into::into).unwrap_or(cfg.poll_interval);
            watch_jobs(api, session, interval, policy).await?;
        }
        Command::Save { external_id } => {
            let jobs = api.list_jobs().await?;
            let job = jobs
                .iter()
                .find(|j| j.external_id == external_id)
                .with_context(|| format!("no job with id {external_id}"))?;
            let sink = Arc::new(DirSaveSink::new(cfg.output_dir.clone()));
            let retriever = Retriever::new(api.clone(), sink);
            let path = retriever.retrieve(job).await?;
            println!("Saved {}", path.display());
        }
    }

    Ok(())
}

/// Follow the poller's published snapshots until Ctrl-C or forced logout.
async fn watch_jobs(
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    interval: Duration,
    policy: MissingJobs,
) -> Result<()> {
    let poller = JobPoller::new(api, policy);
    let mut jobs_rx = poller.subscribe();
    let mut auth_rx = session.subscribe();
    let handle = poller.start(interval);
    let (out_tx, out_handle) = spawn_output_writer();

    let _ = out_tx.send(OutputLine::Stderr(
        "Watching jobs (Ctrl-C to stop)…".to_string(),
    ));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.stop();
                break;
            }
            changed = jobs_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let jobs = jobs_rx.borrow_and_update().clone();
                let stamp = time::OffsetDateTime::now_utc()
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_else(|_| "now".into());
                let _ = out_tx.send(OutputLine::Stdout(format!("-- {stamp} --")));
                if jobs.is_empty() {
                    let _ = out_tx.send(OutputLine::Stdout("(no jobs)".to_string()));
                }
                for job in &jobs {
                    let _ = out_tx.send(OutputLine::Stdout(format_job_line(job)));
                }
            }
            _ = auth_rx.changed() => {
                if !*auth_rx.borrow_and_update() {
                    let _ = out_tx.send(OutputLine::Stderr(
                        "Session ended; stopping watch.".to_string(),
                    ));
                    handle.stop();
                    break;
                }
            }
        }
    }

    handle.join().await;
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

fn format_job_line(job: &Job) -> String {
    let source = job.original_url.as_deref().unwrap_or("unknown source");
    if job.status.is_active() {
        format!(
            "{:<11} {:>3}%  {}  {}",
            job.status, job.progress, job.external_id, source
        )
    } else {
        format!("{:<11}       {}  {}", job.status, job.external_id, source)
    }
}

fn print_catalog(catalog: &FormatCatalog) {
    if catalog.video_formats.is_empty() && catalog.audio_formats.is_empty() {
        println!("No formats reported for this URL.");
        return;
    }
    if !catalog.video_formats.is_empty() {
        println!("Video formats:");
        for fmt in &catalog.video_formats {
            println!(
                "  {:<8} {:>6}  {} @ {} fps",
                fmt.id,
                resolution_label(&fmt.resolution),
                fmt.extension,
                fmt.fps
            );
        }
    }
    if !catalog.audio_formats.is_empty() {
        println!("Audio formats:");
        for fmt in &catalog.audio_formats {
            println!("  {:<8} {:>6}  {}", fmt.id, fmt.bit_rate, fmt.codec);
        }
    }
}

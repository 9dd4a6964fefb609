#![allow(dead_code)]

use clipit_cli::api::{ApiClient, Navigator};
use clipit_cli::model::ClientConfig;
use clipit_cli::session::SessionStore;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Navigator that records login redirects instead of touching the terminal.
pub struct RecordingNavigator {
    at_login: AtomicBool,
    redirects: AtomicUsize,
}

impl RecordingNavigator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            at_login: AtomicBool::new(false),
            redirects: AtomicUsize::new(0),
        })
    }

    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::Relaxed)
    }

    pub fn set_at_login(&self) {
        self.at_login.store(true, Ordering::Relaxed);
    }
}

impl Navigator for RecordingNavigator {
    fn at_login(&self) -> bool {
        self.at_login.load(Ordering::Relaxed)
    }

    fn to_login(&self) {
        if !self.at_login.swap(true, Ordering::Relaxed) {
            self.redirects.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub fn test_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        base_url: base_url.to_string(),
        poll_interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(5),
        output_dir: PathBuf::from("."),
        user_agent: "clipit-cli-test".to_string(),
    }
}

/// Wire up a client against `base_url` with a session persisted at
/// `token_path`.
pub fn client(
    base_url: &str,
    token_path: PathBuf,
) -> (Arc<ApiClient>, Arc<SessionStore>, Arc<RecordingNavigator>) {
    let session = SessionStore::open(token_path);
    let navigator = RecordingNavigator::new();
    let api = ApiClient::new(&test_config(base_url), session.clone(), navigator.clone())
        .expect("client should build");
    (Arc::new(api), session, navigator)
}

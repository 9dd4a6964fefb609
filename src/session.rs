//! Session store.
//!
//! Single source of truth for the bearer credential and the derived
//! authenticated flag. The token survives restarts in one file under the
//! platform config dir; every other component receives an injected
//! `Arc<SessionStore>` and only reads it or calls `login`/`logout`.

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, warn};

pub struct SessionStore {
    path: PathBuf,
    token: RwLock<Option<String>>,
    authenticated: watch::Sender<bool>,
}

impl SessionStore {
    /// Load any previously persisted credential from `path`. A missing or
    /// empty token file is the logged-out state, not an error.
    pub fn open(path: PathBuf) -> Arc<Self> {
        let token = match fs::read_to_string(&path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(_) => None,
        };
        debug!(
            path = %path.display(),
            authenticated = token.is_some(),
            "session store initialized"
        );
        let (authenticated, _) = watch::channel(token.is_some());
        Arc::new(Self {
            path,
            token: RwLock::new(token),
            authenticated,
        })
    }

    /// Token file under the platform config dir.
    pub fn open_default() -> Result<Arc<Self>> {
        let dir = dirs::config_dir().context("no config directory available on this platform")?;
        Ok(Self::open(dir.join("clipit-cli").join("token")))
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    /// Observe authenticated-state changes. The watched value is updated
    /// synchronously with the mutating call.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    /// Persist `token` and mark the session authenticated. Fails only if the
    /// token cannot be written, in which case the session would not survive
    /// a restart and the caller should know.
    pub fn login(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&self.path, token)
            .with_context(|| format!("persisting token to {}", self.path.display()))?;
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        self.authenticated.send_replace(true);
        Ok(())
    }

    /// Clear the credential and the persisted token file. Idempotent, and
    /// infallible: the transport forces logout on expired credentials and
    /// that must always complete.
    pub fn logout(&self) {
        {
            let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
            if guard.is_none() {
                return;
            }
            *guard = None;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "could not remove persisted token");
            }
        }
        self.authenticated.send_replace(false);
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Rule table hot reload
//!
//! Watches the configuration file and swaps the policy engine's rule table
//! once edits settle. A file that fails to load is logged and the rules in
//! force stay in place.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use notify::{Event, RecursiveMode, Watcher};
use sqlgate_core::{ConfigError, GateError, GateResult};
use tracing::{error, info, warn};

use super::policy::PolicyEngine;
use super::types::GateConfig;

/// Quiet period after the last change before reloading
const DEBOUNCE: Duration = Duration::from_millis(500);

/// How often the watch thread checks for stop and pending reloads
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Load `path` and install its rules. The audit timeout and sink are fixed
/// at startup and are not affected.
pub fn reload(path: &Path, policy: &PolicyEngine) -> Result<(), ConfigError> {
    let config = GateConfig::load(path)?;
    policy.replace(config.rule_set())?;
    info!(path = %path.display(), "Rule table reloaded");
    Ok(())
}

/// Running watch thread. Dropping it stops the thread.
pub struct ConfigWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Start watching `config_path` on a background thread.
    pub fn spawn(config_path: &Path, policy: Arc<PolicyEngine>) -> GateResult<Self> {
        let config_path = config_path.to_path_buf();
        let file_name = config_path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| GateError::Watch {
                message: format!("{} is not a file path", config_path.display()),
            })?;
        let dir = match config_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = std::sync::mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(tx).map_err(|e| GateError::Watch {
            message: format!("failed to create file watcher: {}", e),
        })?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| GateError::Watch {
                message: format!("failed to watch {}: {}", dir.display(), e),
            })?;

        info!(path = %config_path.display(), "Watching rule table for changes");

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = std::thread::spawn(move || {
            // keep the watcher alive for the lifetime of the thread
            let _watcher = watcher;
            let mut pending: Option<Instant> = None;

            while !thread_stop.load(Ordering::SeqCst) {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(Ok(event)) => {
                        if touches(&event, &file_name) {
                            if event.kind.is_remove() {
                                warn!("Rule table file removed; keeping current rules");
                                pending = None;
                            } else if event.kind.is_create() || event.kind.is_modify() {
                                pending = Some(Instant::now());
                            }
                        }
                    }
                    Ok(Err(e)) => error!("File watch error: {}", e),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        error!("Watcher channel disconnected. Stopping thread.");
                        break;
                    }
                }

                if pending.map_or(false, |at| at.elapsed() > DEBOUNCE) {
                    pending = None;
                    if let Err(e) = reload(&config_path, &policy) {
                        error!(
                            path = %config_path.display(),
                            "Rejected rule table change, keeping current rules: {}", e
                        );
                    }
                }
            }
        });

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn touches(event: &Event, file_name: &std::ffi::OsStr) -> bool {
    event
        .paths
        .iter()
        .any(|p| p.file_name().map_or(false, |n| n == file_name))
}

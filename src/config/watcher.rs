//! Config file watching for hot reload.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by renaming a temp file over the original keep triggering
//! reloads. Revisions that fail validation are dropped; identical ones are
//! not re-sent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::BalancerConfig;

/// Watches the config file and emits each valid revision.
pub struct ConfigWatcher {
    file: PathBuf,
    revisions: mpsc::UnboundedSender<BalancerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of the revision stream.
    pub fn new(file: &Path) -> (Self, mpsc::UnboundedReceiver<BalancerConfig>) {
        let (revisions, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            file: file.to_path_buf(),
            revisions,
        };
        (watcher, rx)
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.file.file_name().map(|n| n.to_os_string());
        let file = self.file.clone();
        let revisions = self.revisions;
        let mut last: Option<BalancerConfig> = None;

        let mut handle = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    return;
                }
                if !event.paths.iter().any(|p| p.file_name() == file_name.as_deref()) {
                    return;
                }

                match load_config(&file) {
                    Ok(next) if last.as_ref() == Some(&next) => {
                        tracing::debug!(path = ?file, "Config unchanged");
                    }
                    Ok(next) => {
                        tracing::info!(path = ?file, backends = next.backends.len(), "Config reloaded");
                        last = Some(next.clone());
                        if revisions.send(next).is_err() {
                            tracing::debug!("Config receiver dropped");
                        }
                    }
                    Err(e) => {
                        tracing::error!(path = ?file, error = %e, "Rejected config reload, keeping current backends");
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        handle.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.file, "Watching config file");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emits_valid_revision() {
        let dir = std::env::temp_dir().join(format!("http-balancer-watch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("balancer.toml");
        std::fs::write(&file, "[[backends]]\naddress = \"127.0.0.1:3001\"\n").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&file);
        let _handle = watcher.run().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(
            &file,
            "[[backends]]\naddress = \"127.0.0.1:3001\"\n\n[[backends]]\naddress = \"127.0.0.1:3002\"\n",
        )
        .unwrap();

        let next = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await {
                    Some(config) if config.backends.len() == 2 => return config,
                    Some(_) => continue,
                    None => panic!("watcher stopped"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(next.backend_addresses(), vec!["127.0.0.1:3001", "127.0.0.1:3002"]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}

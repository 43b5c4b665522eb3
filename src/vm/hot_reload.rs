//! Hot reload support for worker programs
//!
//! Watches a program file and reassembles it after edits settle:
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 ProgramWatcher                  │
//! ├─────────────────────────────────────────────────┤
//! │  1. File change detected                        │
//! │  2. Debounce                                    │
//! │  3. Assemble                                    │
//! │  4. Valid   -> emit new machine code            │
//! │     Invalid -> log, keep the last good program  │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut watcher = ProgramWatcher::new("worker.ant")?;
//!
//! // In the tick loop
//! if let Some(machine_code) = watcher.poll_reload()? {
//!     sim.reload_all(&machine_code)?;
//! }
//! ```

use super::{assemble_source, AssemblerError, MachineCode};
use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::time::{Duration, Instant};

/// Emitted for every reassembly attempt
#[derive(Debug, Clone)]
pub struct ReloadEvent {
    /// Path of the reloaded file
    pub path: PathBuf,
    /// Timestamp of reload
    pub timestamp: Instant,
    /// Steps in the new program (0 if rejected)
    pub step_count: usize,
    /// Assembly error if the edit was rejected
    pub error: Option<AssemblerError>,
}

/// File watcher that turns edits into machine code
pub struct ProgramWatcher {
    /// Path being watched
    watch_path: PathBuf,
    /// File watcher
    _watcher: RecommendedWatcher,
    /// Channel for file change events
    change_rx: Receiver<PathBuf>,
    /// Last successfully assembled program
    current: Option<MachineCode>,
    /// Most recent reload attempt
    last_event: Option<ReloadEvent>,
    /// Debounce duration to avoid rapid reloads
    debounce: Duration,
    /// Last change time for debouncing
    last_change: Option<Instant>,
}

impl ProgramWatcher {
    /// Watch a single program file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let watch_path = path.as_ref().to_path_buf();
        let (tx, rx) = channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Modify(_) | notify::EventKind::Create(_)
                ) {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
            }
        })
        .context("Failed to create file watcher")?;

        // Editors often replace the file, so watch the parent directory
        let parent = watch_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher
            .watch(parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", parent.display()))?;

        Ok(Self {
            watch_path,
            _watcher: watcher,
            change_rx: rx,
            current: None,
            last_event: None,
            debounce: Duration::from_millis(100),
            last_change: None,
        })
    }

    /// Set debounce duration
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce = duration;
        self
    }

    /// Assemble the file now, regardless of change events
    pub fn load_now(&mut self) -> Result<Option<MachineCode>> {
        self.reload()
    }

    /// Poll for pending reloads (non-blocking)
    ///
    /// Returns `Some` only when the file changed and assembled cleanly.
    /// A file that fails to assemble is logged and the last good program
    /// stays current.
    pub fn poll_reload(&mut self) -> Result<Option<MachineCode>> {
        loop {
            match self.change_rx.try_recv() {
                Ok(path) => {
                    if self.is_watched(&path) {
                        self.last_change = Some(Instant::now());
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    anyhow::bail!("File watcher disconnected");
                }
            }
        }

        match self.last_change {
            Some(changed) if changed.elapsed() >= self.debounce => {
                self.last_change = None;
                self.reload()
            }
            _ => Ok(None),
        }
    }

    fn is_watched(&self, path: &Path) -> bool {
        path == self.watch_path || path.file_name() == self.watch_path.file_name()
    }

    fn reload(&mut self) -> Result<Option<MachineCode>> {
        let path = &self.watch_path;
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let (result, event) = match assemble_source(&source) {
            Ok(machine_code) => {
                let step_count = machine_code.step_count().unwrap_or(0);
                log::info!("reloaded {} ({} steps)", path.display(), step_count);
                let event = ReloadEvent {
                    path: path.clone(),
                    timestamp: Instant::now(),
                    step_count,
                    error: None,
                };
                self.current = Some(machine_code.clone());
                (Some(machine_code), event)
            }
            Err(error) => {
                log::warn!("keeping previous program, {} rejected: {}", path.display(), error);
                let event = ReloadEvent {
                    path: path.clone(),
                    timestamp: Instant::now(),
                    step_count: 0,
                    error: Some(error),
                };
                (None, event)
            }
        };

        self.last_event = Some(event);
        Ok(result)
    }

    /// Last successfully assembled program
    pub fn current(&self) -> Option<&MachineCode> {
        self.current.as_ref()
    }

    /// Most recent reload attempt, successful or not
    pub fn last_event(&self) -> Option<&ReloadEvent> {
        self.last_event.as_ref()
    }

    /// Get the watch path
    pub fn watch_path(&self) -> &Path {
        &self.watch_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_keeps_last_good_program() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.ant");
        std::fs::write(&path, "LOAD A 1\nMOVE\n").unwrap();

        let mut watcher = ProgramWatcher::new(&path).unwrap();
        let first = watcher.load_now().unwrap().expect("valid program");
        assert_eq!(first.step_count().unwrap(), 2);

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "LOAD A").unwrap();
        drop(file);

        assert!(watcher.load_now().unwrap().is_none());
        assert_eq!(watcher.current(), Some(&first));
        let event = watcher.last_event().unwrap();
        assert_eq!(event.error.as_ref().map(|e| e.line), Some(1));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = ProgramWatcher::new(dir.path().join("absent.ant")).unwrap();
        assert!(watcher.load_now().is_err());
    }

    #[test]
    fn test_poll_without_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idle.ant");
        std::fs::write(&path, "NOP\n").unwrap();
        let mut watcher = ProgramWatcher::new(&path)
            .unwrap()
            .with_debounce(Duration::from_secs(3600));
        assert!(watcher.poll_reload().unwrap().is_none());
    }
}

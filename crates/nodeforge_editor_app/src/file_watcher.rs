// SPDX-License-Identifier: MIT OR Apache-2.0
//! File system watcher for the open document.
//!
//! Watches the document's directory (editors often save by replacing the
//! file) and reports debounced events for the document path only.

use notify_debouncer_full::{
    new_debouncer,
    notify::{self, EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

/// Events emitted by the document watcher
#[derive(Debug, Clone, PartialEq)]
pub enum FileEvent {
    /// The document was written (or re-created)
    Modified(PathBuf),
    /// The document was removed
    Deleted(PathBuf),
    /// The watcher reported an error
    Error(String),
}

/// Debounced watcher for a single document
pub struct DocumentWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    event_rx: Receiver<FileEvent>,
    document: PathBuf,
    /// Events seen by the callback, for diagnostics
    event_count: Arc<Mutex<usize>>,
}

impl DocumentWatcher {
    /// Start watching `document`
    pub fn new(document: &Path, debounce: Duration) -> Result<Self, notify::Error> {
        let document = document.canonicalize().map_err(notify::Error::io)?;
        let dir = document
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| notify::Error::generic("document has no parent directory"))?;

        let (event_tx, event_rx) = mpsc::channel();
        let event_count = Arc::new(Mutex::new(0usize));
        let target = document.clone();
        let counter = Arc::clone(&event_count);

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        if !event.paths.iter().any(|path| path == &target) {
                            continue;
                        }
                        *counter.lock() += 1;
                        let translated = match event.kind {
                            EventKind::Create(_) | EventKind::Modify(_) => FileEvent::Modified(target.clone()),
                            EventKind::Remove(_) => FileEvent::Deleted(target.clone()),
                            EventKind::Any | EventKind::Access(_) | EventKind::Other => continue,
                        };
                        let _ = event_tx.send(translated);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        let _ = event_tx.send(FileEvent::Error(error.to_string()));
                    }
                }
            }
        })?;

        debouncer.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!("Watching document for changes: {:?}", document);
        Ok(Self {
            debouncer,
            event_rx,
            document,
            event_count,
        })
    }

    /// The watched document path
    pub fn document(&self) -> &Path {
        &self.document
    }

    /// Number of raw events seen for the document
    pub fn event_count(&self) -> usize {
        *self.event_count.lock()
    }

    /// Pending events, without blocking; consecutive modifications collapse into one
    pub fn poll_events(&self) -> Vec<FileEvent> {
        let mut events = Vec::new();
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => push_collapsed(&mut events, event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("File watcher channel disconnected");
                    break;
                }
            }
        }
        events
    }

    /// Wait up to `timeout` for the next event, then drain whatever else is pending
    pub fn wait_events(&self, timeout: Duration) -> Vec<FileEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(first) => {
                let mut events = vec![first];
                for event in self.poll_events() {
                    push_collapsed(&mut events, event);
                }
                events
            }
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("File watcher channel disconnected");
                vec![FileEvent::Error("watcher stopped".to_string())]
            }
        }
    }

    /// Stop watching
    pub fn stop(mut self) -> Result<(), notify::Error> {
        if let Some(dir) = self.document.parent().map(Path::to_path_buf) {
            self.debouncer.unwatch(&dir)?;
        }
        tracing::info!("Stopped watching document: {:?}", self.document);
        Ok(())
    }
}

fn push_collapsed(events: &mut Vec<FileEvent>, event: FileEvent) {
    if matches!(event, FileEvent::Modified(_)) && events.last() == Some(&event) {
        return;
    }
    events.push(event);
}

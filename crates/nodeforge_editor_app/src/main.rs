// SPDX-License-Identifier: MIT OR Apache-2.0
//! `NodeForge` Editor - headless document session
//!
//! Opens an asset document against a workspace schema, optionally lays it
//! out, recomputes group membership and writes the canonical form back:
//! - Document host with versioned edits
//! - Editor session owning the node graph
//! - RON configuration (`nodeforge.ron`)
//! - Watch mode that re-parses on external changes
//!
//! ## Architecture
//!
//! The host and the session run in one process but only exchange protocol
//! messages. Outbound host messages are printed to stdout as JSON lines;
//! logs go to stderr.

mod config;
mod file_watcher;
mod protocol;
mod session;

use clap::Parser;
use config::{ConfigError, EditorConfig};
use file_watcher::{DocumentWatcher, FileEvent};
use nodeforge_editor_graph::layout::Algorithm;
use protocol::{EditorMessage, HostMessage};
use session::{DocumentHost, EditorSession, SessionError};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Load an asset document, lay it out, recompute groups and write it back
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(name = "nodeforge_editor", version, about, long_about = None)]
struct CliArgs {
    /// Asset document to open
    document: PathBuf,
    /// Workspace context (node templates) as JSON
    #[arg(long)]
    workspace: PathBuf,
    /// RON config file; written with defaults when missing
    #[arg(long)]
    config: Option<PathBuf>,
    /// Lay out every node with `tree` or `graph` before saving
    #[arg(long)]
    layout: Option<Algorithm>,
    /// Keep running and re-parse when the document changes on disk
    #[arg(long)]
    watch: bool,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("File watcher failed: {0}")]
    Watch(#[from] notify::Error),
}

fn main() {
    let args = CliArgs::parse();

    let loaded = EditorConfig::resolve(args.config.as_deref(), &args.document);
    let filter = match &loaded {
        Ok(config) => config.log_filter().to_string(),
        Err(_) => config::DEFAULT_LOG_FILTER.to_string(),
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting NodeForge Editor v{}", env!("CARGO_PKG_VERSION"));

    let result = loaded.map_err(AppError::from).and_then(|config| run(&args, &config));
    if let Err(e) = result {
        tracing::error!("Editor failed: {e}");
        std::process::exit(1);
    }
}

fn run(args: &CliArgs, config: &EditorConfig) -> Result<(), AppError> {
    if let Some(path) = args.config.as_deref().filter(|path| !path.exists()) {
        config.save(path)?;
        tracing::info!("Wrote default config to {:?}", path);
    }
    let context = session::load_workspace(&args.workspace)?;
    let mut host = DocumentHost::open(&args.document)?;
    let mut session = EditorSession::new(context, config);

    deliver(&mut session, host.handle(EditorMessage::Ready))?;

    let needs_layout = !session.unpositioned().is_empty();
    if args.layout.is_some() || needs_layout {
        let algorithm = args.layout.unwrap_or_default();
        let moved = session.auto_position(&[], algorithm);
        tracing::info!("Laid out {moved} node(s)");
    }
    session.assume_measurements()?;
    session.recalculate_groups()?;

    let version = host.version();
    let apply = session.commit()?;
    deliver(&mut session, host.handle(apply))?;
    if host.version() != version {
        host.save()?;
        tracing::info!(
            "Wrote {} node(s), {} bytes",
            session.graph().node_count(),
            host.text().len()
        );
    } else {
        tracing::info!("Document already canonical, nothing written");
    }

    if args.watch {
        watch(&mut host, &mut session, config.watch.debounce())?;
    }
    Ok(())
}

/// Print host messages and feed them to the session
fn deliver(session: &mut EditorSession, messages: Vec<HostMessage>) -> Result<(), SessionError> {
    for message in messages {
        match serde_json::to_string(&message) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("Failed to encode host message: {e}"),
        }
        session.receive(message)?;
    }
    Ok(())
}

fn watch(host: &mut DocumentHost, session: &mut EditorSession, debounce: Duration) -> Result<(), AppError> {
    let watcher = DocumentWatcher::new(host.path(), debounce)?;
    loop {
        for event in watcher.wait_events(Duration::from_secs(1)) {
            match event {
                FileEvent::Modified(_) => {
                    if !host.reload()? {
                        continue;
                    }
                    // A broken external edit leaves the last good graph in place.
                    if let Err(e) = deliver(session, vec![host.update_message()]) {
                        tracing::warn!("Keeping previous graph: {e}");
                        continue;
                    }
                    tracing::info!(
                        "Reloaded {} at version {:?}",
                        session.document_path().unwrap_or_default(),
                        session.source_version()
                    );
                }
                FileEvent::Deleted(path) => {
                    tracing::warn!("Document {:?} was deleted, stopping", path);
                    tracing::debug!("Saw {} event(s) for {:?}", watcher.event_count(), watcher.document());
                    watcher.stop()?;
                    return Ok(());
                }
                FileEvent::Error(message) => tracing::error!("File watcher error: {message}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn args(raw: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("nodeforge_editor").chain(raw.iter().copied()))
    }

    #[test]
    fn test_cli_definition() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_cli_parsing() {
        let parsed = args(&["doc.json", "--workspace", "ctx.json", "--layout", "graph", "--watch"]).unwrap();
        assert_eq!(parsed.document, PathBuf::from("doc.json"));
        assert_eq!(parsed.workspace, PathBuf::from("ctx.json"));
        assert_eq!(parsed.layout, Some(Algorithm::Graph));
        assert!(parsed.watch);
        assert_eq!(parsed.config, None);
    }

    #[test]
    fn test_cli_errors() {
        assert!(args(&["doc.json"]).is_err());
        assert!(args(&["--workspace", "ctx.json"]).is_err());
        assert!(args(&["doc.json", "--workspace"]).is_err());
        assert!(args(&["doc.json", "--workspace", "w", "--layout", "circle"]).is_err());
        assert!(args(&["a.json", "b.json", "--workspace", "w"]).is_err());
        assert!(args(&["a.json", "--workspace", "w", "--verbose"]).is_err());
    }
}

//! Planscope binary support: settings, graph output and the poll loop.

pub mod config;
pub mod error;

pub use config::Settings;
pub use error::AppError;

use planscope_client::{PollOutcome, QueryPoller, QuerySource};
use planscope_common::Error;
use planscope_engine::RenderGraph;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Writes each graph as JSON to a file or to stdout.
#[derive(Debug, Clone, Default)]
pub struct GraphWriter {
    output: Option<PathBuf>,
    pretty: bool,
}

impl GraphWriter {
    pub fn new(output: Option<PathBuf>, pretty: bool) -> Self {
        Self { output, pretty }
    }

    pub fn render(&self, graph: &RenderGraph) -> Result<String, AppError> {
        let text =
            if self.pretty { serde_json::to_string_pretty(graph)? } else { serde_json::to_string(graph)? };
        Ok(text)
    }

    /// Replaces the output file, or prints one line to stdout.
    pub fn write(&self, graph: &RenderGraph) -> Result<(), AppError> {
        let text = self.render(graph)?;
        match &self.output {
            Some(path) => std::fs::write(path, format!("{text}\n"))?,
            None => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{text}")?;
                stdout.flush()?;
            }
        }
        Ok(())
    }
}

/// Fetches, compiles and writes a single graph.
pub async fn run_once<S: QuerySource>(
    poller: &mut QueryPoller<S>,
    writer: &GraphWriter,
) -> Result<(), AppError> {
    match poller.poll_once().await {
        PollOutcome::Rebuilt(graph) => writer.write(&graph),
        PollOutcome::NoData | PollOutcome::Unchanged => Err(Error::NoVisualizationData.into()),
        PollOutcome::Failed(err) => Err(err.into()),
    }
}

/// Polls until `shutdown` fires, writing every rebuilt graph. Failures are
/// logged and polling carries on.
pub async fn run_polling<S: QuerySource>(
    poller: &mut QueryPoller<S>,
    writer: &GraphWriter,
    shutdown: watch::Receiver<bool>,
) {
    poller
        .run(shutdown, |outcome| match outcome {
            PollOutcome::Rebuilt(graph) => {
                if let Err(err) = writer.write(&graph) {
                    error!(error = %err, "Failed to write graph");
                }
            }
            PollOutcome::Unchanged => {}
            PollOutcome::NoData => info!("{}", Error::NoVisualizationData),
            PollOutcome::Failed(err) if err.is_unreachable() => {
                warn!(error = %err, "Backend unreachable, retrying on next tick")
            }
            PollOutcome::Failed(err) => warn!(error = %err, "Poll failed"),
        })
        .await;
}

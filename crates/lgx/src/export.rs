//! 📤 Export — drain a chunked retrieval into NDJSON, one line per message.
//!
//! The driver owns the lifecycle rules callers tend to forget: iterate strictly page after page,
//! and call `cancel()` on the way out no matter how the loop ended.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::chunked::ChunkedResult;
use crate::progress::ProgressMetrics;
use crate::query::ChunkCommand;
use crate::retriever::MultiChunkResultRetriever;

/// 🧾 What an export did.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub messages: u64,
    pub chunks: u64,
    pub bytes: u64,
    pub total_hits: u64,
    pub elapsed: Duration,
}

/// 🚀 Start a retrieval for `command` and write it to `output_file`, or stdout when `None`.
pub async fn export_to(
    retriever: &MultiChunkResultRetriever,
    command: &ChunkCommand,
    output_file: Option<&Path>,
    show_progress: bool,
) -> anyhow::Result<ExportSummary> {
    let label = command.indices.iter().cloned().collect::<Vec<_>>().join(",");
    let mut result = retriever
        .retrieve_chunked_result(command)
        .await
        .context("💀 The first page never made it out of the cluster. No retrieval was started.")?;

    let mut progress = ProgressMetrics::new(label, show_progress);
    match output_file {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("💀 Could not create export file '{}'.", path.display()));
            match file {
                Ok(mut file) => drain_and_cancel(&mut result, &mut file, &mut progress).await,
                Err(error) => {
                    result.cancel().await;
                    Err(error)
                }
            }
        }
        None => drain_and_cancel(&mut result, &mut tokio::io::stdout(), &mut progress).await,
    }
}

/// 🔄 Write every chunk of `result` to `writer`, then cancel, whatever happened in between.
pub(crate) async fn drain_and_cancel<R, W>(
    result: &mut R,
    writer: &mut W,
    progress: &mut ProgressMetrics,
) -> anyhow::Result<ExportSummary>
where
    R: ChunkedResult + ?Sized,
    W: AsyncWrite + Unpin + Send,
{
    let outcome = drain(result, writer, progress).await;
    // -- 🧹 always. even when the drain blew up. especially then.
    result.cancel().await;
    progress.finish();
    outcome?;

    let summary = ExportSummary {
        messages: progress.messages(),
        chunks: progress.chunks(),
        bytes: progress.bytes(),
        total_hits: result.total_hits(),
        elapsed: progress.elapsed(),
    };
    info!(
        "✅ Exported {} messages in {} chunks ({} bytes)",
        summary.messages, summary.chunks, summary.bytes
    );
    Ok(summary)
}

async fn drain<R, W>(result: &mut R, writer: &mut W, progress: &mut ProgressMetrics) -> anyhow::Result<()>
where
    R: ChunkedResult + ?Sized,
    W: AsyncWrite + Unpin + Send,
{
    while let Some(chunk) = result
        .next_chunk()
        .await
        .context("💀 A page fetch failed mid-export. The whole retrieval is off; partial output is on disk.")?
    {
        progress.set_total_hits(result.total_hits());

        let mut payload = String::new();
        for message in &chunk.messages {
            payload.push_str(&message.to_ndjson_line().context("💀 A message refused to become JSON.")?);
            payload.push('\n');
        }
        writer
            .write_all(payload.as_bytes())
            .await
            .context("💀 Writing the export failed. Disk full? Pipe closed? Both?")?;
        progress.record_chunk(chunk.len() as u64, payload.len() as u64);
    }
    writer.flush().await.context("💀 Flushing the export failed.")?;

    debug!("🏁 export drained, retrieval state {:?}", result.state());
    Ok(())
}

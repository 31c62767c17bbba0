//! 🪵 lgx — chunked retrieval of very large result sets from a log search cluster.
//!
//! 🎬 *[a caller wants every message from last Tuesday. all of them. the cluster sighs.]*
//!
//! The pieces, leaf to root:
//! - [`translator`]: raw cluster failures → the closed [`errors::SearchError`] taxonomy
//! - [`client`]: the gateway every request goes through, translating on the way out
//! - [`query`] + [`request`]: a [`query::ChunkCommand`] becomes a wire-ready search request
//! - [`chunked`]: the page-by-page state machine, with scroll and search-after strategies
//! - [`retriever`]: the entry point, `retrieve_chunked_result(command)`
//! - [`export`]: drains a retrieval into NDJSON, used by the `lgx-cli` binary
//!
//! 🦆 The duck is here because every crate root must have one. This is law.

use std::io::IsTerminal;

use anyhow::Context;
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_BORDERS_ONLY};
use tracing::info;

pub mod app_config;
pub mod chunked;
pub mod client;
pub mod common;
pub mod errors;
pub mod export;
pub mod messages;
mod progress;
pub mod query;
pub mod request;
pub mod retriever;
pub mod translator;

#[cfg(test)]
pub(crate) mod test_support;

use crate::app_config::AppConfig;
use crate::export::ExportSummary;
use crate::progress::{format_duration, format_number};
use crate::retriever::MultiChunkResultRetriever;

/// 🚀 Run the configured export end to end and print a summary table to stderr.
pub async fn run(app_config: AppConfig) -> anyhow::Result<ExportSummary> {
    let retriever = MultiChunkResultRetriever::from_config(&app_config.search)
        .context("💀 Could not wire up the retriever from the [search] config.")?;
    info!(
        "🚀 Exporting from {} with {:?} chunking",
        app_config.search.url,
        retriever.chunking_method()
    );

    let show_progress = std::io::stderr().is_terminal();
    let summary = export::export_to(
        &retriever,
        &app_config.export.command,
        app_config.export.output_file.as_deref(),
        show_progress,
    )
    .await?;

    eprintln!("{}", summary_table(&summary));
    Ok(summary)
}

/// 🍽️ The post-export receipt.
fn summary_table(summary: &ExportSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    let rows = [
        ("messages", format_number(summary.messages)),
        ("total hits", format_number(summary.total_hits)),
        ("chunks", format_number(summary.chunks)),
        ("bytes written", format_number(summary.bytes)),
        ("elapsed", format_duration(summary.elapsed)),
    ];
    for (label, value) in rows {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

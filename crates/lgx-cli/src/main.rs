//! 🚀 lgx-cli — the front door, the bouncer, the maitre d' of lgx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Loads config, sets up logging, then lets the library do the heavy lifting.
//! Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🪵 Export every message matching a search, one NDJSON line at a time.
#[derive(Debug, Parser)]
#[command(name = "lgx", version, about)]
struct Args {
    /// TOML config file. Missing file means "env vars only" (LGX_*).
    #[arg(default_value = "lgx.toml")]
    config: PathBuf,

    /// Write NDJSON here instead of the configured output (or stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// 🚀 main() — where it all begins. The "I pressed F5 and held my breath" moment.
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 stderr, so the NDJSON on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // 🔒 a missing file is fine (env-only config); an unreadable path is not
    let config_file = args.config.as_path();
    let config_file_that_exists = match config_file.try_exists().with_context(|| {
        format!(
            "💀 Could not check whether the configuration file exists. Permissions? Relative path confusion? Was checking here: '{}'",
            config_file.display()
        )
    })? {
        true => Some(config_file),
        false => None,
    };

    let mut app_config = lgx::app_config::load_config(config_file_that_exists).context(
        "💀 In lgx-cli, main, we couldn't load the config. Check the TOML, check the LGX_* env vars, check the obvious.",
    )?;
    if let Some(output) = args.output {
        app_config.export.output_file = Some(output);
    }

    if let Err(err) = lgx::run(app_config).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        let mut worth_a_retry = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            if let Some(search_error) = cause.downcast_ref::<lgx::errors::SearchError>() {
                worth_a_retry |= search_error.is_transient();
            }
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like the search cluster isn't reachable. \
                Double-check [search].url and that the cluster is actually running. \
                If you're using Docker, `docker ps` is your friend. ☕"
            );
        }
        if worth_a_retry {
            error!("🔄 hint: the cluster was overloaded or slow, not broken. Retrying later (or with a smaller batch_size) may work.");
        }

        std::process::exit(1);
    }

    // ✅ Pop the champagne. 🍾
    Ok(())
}

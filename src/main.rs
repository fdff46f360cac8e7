use anyhow::Result;
use clap::Parser;
use indicatif::MultiProgress;
use raindrop_tag_cleaner::cli::{self, Cli, ProgressReporter, RunOutcome};
use raindrop_tag_cleaner::error::CleanerError;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Vec<u8>,
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let msg = String::from_utf8_lossy(&self.buffer);
        let msg = msg.trim_end_matches('\n');
        if !msg.is_empty() {
            let _ = self.multi.println(msg);
        }
        self.buffer.clear();
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter {
            multi: Arc::clone(&self.multi),
            buffer: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    raindrop_tag_cleaner::client::install_crypto_provider();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("raindrop_tag_cleaner=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("raindrop_tag_cleaner=info,warn"))
    };

    let multi_progress = Arc::new(MultiProgress::new());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: Arc::clone(&multi_progress),
        })
        .with_target(false)
        .init();

    tracing::info!("-- raindrop.io tag cleaner --");

    let reporter = ProgressReporter::with_multi_progress((*multi_progress).clone());
    match cli::run_cleanup(&cli, &reporter).await? {
        RunOutcome::Aborted => {}
        RunOutcome::Completed(report) => {
            tracing::info!("{}", report.summary());
            for (tag, reason) in report.failures() {
                tracing::warn!("\t'{}': {}", tag, reason);
            }
        }
    }

    Ok(())
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {}", cause);
    }

    if let Some(err) = error.downcast_ref::<CleanerError>() {
        match err {
            CleanerError::MissingCredential(_) => {
                eprintln!("\nHint: Export your raindrop.io app's client secret first:");
                eprintln!("      export RAINDROP_CLIENT_SECRET=...");
            }
            CleanerError::ListenerError(_) => {
                eprintln!("\nHint: Another process may be using the redirect port.");
                eprintln!("      The port must match the redirect URI registered for the app.");
            }
            CleanerError::TokenExchangeError(_) => {
                eprintln!("\nHint: Authorization codes are single-use. Run the cleaner again.");
            }
            CleanerError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file and allowlist path.");
            }
            _ => {}
        }
        if err.is_fatal_startup() {
            eprintln!("\nNo tags were touched.");
        }
    }

    eprintln!("\nFor help, run: raindrop-tag-cleaner --help");
}

//! Command-line interface and run orchestration

use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::allowlist::Allowlist;
use crate::auth::{self, Authorizer};
use crate::cleaner::{confirm, CleanupReport, Confirmation, DeletionPlan, TagCleaner};
use crate::client::{OAuthProvider, RaindropClient, TagService};
use crate::config::{Config, OAuthConfig};
use crate::error::Result;
use crate::rate_limiter::RequestPacer;

#[derive(Parser, Debug)]
#[command(name = "raindrop-tag-cleaner")]
#[command(version)]
#[command(about = "Delete every raindrop.io tag that is not on an allowlist", long_about = None)]
pub struct Cli {
    /// Text file with allowed tags, one per line
    #[arg(long, value_name = "PATH")]
    pub allowlist_file: Option<PathBuf>,

    /// Print what would happen but don't delete anything
    #[arg(long)]
    pub dry_run: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "raindrop-tag-cleaner.toml")]
    pub config: PathBuf,

    /// Don't try to open the authorization URL in a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Give up waiting for the authorization redirect after this many seconds
    #[arg(long, value_name = "SECS")]
    pub auth_timeout: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if self.no_browser {
            config.oauth.open_browser = false;
        }
        if let Some(secs) = self.auth_timeout {
            config.oauth.redirect_timeout_secs = Some(secs);
        }
        config.validate()
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Reporter drawing nowhere, for tests and non-interactive use
    pub fn hidden() -> Self {
        Self::with_multi_progress(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self { multi, bar_style }
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// How a run ended without error
#[derive(Debug)]
pub enum RunOutcome {
    /// The operator declined; nothing was deleted
    Aborted,
    Completed(CleanupReport),
}

/// Everything one cleanup run needs
pub struct RunContext<'a> {
    pub oauth: &'a OAuthConfig,
    pub client_secret: String,
    pub allowlist: Allowlist,
    pub dry_run: bool,
    pub delete_delay: Duration,
    pub provider: &'a dyn OAuthProvider,
    pub service: &'a dyn TagService,
}

/// Authorize, list, confirm, then delete
///
/// `present` receives the authorization URL once the redirect listener is up.
pub async fn execute<F, R, W>(
    ctx: RunContext<'_>,
    reporter: &ProgressReporter,
    present: F,
    input: R,
    mut output: W,
) -> Result<RunOutcome>
where
    F: FnOnce(&Url),
    R: BufRead,
    W: Write,
{
    let mut authorizer = Authorizer::new(ctx.oauth, ctx.client_secret, ctx.provider);
    let token = authorizer.authorize(present).await?;

    let pacer = RequestPacer::with_delay(ctx.delete_delay);
    let mut cleaner = TagCleaner::new(ctx.service, &token, pacer);
    let tags = cleaner.fetch_tags().await?;

    let plan = DeletionPlan::new(&tags, &ctx.allowlist, ctx.dry_run);
    write!(output, "{}", plan.summary())?;
    if confirm(input, &mut output)? == Confirmation::Declined {
        writeln!(output, "Aborted.")?;
        return Ok(RunOutcome::Aborted);
    }

    if !plan.is_dry_run() {
        info!("pacing delete calls {:?} apart", cleaner.pacer().delay());
    }
    let pb = reporter.add_progress_bar(plan.total() as u64, "Processing tags...");
    cleaner = cleaner.with_progress(pb.clone());
    let report = cleaner.run(&plan).await;
    pb.finish_and_clear();

    let stats = cleaner.pacer().stats();
    info!(
        "{} delete calls issued, {:?} spent pacing",
        stats.total_calls, stats.total_delay
    );
    Ok(RunOutcome::Completed(report))
}

/// Run the cleanup against raindrop.io with terminal I/O
pub async fn run_cleanup(cli: &Cli, reporter: &ProgressReporter) -> Result<RunOutcome> {
    // Checked before anything touches the network
    let client_secret = auth::client_secret_from_env()?;

    let mut config = Config::load(&cli.config).await?;
    cli.apply_overrides(&mut config)?;

    let allowlist = Allowlist::load(cli.allowlist_file.as_deref()).await?;
    if cli.dry_run {
        info!("dry run: no tags will be deleted");
    }

    let client = RaindropClient::from_config(&config)?;
    let open_browser = config.oauth.open_browser;

    let ctx = RunContext {
        oauth: &config.oauth,
        client_secret,
        allowlist,
        dry_run: cli.dry_run,
        delete_delay: config.deletion.delay(),
        provider: &client,
        service: &client,
    };

    execute(
        ctx,
        reporter,
        |url| auth::present_authorization_url(url, open_browser),
        BufReader::new(std::io::stdin()),
        std::io::stdout(),
    )
    .await
}

//! Batch deletion of tags not on the allowlist
//!
//! Deletions are strictly sequential, in listing order. Each delete call is
//! followed by the pacer delay whether it succeeded or not; skipped tags
//! cost neither a call nor a delay. A failed delete is recorded and the loop
//! moves on.

use indicatif::ProgressBar;
use std::collections::HashSet;
use std::io::{BufRead, Write};
use tracing::{info, warn};

use crate::allowlist::Allowlist;
use crate::auth::AccessToken;
use crate::client::TagService;
use crate::error::Result;
use crate::models::{DeletionOutcome, SkipReason, Tag};
use crate::rate_limiter::RequestPacer;

/// Listed tags checked against the allowlist
#[derive(Debug, Clone, Copy)]
pub struct DeletionPlan<'a> {
    tags: &'a [Tag],
    allowlist: &'a Allowlist,
    dry_run: bool,
}

impl<'a> DeletionPlan<'a> {
    pub fn new(tags: &'a [Tag], allowlist: &'a Allowlist, dry_run: bool) -> Self {
        Self {
            tags,
            allowlist,
            dry_run,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Number of distinct listed tags
    pub fn total(&self) -> usize {
        self.unique_tags().count()
    }

    /// Number of distinct listed tags not on the allowlist
    pub fn to_delete(&self) -> usize {
        self.unique_tags()
            .filter(|t| !self.allowlist.contains(&t.id))
            .count()
    }

    /// Listed tags in order, each id once
    fn unique_tags(&self) -> impl Iterator<Item = &'a Tag> {
        let mut seen = HashSet::new();
        self.tags.iter().filter(move |&tag| seen.insert(tag.id.as_str()))
    }

    /// Human-readable summary shown before confirmation
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if self.dry_run {
            out.push_str("dry run: nothing will actually be deleted.\n");
        }

        if self.allowlist.is_empty() {
            out.push_str(&format!(
                "no tags in allowlist; all {} tags will be deleted.\n",
                self.total()
            ));
        } else {
            out.push_str(&format!(
                "allowlist contains {} tags:\n\t{}\n\n",
                self.allowlist.len(),
                self.allowlist.sorted().join("\n\t")
            ));
            out.push_str(&format!(
                "{} other tags will be deleted.\n",
                self.to_delete()
            ));
        }
        out
    }
}

/// Operator answer to the confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Proceed,
    Declined,
}

/// Prompt the operator and block for one line of input
///
/// Enter, `y` or `yes` proceeds. Anything else, including end of input,
/// declines.
pub fn confirm<R: BufRead, W: Write>(mut input: R, mut output: W) -> Result<Confirmation> {
    write!(output, "press 'Enter' to continue (Ctrl-C to cancel) ...")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        writeln!(output)?;
        return Ok(Confirmation::Declined);
    }

    match line.trim().to_lowercase().as_str() {
        "" | "y" | "yes" => Ok(Confirmation::Proceed),
        _ => Ok(Confirmation::Declined),
    }
}

/// Per-tag outcomes of one run
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    outcomes: Vec<(String, DeletionOutcome)>,
    dry_run: bool,
}

impl CleanupReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            outcomes: Vec::new(),
            dry_run,
        }
    }

    fn record(&mut self, tag: &str, outcome: DeletionOutcome) {
        self.outcomes.push((tag.to_string(), outcome));
    }

    pub fn outcomes(&self) -> &[(String, DeletionOutcome)] {
        &self.outcomes
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, DeletionOutcome::Succeeded))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DeletionOutcome::Failed(_)))
    }

    pub fn skipped_allowlisted(&self) -> usize {
        self.count(|o| matches!(o, DeletionOutcome::Skipped(SkipReason::Allowlisted)))
    }

    /// Tags a dry run would have deleted
    pub fn skipped_dry_run(&self) -> usize {
        self.count(|o| matches!(o, DeletionOutcome::Skipped(SkipReason::DryRun)))
    }

    /// Tags whose delete call failed, with the reason
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(tag, outcome)| match outcome {
            DeletionOutcome::Failed(reason) => Some((tag.as_str(), reason.as_str())),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&DeletionOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn summary(&self) -> String {
        if self.dry_run {
            format!(
                "dry run complete; {} tags would be deleted, {} allowlisted.",
                self.skipped_dry_run(),
                self.skipped_allowlisted()
            )
        } else {
            format!(
                "complete.\nfailed to delete {} tags; deleted {} tags; kept {} allowlisted tags.",
                self.failed(),
                self.succeeded(),
                self.skipped_allowlisted()
            )
        }
    }
}

/// Drop repeated tag ids, keeping listing order
pub fn dedup_tags(tags: Vec<Tag>) -> Vec<Tag> {
    let mut seen = HashSet::new();
    tags.into_iter().filter(|t| seen.insert(t.id.clone())).collect()
}

/// Sequential deletion engine
pub struct TagCleaner<'a> {
    service: &'a dyn TagService,
    token: &'a AccessToken,
    pacer: RequestPacer,
    progress: ProgressBar,
}

impl<'a> TagCleaner<'a> {
    pub fn new(service: &'a dyn TagService, token: &'a AccessToken, pacer: RequestPacer) -> Self {
        Self {
            service,
            token,
            pacer,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn pacer(&self) -> &RequestPacer {
        &self.pacer
    }

    /// Fetch the full tag list once
    ///
    /// Repeated ids are dropped, keeping the first occurrence.
    pub async fn fetch_tags(&self) -> Result<Vec<Tag>> {
        let listed = self.service.list_tags(self.token).await?;
        let listed_count = listed.len();
        let tags = dedup_tags(listed);
        if tags.len() < listed_count {
            warn!(
                "listing repeated {} tag ids; each tag is processed once",
                listed_count - tags.len()
            );
        }
        info!("discovered {} Raindrop tags", tags.len());
        Ok(tags)
    }

    /// Visit every tag of the plan once
    pub async fn run(&mut self, plan: &DeletionPlan<'_>) -> CleanupReport {
        let mut report = CleanupReport::new(plan.is_dry_run());

        for tag in plan.unique_tags() {
            let outcome = self.process(plan, &tag.id).await;
            report.record(&tag.id, outcome);
            self.progress.inc(1);
        }

        report
    }

    async fn process(&mut self, plan: &DeletionPlan<'_>, tag: &str) -> DeletionOutcome {
        info!("processing tag '{}'...", tag);

        if plan.allowlist.contains(tag) {
            info!("\ttag '{}' is allowlisted; skipping it.", tag);
            return DeletionOutcome::Skipped(SkipReason::Allowlisted);
        }

        if plan.dry_run {
            info!("\tdry run: would delete tag '{}'.", tag);
            return DeletionOutcome::Skipped(SkipReason::DryRun);
        }

        info!("\tdeleting tag '{}'...", tag);
        self.progress.set_message(format!("Deleting '{}'", tag));
        let outcome = match self.service.delete_tag(self.token, tag).await {
            Ok(()) => {
                info!("\t✓ succeeded.");
                DeletionOutcome::Succeeded
            }
            Err(e) => {
                warn!("\tfailed to delete tag '{}': {}", tag, e);
                DeletionOutcome::Failed(e.to_string())
            }
        };

        self.pacer.pace().await;
        outcome
    }
}

use crate::error::{Step, StepError};
use crate::migrator::{MigrationReport, RunSummary};
use crate::types::{AccountId, ResumeCursor};
use tracing::{error, info, warn};

/// Sink for operator-facing progress and outcome lines.
pub trait Reporter: Send + Sync {
    /// Called every N scanned keys with the cursor to resume from.
    fn progress(&self, scanned: usize, checkpoint: Option<&ResumeCursor>);
    fn previewed(&self, old_id: &AccountId, new_id: &AccountId);
    fn migrated(&self, report: &MigrationReport);
    fn failed(&self, error: &StepError);
    fn finished(&self, summary: &RunSummary);
}

/// Writes every line through `tracing`.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn progress(&self, scanned: usize, checkpoint: Option<&ResumeCursor>) {
        info!(
            scanned,
            cursor = checkpoint.map(ResumeCursor::as_str).unwrap_or(""),
            "Scan progress; pass --start-cursor with this cursor to resume"
        );
    }

    fn previewed(&self, old_id: &AccountId, new_id: &AccountId) {
        info!(account_id = %old_id, new_account_id = %new_id, "[DRY RUN] Would migrate account");
    }

    fn migrated(&self, report: &MigrationReport) {
        info!(
            account_id = %report.old_id,
            new_account_id = %report.new_id,
            students = report.dependents.students,
            instructors = report.dependents.instructors,
            account = ?report.primary.account,
            "Completed account migration"
        );
        if let Some(message) = report.blob.warning() {
            warn!(
                account_id = %report.old_id,
                new_account_id = %report.new_id,
                step = %Step::Blob,
                "Profile picture not relocated cleanly: {}",
                message
            );
        }
        if let Some(picture) = &report.primary.orphaned_picture {
            warn!(
                account_id = %report.old_id,
                new_account_id = %report.new_id,
                picture = %picture,
                "Existing profile kept; old profile picture is no longer referenced"
            );
        }
    }

    fn failed(&self, err: &StepError) {
        let cause = format!("{:#}", err.source);
        error!(
            account_id = %err.account_id,
            step = %err.step,
            error = %cause,
            "Account migration aborted; account left for a later run"
        );
    }

    fn finished(&self, summary: &RunSummary) {
        info!(
            scanned = summary.scanned,
            needing_migration = summary.needing_migration,
            migrated = summary.migrated,
            previewed = summary.previewed,
            creations_skipped = summary.creations_skipped,
            blob_warnings = summary.blob_warnings,
            failed = summary.failed.len(),
            cursor = summary
                .last_checkpoint
                .as_ref()
                .map(ResumeCursor::as_str)
                .unwrap_or(""),
            "Migration run finished"
        );
        for (account_id, step) in &summary.failed {
            warn!(account_id = %account_id, step = %step, "Account still needs migration");
        }
    }
}

// ============================================================================
// Test utilities
// ============================================================================

//! Orchestrates one migration run.
//!
//! Each candidate goes through a fixed sequence of steps, every one of which
//! converges when re-executed: dependents are repointed, the account and its
//! profile are recreated under the new id, the profile picture is moved on a
//! best-effort basis, and only then are the old records deleted. There is no
//! rollback; as long as the old account exists the next run finishes the
//! candidate.

use crate::blob_relocation::{BlobOutcome, relocate_picture};
use crate::blob_store::BlobStore;
use crate::dependents::{DependentsReport, repoint_dependents};
use crate::error::{MigrationError, Step, StepError};
use crate::relocator::{Creation, PrimaryReport, create_primary, delete_old_records};
use crate::reporter::Reporter;
use crate::scanner::Scanner;
use crate::search_index::SearchIndex;
use crate::storage::Storage;
use crate::strategies::MigrationStrategy;
use crate::types::{AccountId, ResumeCursor};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct MigratorConfig {
    pub page_size: usize,
    pub report_every: usize,
    pub start_cursor: Option<ResumeCursor>,
    pub dry_run: bool,
    pub relocate_blobs: bool,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            report_every: 100,
            start_cursor: None,
            dry_run: false,
            relocate_blobs: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    pub old_id: AccountId,
    pub new_id: AccountId,
    pub dependents: DependentsReport,
    pub primary: PrimaryReport,
    pub blob: BlobOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    /// The account is gone, typically migrated by an earlier run.
    Vanished,
    NotNeeded,
    Previewed { new_id: AccountId },
    Migrated(MigrationReport),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub scanned: usize,
    pub needing_migration: usize,
    pub migrated: usize,
    pub previewed: usize,
    pub creations_skipped: usize,
    pub blob_warnings: usize,
    pub failed: Vec<(AccountId, Step)>,
    pub last_checkpoint: Option<ResumeCursor>,
}

pub struct Migrator<S, B, I, R> {
    storage: Arc<S>,
    blobs: Arc<B>,
    index: Arc<I>,
    strategy: Arc<dyn MigrationStrategy>,
    reporter: R,
    config: MigratorConfig,
}

impl<S, B, I, R> Migrator<S, B, I, R>
where
    S: Storage,
    B: BlobStore,
    I: SearchIndex,
    R: Reporter,
{
    pub fn new(
        storage: Arc<S>,
        blobs: Arc<B>,
        index: Arc<I>,
        strategy: Arc<dyn MigrationStrategy>,
        reporter: R,
        config: MigratorConfig,
    ) -> Self {
        Self {
            storage,
            blobs,
            index,
            strategy,
            reporter,
            config,
        }
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Scans every candidate once, strictly one at a time. Only a scan
    /// failure ends the run early; candidate failures are reported and
    /// counted.
    pub async fn run(&self) -> Result<RunSummary, MigrationError> {
        let mut scanner = Scanner::new(
            self.storage.as_ref(),
            self.strategy.filter(),
            self.config.page_size,
            self.config.report_every,
            self.config.start_cursor.clone(),
        );
        let mut summary = RunSummary::default();

        while let Some(id) = scanner
            .next(&self.reporter)
            .await
            .map_err(MigrationError::Scan)?
        {
            summary.scanned += 1;
            match self.migrate_candidate(&id).await {
                Ok(CandidateOutcome::Vanished | CandidateOutcome::NotNeeded) => {}
                Ok(CandidateOutcome::Previewed { new_id }) => {
                    summary.needing_migration += 1;
                    summary.previewed += 1;
                    self.reporter.previewed(&id, &new_id);
                }
                Ok(CandidateOutcome::Migrated(report)) => {
                    summary.needing_migration += 1;
                    summary.migrated += 1;
                    if report.primary.account == Creation::SkippedExisting {
                        summary.creations_skipped += 1;
                    }
                    let orphaned = report.primary.orphaned_picture.is_some();
                    if report.blob.warning().is_some() || orphaned {
                        summary.blob_warnings += 1;
                    }
                    self.reporter.migrated(&report);
                }
                Err(err) => {
                    if err.step != Step::Check {
                        summary.needing_migration += 1;
                    }
                    self.reporter.failed(&err);
                    summary.failed.push((err.account_id.clone(), err.step));
                }
            }
        }

        summary.last_checkpoint = scanner.checkpoint().cloned();
        self.reporter.finished(&summary);
        Ok(summary)
    }

    /// Re-reads the account and, if it still needs migration, runs every
    /// step for it. Safe to call again for the same id after any failure.
    pub async fn migrate_candidate(
        &self,
        old_id: &AccountId,
    ) -> Result<CandidateOutcome, StepError> {
        let storage = self.storage.as_ref();

        let account = storage
            .get_account(old_id)
            .await
            .map_err(|e| StepError::new(old_id, Step::Check, e))?;
        let Some(account) = account else {
            info!(account_id = %old_id, "Account no longer exists, skipping");
            return Ok(CandidateOutcome::Vanished);
        };
        if !self.strategy.needs_migration(&account) {
            return Ok(CandidateOutcome::NotNeeded);
        }

        let new_id = self.strategy.new_account_id(&account);
        if new_id == *old_id {
            warn!(account_id = %old_id, "Strategy produced an unchanged id, skipping");
            return Ok(CandidateOutcome::NotNeeded);
        }
        if self.config.dry_run {
            return Ok(CandidateOutcome::Previewed { new_id });
        }

        info!(account_id = %old_id, new_account_id = %new_id, "Going to migrate account");

        let dependents = repoint_dependents(storage, self.index.as_ref(), old_id, &new_id)
            .await
            .map_err(|e| StepError::new(old_id, Step::Dependents, e))?;

        let primary = create_primary(storage, &account, &new_id)
            .await
            .map_err(|e| StepError::new(old_id, Step::Primary, e))?;

        let blob = relocate_picture(
            storage,
            self.blobs.as_ref(),
            old_id,
            &new_id,
            self.config.relocate_blobs,
        )
        .await;

        delete_old_records(storage, old_id)
            .await
            .map_err(|e| StepError::new(old_id, Step::Primary, e))?;

        Ok(CandidateOutcome::Migrated(MigrationReport {
            old_id: old_id.clone(),
            new_id,
            dependents,
            primary,
            blob,
        }))
    }
}

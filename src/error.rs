use crate::types::AccountId;
use std::fmt;
use thiserror::Error;

/// Steps of a single account migration, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Check,
    Dependents,
    Primary,
    Blob,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check => write!(f, "needs-migration check"),
            Self::Dependents => write!(f, "dependent rewrite"),
            Self::Primary => write!(f, "primary relocation"),
            Self::Blob => write!(f, "blob relocation"),
        }
    }
}

/// Failure confined to one candidate. The run continues with the next key and
/// the account stays migratable by a later run.
#[derive(Debug, Error)]
#[error("{step} failed for account {account_id}: {source:#}")]
pub struct StepError {
    pub account_id: AccountId,
    pub step: Step,
    pub source: anyhow::Error,
}

impl StepError {
    pub fn new(account_id: &AccountId, step: Step, source: anyhow::Error) -> Self {
        Self {
            account_id: account_id.clone(),
            step,
            source,
        }
    }
}

/// Failures that abort the whole run.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("account scan failed: {0:#}")]
    Scan(#[source] anyhow::Error),
}

//! Command-line and environment configuration for a migration run.
//!
//! Store locations follow the `DYNAMODB_TABLE` convention of the other
//! operator tools: they can be given as flags or as environment variables.

use crate::migrator::MigratorConfig;
use crate::storage::WriteMode;
use crate::strategies::{Lowercase, MigrationStrategy, StripEmailDomain};
use crate::types::ResumeCursor;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info";

/// Log filter from `RUST_LOG`-style directives, `info` when unset or invalid.
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    /// Turn `name@<domain>` ids into `name`
    StripDomain,
    /// Lower-case every id
    Lowercase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    /// Development target; profile pictures are not moved
    Local,
    Production,
}

/// Migrates account ids and everything keyed by them: students, instructors,
/// instructor search documents, profiles and profile pictures.
#[derive(Debug, Parser)]
#[command(name = "rekey", version)]
pub struct Cli {
    /// Which id migration to run
    #[arg(long, value_enum)]
    pub strategy: StrategyKind,

    /// Domain stripped by the strip-domain strategy
    #[arg(long, default_value = "gmail.com")]
    pub domain: String,

    /// DynamoDB table holding accounts, profiles, students and instructors
    #[arg(long, env = "ACCOUNTS_TABLE")]
    pub accounts_table: String,

    /// DynamoDB table holding instructor search documents
    #[arg(long, env = "SEARCH_TABLE")]
    pub search_table: String,

    /// S3 bucket holding profile pictures
    #[arg(long, env = "PICTURE_BUCKET")]
    pub picture_bucket: String,

    /// How per-collection batches are committed
    #[arg(long, value_enum, default_value_t = WriteMode::NonTransactional)]
    pub mode: WriteMode,

    /// Keys fetched per scan page
    #[arg(long, default_value_t = 100)]
    pub page_size: usize,

    /// Report the resume cursor every N scanned keys (0 disables)
    #[arg(long, default_value_t = 100)]
    pub report_every: usize,

    /// Resume a previous run from a reported cursor
    #[arg(long)]
    pub start_cursor: Option<String>,

    #[arg(long, value_enum, default_value_t = Environment::Production)]
    pub environment: Environment,

    /// Only report what would be migrated
    #[arg(long)]
    pub dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn strategy(&self) -> Arc<dyn MigrationStrategy> {
        match self.strategy {
            StrategyKind::StripDomain => Arc::new(StripEmailDomain::new(&self.domain)),
            StrategyKind::Lowercase => Arc::new(Lowercase),
        }
    }

    pub fn migrator_config(&self) -> Result<MigratorConfig> {
        anyhow::ensure!(self.page_size > 0, "--page-size must be at least 1");
        anyhow::ensure!(
            !(self.mode == WriteMode::Transactional && self.page_size > 1000),
            "--page-size above 1000 is not supported in transactional mode"
        );
        Ok(MigratorConfig {
            page_size: self.page_size,
            report_every: self.report_every,
            start_cursor: self
                .start_cursor
                .as_deref()
                .filter(|c| !c.is_empty())
                .map(ResumeCursor::new),
            dry_run: self.dry_run,
            relocate_blobs: self.environment != Environment::Local,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    fn parse(extra: &[&str]) -> Cli {
        let mut args = vec![
            "rekey",
            "--strategy",
            "strip-domain",
            "--accounts-table",
            "accounts",
            "--search-table",
            "search",
            "--picture-bucket",
            "pictures",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn defaults_match_operator_expectations() {
        let cli = parse(&[]);
        assert_eq!(cli.mode, WriteMode::NonTransactional);
        assert_eq!(cli.environment, Environment::Production);

        let config = cli.migrator_config().unwrap();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.report_every, 100);
        assert_eq!(config.start_cursor, None);
        assert!(config.relocate_blobs);
        assert!(!config.dry_run);
    }

    #[test]
    fn start_cursor_and_local_environment() {
        let cli = parse(&[
            "--start-cursor",
            "bob",
            "--environment",
            "local",
            "--dry-run",
        ]);
        let config = cli.migrator_config().unwrap();
        assert_eq!(config.start_cursor, Some(ResumeCursor::new("bob")));
        assert!(!config.relocate_blobs);
        assert!(config.dry_run);
    }

    #[test]
    fn transactional_mode_is_selectable() {
        let cli = parse(&["--mode", "transactional"]);
        assert_eq!(cli.mode, WriteMode::Transactional);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let cli = parse(&["--page-size", "0"]);
        assert!(cli.migrator_config().is_err());
    }

    #[test]
    fn strategy_is_required() {
        let result = Cli::try_parse_from([
            "rekey",
            "--accounts-table",
            "a",
            "--search-table",
            "s",
            "--picture-bucket",
            "p",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn log_filter_follows_rust_log() {
        assert_eq!(
            log_filter(Some("debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(
            log_filter(Some("rekey=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
    }

    #[test]
    fn log_filter_defaults_to_info() {
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(Some(" ")).max_level_hint(), Some(LevelFilter::INFO));
    }
}

//! Rewrites account ids across the accounts table, the instructor search
//! index and the picture bucket.
//!
//! Usage:
//!   ACCOUNTS_TABLE=accounts SEARCH_TABLE=search PICTURE_BUCKET=pictures \
//!     cargo run -- --strategy strip-domain --dry-run
//!
//! Progress lines carry a cursor; pass it back with `--start-cursor` to
//! resume an interrupted run.

use aws_config::BehaviorVersion;
use clap::Parser;
use rekey::blob_store::S3BlobStore;
use rekey::config::{self, Cli};
use rekey::migrator::Migrator;
use rekey::reporter::TracingReporter;
use rekey::search_index::DynamoSearchIndex;
use rekey::storage::dynamo::DynamoStorage;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = config::log_filter(std::env::var("RUST_LOG").ok().as_deref());
    if cli.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let migrator_config = cli.migrator_config()?;
    info!(
        strategy = ?cli.strategy,
        accounts_table = %cli.accounts_table,
        search_table = %cli.search_table,
        picture_bucket = %cli.picture_bucket,
        mode = %cli.mode,
        dry_run = cli.dry_run,
        "Starting account id migration"
    );
    if !migrator_config.relocate_blobs {
        info!("Local environment; profile pictures will not be relocated");
    }

    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let dynamodb_client = aws_sdk_dynamodb::Client::new(&config);
    let s3_client = aws_sdk_s3::Client::new(&config);

    let storage = Arc::new(DynamoStorage::new(
        dynamodb_client.clone(),
        cli.accounts_table.clone(),
        cli.mode,
    ));
    let blobs = Arc::new(S3BlobStore::new(s3_client, cli.picture_bucket.clone()));
    let index = Arc::new(DynamoSearchIndex::new(
        dynamodb_client,
        cli.search_table.clone(),
    ));

    let migrator = Migrator::new(
        storage,
        blobs,
        index,
        cli.strategy(),
        TracingReporter,
        migrator_config,
    );
    let summary = migrator.run().await?;

    if !summary.failed.is_empty() {
        warn!(
            failed = summary.failed.len(),
            "Some accounts were not migrated; rerun to retry them"
        );
    }
    Ok(())
}

//! Paged, resumable iteration over account keys.
//!
//! The scanner only checkpoints page boundaries: the cursor it reports is the
//! one that re-reads the page currently being processed, so a run restarted
//! from it repeats at most one page. Re-processing is safe because every
//! candidate is re-checked before anything is mutated.

use crate::reporter::Reporter;
use crate::storage::{AccountFilter, Storage};
use crate::types::{AccountId, ResumeCursor};
use anyhow::Result;
use std::collections::VecDeque;
use tracing::debug;

pub struct Scanner<'a, S> {
    storage: &'a S,
    filter: AccountFilter,
    page_size: usize,
    report_every: usize,
    buffer: VecDeque<AccountId>,
    page_start: Option<ResumeCursor>,
    next_page: Option<ResumeCursor>,
    exhausted: bool,
    yielded: usize,
}

impl<'a, S: Storage> Scanner<'a, S> {
    pub fn new(
        storage: &'a S,
        filter: AccountFilter,
        page_size: usize,
        report_every: usize,
        start: Option<ResumeCursor>,
    ) -> Self {
        Self {
            storage,
            filter,
            page_size,
            report_every,
            buffer: VecDeque::new(),
            page_start: start.clone(),
            next_page: start,
            exhausted: false,
            yielded: 0,
        }
    }

    /// Next candidate key, or `None` once the scan is exhausted. A query
    /// error is returned as-is and is not retried.
    pub async fn next<R: Reporter>(&mut self, reporter: &R) -> Result<Option<AccountId>> {
        while self.buffer.is_empty() {
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }

        let Some(id) = self.buffer.pop_front() else {
            return Ok(None);
        };
        self.yielded += 1;
        if self.report_every > 0 && self.yielded % self.report_every == 0 {
            reporter.progress(self.yielded, self.checkpoint());
        }
        Ok(Some(id))
    }

    /// Cursor that resumes the scan at the start of the current page.
    /// `None` means the beginning of the collection.
    pub fn checkpoint(&self) -> Option<&ResumeCursor> {
        self.page_start.as_ref()
    }

    pub fn yielded(&self) -> usize {
        self.yielded
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let start = self.next_page.take();
        let page = self
            .storage
            .scan_account_ids(&self.filter, start.as_ref(), self.page_size)
            .await?;

        debug!(
            keys = page.ids.len(),
            start = ?start.as_ref().map(ResumeCursor::as_str),
            "Fetched account page"
        );

        self.page_start = start;
        self.exhausted = page.next.is_none();
        self.next_page = page.next;
        self.buffer.extend(page.ids);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::test_utils::RecordingReporter;
    use crate::storage::test_utils::{FailPoint, InMemoryStorage, make_account};

    fn storage_with(ids: &[&str]) -> InMemoryStorage {
        ids.iter().fold(InMemoryStorage::new(), |storage, id| {
            storage.with_account(make_account(id, "NUS"))
        })
    }

    async fn drain(scanner: &mut Scanner<'_, InMemoryStorage>, reporter: &RecordingReporter) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some(id) = scanner.next(reporter).await.unwrap() {
            ids.push(id.to_string());
        }
        ids
    }

    #[tokio::test]
    async fn yields_every_key_across_pages() {
        let storage = storage_with(&["a", "b", "c", "d", "e"]);
        let reporter = RecordingReporter::default();
        let mut scanner = Scanner::new(&storage, AccountFilter::all(), 2, 0, None);

        assert_eq!(drain(&mut scanner, &reporter).await, ["a", "b", "c", "d", "e"]);
        assert_eq!(scanner.yielded(), 5);
        assert!(reporter.lines().is_empty());
    }

    #[tokio::test]
    async fn skips_pages_emptied_by_the_filter() {
        let storage = InMemoryStorage::new()
            .with_account(make_account("a", "MIT"))
            .with_account(make_account("b", "MIT"))
            .with_account(make_account("c", "NUS"));
        let reporter = RecordingReporter::default();
        let filter = AccountFilter::all().with_institute("NUS");
        let mut scanner = Scanner::new(&storage, filter, 2, 0, None);

        assert_eq!(drain(&mut scanner, &reporter).await, ["c"]);
    }

    #[tokio::test]
    async fn reports_page_start_cursor_at_cadence() {
        let storage = storage_with(&["a", "b", "c", "d", "e"]);
        let reporter = RecordingReporter::default();
        let mut scanner = Scanner::new(&storage, AccountFilter::all(), 2, 2, None);

        drain(&mut scanner, &reporter).await;
        assert_eq!(
            reporter.lines(),
            ["progress scanned=2 cursor=<start>", "progress scanned=4 cursor=b"]
        );
    }

    #[tokio::test]
    async fn resumes_from_reported_cursor() {
        let storage = storage_with(&["a", "b", "c", "d", "e"]);
        let reporter = RecordingReporter::default();
        let mut scanner = Scanner::new(
            &storage,
            AccountFilter::all(),
            2,
            0,
            Some(ResumeCursor::new("b")),
        );

        assert_eq!(drain(&mut scanner, &reporter).await, ["c", "d", "e"]);
        assert_eq!(scanner.checkpoint(), Some(&ResumeCursor::new("d")));
    }

    #[tokio::test]
    async fn query_failure_is_returned() {
        let storage = storage_with(&["a"]);
        storage.fail_on(FailPoint::Scan);
        let reporter = RecordingReporter::default();
        let mut scanner = Scanner::new(&storage, AccountFilter::all(), 2, 0, None);

        assert!(scanner.next(&reporter).await.is_err());
    }
}

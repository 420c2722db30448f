use crate::types::{Account, AccountId, CourseStudent, Instructor, ResumeCursor, StudentProfile};
use anyhow::Result;

pub mod dynamo;
pub use dynamo::DynamoStorage;

// ============================================================================
// Storage trait
// ============================================================================

#[allow(async_fn_in_trait)]
pub trait Storage: Send + Sync {
    /// Key-only scan of the account collection. `start` is exclusive; the
    /// returned page carries the cursor to pass back for the next page.
    async fn scan_account_ids(
        &self,
        filter: &AccountFilter,
        start: Option<&ResumeCursor>,
        page_size: usize,
    ) -> Result<KeyPage>;

    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>>;
    async fn put_account(&self, account: &Account) -> Result<()>;
    async fn delete_account(&self, id: &AccountId) -> Result<()>;

    async fn get_profile(&self, id: &AccountId) -> Result<Option<StudentProfile>>;
    async fn put_profile(&self, profile: &StudentProfile) -> Result<()>;
    async fn delete_profile(&self, id: &AccountId) -> Result<()>;

    async fn find_students_by_account(&self, id: &AccountId) -> Result<Vec<CourseStudent>>;
    async fn save_students(&self, students: &[CourseStudent]) -> Result<()>;

    async fn find_instructors_by_account(&self, id: &AccountId) -> Result<Vec<Instructor>>;
    async fn save_instructors(&self, instructors: &[Instructor]) -> Result<()>;
}

/// One page of a key-only scan. `next` is `None` once the scan is exhausted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyPage {
    pub ids: Vec<AccountId>,
    pub next: Option<ResumeCursor>,
}

/// How batch saves of a single collection are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum WriteMode {
    /// Plain batch writes. Partial batches are possible on failure.
    #[default]
    NonTransactional,
    /// Each chunk of a batch is committed all-or-nothing.
    Transactional,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonTransactional => write!(f, "non-transactional"),
            Self::Transactional => write!(f, "transactional"),
        }
    }
}

/// Restricts which accounts a scan yields. Evaluated by the store, so it may
/// only reference stored attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountFilter {
    pub id_contains: Option<String>,
    pub institute: Option<String>,
}

impl AccountFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn id_containing(fragment: impl Into<String>) -> Self {
        Self {
            id_contains: Some(fragment.into()),
            ..Self::default()
        }
    }

    pub fn with_institute(mut self, institute: impl Into<String>) -> Self {
        self.institute = Some(institute.into());
        self
    }

    pub fn matches(&self, account: &Account) -> bool {
        let id_ok = self
            .id_contains
            .as_deref()
            .is_none_or(|fragment| account.id.as_str().contains(fragment));
        let institute_ok = self
            .institute
            .as_deref()
            .is_none_or(|institute| account.institute == institute);
        id_ok && institute_ok
    }
}

// ============================================================================
// Test utilities: InMemoryStorage for in-crate tests
// ============================================================================

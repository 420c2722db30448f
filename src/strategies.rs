use crate::storage::AccountFilter;
use crate::types::{Account, AccountId};
use email_address::EmailAddress;
use std::str::FromStr;

/// Business rule of one identifier migration: which accounts move and where.
///
/// Both decisions must be pure and deterministic for a given account state;
/// the engine evaluates them again right before mutating anything.
pub trait MigrationStrategy: Send + Sync {
    /// Narrows the account scan. Accounts outside the filter are never seen.
    fn filter(&self) -> AccountFilter {
        AccountFilter::all()
    }

    fn needs_migration(&self, account: &Account) -> bool;

    fn new_account_id(&self, account: &Account) -> AccountId;
}

/// Turns e-mail shaped ids of one domain into their local part,
/// e.g. `alice@gmail.com` becomes `alice`.
#[derive(Debug, Clone)]
pub struct StripEmailDomain {
    domain: String,
}

impl StripEmailDomain {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.trim_start_matches('@').to_lowercase(),
        }
    }

    fn parse(&self, account: &Account) -> Option<EmailAddress> {
        EmailAddress::from_str(account.id.as_str())
            .ok()
            .filter(|email| email.domain().eq_ignore_ascii_case(&self.domain))
    }
}

impl MigrationStrategy for StripEmailDomain {
    fn filter(&self) -> AccountFilter {
        AccountFilter::id_containing(format!("@{}", self.domain))
    }

    fn needs_migration(&self, account: &Account) -> bool {
        self.parse(account).is_some()
    }

    fn new_account_id(&self, account: &Account) -> AccountId {
        match self.parse(account) {
            Some(email) => AccountId::new(email.local_part()),
            None => account.id.clone(),
        }
    }
}

/// Normalizes ids to lower case.
#[derive(Debug, Clone, Default)]
pub struct Lowercase;

impl MigrationStrategy for Lowercase {
    fn needs_migration(&self, account: &Account) -> bool {
        account.id.as_str() != account.id.as_str().to_lowercase()
    }

    fn new_account_id(&self, account: &Account) -> AccountId {
        AccountId::new(account.id.as_str().to_lowercase())
    }
}

use crate::storage::Storage;
use crate::types::{Account, AccountId, BlobRef, StudentProfile};
use anyhow::{Context, Result};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    Created,
    /// A record already existed under the new id and was left untouched.
    SkippedExisting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryReport {
    pub account: Creation,
    /// `None` when the account has no profile.
    pub profile: Option<Creation>,
    /// Picture of the old profile that the profile kept under the new id
    /// does not reference. It is lost once the old profile is deleted.
    pub orphaned_picture: Option<BlobRef>,
}

/// Creates `account` (as read under its old id) and its profile under
/// `new_id`, each only when absent. Nothing under the old id is touched;
/// see [`delete_old_records`].
pub async fn create_primary<S: Storage>(
    storage: &S,
    account: &Account,
    new_id: &AccountId,
) -> Result<PrimaryReport> {
    let old_id = &account.id;

    let old_profile = storage
        .get_profile(old_id)
        .await
        .context("Failed to load profile")?;
    let (profile, orphaned_picture) = match &old_profile {
        Some(old_profile) => {
            let (creation, orphaned) = create_profile(storage, old_profile, new_id).await?;
            (Some(creation), orphaned)
        }
        None => (None, None),
    };

    let existing = storage
        .get_account(new_id)
        .await
        .context("Failed to check for account under new id")?;
    let account_creation = if existing.is_none() {
        let mut moved = account.clone();
        moved.id = new_id.clone();
        storage.put_account(&moved).await?;
        Creation::Created
    } else {
        info!(
            account_id = %old_id,
            new_account_id = %new_id,
            "Skip creation of new account as account already exists"
        );
        Creation::SkippedExisting
    };

    Ok(PrimaryReport {
        account: account_creation,
        profile,
        orphaned_picture,
    })
}

/// Deletes the old profile, then the old account. The old account going
/// away marks the candidate as done, so this must be its last write.
pub async fn delete_old_records<S: Storage>(storage: &S, old_id: &AccountId) -> Result<()> {
    storage
        .delete_profile(old_id)
        .await
        .context("Failed to delete old profile")?;
    storage
        .delete_account(old_id)
        .await
        .context("Failed to delete old account")
}

async fn create_profile<S: Storage>(
    storage: &S,
    old_profile: &StudentProfile,
    new_id: &AccountId,
) -> Result<(Creation, Option<BlobRef>)> {
    let existing = storage
        .get_profile(new_id)
        .await
        .context("Failed to check for profile under new id")?;
    if let Some(existing) = existing {
        info!(
            account_id = %old_profile.account_id,
            new_account_id = %new_id,
            "Skip creation of new profile as profile already exists"
        );
        let orphaned = old_profile
            .picture
            .clone()
            .filter(|picture| existing.picture.as_ref() != Some(picture));
        if let Some(picture) = &orphaned {
            warn!(
                account_id = %old_profile.account_id,
                new_account_id = %new_id,
                picture = %picture,
                "Old profile picture is not referenced by the existing profile"
            );
        }
        return Ok((Creation::SkippedExisting, orphaned));
    }

    let mut moved = old_profile.clone();
    moved.account_id = new_id.clone();
    storage.put_profile(&moved).await?;
    Ok((Creation::Created, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_utils::{FailPoint, InMemoryStorage, make_account, make_profile};

    #[tokio::test]
    async fn creates_account_and_profile_without_touching_old_records() {
        let account = make_account("A1", "NUS");
        let storage = InMemoryStorage::new()
            .with_account(account.clone())
            .with_profile(make_profile("A1", Some("s3://pictures/A1")));

        let report = create_primary(&storage, &account, &"A2".into())
            .await
            .unwrap();

        assert_eq!(
            report,
            PrimaryReport {
                account: Creation::Created,
                profile: Some(Creation::Created),
                orphaned_picture: None,
            }
        );
        assert!(storage.account("A1").is_some());
        assert!(storage.profile("A1").is_some());
        let moved = storage.account("A2").unwrap();
        assert_eq!(moved.name, account.name);
        assert_eq!(moved.email, account.email);
        assert_eq!(
            storage.profile("A2").unwrap().picture.unwrap().as_str(),
            "s3://pictures/A1"
        );
    }

    #[tokio::test]
    async fn delete_old_records_removes_profile_and_account() {
        let storage = InMemoryStorage::new()
            .with_account(make_account("A1", "NUS"))
            .with_profile(make_profile("A1", None));

        delete_old_records(&storage, &"A1".into()).await.unwrap();

        assert!(storage.account("A1").is_none());
        assert!(storage.profile("A1").is_none());
    }

    #[tokio::test]
    async fn existing_account_is_not_overwritten() {
        let account = make_account("A1", "NUS");
        let mut existing = make_account("A2", "MIT");
        existing.name = "Already here".to_string();
        let storage = InMemoryStorage::new()
            .with_account(account.clone())
            .with_account(existing);

        let report = create_primary(&storage, &account, &"A2".into())
            .await
            .unwrap();

        assert_eq!(report.account, Creation::SkippedExisting);
        assert_eq!(report.profile, None);
        assert_eq!(storage.account_puts(), 0);
        assert_eq!(storage.account("A2").unwrap().name, "Already here");
    }

    #[tokio::test]
    async fn existing_profile_reports_orphaned_old_picture() {
        let account = make_account("A1", "NUS");
        let storage = InMemoryStorage::new()
            .with_account(account.clone())
            .with_profile(make_profile("A1", Some("s3://pictures/A1")))
            .with_profile(make_profile("A2", Some("s3://pictures/A2")));

        let report = create_primary(&storage, &account, &"A2".into())
            .await
            .unwrap();

        assert_eq!(report.profile, Some(Creation::SkippedExisting));
        assert_eq!(
            report.orphaned_picture,
            Some(BlobRef::new("s3://pictures/A1"))
        );
        assert_eq!(
            storage.profile("A2").unwrap().picture,
            Some(BlobRef::new("s3://pictures/A2"))
        );
    }

    #[tokio::test]
    async fn profile_created_by_earlier_attempt_is_not_an_orphan() {
        let account = make_account("A1", "NUS");
        let storage = InMemoryStorage::new()
            .with_account(account.clone())
            .with_profile(make_profile("A1", Some("s3://pictures/A1")))
            .with_profile(make_profile("A2", Some("s3://pictures/A1")));

        let report = create_primary(&storage, &account, &"A2".into())
            .await
            .unwrap();

        assert_eq!(report.profile, Some(Creation::SkippedExisting));
        assert_eq!(report.orphaned_picture, None);
    }

    #[tokio::test]
    async fn failed_creation_keeps_old_account() {
        let account = make_account("A1", "NUS");
        let storage = InMemoryStorage::new().with_account(account.clone());
        storage.fail_on(FailPoint::PutAccount);

        let result = create_primary(&storage, &account, &"A2".into()).await;

        assert!(result.is_err());
        assert!(storage.account("A1").is_some());
        assert!(storage.account("A2").is_none());
    }

    #[tokio::test]
    async fn creation_converges_across_attempts() {
        let account = make_account("A1", "NUS");
        let storage = InMemoryStorage::new().with_account(account.clone());

        create_primary(&storage, &account, &"A2".into())
            .await
            .unwrap();
        let report = create_primary(&storage, &account, &"A2".into())
            .await
            .unwrap();

        assert_eq!(report.account, Creation::SkippedExisting);
        assert_eq!(storage.account_puts(), 1);
    }
}

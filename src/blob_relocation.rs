//! Best-effort move of the profile picture to a key matching the new id.
//!
//! Nothing here can fail a migration: every failure becomes a `BlobOutcome`
//! carrying a warning, and the profile keeps the best reference available.

use crate::blob_store::{BlobError, BlobStore};
use crate::storage::Storage;
use crate::types::{AccountId, BlobRef};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum BlobOutcome {
    /// No profile under the new id, or no object under the old key.
    NotApplicable,
    /// Relocation is disabled for local targets; the reference is unchanged.
    SkippedLocal,
    Relocated(BlobRef),
    /// Copied and repointed, but the object under the old key is still there.
    OldObjectKept { reference: BlobRef, message: String },
    /// Nothing under the old key. The profile now points at the new key,
    /// where a previous run may already have put the object.
    Missing { reference: BlobRef, message: String },
    /// An object sits under the old key but the profile references
    /// something else, so it was left in place.
    Unreferenced { message: String },
    /// Copy, lookup or profile update failed; the profile keeps the old
    /// reference.
    Failed { message: String },
}

impl BlobOutcome {
    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::OldObjectKept { message, .. }
            | Self::Missing { message, .. }
            | Self::Unreferenced { message }
            | Self::Failed { message } => Some(message),
            Self::NotApplicable | Self::SkippedLocal | Self::Relocated(_) => None,
        }
    }
}

pub async fn relocate_picture<S: Storage, B: BlobStore>(
    storage: &S,
    blobs: &B,
    old_id: &AccountId,
    new_id: &AccountId,
    enabled: bool,
) -> BlobOutcome {
    let profile = match storage.get_profile(new_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return BlobOutcome::NotApplicable,
        Err(e) => {
            return BlobOutcome::Failed {
                message: format!("Failed to load profile: {:#}", e),
            };
        }
    };

    let old_reference = blobs.reference_for(old_id.as_str());
    if profile.picture.as_ref() != Some(&old_reference) {
        if !enabled {
            return BlobOutcome::NotApplicable;
        }
        return match blobs.exists(old_id.as_str()).await {
            Ok(false) => BlobOutcome::NotApplicable,
            Ok(true) => BlobOutcome::Unreferenced {
                message: format!(
                    "Picture object '{}' left in place; profile picture is {}",
                    old_id,
                    profile
                        .picture
                        .as_ref()
                        .map(BlobRef::as_str)
                        .unwrap_or("unset")
                ),
            },
            Err(e) => BlobOutcome::Failed {
                message: format!("Error during picture lookup: {}", e),
            },
        };
    }
    if !enabled {
        info!(account_id = %old_id, "Skipping picture relocation for local target");
        return BlobOutcome::SkippedLocal;
    }

    let new_reference = blobs.reference_for(new_id.as_str());
    let missing = match blobs.copy(old_id.as_str(), new_id.as_str()).await {
        Ok(()) => None,
        Err(e @ BlobError::NotFound(_)) => Some(format!("Profile picture not exist: {}", e)),
        Err(e) => {
            return BlobOutcome::Failed {
                message: format!("Error during picture copy: {}", e),
            };
        }
    };

    // The old object is only deleted once the profile points at the new key.
    let mut updated = profile;
    updated.picture = Some(new_reference.clone());
    if let Err(e) = storage.put_profile(&updated).await {
        return BlobOutcome::Failed {
            message: format!("Failed to repoint profile picture: {:#}", e),
        };
    }

    if let Some(message) = missing {
        return BlobOutcome::Missing {
            reference: new_reference,
            message,
        };
    }

    match blobs.delete(old_id.as_str()).await {
        Ok(()) => BlobOutcome::Relocated(new_reference),
        Err(e) => BlobOutcome::OldObjectKept {
            reference: new_reference,
            message: format!("Error during picture delete: {}", e),
        },
    }
}

use crate::search_index::SearchIndex;
use crate::storage::Storage;
use crate::types::{AccountId, Dependent, InstructorSearchDocument};
use anyhow::{Context, Result};
use tracing::info;

/// Number of records repointed per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependentsReport {
    pub students: usize,
    pub instructors: usize,
}

/// Rewrites every student and instructor that references `old_id` to
/// reference `new_id`, one batch per collection.
///
/// Instructor search documents are written before the instructors
/// themselves: if the save fails the instructors still reference `old_id`
/// and the next run rebuilds the documents again.
pub async fn repoint_dependents<S: Storage, I: SearchIndex>(
    storage: &S,
    index: &I,
    old_id: &AccountId,
    new_id: &AccountId,
) -> Result<DependentsReport> {
    let students = repoint(
        storage
            .find_students_by_account(old_id)
            .await
            .context("Failed to load students")?,
        old_id,
        new_id,
    );
    if !students.is_empty() {
        storage.save_students(&students).await?;
        info!(account_id = %old_id, new_account_id = %new_id, count = students.len(), "Repointed students");
    }

    let instructors = repoint(
        storage
            .find_instructors_by_account(old_id)
            .await
            .context("Failed to load instructors")?,
        old_id,
        new_id,
    );
    if !instructors.is_empty() {
        let documents: Vec<_> = instructors
            .iter()
            .map(InstructorSearchDocument::from_instructor)
            .collect();
        index
            .put_instructor_documents(&documents)
            .await
            .context("Failed to refresh instructor search documents")?;
        storage.save_instructors(&instructors).await?;
        info!(account_id = %old_id, new_account_id = %new_id, count = instructors.len(), "Repointed instructors");
    }

    Ok(DependentsReport {
        students: students.len(),
        instructors: instructors.len(),
    })
}

/// Index lookups may be stale, so records are re-checked before rewriting.
fn repoint<D: Dependent>(records: Vec<D>, old_id: &AccountId, new_id: &AccountId) -> Vec<D> {
    records
        .into_iter()
        .filter(|record| record.account_id() == Some(old_id))
        .map(|mut record| {
            record.set_account_id(new_id.clone());
            record
        })
        .collect()
}

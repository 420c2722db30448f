use super::{AccountFilter, KeyPage, Storage, WriteMode};
use crate::types::{
    Account, AccountId, BlobRef, CourseStudent, Instructor, ResumeCursor, StudentProfile,
};
use anyhow::{Context, Result};
use aws_sdk_dynamodb::{
    Client,
    types::{AttributeValue, Put, PutRequest, TransactWriteItem, WriteRequest},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::warn;

const ACCOUNT_PARTITION_KEY: &str = "ACCOUNT";
const PROFILE_PARTITION_KEY: &str = "PROFILE";
const STUDENT_PARTITION_KEY_PREFIX: &str = "STUDENT";
const INSTRUCTOR_PARTITION_KEY_PREFIX: &str = "INSTRUCTOR";
const STUDENT_ACCOUNT_INDEX: &str = "student_account_id_index";
const INSTRUCTOR_ACCOUNT_INDEX: &str = "instructor_account_id_index";
const BATCH_WRITE_LIMIT: usize = 25;
const TRANSACT_WRITE_LIMIT: usize = 100;
const MAX_UNPROCESSED_RESUBMITS: usize = 5;

type Item = HashMap<String, AttributeValue>;

// ============================================================================
// DynamoStorage: DynamoDB-backed Storage implementation
// ============================================================================

pub struct DynamoStorage {
    client: Client,
    table_name: String,
    write_mode: WriteMode,
}

impl DynamoStorage {
    pub fn new(client: Client, table_name: String, write_mode: WriteMode) -> Self {
        Self {
            client,
            table_name,
            write_mode,
        }
    }

    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.to_string()))
            .key("SK", AttributeValue::S(sk.to_string()))
            .consistent_read(true)
            .send()
            .await?;
        Ok(output.item)
    }

    async fn put(&self, item: Item) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await?;
        Ok(())
    }

    async fn delete(&self, pk: &str, sk: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.to_string()))
            .key("SK", AttributeValue::S(sk.to_string()))
            .send()
            .await?;
        Ok(())
    }

    /// Queries every item of a GSI whose key attribute equals `value`.
    /// GSI reads are eventually consistent.
    async fn query_index(&self, index: &str, attribute: &str, value: &str) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut exclusive_start_key = None;

        loop {
            let mut req = self
                .client
                .query()
                .table_name(&self.table_name)
                .index_name(index)
                .key_condition_expression("#attr = :value")
                .expression_attribute_names("#attr", attribute)
                .expression_attribute_values(":value", AttributeValue::S(value.to_string()));

            if let Some(start_key) = exclusive_start_key {
                req = req.set_exclusive_start_key(Some(start_key));
            }

            let output = req.send().await?;
            items.extend(output.items.unwrap_or_default());

            exclusive_start_key = output.last_evaluated_key;
            if exclusive_start_key.is_none() {
                break;
            }
        }

        Ok(items)
    }

    async fn write_items(&self, items: Vec<Item>) -> Result<()> {
        match self.write_mode {
            WriteMode::NonTransactional => {
                for chunk in items.chunks(BATCH_WRITE_LIMIT) {
                    self.batch_write(chunk).await?;
                }
            }
            WriteMode::Transactional => {
                for chunk in items.chunks(TRANSACT_WRITE_LIMIT) {
                    self.transact_write(chunk).await?;
                }
            }
        }
        Ok(())
    }

    async fn batch_write(&self, chunk: &[Item]) -> Result<()> {
        let requests = chunk
            .iter()
            .map(|item| -> Result<WriteRequest> {
                let put = PutRequest::builder().set_item(Some(item.clone())).build()?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<Result<Vec<_>>>()?;

        let mut pending = HashMap::from([(self.table_name.clone(), requests)]);
        for attempt in 0..=MAX_UNPROCESSED_RESUBMITS {
            let output = self
                .client
                .batch_write_item()
                .set_request_items(Some(pending))
                .send()
                .await?;

            pending = output.unprocessed_items.unwrap_or_default();
            pending.retain(|_, requests| !requests.is_empty());
            if pending.is_empty() {
                return Ok(());
            }
            warn!(
                attempt,
                unprocessed = pending.values().map(Vec::len).sum::<usize>(),
                "Batch write left unprocessed items, resubmitting"
            );
        }

        anyhow::bail!(
            "Batch write still had unprocessed items after {} resubmits",
            MAX_UNPROCESSED_RESUBMITS
        )
    }

    async fn transact_write(&self, chunk: &[Item]) -> Result<()> {
        let transact_items = chunk
            .iter()
            .map(|item| -> Result<TransactWriteItem> {
                let put = Put::builder()
                    .table_name(&self.table_name)
                    .set_item(Some(item.clone()))
                    .build()?;
                Ok(TransactWriteItem::builder().put(put).build())
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await?;
        Ok(())
    }
}

impl Storage for DynamoStorage {
    async fn scan_account_ids(
        &self,
        filter: &AccountFilter,
        start: Option<&ResumeCursor>,
        page_size: usize,
    ) -> Result<KeyPage> {
        let limit = i32::try_from(page_size).context("Page size too large")?;
        let mut req = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("PK = :pk")
            .expression_attribute_values(
                ":pk",
                AttributeValue::S(ACCOUNT_PARTITION_KEY.to_string()),
            )
            .projection_expression("SK")
            .limit(limit)
            .consistent_read(true);

        let mut conditions = Vec::new();
        if let Some(fragment) = &filter.id_contains {
            conditions.push("contains(account_id, :id_fragment)");
            req = req.expression_attribute_values(
                ":id_fragment",
                AttributeValue::S(fragment.clone()),
            );
        }
        if let Some(institute) = &filter.institute {
            conditions.push("#institute = :institute");
            req = req
                .expression_attribute_names("#institute", "institute")
                .expression_attribute_values(":institute", AttributeValue::S(institute.clone()));
        }
        if !conditions.is_empty() {
            req = req.filter_expression(conditions.join(" AND "));
        }

        if let Some(cursor) = start {
            req = req.set_exclusive_start_key(Some(key_from_cursor(cursor)));
        }

        let output = req.send().await.context("Failed to scan accounts")?;

        let ids = output
            .items
            .unwrap_or_default()
            .iter()
            .map(|item| string_attr(item, "SK").map(AccountId::new))
            .collect::<Result<Vec<_>>>()?;
        let next = output
            .last_evaluated_key
            .as_ref()
            .map(cursor_from_key)
            .transpose()?;

        Ok(KeyPage { ids, next })
    }

    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        self.get(ACCOUNT_PARTITION_KEY, id.as_str())
            .await
            .context("Failed to get account")?
            .map(account_from_item)
            .transpose()
    }

    async fn put_account(&self, account: &Account) -> Result<()> {
        self.put(account_to_item(account))
            .await
            .context("Failed to put account")
    }

    async fn delete_account(&self, id: &AccountId) -> Result<()> {
        self.delete(ACCOUNT_PARTITION_KEY, id.as_str())
            .await
            .context("Failed to delete account")
    }

    async fn get_profile(&self, id: &AccountId) -> Result<Option<StudentProfile>> {
        self.get(PROFILE_PARTITION_KEY, id.as_str())
            .await
            .context("Failed to get profile")?
            .map(profile_from_item)
            .transpose()
    }

    async fn put_profile(&self, profile: &StudentProfile) -> Result<()> {
        self.put(profile_to_item(profile))
            .await
            .context("Failed to put profile")
    }

    async fn delete_profile(&self, id: &AccountId) -> Result<()> {
        self.delete(PROFILE_PARTITION_KEY, id.as_str())
            .await
            .context("Failed to delete profile")
    }

    async fn find_students_by_account(&self, id: &AccountId) -> Result<Vec<CourseStudent>> {
        self.query_index(STUDENT_ACCOUNT_INDEX, "student_account_id", id.as_str())
            .await
            .context("Failed to query students by account")?
            .into_iter()
            .map(student_from_item)
            .collect()
    }

    async fn save_students(&self, students: &[CourseStudent]) -> Result<()> {
        self.write_items(students.iter().map(student_to_item).collect())
            .await
            .context("Failed to save students")
    }

    async fn find_instructors_by_account(&self, id: &AccountId) -> Result<Vec<Instructor>> {
        self.query_index(INSTRUCTOR_ACCOUNT_INDEX, "instructor_account_id", id.as_str())
            .await
            .context("Failed to query instructors by account")?
            .into_iter()
            .map(instructor_from_item)
            .collect()
    }

    async fn save_instructors(&self, instructors: &[Instructor]) -> Result<()> {
        self.write_items(instructors.iter().map(instructor_to_item).collect())
            .await
            .context("Failed to save instructors")
    }
}

// ============================================================================
// Cursor encoding
// ============================================================================

/// The account partition is fixed, so the sort key alone identifies the
/// position in the scan.
pub(crate) fn cursor_from_key(key: &Item) -> Result<ResumeCursor> {
    let pk = string_attr(key, "PK")?;
    anyhow::ensure!(
        pk == ACCOUNT_PARTITION_KEY,
        "Unexpected partition '{}' in scan position",
        pk
    );
    Ok(ResumeCursor::new(string_attr(key, "SK")?))
}

pub(crate) fn key_from_cursor(cursor: &ResumeCursor) -> Item {
    HashMap::from([
        (
            "PK".to_string(),
            AttributeValue::S(ACCOUNT_PARTITION_KEY.to_string()),
        ),
        ("SK".to_string(), AttributeValue::S(cursor.as_str().to_string())),
    ])
}

// ============================================================================
// Serialization helpers
// ============================================================================

fn string_attr(item: &Item, name: &str) -> Result<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Missing {} field", name))
}

fn optional_string_attr(item: &Item, name: &str) -> Option<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .filter(|s| !s.is_empty())
        .cloned()
}

fn bool_attr(item: &Item, name: &str) -> Result<bool> {
    item.get(name)
        .and_then(|v| v.as_bool().ok())
        .copied()
        .ok_or_else(|| anyhow::anyhow!("Missing {} field", name))
}

fn timestamp_attr(item: &Item, name: &str) -> Result<DateTime<Utc>> {
    string_attr(item, name)?
        .parse::<DateTime<Utc>>()
        .with_context(|| format!("Invalid {} timestamp", name))
}

fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

fn dependent_pk(prefix: &str, course_id: &str) -> String {
    format!("{}#{}", prefix, course_id)
}

pub(crate) fn account_to_item(account: &Account) -> Item {
    HashMap::from([
        ("PK".to_string(), s(ACCOUNT_PARTITION_KEY)),
        ("SK".to_string(), s(account.id.as_str())),
        ("account_id".to_string(), s(account.id.as_str())),
        ("name".to_string(), s(&account.name)),
        ("email".to_string(), s(&account.email)),
        ("institute".to_string(), s(&account.institute)),
        (
            "is_instructor".to_string(),
            AttributeValue::Bool(account.is_instructor),
        ),
        (
            "created_at".to_string(),
            s(&account.created_at.to_rfc3339()),
        ),
    ])
}

pub(crate) fn account_from_item(item: Item) -> Result<Account> {
    Ok(Account {
        id: AccountId::new(string_attr(&item, "account_id")?),
        name: string_attr(&item, "name")?,
        email: string_attr(&item, "email")?,
        institute: optional_string_attr(&item, "institute").unwrap_or_default(),
        is_instructor: bool_attr(&item, "is_instructor")?,
        created_at: timestamp_attr(&item, "created_at")?,
    })
}

pub(crate) fn profile_to_item(profile: &StudentProfile) -> Item {
    let mut item = HashMap::from([
        ("PK".to_string(), s(PROFILE_PARTITION_KEY)),
        ("SK".to_string(), s(profile.account_id.as_str())),
        ("account_id".to_string(), s(profile.account_id.as_str())),
        ("short_name".to_string(), s(&profile.short_name)),
        ("email".to_string(), s(&profile.email)),
        ("institute".to_string(), s(&profile.institute)),
        ("nationality".to_string(), s(&profile.nationality)),
        ("more_info".to_string(), s(&profile.more_info)),
        (
            "modified_at".to_string(),
            s(&profile.modified_at.to_rfc3339()),
        ),
    ]);
    if let Some(picture) = &profile.picture {
        item.insert("picture".to_string(), s(picture.as_str()));
    }
    item
}

pub(crate) fn profile_from_item(item: Item) -> Result<StudentProfile> {
    Ok(StudentProfile {
        account_id: AccountId::new(string_attr(&item, "account_id")?),
        short_name: optional_string_attr(&item, "short_name").unwrap_or_default(),
        email: optional_string_attr(&item, "email").unwrap_or_default(),
        institute: optional_string_attr(&item, "institute").unwrap_or_default(),
        nationality: optional_string_attr(&item, "nationality").unwrap_or_default(),
        more_info: optional_string_attr(&item, "more_info").unwrap_or_default(),
        picture: optional_string_attr(&item, "picture").map(BlobRef::new),
        modified_at: timestamp_attr(&item, "modified_at")?,
    })
}

pub(crate) fn student_to_item(student: &CourseStudent) -> Item {
    let mut item = HashMap::from([
        (
            "PK".to_string(),
            s(&dependent_pk(STUDENT_PARTITION_KEY_PREFIX, &student.course_id)),
        ),
        ("SK".to_string(), s(&student.email)),
        ("course_id".to_string(), s(&student.course_id)),
        ("email".to_string(), s(&student.email)),
        ("name".to_string(), s(&student.name)),
        ("team".to_string(), s(&student.team)),
        ("section".to_string(), s(&student.section)),
        ("comments".to_string(), s(&student.comments)),
    ]);
    // Unregistered students carry no account and stay out of the index.
    if let Some(account_id) = &student.account_id {
        item.insert("student_account_id".to_string(), s(account_id.as_str()));
    }
    item
}

pub(crate) fn student_from_item(item: Item) -> Result<CourseStudent> {
    Ok(CourseStudent {
        course_id: string_attr(&item, "course_id")?,
        email: string_attr(&item, "email")?,
        name: string_attr(&item, "name")?,
        account_id: optional_string_attr(&item, "student_account_id").map(AccountId::new),
        team: optional_string_attr(&item, "team").unwrap_or_default(),
        section: optional_string_attr(&item, "section").unwrap_or_default(),
        comments: optional_string_attr(&item, "comments").unwrap_or_default(),
    })
}

pub(crate) fn instructor_to_item(instructor: &Instructor) -> Item {
    let mut item = HashMap::from([
        (
            "PK".to_string(),
            s(&dependent_pk(
                INSTRUCTOR_PARTITION_KEY_PREFIX,
                &instructor.course_id,
            )),
        ),
        ("SK".to_string(), s(&instructor.email)),
        ("course_id".to_string(), s(&instructor.course_id)),
        ("email".to_string(), s(&instructor.email)),
        ("name".to_string(), s(&instructor.name)),
        ("role".to_string(), s(&instructor.role)),
        ("display_name".to_string(), s(&instructor.display_name)),
        (
            "is_archived".to_string(),
            AttributeValue::Bool(instructor.is_archived),
        ),
    ]);
    if let Some(account_id) = &instructor.account_id {
        item.insert("instructor_account_id".to_string(), s(account_id.as_str()));
    }
    item
}

pub(crate) fn instructor_from_item(item: Item) -> Result<Instructor> {
    Ok(Instructor {
        course_id: string_attr(&item, "course_id")?,
        email: string_attr(&item, "email")?,
        name: string_attr(&item, "name")?,
        account_id: optional_string_attr(&item, "instructor_account_id").map(AccountId::new),
        role: optional_string_attr(&item, "role").unwrap_or_default(),
        display_name: optional_string_attr(&item, "display_name").unwrap_or_default(),
        is_archived: bool_attr(&item, "is_archived").unwrap_or(false),
    })
}

// ============================================================================
// Tests: DynamoDB serialization helpers (no network required)
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_account() -> Account {
        Account {
            id: AccountId::from("alice@gmail.com"),
            name: "Alice".to_string(),
            email: "alice@uni.edu".to_string(),
            institute: "NUS".to_string(),
            is_instructor: true,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn account_item_keys_by_id() {
        let item = account_to_item(&make_account());
        assert_eq!(item["PK"], s("ACCOUNT"));
        assert_eq!(item["SK"], s("alice@gmail.com"));
        assert_eq!(account_from_item(item).unwrap(), make_account());
    }

    #[test]
    fn account_from_item_missing_created_at() {
        let mut item = account_to_item(&make_account());
        item.remove("created_at");
        assert!(account_from_item(item).is_err());
    }

    #[test]
    fn account_from_item_invalid_timestamp() {
        let mut item = account_to_item(&make_account());
        item.insert("created_at".to_string(), s("yesterday"));
        assert!(account_from_item(item).is_err());
    }

    #[test]
    fn profile_without_picture_has_no_picture_attribute() {
        let profile = StudentProfile {
            account_id: AccountId::from("alice"),
            short_name: "Al".to_string(),
            email: String::new(),
            institute: String::new(),
            nationality: String::new(),
            more_info: String::new(),
            picture: None,
            modified_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let item = profile_to_item(&profile);
        assert!(!item.contains_key("picture"));
        assert_eq!(profile_from_item(item).unwrap(), profile);
    }

    #[test]
    fn unregistered_student_is_not_indexed_by_account() {
        let student = CourseStudent {
            course_id: "CS101".to_string(),
            email: "bob@uni.edu".to_string(),
            name: "Bob".to_string(),
            account_id: None,
            team: "Team 1".to_string(),
            section: "S1".to_string(),
            comments: String::new(),
        };
        let item = student_to_item(&student);
        assert_eq!(item["PK"], s("STUDENT#CS101"));
        assert!(!item.contains_key("student_account_id"));
        assert_eq!(student_from_item(item).unwrap(), student);
    }

    #[test]
    fn instructor_item_carries_index_attribute() {
        let instructor = Instructor {
            course_id: "CS101".to_string(),
            email: "prof@uni.edu".to_string(),
            name: "Prof".to_string(),
            account_id: Some(AccountId::from("prof")),
            role: "Co-owner".to_string(),
            display_name: "Instructor".to_string(),
            is_archived: false,
        };
        let item = instructor_to_item(&instructor);
        assert_eq!(item["instructor_account_id"], s("prof"));
        assert_eq!(instructor_from_item(item).unwrap(), instructor);
    }

    #[test]
    fn cursor_is_the_sort_key_of_the_account_partition() {
        let key = key_from_cursor(&ResumeCursor::new("bob"));
        assert_eq!(key["PK"], s("ACCOUNT"));
        assert_eq!(cursor_from_key(&key).unwrap(), ResumeCursor::new("bob"));
    }

    #[test]
    fn cursor_from_foreign_partition_is_rejected() {
        let key = HashMap::from([
            ("PK".to_string(), s("PROFILE")),
            ("SK".to_string(), s("bob")),
        ]);
        assert!(cursor_from_key(&key).is_err());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Login identifier of an account. Dependent records point at accounts by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reference to a binary object in the picture store, e.g. `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque scan position. Only page boundaries are representable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResumeCursor(String);

impl ResumeCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResumeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An account record stored in DynamoDB.
/// PK="ACCOUNT", SK="{account_id}"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub institute: String,
    pub is_instructor: bool,
    pub created_at: DateTime<Utc>,
}

/// Profile attached 1:1 to an account, keyed by the same id.
/// PK="PROFILE", SK="{account_id}"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub account_id: AccountId,
    pub short_name: String,
    pub email: String,
    pub institute: String,
    pub nationality: String,
    pub more_info: String,
    pub picture: Option<BlobRef>,
    pub modified_at: DateTime<Utc>,
}

/// Enrollment of a student in a course.
/// PK="STUDENT#{course_id}", SK="{email}"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStudent {
    pub course_id: String,
    pub email: String,
    pub name: String,
    pub account_id: Option<AccountId>,
    pub team: String,
    pub section: String,
    pub comments: String,
}

/// Instructor of a course. Instructors are also indexed for search.
/// PK="INSTRUCTOR#{course_id}", SK="{email}"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instructor {
    pub course_id: String,
    pub email: String,
    pub name: String,
    pub account_id: Option<AccountId>,
    pub role: String,
    pub display_name: String,
    pub is_archived: bool,
}

/// A record in a secondary collection that references an account.
pub trait Dependent: Clone {
    /// Identity of the record within its own collection.
    fn record_key(&self) -> String;
    fn account_id(&self) -> Option<&AccountId>;
    fn set_account_id(&mut self, id: AccountId);
}

impl Dependent for CourseStudent {
    fn record_key(&self) -> String {
        format!("{}#{}", self.course_id, self.email)
    }

    fn account_id(&self) -> Option<&AccountId> {
        self.account_id.as_ref()
    }

    fn set_account_id(&mut self, id: AccountId) {
        self.account_id = Some(id);
    }
}

impl Dependent for Instructor {
    fn record_key(&self) -> String {
        format!("{}#{}", self.course_id, self.email)
    }

    fn account_id(&self) -> Option<&AccountId> {
        self.account_id.as_ref()
    }

    fn set_account_id(&mut self, id: AccountId) {
        self.account_id = Some(id);
    }
}

/// Denormalized projection of an instructor used for full-text lookup.
/// Always rebuilt from the instructor record, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorSearchDocument {
    pub id: String,
    pub course_id: String,
    pub name: String,
    pub email: String,
    pub account_id: Option<AccountId>,
    pub role: String,
    pub display_name: String,
    pub search_text: String,
}

impl InstructorSearchDocument {
    pub fn from_instructor(instructor: &Instructor) -> Self {
        let search_text = [
            instructor.course_id.as_str(),
            instructor.name.as_str(),
            instructor.email.as_str(),
            instructor
                .account_id
                .as_ref()
                .map(AccountId::as_str)
                .unwrap_or(""),
            instructor.role.as_str(),
            instructor.display_name.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

        Self {
            id: instructor.record_key(),
            course_id: instructor.course_id.clone(),
            name: instructor.name.clone(),
            email: instructor.email.clone(),
            account_id: instructor.account_id.clone(),
            role: instructor.role.clone(),
            display_name: instructor.display_name.clone(),
            search_text,
        }
    }
}

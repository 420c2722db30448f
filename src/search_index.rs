use crate::types::InstructorSearchDocument;
use anyhow::{Context, Result};
use aws_sdk_dynamodb::{Client, types::AttributeValue};
use std::collections::HashMap;

const INSTRUCTOR_DOCUMENT_PARTITION_KEY: &str = "INSTRUCTOR_DOC";

// ============================================================================
// SearchIndex trait
// ============================================================================

#[allow(async_fn_in_trait)]
pub trait SearchIndex: Send + Sync {
    /// Replaces the documents keyed by each document's owning instructor.
    async fn put_instructor_documents(&self, documents: &[InstructorSearchDocument])
    -> Result<()>;
}

// ============================================================================
// DynamoSearchIndex: documents kept in a dedicated DynamoDB table
// ============================================================================

pub struct DynamoSearchIndex {
    client: Client,
    table_name: String,
}

impl DynamoSearchIndex {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

impl SearchIndex for DynamoSearchIndex {
    async fn put_instructor_documents(
        &self,
        documents: &[InstructorSearchDocument],
    ) -> Result<()> {
        for document in documents {
            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(document_to_item(document)?))
                .send()
                .await
                .with_context(|| format!("Failed to index instructor {}", document.id))?;
        }
        Ok(())
    }
}

fn document_to_item(
    document: &InstructorSearchDocument,
) -> Result<HashMap<String, AttributeValue>> {
    Ok(HashMap::from([
        (
            "PK".to_string(),
            AttributeValue::S(INSTRUCTOR_DOCUMENT_PARTITION_KEY.to_string()),
        ),
        ("SK".to_string(), AttributeValue::S(document.id.clone())),
        (
            "search_text".to_string(),
            AttributeValue::S(document.search_text.clone()),
        ),
        (
            "document".to_string(),
            AttributeValue::S(serde_json::to_string(document)?),
        ),
    ]))
}

// ============================================================================
// Test utilities
// ============================================================================

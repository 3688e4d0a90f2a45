use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Processed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "uploaded" => Some(DocumentStatus::Uploaded),
            "processing" => Some(DocumentStatus::Processing),
            "processed" => Some(DocumentStatus::Processed),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }
}

/// A user document stored in the `documents` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub status: DocumentStatus,
    #[serde(default)]
    pub extracted_text: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub user_id: String,
    pub file_name: String,
    pub file_path: String,
    pub document_type: Option<String>,
    pub source: Option<String>,
    pub status: DocumentStatus,
}

/// Status transition for a document; optional fields are only written when set.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatusUpdate {
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl DocumentStatusUpdate {
    pub fn status(status: DocumentStatus) -> Self {
        Self {
            status,
            extracted_text: None,
            processed_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentFilter {
    pub document_type: Option<String>,
    pub status: Option<DocumentStatus>,
}

/// A window of document text. Positions are character offsets into the
/// preprocessed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub index: usize,
    pub content: String,
    pub start_position: usize,
    pub end_position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmbedding {
    pub document_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub chunk_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEmbedding {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub chunk_index: usize,
}

/// Chunk of a scraped official publication (gaceta or fallo PDF).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSourceEmbedding {
    #[serde(rename = "gaceta_url")]
    pub source_url: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub chunk_index: usize,
}

/// Row returned by the `match_documents` database function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub similarity: f32,
}

/// Arguments of the `match_documents` database function.
#[derive(Debug, Clone, Serialize)]
pub struct MatchParams {
    pub match_threshold: f32,
    pub match_count: usize,
    #[serde(rename = "p_user_id", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub title: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalDeadline {
    pub id: String,
    pub case_id: String,
    pub description: String,
    #[serde(deserialize_with = "date_prefix")]
    pub deadline_date: NaiveDate,
    pub is_completed: bool,
    pub notification_sent: bool,
}

/// A deadline joined with its parent case, as selected by
/// `legal_deadlines?select=*,cases:case_id(title,user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDeadline {
    #[serde(flatten)]
    pub deadline: LegalDeadline,
    pub cases: CaseSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Deadline,
    DeadlineExpired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub is_read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerState {
    pub id: String,
    pub source_url: String,
    #[serde(default)]
    pub content_selector: Option<String>,
    pub last_content_hash: String,
    pub last_checked_at: DateTime<Utc>,
    #[serde(default)]
    pub update_detected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_change_content_snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCrawlerState {
    pub source_url: String,
    pub content_selector: String,
    pub last_content_hash: String,
    pub last_checked_at: DateTime<Utc>,
    pub last_change_content_snippet: String,
}

/// Partial update of a crawler state row; unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlerStateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_content_hash: Option<String>,
    pub last_checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_detected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change_content_snippet: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSourceType {
    Publication,
    Website,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalUpdate {
    pub source: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub source_type: UpdateSourceType,
    pub is_new: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedGaceta {
    pub url: String,
    pub title: String,
    pub gaceta_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedFallo {
    pub url: String,
    pub title: String,
    pub tribunal: String,
    pub fallo_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Accepts both `2025-04-22` and full timestamps such as
/// `2025-04-22T00:00:00+00:00`.
fn date_prefix<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let day = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_deadline_reads_joined_case() {
        let row = serde_json::json!({
            "id": "d1",
            "case_id": "c1",
            "description": "Contestar demanda",
            "deadline_date": "2025-04-22T00:00:00+00:00",
            "is_completed": false,
            "notification_sent": false,
            "created_at": "2025-04-01T10:00:00Z",
            "cases": { "title": "Pérez vs. Gómez", "user_id": "u1" }
        });

        let pending: PendingDeadline = serde_json::from_value(row).unwrap();
        assert_eq!(
            pending.deadline.deadline_date,
            NaiveDate::from_ymd_opt(2025, 4, 22).unwrap()
        );
        assert_eq!(pending.cases.user_id, "u1");
    }

    #[test]
    fn notification_kind_serializes_as_type() {
        let notification = NewNotification {
            user_id: "u1".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            kind: NotificationKind::DeadlineExpired,
            is_read: false,
        };
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "deadline_expired");
    }
}

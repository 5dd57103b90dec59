use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::temporal::Timestamp;

/// One certification document (an academic credential).
///
/// `id` is the primary key and never changes after issue. `owner` names
/// the organization allowed to mutate the record and is likewise fixed.
/// `updated_at` is assigned by the registry on every write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub organization: String,
    pub document_type: String,
    pub document_name: String,
    pub student_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    /// Caller-supplied date, stored verbatim.
    pub issue_date: String,
    /// Content-addressable reference to the scanned certificate.
    pub image_hash: String,
    pub owner: String,
    pub updated_at: Timestamp,
}

impl Record {
    /// Check that every required field is non-empty. `grade` is optional.
    pub fn validate(&self) -> Result<(), TypeError> {
        let required: [(&'static str, &str); 8] = [
            ("id", &self.id),
            ("organization", &self.organization),
            ("documentType", &self.document_type),
            ("documentName", &self.document_name),
            ("studentName", &self.student_name),
            ("issueDate", &self.issue_date),
            ("imageHash", &self.image_hash),
            ("owner", &self.owner),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(TypeError::EmptyField { field });
            }
        }
        Ok(())
    }

    /// Returns `true` if `candidate` is this record's owner.
    pub fn is_owned_by(&self, candidate: &str) -> bool {
        self.owner == candidate
    }
}

/// A stored document as surfaced by bulk reads.
///
/// Bulk reads never fail on a single bad entry: bytes that do not decode
/// into a [`Record`] are carried as their lossy UTF-8 text instead.
/// Serialized untagged, so a raw entry appears as a bare JSON string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentView {
    Document(Record),
    Raw(String),
}

impl DocumentView {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Document(record) => Some(record),
            Self::Raw(_) => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

impl From<Record> for DocumentView {
    fn from(record: Record) -> Self {
        Self::Document(record)
    }
}

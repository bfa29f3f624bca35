//! Backend job integration
//!
//! Every tool runs as a job on the remote service: a task is submitted, its
//! status is polled until a completion value is reported, and the result is
//! either streamed back as `data:` frames or fetched as a whole document.

mod client;
mod poll;
mod stream;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::{JobClient, Upload};
pub use poll::{poll_until, PollPolicy};
pub use stream::{token_stream, StreamEvent};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Job {job_id} did not complete after {attempts} status checks")]
    PollTimeout { job_id: String, attempts: u32 },

    #[error("Stream reported an error: {0}")]
    StreamEvent(String),
}

/// Tools offered by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    #[serde(rename = "Grammar Correction")]
    GrammarCorrection,
    #[serde(rename = "Language Translation")]
    LanguageTranslation,
    #[serde(rename = "File OCR")]
    FileOcr,
    #[serde(rename = "Paraphraser")]
    Paraphraser,
    #[serde(rename = "Summarizer")]
    Summarizer,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::GrammarCorrection,
        Tool::LanguageTranslation,
        Tool::FileOcr,
        Tool::Paraphraser,
        Tool::Summarizer,
    ];

    pub fn id(self) -> u8 {
        match self {
            Tool::GrammarCorrection => 1,
            Tool::LanguageTranslation => 2,
            Tool::FileOcr => 3,
            Tool::Paraphraser => 4,
            Tool::Summarizer => 5,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Tool::GrammarCorrection => "Grammar Correction",
            Tool::LanguageTranslation => "Language Translation",
            Tool::FileOcr => "File OCR",
            Tool::Paraphraser => "Paraphraser",
            Tool::Summarizer => "Summarizer",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Tool::GrammarCorrection => "📝",
            Tool::LanguageTranslation => "💻",
            Tool::FileOcr => "📄",
            Tool::Paraphraser => "🔄",
            Tool::Summarizer => "📋",
        }
    }

    /// Identifier sent as the `taskid` form field
    pub fn task_id(self) -> String {
        normalize_task_id(self.name())
    }

    /// OCR and summarization only take uploaded documents
    pub fn accepts_text(self) -> bool {
        !matches!(self, Tool::FileOcr | Tool::Summarizer)
    }

    /// Grammar correction answers synchronously and is resolved by its own view
    pub fn is_grammar(self) -> bool {
        self == Tool::GrammarCorrection
    }
}

impl Default for Tool {
    fn default() -> Self {
        Tool::Summarizer
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub fn normalize_task_id(name: &str) -> String {
    let id = name.to_lowercase().replace(' ', "_");
    if id == "language_translation" {
        "translate".to_string()
    } else {
        id
    }
}

/// File extensions the upload picker accepts
pub const ACCEPTED_UPLOADS: [&str; 5] = ["pdf", "doc", "docx", "txt", "rtf"];

/// Status reported by `/job-status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Processing,
    OcrCompleted,
    SummarizerCompleted,
    TranslateCompleted,
    GrammarCompleted,
    Other(String),
}

impl JobStatus {
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            JobStatus::OcrCompleted
                | JobStatus::SummarizerCompleted
                | JobStatus::TranslateCompleted
                | JobStatus::GrammarCompleted
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::OcrCompleted => "ocr_completed",
            JobStatus::SummarizerCompleted => "summarizer_completed",
            JobStatus::TranslateCompleted => "translate_completed",
            JobStatus::GrammarCompleted => "grammar_completed",
            JobStatus::Other(status) => status,
        }
    }
}

impl From<String> for JobStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "processing" => JobStatus::Processing,
            "ocr_completed" => JobStatus::OcrCompleted,
            "summarizer_completed" => JobStatus::SummarizerCompleted,
            "translate_completed" => JobStatus::TranslateCompleted,
            "grammar_completed" => JobStatus::GrammarCompleted,
            _ => JobStatus::Other(status),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids() {
        assert_eq!(Tool::GrammarCorrection.task_id(), "grammar_correction");
        assert_eq!(Tool::LanguageTranslation.task_id(), "translate");
        assert_eq!(Tool::FileOcr.task_id(), "file_ocr");
        assert_eq!(Tool::Paraphraser.task_id(), "paraphraser");
        assert_eq!(Tool::Summarizer.task_id(), "summarizer");
    }

    #[test]
    fn test_tool_ids_round_trip() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_id(tool.id()), Some(tool));
        }
        assert_eq!(Tool::from_id(9), None);
        assert_eq!(Tool::default(), Tool::Summarizer);
    }

    #[test]
    fn test_text_input_per_tool() {
        assert!(Tool::GrammarCorrection.accepts_text());
        assert!(Tool::Paraphraser.accepts_text());
        assert!(!Tool::FileOcr.accepts_text());
        assert!(!Tool::Summarizer.accepts_text());
    }

    #[test]
    fn test_status_parsing() {
        let status: JobStatus = serde_json::from_str("\"summarizer_completed\"").unwrap();
        assert_eq!(status, JobStatus::SummarizerCompleted);
        assert!(status.is_completed());

        let processing: JobStatus = serde_json::from_str("\"processing\"").unwrap();
        assert!(!processing.is_completed());

        let unknown: JobStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(unknown, JobStatus::Other("failed".to_string()));
        assert!(!unknown.is_completed());
        assert_eq!(unknown.as_str(), "failed");
    }
}

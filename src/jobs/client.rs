//! HTTP client for the job backend

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;

use super::{JobError, JobStatus, Tool};

/// A document attached to a task submission
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Body of a successful `/submit-task` call
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub jobid: String,

    /// Original document rendered as HTML (grammar correction)
    #[serde(default, alias = "html_original")]
    pub html: Option<String>,

    /// Original document as plain text (grammar correction)
    #[serde(default)]
    pub content: Option<String>,
}

impl SubmitResponse {
    /// Original content and whether it is HTML. Falls back to the submitted query.
    pub fn original_content(&self, query: &str) -> (String, bool) {
        match (&self.html, &self.content) {
            (Some(html), _) => (html.clone(), true),
            (None, Some(content)) => (content.clone(), false),
            (None, None) => (query.to_string(), false),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: JobStatus,
}

/// Body of `/job-output/<id>`
#[derive(Debug, Clone, Deserialize)]
pub struct JobOutput {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl JobOutput {
    pub fn into_text(self) -> Option<String> {
        self.html.or(self.content)
    }
}

/// Client for submit, status, output and stream endpoints
pub struct JobClient {
    client: Client,
    stream_client: Client,
    api_url: String,
    grammar_api_url: String,
}

impl JobClient {
    pub fn new(config: &Config) -> Result<Self, JobError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.settings.http.timeout_secs))
            .build()?;
        // Streams stay open as long as the backend produces tokens
        let stream_client = Client::builder()
            .connect_timeout(Duration::from_secs(config.settings.http.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            stream_client,
            api_url: config.api_url.clone(),
            grammar_api_url: config.grammar_api_url.clone(),
        })
    }

    /// Grammar correction has its own backend; every other tool shares the default
    pub fn base_url(&self, tool: Tool) -> &str {
        if tool.is_grammar() {
            &self.grammar_api_url
        } else {
            &self.api_url
        }
    }

    pub async fn submit(
        &self,
        tool: Tool,
        query: &str,
        file: Option<Upload>,
    ) -> Result<SubmitResponse, JobError> {
        let mut form = Form::new()
            .text("taskid", tool.task_id())
            .text("query", query.to_string());

        if let Some(upload) = file {
            let mut part = Part::bytes(upload.bytes).file_name(upload.file_name);
            if let Some(mime) = upload.content_type {
                part = part.mime_str(&mime)?;
            }
            form = form.part("file", part);
        }

        let url = format!("{}/submit-task", self.base_url(tool));
        debug!(%url, task = %tool.task_id(), "Submitting task");

        let response = self.client.post(&url).multipart(form).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    pub async fn job_status(&self, tool: Tool, job_id: &str) -> Result<JobStatus, JobError> {
        let url = format!("{}/job-status", self.base_url(tool));
        let response = self
            .client
            .get(&url)
            .query(&[("jobid", job_id)])
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body: StatusResponse = response.json().await?;
        Ok(body.status)
    }

    pub async fn job_output(&self, tool: Tool, job_id: &str) -> Result<JobOutput, JobError> {
        let url = format!("{}/job-output/{}", self.base_url(tool), job_id);
        let response = self.client.get(&url).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Open the token stream for a completed job
    pub async fn open_stream(&self, tool: Tool, job_id: &str) -> Result<Response, JobError> {
        let url = format!("{}/stream/{}", self.base_url(tool), job_id);
        let response = self.stream_client.get(&url).send().await?;
        ensure_success(response).await
    }

    /// Where the corrected document of a grammar job can be downloaded
    pub fn download_url(&self, job_id: &str) -> String {
        format!("{}/grammar/download/{}", self.grammar_api_url, job_id)
    }
}

async fn ensure_success(response: Response) -> Result<Response, JobError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(JobError::Http { status, body })
}

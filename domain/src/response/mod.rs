//! Parsing of structured model responses
//!
//! Every stage's output passes through one of these parsers. A
//! [`ParseFailure`] carries the corrective instruction used for the single
//! re-prompt the orchestrator allows before failing the stage.

pub mod traceback;

use crate::blueprint::validate_relative_path;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub use traceback::{TraceFrame, parse_traceback};

/// A response that could not be turned into the structure a stage expects
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("Empty response")]
    EmptyResponse,

    #[error("No JSON object found (expected {expected})")]
    NoJson { expected: &'static str },

    #[error("Response does not match the {expected} schema: {reason}")]
    InvalidSchema {
        expected: &'static str,
        reason: String,
    },
}

impl ParseFailure {
    fn schema(expected: &'static str, reason: impl Into<String>) -> Self {
        ParseFailure::InvalidSchema {
            expected,
            reason: reason.into(),
        }
    }

    /// Instruction appended to the prompt for the corrective re-prompt
    pub fn corrective_instruction(&self) -> String {
        match self {
            ParseFailure::EmptyResponse => {
                "Your previous response was empty. Respond with the complete content now."
                    .to_string()
            }
            ParseFailure::NoJson { expected } => format!(
                "Your previous response did not contain a JSON object. Respond with ONLY a single valid JSON {} object, no prose.",
                expected
            ),
            ParseFailure::InvalidSchema { expected, reason } => format!(
                "Your previous response was not a valid {} ({}). Respond with ONLY a corrected JSON object.",
                expected, reason
            ),
        }
    }
}

/// Find a JSON object in a response: fenced block first, then the outermost
/// braces.
pub fn extract_json(response: &str) -> Option<Value> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(re) = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```")
        && let Some(caps) = re.captures(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(&caps[1])
    {
        return Some(value);
    }
    let first = trimmed.find('{')?;
    let last = trimmed.rfind('}')?;
    if last <= first {
        return None;
    }
    serde_json::from_str(&trimmed[first..=last]).ok()
}

/// Strip a surrounding markdown code fence from generated file content.
/// Content without a fence is returned trimmed.
pub fn clean_code_output(response: &str) -> String {
    let trimmed = response.trim();
    // Fully wrapped: keep everything between the outer fences so nested
    // fences (e.g. in generated Markdown) survive
    if trimmed.starts_with("```")
        && trimmed.len() > 3
        && trimmed.ends_with("```")
        && let Some(newline) = trimmed.find('\n')
    {
        let body = &trimmed[newline + 1..trimmed.len() - 3];
        return body.trim_end_matches([' ', '\t']).trim_end_matches('\n').to_string();
    }
    if let Ok(re) = Regex::new(r"(?s)```[A-Za-z0-9_+.\-]*[ \t]*\n(.*?)\n[ \t]*```")
        && let Some(caps) = re.captures(trimmed)
    {
        return caps[1].to_string();
    }
    trimmed.to_string()
}

/// Parse the Coder's output for one file
pub fn parse_file_content(response: &str) -> Result<String, ParseFailure> {
    let content = clean_code_output(response);
    if content.trim().is_empty() {
        return Err(ParseFailure::EmptyResponse);
    }
    let mut content = content;
    if !content.ends_with('\n') {
        content.push('\n');
    }
    Ok(content)
}

/// Per-file brief produced by the Scaffolding stage
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileBrief {
    #[serde(alias = "filename", alias = "file")]
    pub path: String,
    #[serde(default, alias = "purpose", alias = "description")]
    pub brief: String,
}

/// Ordered generation plan
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScaffoldPlan {
    pub files: Vec<FileBrief>,
}

impl ScaffoldPlan {
    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }
}

const SCAFFOLD: &str = "scaffold plan";
const REVIEW: &str = "review verdict";
const VALIDATION: &str = "validation verdict";

pub fn parse_scaffold_plan(response: &str) -> Result<ScaffoldPlan, ParseFailure> {
    if response.trim().is_empty() {
        return Err(ParseFailure::EmptyResponse);
    }
    let json = extract_json(response).ok_or(ParseFailure::NoJson { expected: SCAFFOLD })?;
    let plan: ScaffoldPlan =
        serde_json::from_value(json).map_err(|e| ParseFailure::schema(SCAFFOLD, e.to_string()))?;
    if plan.files.is_empty() {
        return Err(ParseFailure::schema(SCAFFOLD, "\"files\" is empty"));
    }
    for file in &plan.files {
        validate_relative_path(&file.path)
            .map_err(|e| ParseFailure::schema(SCAFFOLD, e.to_string()))?;
    }
    Ok(plan)
}

/// A Reviewer comment on one file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileComment {
    #[serde(alias = "filename", alias = "file")]
    pub path: String,
    #[serde(alias = "issue", alias = "message")]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub comments: Vec<FileComment>,
}

impl ReviewVerdict {
    pub fn approve(summary: impl Into<String>) -> Self {
        Self {
            approved: true,
            summary: summary.into(),
            comments: Vec::new(),
        }
    }

    /// Paths flagged for revision, in comment order without duplicates
    pub fn flagged_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for comment in &self.comments {
            if !files.contains(&comment.path) {
                files.push(comment.path.clone());
            }
        }
        files
    }

    /// All comments on `path`, joined
    pub fn comments_for(&self, path: &str) -> Option<String> {
        let notes: Vec<&str> = self
            .comments
            .iter()
            .filter(|c| c.path == path)
            .map(|c| c.comment.as_str())
            .collect();
        (!notes.is_empty()).then(|| notes.join("\n"))
    }

    /// Fold another reviewer's verdict into this one
    pub fn merge(&mut self, other: ReviewVerdict) {
        self.approved = self.approved && other.approved;
        if !other.summary.is_empty() {
            if !self.summary.is_empty() {
                self.summary.push('\n');
            }
            self.summary.push_str(&other.summary);
        }
        self.comments.extend(other.comments);
    }
}

pub fn parse_review_verdict(response: &str) -> Result<ReviewVerdict, ParseFailure> {
    if response.trim().is_empty() {
        return Err(ParseFailure::EmptyResponse);
    }
    let json = extract_json(response).ok_or(ParseFailure::NoJson { expected: REVIEW })?;
    serde_json::from_value(json).map_err(|e| ParseFailure::schema(REVIEW, e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidationVerdict {
    #[serde(alias = "success", alias = "pass")]
    pub passed: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidationVerdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
        }
    }

    pub fn fail(errors: Vec<String>) -> Self {
        Self {
            passed: false,
            errors,
        }
    }
}

pub fn parse_validation_verdict(response: &str) -> Result<ValidationVerdict, ParseFailure> {
    if response.trim().is_empty() {
        return Err(ParseFailure::EmptyResponse);
    }
    let json = extract_json(response).ok_or(ParseFailure::NoJson {
        expected: VALIDATION,
    })?;
    serde_json::from_value(json).map_err(|e| ParseFailure::schema(VALIDATION, e.to_string()))
}

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::pipeline::{ActionItem, MeetingSummary};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SummaryError {
    #[error("response is empty")]
    Empty,

    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("response does not match the summary schema: {0}")]
    Schema(String),

    #[error("field '{0}' must not be blank")]
    BlankField(String),
}

#[derive(Debug, Deserialize)]
struct WireSummary {
    summary: String,
    decisions: Vec<String>,
    action_items: Vec<WireActionItem>,
}

#[derive(Debug, Deserialize)]
struct WireActionItem {
    owner: String,
    task: String,
    due: String,
}

/// Turns a model response into a validated [`MeetingSummary`]. Anything
/// short of the full structure is rejected; there is no partial result.
pub struct SummaryParser {
    fence_regex: Regex,
}

impl SummaryParser {
    pub fn new() -> Result<Self> {
        // A single fenced block, optionally tagged json, filling the response.
        let fence_regex = Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n(.*?)\n?\s*```\s*$")?;
        Ok(Self { fence_regex })
    }

    pub fn parse(&self, raw: &str) -> Result<MeetingSummary, SummaryError> {
        let body = match self.fence_regex.captures(raw).and_then(|c| c.get(1)) {
            Some(inner) => {
                debug!("Stripped code fence from summary response");
                inner.as_str()
            }
            None => raw,
        }
        .trim();

        if body.is_empty() {
            return Err(SummaryError::Empty);
        }

        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| SummaryError::InvalidJson(e.to_string()))?;
        if !value.is_object() {
            return Err(SummaryError::Schema("expected a JSON object".to_string()));
        }
        let wire: WireSummary =
            serde_json::from_value(value).map_err(|e| SummaryError::Schema(e.to_string()))?;

        validate(wire)
    }
}

fn validate(wire: WireSummary) -> Result<MeetingSummary, SummaryError> {
    let summary = non_blank("summary", wire.summary)?;

    let decisions = wire
        .decisions
        .into_iter()
        .enumerate()
        .map(|(i, d)| non_blank(&format!("decisions[{}]", i), d))
        .collect::<Result<Vec<_>, _>>()?;

    let action_items = wire
        .action_items
        .into_iter()
        .enumerate()
        .map(|(i, item)| -> Result<ActionItem, SummaryError> {
            Ok(ActionItem {
                owner: non_blank(&format!("action_items[{}].owner", i), item.owner)?,
                task: non_blank(&format!("action_items[{}].task", i), item.task)?,
                due: non_blank(&format!("action_items[{}].due", i), item.due)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MeetingSummary {
        summary,
        decisions,
        action_items,
    })
}

fn non_blank(field: &str, value: String) -> Result<String, SummaryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SummaryError::BlankField(field.to_string()));
    }
    Ok(trimmed.to_string())
}

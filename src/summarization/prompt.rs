use serde::{Deserialize, Serialize};

/// Structured prompt sent with every transcript. Loaded once from config
/// and never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSpec {
    pub role: String,
    pub task: String,
    pub output_format: String,
    pub summary_requirement: String,
    pub decisions_requirement: String,
    pub action_items_requirement: String,
}

impl Default for PromptSpec {
    fn default() -> Self {
        Self {
            role: "Meeting assistant".to_string(),
            task: "Analyze the source text and extract a summary, the decisions, and the key actions."
                .to_string(),
            output_format: "STRICT JSON".to_string(),
            summary_requirement: "Concise summary, 5 sentences maximum.".to_string(),
            decisions_requirement: "List of final decisions and conclusions.".to_string(),
            action_items_requirement: "List of action items as (owner: task, due date).".to_string(),
        }
    }
}

impl PromptSpec {
    /// Instruction block sent as the system message.
    pub fn render(&self) -> String {
        format!(
            "Role: {role}\n\
             Task: {task}\n\
             Output format: {format}. Reply with a single JSON object and nothing else, \
             no markdown and no commentary.\n\
             Required fields:\n\
             - \"summary\" (string): {summary}\n\
             - \"decisions\" (array of strings): {decisions}\n\
             - \"action_items\" (array of objects with string fields \"owner\", \"task\", \"due\"): {actions} \
             Use \"unspecified\" when no owner or due date is stated.",
            role = self.role,
            task = self.task,
            format = self.output_format,
            summary = self.summary_requirement,
            decisions = self.decisions_requirement,
            actions = self.action_items_requirement,
        )
    }

    /// User message carrying the transcript.
    pub fn source_text(transcript: &str) -> String {
        format!("Source text:\n\"\"\"\n{}\n\"\"\"", transcript)
    }
}

//! `ask_user`: lets an agent put a question to the operator.
//!
//! There is no interactive channel, so the question is logged and a
//! configured placeholder answer is returned.

use std::time::Instant;

use async_trait::async_trait;

use crate::context::InvocationContext;
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

pub struct AskUserTool {
    answer: String,
}

impl AskUserTool {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask the user a question when information needed to finish the task is missing."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let question = require_str(&params, "question")?;
        tracing::info!("{} Agent asked: '{question}'", ctx.label());
        Ok(ToolOutput::text(
            format!("User responded: '{}'", self.answer),
            start.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_placeholder_answer() {
        let tool = AskUserTool::new("no idea, use defaults");
        let out = tool
            .execute(
                serde_json::json!({"question": "Which currency?"}),
                &InvocationContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(out.as_text(), "User responded: 'no idea, use defaults'");
    }

    #[tokio::test]
    async fn question_is_required() {
        let tool = AskUserTool::new("x");
        assert!(tool
            .execute(serde_json::json!({}), &InvocationContext::default())
            .await
            .is_err());
    }
}

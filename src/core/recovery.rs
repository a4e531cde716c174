//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction：结构化输出违例可以带着纠错提示重问一次，其余错误直接终止。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作（重试提示 / 终止）
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::SchemaViolation { detail, .. } => RecoveryAction::RetryWithPrompt(format!(
                "Your previous answer was rejected: {detail}. \
                 Reply with exactly one JSON object in the requested format, \
                 without Markdown, code fences or any other text. \
                 Only use names that appear in the provided lists."
            )),
            _ => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Stage;

    #[test]
    fn test_recovery_schema_violation() {
        let engine = RecoveryEngine::new();
        let err = AgentError::SchemaViolation {
            stage: Stage::TableSelection,
            detail: "unknown table `emp`".to_string(),
        };
        match engine.handle(&err) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("unknown table `emp`"));
                assert!(msg.contains("JSON"));
            }
            other => panic!("Expected RetryWithPrompt, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_no_relevant_tables_aborts() {
        let engine = RecoveryEngine::new();
        assert!(matches!(
            engine.handle(&AgentError::NoRelevantTables),
            RecoveryAction::Abort
        ));
    }
}

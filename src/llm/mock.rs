//! Mock LLM 客户端（无需 API Key）
//!
//! 通过 `Prompt::from_messages` 识别任务，按简单启发式给出确定性回答，
//! 足以在本地数据库上跑通整条工作流；无法识别的输入返回固定的演示文本。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message};
use crate::prompt::{field, Prompt, PromptTask};
use crate::workflow::output::parse_table_list;

pub const MOCK_FALLBACK: &str = "Mock response: This is a demo without API key";

/// Mock 客户端：确定性回答，记录调用次数
#[derive(Debug, Default)]
pub struct MockLlmClient {
    calls: AtomicU64,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let Some(prompt) = Prompt::from_messages(messages) else {
            return Ok(MOCK_FALLBACK.to_string());
        };
        let question = prompt.get(field::QUESTION).unwrap_or_default();

        let answer = match prompt.task {
            PromptTask::TableSelection => {
                let available = parse_table_list(prompt.get(field::AVAILABLE_TABLES).unwrap_or_default());
                select_tables(question, &available)
            }
            PromptTask::ColumnSelection => {
                let tables = parse_table_list(prompt.get(field::SELECTED_TABLES).unwrap_or_default());
                select_columns(&tables, prompt.get(field::SCHEMAS).unwrap_or_default())
            }
            PromptTask::SqlGeneration => generate_sql(
                question,
                prompt.get(field::SELECTED_TABLES).unwrap_or_default(),
                prompt.get(field::SELECTED_COLUMNS).unwrap_or_default(),
            ),
            PromptTask::SqlValidation => "valid".to_string(),
            PromptTask::Summarization => format!(
                "Answer to \"{}\": {}",
                question,
                prompt.get(field::QUERY_RESULT).unwrap_or_default()
            ),
        };
        Ok(answer)
    }
}

/// 问题里出现表名（或其单数形式）的表；都没有时取第一张
fn select_tables(question: &str, available: &[String]) -> String {
    let q = question.to_lowercase();
    let mut picked: Vec<&String> = available
        .iter()
        .filter(|t| {
            let name = t.to_lowercase();
            q.contains(&name) || q.contains(name.trim_end_matches('s'))
        })
        .collect();
    if picked.is_empty() {
        picked.extend(available.first());
    }
    serde_json::json!({ "table_target": picked }).to_string()
}

/// 从 CREATE TABLE 语句中取列名，取不到时用 `*`
fn select_columns(tables: &[String], schemas: &str) -> String {
    let mut target: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for table in tables {
        let cols = create_table_body(schemas, table)
            .map(column_names)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| vec!["*".to_string()]);
        target.insert(table, cols);
    }
    serde_json::json!({ "column_target": target }).to_string()
}

fn create_table_body<'a>(schemas: &'a str, table: &str) -> Option<&'a str> {
    let lower = schemas.to_ascii_lowercase();
    let mut search_from = 0;
    while let Some(pos) = lower[search_from..].find("create table") {
        let start = search_from + pos;
        let open = start + lower[start..].find('(')?;
        let header = lower[start + "create table".len()..open]
            .trim()
            .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']');
        if header == table.to_ascii_lowercase() {
            let close = matching_paren(&lower, open)?;
            return Some(&schemas[open + 1..close]);
        }
        search_from = open;
    }
    None
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn column_names(body: &str) -> Vec<String> {
    const CONSTRAINTS: [&str; 5] = ["primary", "foreign", "unique", "check", "constraint"];
    body.split(',')
        .filter_map(|def| def.split_whitespace().next())
        .map(|name| name.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']' || c == '('))
        .filter(|name| {
            !name.is_empty()
                && name.chars().all(|c| c.is_alphanumeric() || c == '_')
                && !CONSTRAINTS.contains(&name.to_lowercase().as_str())
        })
        .map(str::to_string)
        .collect()
}

/// 计数类问题生成 COUNT(*)，否则列出已选列
fn generate_sql(question: &str, selected_tables: &str, selected_columns: &str) -> String {
    let q = question.to_lowercase();
    let table = parse_table_list(selected_tables)
        .into_iter()
        .next()
        .unwrap_or_else(|| "unknown".to_string());

    let sql = if q.contains("how many") || q.contains("count") || q.contains("number of") {
        format!("SELECT COUNT(*) FROM {table}")
    } else {
        let columns = serde_json::from_str::<BTreeMap<String, Vec<String>>>(selected_columns)
            .ok()
            .and_then(|m| m.get(&table).cloned())
            .filter(|c| !c.is_empty())
            .map(|c| c.join(", "))
            .unwrap_or_else(|| "*".to_string());
        format!("SELECT {columns} FROM {table} LIMIT 10")
    };
    format!("```sql\n{sql};\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptTemplates;

    async fn ask(prompt: Prompt) -> String {
        let messages = PromptTemplates::default().render(&prompt);
        MockLlmClient::new().complete(&messages).await.unwrap()
    }

    #[tokio::test]
    async fn test_table_selection_by_name() {
        let out = ask(Prompt::new(PromptTask::TableSelection)
            .field(field::QUESTION, "How many employees are there?")
            .field(field::AVAILABLE_TABLES, "departments, employees"))
        .await;
        assert_eq!(out, r#"{"table_target":["employees"]}"#);
    }

    #[tokio::test]
    async fn test_column_selection_from_schema() {
        let schema = "CREATE TABLE employees (\n\tid INTEGER PRIMARY KEY,\n\tname TEXT NOT NULL,\n\tdept_id INTEGER,\n\tFOREIGN KEY(dept_id) REFERENCES departments(id)\n)";
        let out = ask(Prompt::new(PromptTask::ColumnSelection)
            .field(field::SELECTED_TABLES, "employees")
            .field(field::SCHEMAS, schema))
        .await;
        assert_eq!(out, r#"{"column_target":{"employees":["id","name","dept_id"]}}"#);
    }

    #[tokio::test]
    async fn test_sql_generation_count() {
        let out = ask(Prompt::new(PromptTask::SqlGeneration)
            .field(field::QUESTION, "How many employees are there?")
            .field(field::SELECTED_TABLES, "employees"))
        .await;
        assert_eq!(out, "```sql\nSELECT COUNT(*) FROM employees;\n```");
    }

    #[tokio::test]
    async fn test_unrecognized_prompt_falls_back() {
        let client = MockLlmClient::new();
        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, MOCK_FALLBACK);
        assert_eq!(client.calls(), 1);
    }
}

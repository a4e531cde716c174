//! 各任务的 prompt 模板
//!
//! 内置默认模板；若 `<prompts_dir>/<task>.txt` 存在则整体覆盖。
//! 未指定目录时按 config/prompts、../config/prompts 顺序查找。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::llm::Message;
use crate::prompt::{Prompt, PromptTask};
use crate::workflow::output::{column_target_schema, table_target_schema};

const TABLE_SELECTION: &str = r#"You analyze a user's question and decide which tables of a {dialect} database are needed to answer it.

Pick table names ONLY from the available tables you are given.
If no table is relevant, answer with the single word NULL.

Otherwise answer with one JSON object and nothing else, matching this JSON schema:
{format}

Example: {"table_target": ["table1", "table2"]}"#;

const COLUMN_SELECTION: &str = r#"You identify the columns needed to answer a question from the given tables of a {dialect} database.

Use the table schemas you are given. If two or more tables are involved, also include the columns that are FOREIGN KEYs to the other tables.
Do not invent tables or columns.

Answer with one JSON object and nothing else, matching this JSON schema:
{format}

Example: {"column_target": {"table1": ["col_a", "col_b"], "table2": ["col_c"]}}"#;

const SQL_GENERATION: &str = r#"You are a {dialect} expert with a strong attention to detail.

Given a question and the tables and columns to use, output one syntactically correct {dialect} query that answers it.
- Only query the relevant columns, never all columns of a table.
- You may order the results by a relevant column.
- Never write DML statements (INSERT, UPDATE, DELETE, DROP etc.).
- If a previous query and feedback are given, the previous query was rejected or failed: fix it.
- If the previous query returned an empty result, rewrite it so that it returns rows.

Output only the SQL query, without Markdown and without explanations."#;

const SQL_VALIDATION: &str = r#"You are a {dialect} expert with a strong attention to detail.

Double check the query for common mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for joins

If the query has none of these mistakes, answer with the single word: valid
Otherwise answer: invalid <one sentence describing the mistake>"#;

const SUMMARIZATION: &str = r#"Summarize the query result so that it answers the user's question.
Answer in plain language and do not mention SQL unless asked."#;

/// 模板集合：任务 -> 模板文本
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: HashMap<PromptTask, String>,
    dialect: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        let templates = PromptTask::ALL
            .into_iter()
            .map(|task| (task, default_template(task).to_string()))
            .collect();
        Self {
            templates,
            dialect: "SQLite".to_string(),
        }
    }
}

fn default_template(task: PromptTask) -> &'static str {
    match task {
        PromptTask::TableSelection => TABLE_SELECTION,
        PromptTask::ColumnSelection => COLUMN_SELECTION,
        PromptTask::SqlGeneration => SQL_GENERATION,
        PromptTask::SqlValidation => SQL_VALIDATION,
        PromptTask::Summarization => SUMMARIZATION,
    }
}

impl PromptTemplates {
    /// 加载模板：prompts_dir 指定时只查该目录，否则依次查 config/prompts、../config/prompts
    pub fn load(prompts_dir: Option<&Path>) -> Self {
        let dirs: Vec<PathBuf> = match prompts_dir {
            Some(dir) => vec![dir.to_path_buf()],
            None => vec![
                PathBuf::from("config/prompts"),
                PathBuf::from("../config/prompts"),
            ],
        };

        let mut templates = Self::default();
        for task in PromptTask::ALL {
            let found = dirs
                .iter()
                .map(|d| d.join(format!("{}.txt", task.as_str())))
                .find_map(|p| std::fs::read_to_string(&p).ok().map(|s| (p, s)));
            if let Some((path, content)) = found {
                if content.trim().is_empty() {
                    tracing::warn!(path = %path.display(), "Ignoring empty prompt template");
                    continue;
                }
                tracing::debug!(task = %task, path = %path.display(), "Loaded prompt template");
                templates.templates.insert(task, content.trim().to_string());
            }
        }
        templates
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    pub fn with_template(mut self, task: PromptTask, template: impl Into<String>) -> Self {
        self.templates.insert(task, template.into());
        self
    }

    pub fn template(&self, task: PromptTask) -> &str {
        self.templates
            .get(&task)
            .map(String::as_str)
            .unwrap_or_else(|| default_template(task))
    }

    /// 渲染为 [system, user] 两条消息
    pub fn render(&self, prompt: &Prompt) -> Vec<Message> {
        let format = match prompt.task {
            PromptTask::TableSelection => table_target_schema(),
            PromptTask::ColumnSelection => column_target_schema(),
            _ => String::new(),
        };
        let body = self
            .template(prompt.task)
            .replace("{format}", &format)
            .replace("{dialect}", &self.dialect);

        vec![
            Message::system(format!("{}\n\n{}", prompt.task_header(), body)),
            Message::user(prompt.render_fields()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::field;

    #[test]
    fn test_render_embeds_schema_and_dialect() {
        let templates = PromptTemplates::default().with_dialect("PostgreSQL");
        let prompt = Prompt::new(PromptTask::TableSelection)
            .field(field::QUESTION, "How many employees are there?")
            .field(field::AVAILABLE_TABLES, "employees, departments");
        let messages = templates.render(&prompt);

        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.starts_with("### task: table_selection"));
        assert!(messages[0].content.contains("\"table_target\""));
        assert!(messages[0].content.contains("PostgreSQL"));
        assert!(!messages[0].content.contains("{format}"));
        assert!(messages[1].content.contains("### available_tables\nemployees, departments"));
    }

    #[test]
    fn test_override_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("summarization.txt"),
            "Answer tersely in {dialect} terms.",
        )
        .unwrap();
        std::fs::write(dir.path().join("sql_validation.txt"), "   ").unwrap();

        let templates = PromptTemplates::load(Some(dir.path()));
        assert_eq!(
            templates.template(PromptTask::Summarization),
            "Answer tersely in {dialect} terms."
        );
        assert_eq!(templates.template(PromptTask::SqlValidation), SQL_VALIDATION);
    }
}

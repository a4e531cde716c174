//! 模型输出解析
//!
//! 决策阶段的结构化输出（选表 / 选列）严格按 schemars 生成的 JSON Schema 解析：
//! 容忍 ```json 代码块，拒绝未知字段，并检查名字是否属于候选集合。
//! SQL 文本与校验结论也在这里归一化。

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::AgentError;
use crate::workflow::{Stage, Verdict};

/// 选表输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TableTarget {
    /// Names of the tables needed to answer the question
    pub table_target: Vec<String>,
}

/// 选列输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ColumnTarget {
    /// Table name -> column names needed from that table
    pub column_target: BTreeMap<String, Vec<String>>,
}

pub fn table_target_schema() -> String {
    serde_json::to_string_pretty(&schema_for!(TableTarget)).unwrap_or_default()
}

pub fn column_target_schema() -> String {
    serde_json::to_string_pretty(&schema_for!(ColumnTarget)).unwrap_or_default()
}

/// 模型输出解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no JSON object found in output")]
    NoJson,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("column_target key `{0}` is not a selected table")]
    UnselectedTable(String),

    #[error("{0} is empty")]
    Empty(&'static str),

    #[error("model answered NULL")]
    NullAnswer,
}

impl ParseError {
    /// 转为阶段错误：NULL 表示无相关表；空 SQL / 空回答属于无效输出；其余为结构违例（可修复）
    pub fn into_agent_error(self, stage: Stage) -> AgentError {
        let detail = self.to_string();
        match self {
            ParseError::NullAnswer => AgentError::NoRelevantTables,
            ParseError::Empty("sql") | ParseError::Empty("answer") => {
                AgentError::InvalidModelOutput { stage, detail }
            }
            _ => AgentError::SchemaViolation { stage, detail },
        }
    }
}

/// 从模型输出中截取 JSON：优先 ```json 代码块，否则取第一个 `{` 到最后一个 `}`
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

fn is_null_answer(output: &str) -> bool {
    output
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`' || c == '.')
        .eq_ignore_ascii_case("null")
}

/// 逗号 / 换行分隔的表名列表
pub fn parse_table_list(text: &str) -> Vec<String> {
    text.split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 在候选集合中按大小写不敏感查找，返回候选中的原始写法
fn canonicalize<'a>(name: &str, candidates: &'a [String]) -> Option<&'a String> {
    let name = name.trim();
    candidates.iter().find(|c| c.eq_ignore_ascii_case(name))
}

/// 解析选表输出：结果为 available 的非空子集，按首次出现去重
pub fn parse_table_target(output: &str, available: &[String]) -> Result<Vec<String>, ParseError> {
    if is_null_answer(output) {
        return Err(ParseError::NullAnswer);
    }
    let json = extract_json(output).ok_or(ParseError::NoJson)?;
    let parsed: TableTarget =
        serde_json::from_str(json).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut tables = Vec::new();
    for name in &parsed.table_target {
        let canonical =
            canonicalize(name, available).ok_or_else(|| ParseError::UnknownTable(name.clone()))?;
        if seen.insert(canonical.to_ascii_lowercase()) {
            tables.push(canonical.clone());
        }
    }
    if tables.is_empty() {
        return Err(ParseError::Empty("table_target"));
    }
    Ok(tables)
}

/// 解析选列输出：键必须属于已选表，映射非空
pub fn parse_column_target(
    output: &str,
    selected: &[String],
) -> Result<BTreeMap<String, Vec<String>>, ParseError> {
    let json = extract_json(output).ok_or(ParseError::NoJson)?;
    let parsed: ColumnTarget =
        serde_json::from_str(json).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let mut columns: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (table, cols) in parsed.column_target {
        let canonical = canonicalize(&table, selected)
            .ok_or_else(|| ParseError::UnselectedTable(table.clone()))?;
        let entry = columns.entry(canonical.clone()).or_default();
        for col in cols {
            let col = col.trim().to_string();
            if !col.is_empty() && !entry.contains(&col) {
                entry.push(col);
            }
        }
    }
    if columns.is_empty() {
        return Err(ParseError::Empty("column_target"));
    }
    Ok(columns)
}

/// 压缩引号之外的连续空白；字符串字面量原样保留
fn collapse_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;
    for c in sql.chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c.is_whitespace() => pending_space = true,
            None => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("valid regex"))
}

fn dialect_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(sqlite|sql)\b\s*:?").expect("valid regex"))
}

/// 归一化生成的 SQL：去掉代码块与方言标记、反引号、分号、换行，并压缩字面量之外的空白
pub fn normalize_sql(output: &str) -> Result<String, ParseError> {
    let body = match fence_re().captures(output) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string(),
        None => output.to_string(),
    };
    let body = dialect_marker_re().replace(&body, "");
    let cleaned: String = body
        .chars()
        .filter(|c| *c != '`' && *c != ';')
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let sql = collapse_whitespace(cleaned.trim());
    if sql.is_empty() {
        return Err(ParseError::Empty("sql"));
    }
    Ok(sql)
}

/// 解析校验结论：首词 valid / invalid，其余文本为理由；无法识别时按 Invalid 处理
pub fn parse_verdict(output: &str) -> (Verdict, String) {
    let trimmed = output.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let first = parts
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_ascii_alphabetic())
        .to_ascii_lowercase();
    let rest = parts
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches([':', '-', ',', '.'])
        .trim()
        .to_string();

    match first.as_str() {
        "valid" => (Verdict::Valid, rest),
        "invalid" => {
            let reason = if rest.is_empty() {
                "query was judged invalid".to_string()
            } else {
                rest
            };
            (Verdict::Invalid, reason)
        }
        _ => (
            Verdict::Invalid,
            format!("unrecognized verdict: {}", preview(trimmed)),
        ),
    }
}

/// 截掉表结构中第一个 `/` 起的样例数据注释
pub fn trim_schema(raw: &str) -> String {
    match raw.find('/') {
        Some(idx) => raw[..idx].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > 80 {
        format!("{}...", s.chars().take(80).collect::<String>())
    } else {
        s.to_string()
    }
}

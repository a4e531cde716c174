//! Few-shot 示例：静态的「问题 → SQL」对，构建时加载一次，供 SQL 生成阶段使用

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 单条示例
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub input: String,
    pub query: String,
}

/// 示例集合（可为空）
#[derive(Debug, Clone, Default)]
pub struct FewShotSet {
    examples: Vec<FewShotExample>,
}

impl FewShotSet {
    pub fn new(examples: Vec<FewShotExample>) -> Self {
        Self { examples }
    }

    /// 加载示例文件；文件不存在时返回空集合，内容无法解析时告警并返回空集合
    pub fn load(path: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match path {
            Some(p) => vec![p.to_path_buf()],
            None => vec![
                PathBuf::from("config/few_shot/examples.json"),
                PathBuf::from("../config/few_shot/examples.json"),
            ],
        };

        let Some((path, content)) = candidates
            .iter()
            .find_map(|p| std::fs::read_to_string(p).ok().map(|c| (p, c)))
        else {
            tracing::debug!("No few-shot examples file found, continuing without examples");
            return Self::default();
        };

        match serde_json::from_str::<Vec<FewShotExample>>(&content) {
            Ok(examples) => {
                tracing::info!(path = %path.display(), count = examples.len(), "Loaded few-shot examples");
                Self { examples }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Invalid few-shot examples file, ignoring");
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn examples(&self) -> &[FewShotExample] {
        &self.examples
    }

    /// 渲染为 prompt 文本
    pub fn render(&self) -> String {
        self.examples
            .iter()
            .map(|e| format!("Question: {}\nSQL: {}", e.input, e.query))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

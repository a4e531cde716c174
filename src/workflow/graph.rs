//! 工作流状态图
//!
//! 使用邻接表描述合法的阶段转移；引擎据此拒绝阶段返回的非法路由，
//! 并可导出 Mermaid 代码用于可视化（粘贴到 https://mermaid.live/）。

use std::collections::{HashMap, HashSet, VecDeque};

use crate::workflow::Stage;

/// 工作流状态图
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    entry: Stage,
    /// 邻接表：阶段 -> 允许的后继阶段
    pub adjacency: HashMap<Stage, Vec<Stage>>,
}

impl WorkflowGraph {
    /// 标准的 NL → SQL 图
    pub fn standard() -> Self {
        let mut adjacency: HashMap<Stage, Vec<Stage>> = HashMap::new();
        let mut edge = |from: Stage, to: Stage| adjacency.entry(from).or_default().push(to);

        edge(Stage::TableDiscovery, Stage::TableSelection);
        edge(Stage::TableSelection, Stage::SchemaExtraction);
        edge(Stage::SchemaExtraction, Stage::ColumnSelection);
        edge(Stage::ColumnSelection, Stage::SqlGeneration);
        edge(Stage::SqlGeneration, Stage::SqlValidation);
        edge(Stage::SqlValidation, Stage::SqlExecution);
        edge(Stage::SqlValidation, Stage::SqlGeneration);
        edge(Stage::SqlExecution, Stage::ResultSummarization);
        edge(Stage::SqlExecution, Stage::SqlGeneration);
        edge(Stage::ResultSummarization, Stage::Terminal);

        Self {
            entry: Stage::TableDiscovery,
            adjacency,
        }
    }

    pub fn entry(&self) -> Stage {
        self.entry
    }

    pub fn successors(&self, stage: Stage) -> &[Stage] {
        self.adjacency.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn allows(&self, from: Stage, to: Stage) -> bool {
        self.successors(from).contains(&to)
    }

    /// 从入口可达的阶段集合（BFS）
    pub fn reachable(&self) -> HashSet<Stage> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([self.entry]);
        while let Some(stage) = queue.pop_front() {
            if seen.insert(stage) {
                queue.extend(self.successors(stage).iter().copied());
            }
        }
        seen
    }

    /// 每个可达阶段都存在到 Terminal 的路径（否则某些路由永远无法成功结束）
    pub fn can_terminate(&self) -> bool {
        let reachable = self.reachable();
        if !reachable.contains(&Stage::Terminal) {
            return false;
        }
        // 反向 BFS：从 Terminal 出发沿入边回溯
        let mut reverse: HashMap<Stage, Vec<Stage>> = HashMap::new();
        for (from, tos) in &self.adjacency {
            for to in tos {
                reverse.entry(*to).or_default().push(*from);
            }
        }
        let mut reaches_end = HashSet::new();
        let mut queue = VecDeque::from([Stage::Terminal]);
        while let Some(stage) = queue.pop_front() {
            if reaches_end.insert(stage) {
                if let Some(preds) = reverse.get(&stage) {
                    queue.extend(preds.iter().copied());
                }
            }
        }
        reachable.iter().all(|s| reaches_end.contains(s))
    }

    /// 导出 Mermaid flowchart；重入 SQL 生成的边带上回路标签
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        out.push_str(&format!("    START([start]) --> {}\n", self.entry.name()));
        for from in Stage::ALL {
            for to in self.successors(from) {
                let label = match (from, to) {
                    (Stage::SqlValidation, Stage::SqlExecution) => Some("valid"),
                    (Stage::SqlValidation, Stage::SqlGeneration) => Some("invalid"),
                    (Stage::SqlExecution, Stage::ResultSummarization) => Some("ok"),
                    (Stage::SqlExecution, Stage::SqlGeneration) => Some("error"),
                    _ => None,
                };
                let target = if *to == Stage::Terminal {
                    "END([end])".to_string()
                } else {
                    to.name().to_string()
                };
                match label {
                    Some(l) => out.push_str(&format!("    {} -->|{}| {}\n", from.name(), l, target)),
                    None => out.push_str(&format!("    {} --> {}\n", from.name(), target)),
                }
            }
        }
        out
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_edges() {
        let graph = WorkflowGraph::standard();
        assert_eq!(graph.entry(), Stage::TableDiscovery);
        assert!(graph.allows(Stage::SqlValidation, Stage::SqlExecution));
        assert!(graph.allows(Stage::SqlValidation, Stage::SqlGeneration));
        assert!(graph.allows(Stage::SqlExecution, Stage::SqlGeneration));
        assert!(!graph.allows(Stage::TableDiscovery, Stage::SqlExecution));
        assert!(!graph.allows(Stage::SqlGeneration, Stage::SqlExecution));
        assert!(graph.successors(Stage::Terminal).is_empty());
    }

    #[test]
    fn test_only_summarization_reaches_terminal() {
        let graph = WorkflowGraph::standard();
        for stage in Stage::ALL {
            let to_terminal = graph.allows(stage, Stage::Terminal);
            assert_eq!(to_terminal, stage == Stage::ResultSummarization, "{stage}");
        }
    }

    #[test]
    fn test_every_stage_can_terminate() {
        let graph = WorkflowGraph::standard();
        assert_eq!(graph.reachable().len(), Stage::ALL.len());
        assert!(graph.can_terminate());
    }

    #[test]
    fn test_dead_end_detected() {
        let mut graph = WorkflowGraph::standard();
        graph.adjacency.insert(Stage::SqlExecution, vec![Stage::SqlGeneration]);
        assert!(!graph.can_terminate());
    }

    #[test]
    fn test_mermaid_output() {
        let mermaid = WorkflowGraph::standard().to_mermaid();
        assert!(mermaid.starts_with("flowchart TD"));
        assert!(mermaid.contains("SQLValidation -->|invalid| SQLGeneration"));
        assert!(mermaid.contains("SQLExecution -->|error| SQLGeneration"));
        assert!(mermaid.contains("ResultSummarization --> END([end])"));
    }
}

//! sqlagent - 自然语言转 SQL 命令行
//!
//! 用法：
//! - `sqlagent "How many employees are there?"`：回答一个问题，stdout 输出 JSON 响应
//! - `sqlagent --graph`：输出工作流的 Mermaid 图
//! - `sqlagent`：从 stdin 逐行读取问题，每行输出一条 JSON
//! - `--config <path>`：追加配置文件

use std::path::PathBuf;

use anyhow::Context;
use sqlagent::{agent::SqlAgent, config::load_config, observability, workflow::WorkflowGraph};
use tokio::io::{AsyncBufReadExt, BufReader};

struct Args {
    config: Option<PathBuf>,
    graph: bool,
    question: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        graph: false,
        question: None,
    };
    let mut words = Vec::new();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--graph" => args.graph = true,
            "--config" => {
                let path = iter.next().context("--config requires a path")?;
                args.config = Some(PathBuf::from(path));
            }
            _ => words.push(arg),
        }
    }
    if !words.is_empty() {
        args.question = Some(words.join(" "));
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let args = parse_args()?;

    if args.graph {
        print!("{}", WorkflowGraph::standard().to_mermaid());
        return Ok(());
    }

    let cfg = load_config(args.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let agent = SqlAgent::from_config(&cfg)
        .await
        .context("Failed to create SQL agent")?;

    if let Some(question) = args.question {
        let response = agent.ask(&question).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = agent.ask(&line).await;
        println!("{}", serde_json::to_string(&response)?);
    }
    Ok(())
}

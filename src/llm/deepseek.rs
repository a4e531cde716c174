//! DeepSeek 后端：OpenAI 兼容端点，按 [llm] 配置段组装
//!
//! - Base URL: `llm.base_url`，缺省 https://api.deepseek.com
//! - 模型: `llm.deepseek.model` > `DEEPSEEK_MODEL` > `llm.model`

use std::time::Duration;

use crate::config::LlmSection;
use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 解析实际使用的模型名
pub fn deepseek_model(cfg: &LlmSection) -> String {
    cfg.deepseek
        .model
        .clone()
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            if cfg.model.trim().is_empty() {
                DEEPSEEK_CHAT.to_string()
            } else {
                cfg.model.clone()
            }
        })
}

/// 创建 DeepSeek 客户端；Key 取 `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY`
pub fn create_deepseek_client(cfg: &LlmSection) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    let base_url = cfg.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);

    OpenAiClient::new(Some(base_url), &deepseek_model(cfg), api_key.as_deref())
        .with_request_timeout(Duration::from_secs(cfg.timeouts.request.max(1)))
}

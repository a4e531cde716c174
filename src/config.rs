//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SQLAGENT__*` 覆盖（双下划线表示嵌套，如 `SQLAGENT__WORKFLOW__MAX_STEPS=30`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
}

/// [app] 段：应用名、单次提问的整体超时
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 整个 run 的调用方超时（秒），0 表示不限
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    300
}

/// [llm] 段：后端选择、重试与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 限流 / 超时 / 网络错误时的最大重试次数
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            max_retries: default_llm_max_retries(),
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_llm_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次模型调用超时（秒）
    #[serde(default = "default_llm_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_llm_request_timeout(),
        }
    }
}

fn default_llm_request_timeout() -> u64 {
    60
}

/// [database] 段：连接串、连接池与单次调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    /// 如 `sqlite:data/company.db`；未设置时读取环境变量 CONNECTION_STRING
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// 连接最长存活时间（秒），到期回收
    #[serde(default = "default_recycle_secs")]
    pub recycle_secs: u64,
    /// 以只读方式打开数据库，拒绝 DML
    #[serde(default = "default_read_only")]
    pub read_only: bool,
    /// list_tables / get_schema / run_query 单次超时（秒）
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            recycle_secs: default_recycle_secs(),
            read_only: default_read_only(),
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl DatabaseSection {
    /// 配置中的 url 优先，其次环境变量 CONNECTION_STRING
    pub fn resolved_url(&self) -> Option<String> {
        self.url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| std::env::var("CONNECTION_STRING").ok())
            .filter(|u| !u.trim().is_empty())
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_recycle_secs() -> u64 {
    300
}

fn default_read_only() -> bool {
    true
}

fn default_provider_timeout_secs() -> u64 {
    30
}

/// [workflow] 段：步数预算、两条重试回路的上限、修复重试、few-shot 与 prompt 目录
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// 校验判定 invalid 后的最大重新生成次数；0 表示只受 max_steps 约束
    #[serde(default = "default_loop_retries")]
    pub max_validation_retries: u32,
    /// 执行报错后的最大重新生成次数；0 表示只受 max_steps 约束
    #[serde(default = "default_loop_retries")]
    pub max_execution_retries: u32,
    /// 选表 / 选列 JSON 不合规时的重新提示次数
    #[serde(default = "default_parse_repair_attempts")]
    pub parse_repair_attempts: u32,
    /// 关闭后 SQL 校验阶段直接判定 valid，不调用模型
    #[serde(default = "default_validate_sql")]
    pub validate_sql: bool,
    pub few_shot_path: Option<PathBuf>,
    pub prompts_dir: Option<PathBuf>,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_validation_retries: default_loop_retries(),
            max_execution_retries: default_loop_retries(),
            parse_repair_attempts: default_parse_repair_attempts(),
            validate_sql: default_validate_sql(),
            few_shot_path: None,
            prompts_dir: None,
        }
    }
}

fn default_max_steps() -> usize {
    50
}

fn default_loop_retries() -> u32 {
    8
}

fn default_parse_repair_attempts() -> u32 {
    1
}

fn default_validate_sql() -> bool {
    true
}

/// 从 config 目录加载配置，环境变量 SQLAGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SQLAGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SQLAGENT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

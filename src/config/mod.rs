/// 脚本宿主配置
///
/// 提供TOML/JSON配置文件与环境变量覆盖
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::impl_default;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 默认配置文件名
pub const DEFAULT_TOML: &str = "voxel_script.toml";
pub const DEFAULT_JSON: &str = "voxel_script.json";

/// QuickJS 最小栈限制，低于此值连全局代码都无法执行
const MIN_STACK_SIZE: usize = 64 * 1024;

/// 脚本宿主主配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// 运行时资源限制
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// 绑定行为
    #[serde(default)]
    pub bindings: BindingsConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ScriptConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 按扩展名加载配置文件，`.json` 走JSON，其余按TOML解析
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("VOXEL_SCRIPT_MEMORY_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.runtime.memory_limit = Some(limit);
            }
        }
        if let Ok(val) = env::var("VOXEL_SCRIPT_MAX_STACK_SIZE") {
            if let Ok(size) = val.parse() {
                self.runtime.max_stack_size = Some(size);
            }
        }
        if let Ok(val) = env::var("VOXEL_SCRIPT_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.runtime.timeout_ms = Some(ms);
            }
        }
        if let Ok(val) = env::var("VOXEL_SCRIPT_ROOT_GLOBAL") {
            if !val.is_empty() {
                self.bindings.root_global = val;
            }
        }
        if let Ok(val) = env::var("VOXEL_SCRIPT_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                self.logging.level = level;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.runtime.validate()?;
        self.bindings.validate()?;
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./voxel_script.toml
    /// 2. ./voxel_script.json
    /// 3. 使用默认配置
    pub fn load_or_default() -> Self {
        if let Ok(config) = Self::from_toml_file(DEFAULT_TOML) {
            tracing::info!(target: "config", "Loaded config from {}", DEFAULT_TOML);
            return config;
        }

        if let Ok(config) = Self::from_json_file(DEFAULT_JSON) {
            tracing::info!(target: "config", "Loaded config from {}", DEFAULT_JSON);
            return config;
        }

        tracing::debug!(target: "config", "Using default configuration");
        Self::default()
    }
}

/// 运行时资源限制（字节），`None` 表示沿用 QuickJS 默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub memory_limit: Option<usize>,
    #[serde(default)]
    pub max_stack_size: Option<usize>,
    #[serde(default)]
    pub gc_threshold: Option<usize>,
    /// 单次求值的超时（毫秒），超时后脚本被中断
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl RuntimeConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.memory_limit == Some(0) {
            return Err(ConfigError::ValidationError(
                "runtime.memory_limit must be greater than zero".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "runtime.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(size) = self.max_stack_size {
            if size < MIN_STACK_SIZE {
                return Err(ConfigError::ValidationError(format!(
                    "runtime.max_stack_size must be at least {} bytes, got {}",
                    MIN_STACK_SIZE, size
                )));
            }
        }
        Ok(())
    }
}

/// 绑定行为配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingsConfig {
    /// 根对象的全局变量名
    pub root_global: String,

    /// 是否安装 `console` 与 `print`
    pub console: bool,

    /// 是否以严格模式求值脚本
    pub strict: bool,
}

impl_default!(BindingsConfig {
    root_global: "goxel".to_string(),
    console: true,
    strict: false,
});

impl BindingsConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let mut chars = self.root_global.chars();
        let valid_start = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
            .unwrap_or(false);
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
            return Err(ConfigError::ValidationError(format!(
                "bindings.root_global {:?} is not a valid identifier",
                self.root_global
            )));
        }
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 是否输出 target
    pub show_targets: bool,
}

impl_default!(LoggingConfig {
    level: LogLevel::Warn,
    show_targets: true,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// `EnvFilter` 指令
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScriptConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bindings.root_global, "goxel");
        assert!(config.bindings.console);
        assert!(!config.bindings.strict);
    }

    #[test]
    fn test_toml_serialization() {
        let mut config = ScriptConfig::default();
        config.runtime.memory_limit = Some(32 * 1024 * 1024);
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ScriptConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ScriptConfig::from_toml_str(
            r#"
            [bindings]
            root_global = "app"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.bindings.root_global, "app");
        assert!(config.bindings.console);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.runtime, RuntimeConfig::default());
    }

    #[test]
    fn test_json_parsing() {
        let config = ScriptConfig::from_json_str(
            r#"{ "runtime": { "max_stack_size": 1048576 }, "bindings": { "strict": true } }"#,
        )
        .unwrap();
        assert_eq!(config.runtime.max_stack_size, Some(1024 * 1024));
        assert!(config.bindings.strict);
        assert_eq!(config.bindings.root_global, "goxel");
    }

    #[test]
    fn test_invalid_root_global_rejected() {
        let mut config = ScriptConfig::default();
        config.bindings.root_global = "9lives".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
        config.bindings.root_global = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tiny_stack_rejected() {
        let mut config = ScriptConfig::default();
        config.runtime.max_stack_size = Some(1024);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error_reported() {
        assert!(matches!(
            ScriptConfig::from_toml_str("[bindings\nroot_global ="),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse(" info "), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("loud"), None);
    }
}

//! 日志初始化
//!
//! `RUST_LOG` 优先，未设置时回退到配置文件中的日志级别。

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// 初始化全局 tracing 订阅器
///
/// 重复调用是安全的，第二次调用会被忽略。日志写到 stderr，
/// stdout 留给脚本的 `console.log` 输出。
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.show_targets)
        .with_writer(std::io::stderr)
        .try_init();
    tracing::debug!(target: "voxel_script", level = config.level.as_filter(), "Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&config);
    }
}

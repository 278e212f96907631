//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 订阅器，过滤规则取自 `RUST_LOG`，缺省为 `info`。
//! 每帧收发为 `trace` 级别，调试总线时可使用 `RUST_LOG=openarm_driver=trace`。

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// 安装全局订阅器；已安装时返回错误
pub fn try_init_logger() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt().with_env_filter(env_filter()).try_init()
}

/// 安装全局订阅器；重复调用时静默忽略
pub fn init_logger() {
    if try_init_logger().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_idempotent() {
        init_logger();
        init_logger();
        assert!(try_init_logger().is_err());
    }
}

//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 安装全局 fmt subscriber
///
/// `RUST_LOG` 存在时优先使用，否则使用 `default_directive`（如 `"ardurep=info"`）。
/// 重复调用是安全的：已有全局 subscriber 时不做任何事。
///
/// # 返回值
/// 本次调用是否安装了 subscriber
pub fn init_logging(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

//! 驱动层错误类型定义

use crate::source::SourceError;
use ardurep_protocol::ProtocolError;
use ardurep_store::{SchemaError, StoreError};
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 输入源错误（打开或读取失败）
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// 存储错误
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Schema 错误
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Builder 缺少必要参数
    #[error("Invalid reader configuration: {0}")]
    InvalidConfig(String),

    /// 无法创建 Reader 线程
    #[error("Failed to spawn reader thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Reader 线程 panic
    #[error("Reader thread panicked")]
    ThreadPanicked,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}

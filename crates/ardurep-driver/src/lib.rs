//! 驱动层模块
//!
//! 本模块提供 Reader 线程管理，包括：
//! - 行输入源抽象（串口 / 任意 `BufRead`）
//! - 帧重组后写入共享 `SensorStore`
//! - 轮次计数与协作式停止
//! - 原子指标
//!
//! # 使用场景
//!
//! 每个串口设备一个 [`Reader`]，多个 Reader 可以共享同一个存储。
//! 大多数用户通过 `ardurep` crate 的配置文件启动 Reader。

mod builder;
mod error;
pub mod metrics;
pub mod pipeline;
mod reader;
#[cfg(unix)]
pub mod serial;
pub mod source;

pub use builder::{DEFAULT_BAUD_RATE, ReaderBuilder};
pub use error::DriverError;
pub use metrics::{ReaderMetrics, ReaderMetricsSnapshot};
pub use pipeline::{Lifetime, ReaderConfig, reader_loop};
pub use reader::Reader;
#[cfg(unix)]
pub use serial::SerialSource;
pub use source::{BufReadSource, LineSource, SourceError};

//! Ardurep - 串口传感器 JSON 报告采集
//!
//! 从串口设备读取按行分帧的 JSON 报告，按 schema 映射字段名，
//! 在共享存储中保留每个传感器的最新值，并以文本或 JSON 输出。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 行分类、帧重组、帧解码
//! - **存储层** (`store`): schema 字段映射、传感器记录存储、渲染与导出
//! - **驱动层** (`driver`): 输入源、Reader 线程、轮次计数、指标
//! - **本 crate**: 配置文件、日志初始化、Sink
//!
//! # 快速开始
//!
//! ```no_run
//! use ardurep::prelude::*;
//!
//! ardurep::init_logging("ardurep=info");
//!
//! let config = ArdurepConfig::from_file("ardurep.toml").unwrap();
//! let store = config.build_store().unwrap();
//! let spawned = config.spawn_readers(&store).unwrap();
//! for (device, err) in &spawned.failures {
//!     eprintln!("{}: {}", device.display(), err);
//! }
//!
//! let mut sink = StdoutSink::new();
//! sink.report(&store).unwrap();
//!
//! for reader in spawned.readers {
//!     reader.join().unwrap();
//! }
//! ```

pub mod config;
pub mod logging;
pub mod prelude;
pub mod sink;

// 分层 crate 通过模块路径访问
pub use ardurep_driver as driver;
pub use ardurep_protocol as protocol;
pub use ardurep_store as store;

// 常用类型
pub use ardurep_driver::{DriverError, Reader, ReaderBuilder, ReaderConfig};
pub use ardurep_protocol::{FrameAssembler, ProtocolError, SensorValue};
pub use ardurep_store::{KeyMapping, SchemaError, SchemaKeyMapper, SensorStore, StoreError};
pub use config::{ArdurepConfig, ConfigError, SpawnedReaders};
pub use logging::init_logging;
pub use sink::{FileSink, Sink, SinkError, SinkTarget, StdoutSink};

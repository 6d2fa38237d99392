//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use ardurep::prelude::*;
//! ```

pub use crate::config::{ArdurepConfig, SpawnedReaders};
pub use crate::sink::{FileSink, Sink, SinkTarget, StdoutSink};

pub use ardurep_driver::{LineSource, Reader, ReaderBuilder, ReaderConfig};
pub use ardurep_store::{KeyMapping, SchemaKeyMapper, SensorStore};

// 错误类型
pub use crate::config::ConfigError;
pub use crate::sink::SinkError;
pub use ardurep_driver::DriverError;
pub use ardurep_store::{SchemaError, StoreError};

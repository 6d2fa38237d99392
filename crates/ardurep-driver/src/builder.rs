//! Builder 模式实现
//!
//! 提供链式构造串口 `Reader` 的便捷方式。

use crate::error::DriverError;
use crate::pipeline::ReaderConfig;
use crate::reader::Reader;
use ardurep_store::SensorStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// 默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Reader Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use ardurep_driver::ReaderBuilder;
/// use ardurep_store::SensorStore;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let store = Arc::new(SensorStore::default());
/// let reader = ReaderBuilder::new()
///     .device("/dev/ttyACM0")
///     .baud_rate(115_200)
///     .rounds(0)
///     .poll_interval(Duration::from_millis(50))
///     .build(store)
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ReaderBuilder {
    /// Reader 名称（线程名和日志），默认取设备路径
    name: Option<String>,
    /// 串口设备路径
    device: Option<PathBuf>,
    /// 波特率（默认 9600）
    baud_rate: Option<u32>,
    /// 循环配置
    config: ReaderConfig,
}

impl Default for ReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            device: None,
            baud_rate: None,
            config: ReaderConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 设置串口设备（必需）
    pub fn device(mut self, device: impl Into<PathBuf>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// 设置波特率（可选，默认 9600）
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// 轮次上限，0 表示不限
    pub fn rounds(mut self, rounds: u64) -> Self {
        self.config.rounds = rounds;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// 整体替换循环配置
    pub fn reader_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// 当前循环配置
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// 打开串口并启动 Reader
    ///
    /// 读超时在这里应用到串口输入源。
    ///
    /// # 错误
    /// - `DriverError::InvalidConfig`: 未设置设备路径
    /// - `DriverError::Source`: 打开或配置串口失败
    #[cfg(unix)]
    pub fn build(self, store: Arc<SensorStore>) -> Result<Reader, DriverError> {
        use crate::serial::SerialSource;
        use tracing::error;

        let device = self
            .device
            .ok_or_else(|| DriverError::InvalidConfig("device path is required".to_string()))?;
        let baud_rate = self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

        let source = SerialSource::open(&device, baud_rate, self.config.read_timeout()).map_err(|e| {
            error!("{}", e);
            DriverError::Source(e)
        })?;

        let name = self.name.unwrap_or_else(|| device.display().to_string());
        Reader::spawn(name, source, store, self.config)
    }
}

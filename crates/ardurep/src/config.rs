//! 配置文件
//!
//! ```toml
//! [store]
//! input_schema = "schemas/default-schema.json"
//! input_meta_schema = "schemas/meta-schema.json"
//!
//! [[reader]]
//! device = "/dev/ttyACM0"
//! baud_rate = 9600
//! rounds = 0
//! ```
//!
//! 相对路径按配置文件所在目录解析。

use ardurep_driver::{DEFAULT_BAUD_RATE, DriverError, ReaderBuilder, ReaderConfig};
use ardurep_store::{KeyMapping, SchemaError, SensorStore, read_schema};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// [`ArdurepConfig::spawn_readers`] 的结果
///
/// 某个设备打开失败只影响它自己的 Reader，其余照常启动。
#[derive(Debug, Default)]
pub struct SpawnedReaders {
    /// 已启动的 Reader
    pub readers: Vec<ardurep_driver::Reader>,
    /// 打开失败的设备（解析后的路径）及原因
    pub failures: Vec<(PathBuf, DriverError)>,
}

impl SpawnedReaders {
    /// 是否所有设备都已启动
    pub fn all_started(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 顶层配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArdurepConfig {
    /// 字段映射
    #[serde(default)]
    pub store: StoreSection,

    /// 串口 Reader 列表
    #[serde(default, rename = "reader")]
    pub readers: Vec<ReaderSection>,

    /// 相对路径的解析基准（配置文件所在目录）
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// `[store]`：四个可选的 schema 文档路径
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    pub input_schema: Option<PathBuf>,
    pub input_meta_schema: Option<PathBuf>,
    pub output_schema: Option<PathBuf>,
    pub output_meta_schema: Option<PathBuf>,
}

/// `[[reader]]`：一个串口设备
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReaderSection {
    /// 设备路径
    pub device: PathBuf,

    /// Reader 名称，默认取设备路径
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// 轮次上限，0 表示不限
    #[serde(default = "default_rounds")]
    pub rounds: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_rounds() -> u64 {
    ReaderConfig::default().rounds
}

fn default_poll_interval_ms() -> u64 {
    ReaderConfig::default().poll_interval_ms
}

fn default_read_timeout_ms() -> u64 {
    ReaderConfig::default().read_timeout_ms
}

impl ReaderSection {
    /// 循环配置
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            rounds: self.rounds,
            poll_interval_ms: self.poll_interval_ms,
            read_timeout_ms: self.read_timeout_ms,
        }
    }

    /// 对应的 Builder
    pub fn builder(&self) -> ReaderBuilder {
        let builder = ReaderBuilder::new()
            .device(&self.device)
            .baud_rate(self.baud_rate)
            .reader_config(self.reader_config());
        match &self.name {
            Some(name) => builder.name(name),
            None => builder,
        }
    }
}

impl ArdurepConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::parse(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// 从 TOML 文本解析配置（相对路径按当前目录解析）
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, reader) in self.readers.iter().enumerate() {
            if reader.device.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!("reader {} has an empty device path", index)));
            }
            if reader.baud_rate == 0 {
                return Err(ConfigError::Invalid(format!("reader {} has a zero baud rate", index)));
            }
        }
        Ok(())
    }

    /// 设置相对路径的解析基准
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// 解析配置中的路径
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn read_optional(&self, path: Option<&PathBuf>) -> Result<Option<String>, ConfigError> {
        path.map(|p| read_schema(&self.resolve(p)))
            .transpose()
            .map_err(ConfigError::from)
    }

    /// 读取 schema 文档并构造字段映射
    pub fn key_mapping(&self) -> Result<KeyMapping, ConfigError> {
        let store = &self.store;
        let input_schema = self.read_optional(store.input_schema.as_ref())?;
        let input_meta_schema = self.read_optional(store.input_meta_schema.as_ref())?;
        let output_schema = self.read_optional(store.output_schema.as_ref())?;
        let output_meta_schema = self.read_optional(store.output_meta_schema.as_ref())?;

        let mapping = KeyMapping::from_schemas(
            input_schema.as_deref(),
            input_meta_schema.as_deref(),
            output_schema.as_deref(),
            output_meta_schema.as_deref(),
        )?;
        Ok(mapping)
    }

    /// 构造共享存储
    pub fn build_store(&self) -> Result<Arc<SensorStore>, ConfigError> {
        Ok(Arc::new(SensorStore::new(self.key_mapping()?)))
    }

    /// 为每个 `[[reader]]` 打开串口并启动 Reader
    ///
    /// 设备打开失败记录 `error!` 后跳过，失败列表随结果返回；
    /// 只有配置本身无效时才返回错误。
    #[cfg(unix)]
    pub fn spawn_readers(&self, store: &Arc<SensorStore>) -> Result<SpawnedReaders, ConfigError> {
        self.validate()?;

        let mut spawned = SpawnedReaders::default();
        for section in &self.readers {
            let device = self.resolve(&section.device);
            let section = ReaderSection {
                device: device.clone(),
                ..section.clone()
            };
            match section.builder().build(store.clone()) {
                Ok(reader) => spawned.readers.push(reader),
                Err(e) => {
                    error!("Failed to start reader on {}: {}", device.display(), e);
                    spawned.failures.push((device, e));
                },
            }
        }

        info!(
            "Spawned {} reader(s), {} failed",
            spawned.readers.len(),
            spawned.failures.len()
        );
        Ok(spawned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = ArdurepConfig::parse("").unwrap();
        assert_eq!(config, ArdurepConfig::default());
        assert_eq!(config.key_mapping().unwrap(), KeyMapping::default());
    }

    #[test]
    fn test_reader_defaults() {
        let config = ArdurepConfig::parse(
            r#"
            [[reader]]
            device = "/dev/ttyACM0"

            [[reader]]
            device = "/dev/ttyACM1"
            name = "greenhouse"
            baud_rate = 115200
            rounds = 0
            poll_interval_ms = 10
            read_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.readers.len(), 2);
        let first = &config.readers[0];
        assert_eq!(first.baud_rate, 9600);
        assert_eq!(first.reader_config(), ReaderConfig::default());
        assert!(first.name.is_none());

        let second = &config.readers[1];
        assert_eq!(second.name.as_deref(), Some("greenhouse"));
        assert_eq!(
            second.reader_config(),
            ReaderConfig {
                rounds: 0,
                poll_interval_ms: 10,
                read_timeout_ms: 250,
            }
        );
    }

    #[test]
    fn test_unknown_reader_field_is_rejected() {
        let err = ArdurepConfig::parse("[[reader]]\ndevice = \"/dev/x\"\nbaud = 9600\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_invalid_reader() {
        let err = ArdurepConfig::parse("[[reader]]\ndevice = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("empty device")));

        let err = ArdurepConfig::parse("[[reader]]\ndevice = \"/dev/x\"\nbaud_rate = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("zero baud")));
    }

    #[test]
    fn test_resolve() {
        let config = ArdurepConfig::default().with_base_dir("/etc/ardurep");
        assert_eq!(
            config.resolve(Path::new("schemas/meta-schema.json")),
            PathBuf::from("/etc/ardurep/schemas/meta-schema.json")
        );
        assert_eq!(config.resolve(Path::new("/abs/x.json")), PathBuf::from("/abs/x.json"));
        assert_eq!(
            ArdurepConfig::default().resolve(Path::new("rel.json")),
            PathBuf::from("rel.json")
        );
    }

    #[test]
    fn test_missing_schema_file() {
        let config = ArdurepConfig::parse("[store]\ninput_schema = \"/nonexistent/ardurep/schema.json\"\n").unwrap();
        let err = config.key_mapping().unwrap_err();
        assert!(matches!(err, ConfigError::Schema(SchemaError::Io { .. })));
    }
}

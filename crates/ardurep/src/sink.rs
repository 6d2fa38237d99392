//! 报告输出
//!
//! Sink 只调用 `SensorStore` 的只读接口，写入失败不影响存储和 Reader。

use ardurep_store::SensorStore;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// 文件目标的 URL 前缀
pub const FILE_SCHEME: &str = "file://";

/// Sink 错误
#[derive(Debug, Error)]
pub enum SinkError {
    /// 不支持的目标（如 HTTP）
    #[error("Unsupported sink target: {0}")]
    UnsupportedTarget(String),

    /// 写文件失败
    #[error("Could not write to {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}

/// 存储内容的消费者
pub trait Sink {
    fn report(&mut self, store: &SensorStore) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn report(&mut self, store: &SensorStore) -> Result<(), SinkError> {
        (**self).report(store)
    }
}

/// 把文本渲染写到标准输出（或任意 writer）
#[derive(Debug)]
pub struct StdoutSink<W = io::Stdout> {
    out: W,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> StdoutSink<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for StdoutSink<W> {
    fn report(&mut self, store: &SensorStore) -> Result<(), SinkError> {
        self.out.write_all(store.render_text().as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

/// 向文件追加 JSON 片段
///
/// 每次 `report` 追加当前全部记录（带缩进，末尾有逗号），
/// 文件内容加上外层 `[` `]` 并去掉最后一个逗号后即为 JSON 数组。
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
    translate: bool,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            translate: true,
        }
    }

    /// 是否按输出映射重命名字段（默认是）
    pub fn translate(mut self, translate: bool) -> Self {
        self.translate = translate;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn report(&mut self, store: &SensorStore) -> Result<(), SinkError> {
        let fragment = store.export_json_fragment(true, self.translate);
        let file_error = |source: io::Error| SinkError::File {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(file_error)?;
        file.write_all(fragment.as_bytes()).map_err(|e| {
            warn!("Could not write the content to {}: {}", self.path.display(), e);
            file_error(e)
        })?;

        debug!("Appended {} byte(s) to {}", fragment.len(), self.path.display());
        Ok(())
    }
}

/// Sink 目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Stdout,
    File(PathBuf),
}

impl SinkTarget {
    /// 解析目标字符串
    ///
    /// | 输入 | 结果 |
    /// |------|------|
    /// | `""` / `"-"` | `Stdout` |
    /// | `file:///path` | `File("/path")` |
    /// | 其他（含 `http://`、`https://`） | `UnsupportedTarget` |
    pub fn parse(target: &str) -> Result<Self, SinkError> {
        match target {
            "" | "-" => Ok(Self::Stdout),
            _ => match target.strip_prefix(FILE_SCHEME) {
                Some(path) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
                _ => Err(SinkError::UnsupportedTarget(target.to_string())),
            },
        }
    }

    /// 构造对应的 Sink
    pub fn into_sink(self, translate: bool) -> Box<dyn Sink + Send> {
        match self {
            Self::Stdout => Box::new(StdoutSink::new()),
            Self::File(path) => Box::new(FileSink::new(path).translate(translate)),
        }
    }
}

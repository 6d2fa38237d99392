//! 行输入源
//!
//! Reader 只依赖 [`LineSource`]，不关心字节来自串口、管道还是测试脚本。

use std::io::{self, BufRead};
use std::path::PathBuf;
use thiserror::Error;

/// 输入源错误
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// 打开设备失败
    #[error("Could not connect to {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 串口不支持的波特率
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// 对端关闭（EOF / 挂断）
    #[error("Source closed")]
    Closed,
}

/// 逐行读取的字节流
pub trait LineSource {
    /// 读取一行（包含行尾）
    ///
    /// # 返回值
    /// - `Ok(Some(line))`: 一行原始字节
    /// - `Ok(None)`: 读超时内没有完整的行
    /// - `Err(SourceError::Closed)`: 输入结束
    /// - `Err(e)`: 其他 IO 错误，Reader 视为致命
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, SourceError>;
}

impl<S: LineSource + ?Sized> LineSource for Box<S> {
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        (**self).read_line()
    }
}

/// 基于 [`BufRead`] 的输入源（管道、文件、回放）
///
/// 读到末尾时返回 [`SourceError::Closed`]。非阻塞的底层 reader 返回
/// `WouldBlock`/`TimedOut` 时，已读到的半行保留到下次调用。
#[derive(Debug)]
pub struct BufReadSource<R> {
    reader: R,
    /// 已读但尚未遇到 `\n` 的字节
    pending: Vec<u8>,
}

impl<R: BufRead> BufReadSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: BufRead> LineSource for BufReadSource<R> {
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        loop {
            match self.reader.read_until(b'\n', &mut self.pending) {
                Ok(0) if self.pending.is_empty() => return Err(SourceError::Closed),
                Ok(_) => return Ok(Some(std::mem::take(&mut self.pending))),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                    return Ok(None);
                },
                Err(e) => return Err(SourceError::Io(e)),
            }
        }
    }
}

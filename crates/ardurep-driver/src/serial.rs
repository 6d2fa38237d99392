//! Unix 串口输入源
//!
//! 以 raw 模式打开 tty（termios），用 `poll` 等待可读，按行切分。

use crate::source::{LineSource, SourceError};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::termios::{self, BaudRate, ControlFlags, SetArg};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 单次 `read()` 的缓冲大小
const READ_CHUNK: usize = 256;

/// 一行的最大字节数；超过且仍无 `\n` 的数据被丢弃
pub const MAX_LINE_LEN: usize = 4096;

/// 串口输入源
#[derive(Debug)]
pub struct SerialSource {
    path: PathBuf,
    file: File,
    /// 已读但尚未组成完整行的字节
    pending: Vec<u8>,
    read_timeout: Duration,
}

impl SerialSource {
    /// 打开并配置串口
    ///
    /// # 参数
    /// - `path`: 设备路径（如 `/dev/ttyACM0`）
    /// - `baud_rate`: 波特率（如 9600）
    /// - `read_timeout`: 等待一行的最长时间，超时后 `read_line` 返回 `Ok(None)`
    pub fn open(path: impl AsRef<Path>, baud_rate: u32, read_timeout: Duration) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let baud = baud_rate_flag(baud_rate)?;
        let open_error = |source: io::Error| SourceError::Open {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags((nix::fcntl::OFlag::O_NOCTTY | nix::fcntl::OFlag::O_NONBLOCK).bits())
            .open(path)
            .map_err(open_error)?;

        let mut settings = termios::tcgetattr(&file).map_err(|e| open_error(e.into()))?;
        termios::cfmakeraw(&mut settings);
        settings.control_flags.insert(ControlFlags::CLOCAL | ControlFlags::CREAD);
        termios::cfsetspeed(&mut settings, baud).map_err(|e| open_error(e.into()))?;
        termios::tcsetattr(&file, SetArg::TCSANOW, &settings).map_err(|e| open_error(e.into()))?;

        debug!("Opened serial device {} at {} baud", path.display(), baud_rate);
        Ok(Self {
            path: path.to_path_buf(),
            file,
            pending: Vec::new(),
            read_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 从缓冲区取出一行（包含 `\n`）
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let rest = self.pending.split_off(end + 1);
        Some(std::mem::replace(&mut self.pending, rest))
    }

    /// 丢弃超长且没有行尾的数据（波特率错误、噪声）
    fn discard_overlong(&mut self) {
        if self.pending.len() >= MAX_LINE_LEN {
            warn!(
                "Discarding {} bytes without line terminator from {}",
                self.pending.len(),
                self.path.display()
            );
            self.pending.clear();
        }
    }

    /// 等待可读；超时返回 `false`
    fn wait_readable(&self, timeout: Duration) -> Result<bool, SourceError> {
        let pollfd = PollFd::new(self.file.as_fd(), PollFlags::POLLIN);
        // PollTimeout 以毫秒计，u16 上限 65535ms
        let timeout_ms = timeout.as_millis().min(u16::MAX as u128) as u16;

        match poll(&mut [pollfd], PollTimeout::from(timeout_ms)) {
            Ok(0) => Ok(false),
            Ok(_) => Ok(true),
            Err(nix::errno::Errno::EINTR) => Ok(false),
            Err(e) => Err(SourceError::Io(io::Error::other(format!("poll failed: {}", e)))),
        }
    }
}

impl LineSource for SerialSource {
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.wait_readable(remaining)? {
                trace!("No complete line from {} within {:?}", self.path.display(), self.read_timeout);
                return Ok(None);
            }

            match self.file.read(&mut chunk) {
                Ok(0) => return Err(SourceError::Closed),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    if let Some(line) = self.take_line() {
                        return Ok(Some(line));
                    }
                    self.discard_overlong();
                },
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => continue,
                // 对端挂断后 tty 读返回 EIO
                Err(e) if e.raw_os_error() == Some(nix::errno::Errno::EIO as i32) => return Err(SourceError::Closed),
                Err(e) => return Err(SourceError::Io(e)),
            }
        }
    }
}

/// 数值波特率 → termios 常量
fn baud_rate_flag(baud_rate: u32) -> Result<BaudRate, SourceError> {
    let flag = match baud_rate {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        other => return Err(SourceError::UnsupportedBaudRate(other)),
    };
    Ok(flag)
}

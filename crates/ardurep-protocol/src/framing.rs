//! 帧重组模块
//!
//! 每个连接持有一个 [`FrameAssembler`]，逐行喂入原始字节，
//! 在遇到合法的结束行时吐出一个完整帧（JSON 数组文本）。

use crate::ProtocolError;
use tracing::trace;

/// 起始行
pub const START_MARKER: &str = "[";

/// 结束行
pub const END_MARKER: &str = "]";

/// 数据行前缀（两个空格 + `{`）
pub const DATA_PREFIX: &str = "  {";

/// 结束行生效所需的最小缓冲长度（不含）
///
/// 只有 `[` 或 `[` 加空白的缓冲区不构成帧。
pub const MIN_FRAME_LEN: usize = 4;

/// 行分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// 恰好为 `[`
    Start,
    /// 恰好为 `]`
    End,
    /// 以 `"  {"` 开头
    Data,
    /// 其他内容（调试输出、空行等），忽略
    Other,
}

/// 去掉行尾的 `\n`（以及紧邻的 `\r`）
pub fn strip_terminator(raw: &[u8]) -> &[u8] {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// 对一行（已去掉行尾）进行分类
pub fn classify_line(line: &str) -> LineKind {
    if line == START_MARKER {
        LineKind::Start
    } else if line == END_MARKER {
        LineKind::End
    } else if line.starts_with(DATA_PREFIX) {
        LineKind::Data
    } else {
        LineKind::Other
    }
}

/// 重组器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssemblerState {
    /// 等待起始行
    #[default]
    Idle,
    /// 已收到起始行，正在累积数据行
    Recording,
}

/// 帧重组器
///
/// # 状态转换
///
/// | 状态 | 输入 | 动作 | 下一状态 |
/// |------|------|------|----------|
/// | Idle | `[` | 缓冲区置为 `[` | Recording |
/// | Idle | 其他 | 无 | Idle |
/// | Recording | 数据行 | 追加空格和该行 | Recording |
/// | Recording | `]`（缓冲区长度 > 4） | 追加 `]` 并吐出帧 | Idle |
/// | Recording | `]`（缓冲区过短） | 无 | Recording |
/// | Recording | `[` | 丢弃部分帧，重新开始 | Recording |
/// | 任意 | 非 UTF-8 行 | 清空缓冲区，返回 `Decode` 错误 | Idle |
///
/// # Example
///
/// ```
/// use ardurep_protocol::FrameAssembler;
///
/// let mut assembler = FrameAssembler::new();
/// assert_eq!(assembler.feed(b"[\r\n").unwrap(), None);
/// assert_eq!(assembler.feed(b"  {\"id\":\"a\",\"value\":1}\r\n").unwrap(), None);
/// let frame = assembler.feed(b"]\r\n").unwrap().unwrap();
/// assert_eq!(frame, "[   {\"id\":\"a\",\"value\":1}]");
/// ```
#[derive(Debug, Default)]
pub struct FrameAssembler {
    state: AssemblerState,
    buffer: String,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前状态
    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// 当前缓冲的部分帧
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// 丢弃部分帧，回到 Idle
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = AssemblerState::Idle;
    }

    /// 喂入一行原始字节（可带行尾）
    ///
    /// # 返回值
    /// - `Ok(Some(frame))`: 本行结束了一个完整帧
    /// - `Ok(None)`: 帧尚未完整（或本行被忽略）
    /// - `Err(ProtocolError::Decode)`: 本行不是 UTF-8，部分帧已丢弃
    pub fn feed(&mut self, raw: &[u8]) -> Result<Option<String>, ProtocolError> {
        match std::str::from_utf8(strip_terminator(raw)) {
            Ok(line) => Ok(self.feed_line(line)),
            Err(e) => {
                self.reset();
                Err(ProtocolError::Decode(e.to_string()))
            },
        }
    }

    /// 喂入一行已解码的文本（不含行尾）
    pub fn feed_line(&mut self, line: &str) -> Option<String> {
        let kind = classify_line(line);
        match (self.state, kind) {
            (_, LineKind::Start) => {
                if self.state == AssemblerState::Recording {
                    trace!("Start marker while recording, dropping {} buffered bytes", self.buffer.len());
                }
                self.buffer.clear();
                self.buffer.push_str(START_MARKER);
                self.state = AssemblerState::Recording;
                None
            },
            (AssemblerState::Recording, LineKind::Data) => {
                self.buffer.push(' ');
                self.buffer.push_str(line);
                None
            },
            (AssemblerState::Recording, LineKind::End) => {
                if self.buffer.len() > MIN_FRAME_LEN && self.buffer.starts_with(START_MARKER) {
                    self.buffer.push_str(END_MARKER);
                    self.state = AssemblerState::Idle;
                    Some(std::mem::take(&mut self.buffer))
                } else {
                    trace!("End marker on short buffer ({} bytes), ignored", self.buffer.len());
                    None
                }
            },
            _ => None,
        }
    }
}

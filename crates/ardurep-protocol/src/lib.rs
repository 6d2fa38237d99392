//! # ardurep Protocol
//!
//! 传感器串口行协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `framing`: 行分类与帧重组状态机
//! - `value`: 传感器字段值（数值/文本等标量的显式标签联合）
//! - `decode`: 完整帧到扁平记录的解码
//!
//! ## 线格式
//!
//! ```text
//! [
//!   {"id":"light_value","value":"777"}
//!   {"id":"temp","value":21.5,"unit":"C","threshold":30}
//! ]
//! ```
//!
//! 起始行恰好为 `[`，数据行以两个空格加 `{` 开头，结束行恰好为 `]`。
//! 其余行一律忽略，因此设备可以在帧之间输出任意调试信息。

pub mod decode;
pub mod framing;
pub mod value;

// 重新导出常用类型
pub use decode::{FlatRecord, decode_frame};
pub use framing::{AssemblerState, FrameAssembler, LineKind, classify_line, strip_terminator};
pub use value::SensorValue;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 原始行不是合法的 UTF-8 文本
    #[error("Decode error: line is not valid UTF-8 ({0})")]
    Decode(String),

    /// 完整帧不是扁平对象组成的 JSON 数组
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ProtocolError {
    /// 是否为解码错误（由读取循环计为一次 aging tick）
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

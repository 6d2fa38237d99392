//! 传感器字段值
//!
//! 设备发送的扁平记录只包含 JSON 标量。阈值比较按标签显式定义，
//! 不依赖 JSON 解码后的动态类型。

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::fmt;

/// 扁平记录中的一个字段值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    /// JSON 数值（保留整数/浮点原始表示）
    Number(Number),
    /// JSON 字符串
    Text(String),
    /// JSON 布尔值
    Bool(bool),
    /// JSON null
    Null,
}

impl SensorValue {
    /// 从 JSON 值构造；数组和对象不是扁平字段，返回 `None`
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n)),
            Value::String(s) => Some(Self::Text(s)),
            Value::Bool(b) => Some(Self::Bool(b)),
            Value::Null => Some(Self::Null),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// 转换为 JSON 值（用于导出）
    pub fn to_json(&self) -> Value {
        match self {
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Null => Value::Null,
        }
    }

    /// 按数值解释（文本会尝试解析）
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::Bool(_) | Self::Null => None,
        }
    }

    /// 文本内容（仅 `Text`）
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// 比较两个字段值
    ///
    /// | 左 | 右 | 规则 |
    /// |----|----|------|
    /// | Number | Number | 数值比较 |
    /// | Text | Text | 字典序比较 |
    /// | Bool | Bool | `false < true` |
    /// | Number | Text（或反之） | 文本按数值解析后比较，解析失败则不可比较 |
    /// | 其他组合（含 Null） | | 不可比较 |
    ///
    /// 不可比较时返回 `None`。
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Number(_), Self::Number(_))
            | (Self::Number(_), Self::Text(_))
            | (Self::Text(_), Self::Number(_)) => self.as_f64()?.partial_cmp(&other.as_f64()?),
            _ => None,
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for SensorValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SensorValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SensorValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<i32> for SensorValue {
    fn from(value: i32) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<bool> for SensorValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

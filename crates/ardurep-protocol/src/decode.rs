//! 帧解码
//!
//! 将 [`FrameAssembler`](crate::FrameAssembler) 吐出的完整帧解析为扁平记录序列。

use crate::{ProtocolError, SensorValue};
use serde_json::Value;

/// 一条扁平记录（字段名 → 标量值）
///
/// 字段顺序与帧中出现的顺序无关，按键查找。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRecord {
    fields: Vec<(String, SensorValue)>,
}

impl FlatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式添加字段（同名字段覆盖）
    pub fn with(mut self, key: impl Into<String>, value: impl Into<SensorValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// 插入字段（同名字段覆盖）
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SensorValue>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&SensorValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SensorValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn from_object(index: usize, object: serde_json::Map<String, Value>) -> Result<Self, ProtocolError> {
        let mut record = Self::new();
        for (key, value) in object {
            let value = SensorValue::from_json(value).ok_or_else(|| {
                ProtocolError::Parse(format!("field `{}` of record {} is not a scalar", key, index))
            })?;
            record.fields.push((key, value));
        }
        Ok(record)
    }
}

/// 解码一个完整帧
///
/// 帧必须是由扁平对象组成的 JSON 数组；任何偏差都返回
/// [`ProtocolError::Parse`]，整个帧被丢弃。
///
/// # Example
///
/// ```
/// use ardurep_protocol::decode_frame;
///
/// let records = decode_frame(r#"[ {"id":"a","value":"8","unit":"m"}]"#).unwrap();
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].get("unit").unwrap().to_string(), "m");
/// ```
pub fn decode_frame(frame: &str) -> Result<Vec<FlatRecord>, ProtocolError> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| ProtocolError::Parse(format!("invalid JSON: {}", e)))?;

    let Value::Array(items) = value else {
        return Err(ProtocolError::Parse("frame is not a JSON array".to_string()));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(object) => FlatRecord::from_object(index, object),
            _ => Err(ProtocolError::Parse(format!("record {} is not a JSON object", index))),
        })
        .collect()
}

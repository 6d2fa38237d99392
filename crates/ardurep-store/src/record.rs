//! 单个传感器的最新记录

use crate::schema::{FieldRole, KeyMapping};
use ardurep_protocol::SensorValue;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt::Write;

/// 回执时间的文本格式（UTC，精确到秒，无时区后缀）
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 格式化回执时间
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// 传感器记录
///
/// 每次收到同一 id 的新记录时整体替换，旧记录中的可选字段不会保留。
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    /// 传感器 id（原样保留 JSON 类型）
    pub id: SensorValue,
    pub value: SensorValue,
    pub unit: Option<SensorValue>,
    pub threshold: Option<SensorValue>,
    /// 标注为 `other` 且在输入中出现的字段（按映射顺序，同名只保留一次）
    pub others: Vec<(String, SensorValue)>,
    /// 设备自带的时间戳
    pub sensor_time: Option<SensorValue>,
    /// store 接收该批次的时间
    pub receipt_time: DateTime<Utc>,
}

impl SensorRecord {
    /// id 的显示文本（文本原样，其余取 JSON 文本）
    pub fn key(&self) -> String {
        record_key(&self.id)
    }

    /// 查找 `other` 字段
    pub fn other(&self, key: &str) -> Option<&SensorValue> {
        self.others.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// 阈值是否低于当前值
    ///
    /// 不可比较的组合（见 [`SensorValue::compare`]）视为未超限。
    pub fn is_over_threshold(&self) -> bool {
        self.threshold
            .as_ref()
            .is_some_and(|threshold| threshold.compare(&self.value) == Some(Ordering::Less))
    }

    /// 渲染为一行文本（不含换行）
    pub fn render_line(&self, mapping: &KeyMapping) -> String {
        let unit = self.unit.as_ref().map(ToString::to_string).unwrap_or_default();
        let mut line = format!("{} {}{}", self.id, self.value, unit);

        if let Some(threshold) = &self.threshold {
            if self.is_over_threshold() {
                let _ = write!(line, " !Warning: Value is over threshold: {}!", threshold);
            } else {
                let _ = write!(line, " ({}{})", threshold, unit);
            }
        }

        for key in mapping.other_keys() {
            if let Some(value) = self.other(key) {
                let _ = write!(line, " {}", value);
            }
        }
        line
    }

    /// 规范键下的字段（导出顺序）
    pub fn canonical_fields<'a>(&'a self, mapping: &'a KeyMapping) -> Vec<(&'a str, Value)> {
        let mut fields = vec![
            (FieldRole::Id.as_str(), self.id.to_json()),
            (FieldRole::Value.as_str(), self.value.to_json()),
        ];
        if let Some(unit) = &self.unit {
            fields.push((FieldRole::Unit.as_str(), unit.to_json()));
        }
        if let Some(threshold) = &self.threshold {
            fields.push((FieldRole::Threshold.as_str(), threshold.to_json()));
        }
        for (key, value) in &self.others {
            fields.push((key.as_str(), value.to_json()));
        }
        if let Some(sensor_time) = &self.sensor_time {
            fields.push((mapping.sensor_time_key(), sensor_time.to_json()));
        }
        fields.push((mapping.receipt_time_key(), Value::String(format_timestamp(&self.receipt_time))));
        fields
    }

    /// 转为 JSON 对象；`translate` 为真时按输出映射重命名键
    pub fn to_json_object(&self, mapping: &KeyMapping, translate: bool) -> Map<String, Value> {
        self.canonical_fields(mapping)
            .into_iter()
            .map(|(key, value)| {
                let key = if translate { mapping.translate(key) } else { key };
                (key.to_string(), value)
            })
            .collect()
    }
}

/// id 的显示文本：文本原样，其余取 JSON 文本
pub(crate) fn record_key(id: &SensorValue) -> String {
    match id {
        SensorValue::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

/// store 内部索引
///
/// 文本 id 与其他类型的 id 分开：`"7"` 和 `7` 是两个传感器。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum RecordKey {
    Text(String),
    Json(String),
}

impl RecordKey {
    pub(crate) fn of(id: &SensorValue) -> Self {
        match id {
            SensorValue::Text(s) => Self::Text(s.clone()),
            other => Self::Json(other.to_string()),
        }
    }
}

//! 传感器记录存储
//!
//! # 同步机制
//!
//! - 写入：`parking_lot::Mutex` 在整个 `apply()` 调用期间持有，多个 Reader 的批次串行执行
//! - 读取：每次 `apply()` 结束后通过 `ArcSwap` 发布不可变快照，渲染/导出只读快照，
//!   永远看不到应用了一半的批次

use crate::record::{RecordKey, SensorRecord, format_timestamp, record_key};
use crate::schema::KeyMapping;
use ardurep_protocol::{FlatRecord, ProtocolError, SensorValue, decode_frame};
use arc_swap::ArcSwap;
use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// 首个批次到达前渲染头中显示的时间
pub const NO_BATCH_YET: &str = "n/a";

/// 存储层错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 帧不是合法的扁平对象 JSON 数组，整个批次被丢弃
    #[error(transparent)]
    Parse(#[from] ProtocolError),

    /// 记录缺少必需字段；此前的记录已提交，其余记录未应用
    #[error("Missing mandatory field `{key}` in record {index} ({applied} record(s) already applied)")]
    MissingField { key: String, index: usize, applied: usize },
}

/// 存储内容的不可变快照
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    records: Vec<SensorRecord>,
    index: HashMap<RecordKey, usize>,
    last_batch_time: Option<DateTime<Utc>>,
}

impl StoreSnapshot {
    /// 按到达顺序排列的记录（同 id 替换时保留原位置）
    pub fn records(&self) -> &[SensorRecord] {
        &self.records
    }

    /// 按 id 文本查找；文本 id 优先，其次是 JSON 文本相同的非文本 id
    pub fn get(&self, id: &str) -> Option<&SensorRecord> {
        self.index
            .get(&RecordKey::Text(id.to_string()))
            .or_else(|| self.index.get(&RecordKey::Json(id.to_string())))
            .map(|&i| &self.records[i])
    }

    /// 按原始 id 值精确查找
    pub fn get_by_id(&self, id: &SensorValue) -> Option<&SensorRecord> {
        self.index.get(&RecordKey::of(id)).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_batch_time(&self) -> Option<DateTime<Utc>> {
        self.last_batch_time
    }

    fn upsert(&mut self, record: SensorRecord) {
        let key = RecordKey::of(&record.id);
        match self.index.get(&key) {
            Some(&i) => self.records[i] = record,
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(record);
            },
        }
    }

    fn render_text(&self, mapping: &KeyMapping) -> String {
        let header = self
            .last_batch_time
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_else(|| NO_BATCH_YET.to_string());

        let mut text = format!("==== {} ====\n", header);
        for record in &self.records {
            text.push_str(&record.render_line(mapping));
            text.push('\n');
        }
        text
    }

    fn to_json(&self, mapping: &KeyMapping, translate: bool) -> Value {
        Value::Array(
            self.records
                .iter()
                .map(|record| Value::Object(record.to_json_object(mapping, translate)))
                .collect(),
        )
    }
}

/// 传感器记录存储
///
/// 通常包装在 `Arc` 中由多个 Reader 共享。
///
/// # Example
///
/// ```
/// use ardurep_store::SensorStore;
///
/// let store = SensorStore::default();
/// store.apply_frame(r#"[ {"id":"a","value":"8","unit":"m"}, {"id":"b","value":"9"} ]"#).unwrap();
///
/// let text = store.render_text();
/// assert!(text.lines().any(|line| line == "a 8m"));
/// assert!(text.lines().any(|line| line == "b 9"));
/// ```
pub struct SensorStore {
    mapping: KeyMapping,
    writer: Mutex<StoreSnapshot>,
    published: ArcSwap<StoreSnapshot>,
}

impl Default for SensorStore {
    fn default() -> Self {
        Self::new(KeyMapping::default())
    }
}

impl std::fmt::Debug for SensorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorStore")
            .field("mapping", &self.mapping)
            .field("records", &self.len())
            .finish()
    }
}

impl SensorStore {
    pub fn new(mapping: KeyMapping) -> Self {
        Self {
            mapping,
            writer: Mutex::new(StoreSnapshot::default()),
            published: ArcSwap::from_pointee(StoreSnapshot::default()),
        }
    }

    pub fn key_mapping(&self) -> &KeyMapping {
        &self.mapping
    }

    /// 最新发布的快照
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.published.load_full()
    }

    pub fn get(&self, id: &str) -> Option<SensorRecord> {
        self.published.load().get(id).cloned()
    }

    pub fn get_by_id(&self, id: &SensorValue) -> Option<SensorRecord> {
        self.published.load().get_by_id(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.published.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.load().is_empty()
    }

    pub fn last_batch_time(&self) -> Option<DateTime<Utc>> {
        self.published.load().last_batch_time()
    }

    /// 解码并应用一个完整帧
    ///
    /// 帧解析失败时存储保持不变。
    pub fn apply_frame(&self, frame: &str) -> Result<usize, StoreError> {
        let records = decode_frame(frame)?;
        self.apply(&records)
    }

    /// 应用一个批次，回执时间取当前时间
    pub fn apply(&self, records: &[FlatRecord]) -> Result<usize, StoreError> {
        self.apply_at(records, Utc::now())
    }

    /// 以给定时间应用一个批次
    ///
    /// 回执时间截断到整秒，批次内所有记录共享同一时间。
    ///
    /// # 返回值
    /// - `Ok(n)`: 全部 `n` 条记录已应用
    /// - `Err(StoreError::MissingField)`: 在缺少必需字段的记录处中止，
    ///   之前的记录保持已提交（批次不是原子的）
    pub fn apply_at(&self, records: &[FlatRecord], now: DateTime<Utc>) -> Result<usize, StoreError> {
        let receipt_time = now.trunc_subsecs(0);

        let mut state = self.writer.lock();
        state.last_batch_time = Some(receipt_time);

        let mut result = Ok(records.len());
        for (index, input) in records.iter().enumerate() {
            match self.build_record(input, receipt_time) {
                Ok(record) => {
                    trace!("Applied record for `{}`", record.key());
                    state.upsert(record);
                },
                Err(key) => {
                    result = Err(StoreError::MissingField {
                        key,
                        index,
                        applied: index,
                    });
                    break;
                },
            }
        }

        // 即使中途失败也发布：已应用的记录是提交状态
        self.published.store(Arc::new(state.clone()));
        debug!("Batch of {} record(s) applied, store holds {}", records.len(), state.len());
        result
    }

    /// 从输入记录构造存储记录；缺少必需字段时返回缺失的键名
    fn build_record(&self, input: &FlatRecord, receipt_time: DateTime<Utc>) -> Result<SensorRecord, String> {
        let mapping = &self.mapping;
        let id = input
            .get(mapping.id_key())
            .ok_or_else(|| mapping.id_key().to_string())?;
        let value = input
            .get(mapping.value_key())
            .ok_or_else(|| mapping.value_key().to_string())?;

        let mut others: Vec<(String, _)> = Vec::new();
        for key in mapping.other_keys() {
            if let Some(v) = input.get(key)
                && !others.iter().any(|(k, _)| k == key)
            {
                others.push((key.clone(), v.clone()));
            }
        }

        Ok(SensorRecord {
            id: id.clone(),
            value: value.clone(),
            unit: input.get(mapping.unit_key()).cloned(),
            threshold: input.get(mapping.threshold_key()).cloned(),
            others,
            sensor_time: input.get(mapping.sensor_time_key()).cloned(),
            receipt_time,
        })
    }

    /// 人类可读文本
    ///
    /// 首行为 `==== <批次时间> ====`，随后每个传感器一行。
    pub fn render_text(&self) -> String {
        self.published.load().render_text(&self.mapping)
    }

    /// 按输出映射重命名后的视图：id → (输出键 → 值)
    ///
    /// 键为 id 的显示文本；`"7"` 与 `7` 同时存在时，到达较晚的记录占用该键。
    pub fn translated_view(&self) -> Map<String, Value> {
        self.published
            .load()
            .records()
            .iter()
            .map(|record| {
                (
                    record_key(&record.id),
                    Value::Object(record.to_json_object(&self.mapping, true)),
                )
            })
            .collect()
    }

    /// 导出为 JSON 数组
    ///
    /// `pretty` 为真时使用 2 空格缩进。
    pub fn export_json(&self, pretty: bool, translate: bool) -> String {
        let json = self.published.load().to_json(&self.mapping, translate);
        if pretty { format!("{:#}", json) } else { json.to_string() }
    }

    /// 导出 JSON 数组的内部内容并追加逗号
    ///
    /// 用于向外部 JSON 数组日志文件逐批追加。存储为空时返回空字符串。
    pub fn export_json_fragment(&self, pretty: bool, translate: bool) -> String {
        let json = self.export_json(pretty, translate);
        if json.len() <= 2 {
            return String::new();
        }
        if pretty {
            // "[\n  {...}\n]" → "\n  {...}" + ",\n"
            format!("{},\n", &json[1..json.len() - 2])
        } else {
            format!("{},", &json[1..json.len() - 1])
        }
    }
}

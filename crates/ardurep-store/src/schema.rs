//! Schema 驱动的字段映射
//!
//! 输入 schema 为属性打上角色标注（`"key": "id"` 等），决定从设备记录的哪个字段
//! 读取 id/value/unit/threshold/time；输出 schema 的标注决定导出时规范键被重命名为什么。
//!
//! 每个 schema 都必须附带 meta-schema，构造前先用 meta-schema 校验 schema 本身。

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

/// schema 属性上的角色标注键
pub const ROLE_ANNOTATION: &str = "key";

/// 回执时间键与设备时间键冲突时，回执时间改用的键名
pub const FALLBACK_RECEIPT_TIME_KEY: &str = "report_timestamp";

/// 默认的设备时间键
pub const DEFAULT_SENSOR_TIME_KEY: &str = "sensor_timestamp";

/// 字段角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Id,
    Value,
    Unit,
    Threshold,
    Time,
    /// 可以标注任意多个属性
    Other,
}

impl FieldRole {
    /// 从标注值解析，未知标注返回 `None`
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "id" => Some(Self::Id),
            "value" => Some(Self::Value),
            "unit" => Some(Self::Unit),
            "threshold" => Some(Self::Threshold),
            "time" => Some(Self::Time),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// 标注值，同时也是该角色的规范键
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Value => "value",
            Self::Unit => "unit",
            Self::Threshold => "threshold",
            Self::Time => "time",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// schema 所属的一侧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSide {
    Input,
    Output,
}

impl fmt::Display for SchemaSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// schema 配置错误
#[derive(Error, Debug)]
pub enum SchemaError {
    /// 给出了 schema 但没有对应的 meta-schema
    #[error("Configuration error: {side} schema given without meta-schema")]
    Configuration { side: SchemaSide },

    /// schema 未通过 meta-schema 校验（或不是合法 JSON）
    #[error("Schema validation error ({side}): {message}")]
    Validation { side: SchemaSide, message: String },

    /// 读取 schema 文件失败
    #[error("Failed to read schema file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 字段映射（构造后不可变）
///
/// 由 [`SchemaKeyMapper::build`] 生成，交给 `SensorStore` 持有。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMapping {
    id_key: String,
    value_key: String,
    unit_key: String,
    threshold_key: String,
    receipt_time_key: String,
    sensor_time_key: String,
    other_keys: Vec<String>,
    translation_keys: HashMap<String, String>,
}

impl Default for KeyMapping {
    fn default() -> Self {
        let translation_keys = [
            FieldRole::Id,
            FieldRole::Value,
            FieldRole::Unit,
            FieldRole::Threshold,
            FieldRole::Time,
        ]
        .into_iter()
        .map(|role| (role.as_str().to_string(), role.as_str().to_string()))
        .collect();

        Self {
            id_key: FieldRole::Id.as_str().to_string(),
            value_key: FieldRole::Value.as_str().to_string(),
            unit_key: FieldRole::Unit.as_str().to_string(),
            threshold_key: FieldRole::Threshold.as_str().to_string(),
            receipt_time_key: FieldRole::Time.as_str().to_string(),
            sensor_time_key: DEFAULT_SENSOR_TIME_KEY.to_string(),
            other_keys: Vec::new(),
            translation_keys,
        }
    }
}

impl KeyMapping {
    /// 按四个可选文档构造映射
    ///
    /// 等价于 `SchemaKeyMapper` 依次设置四个文档后调用 `build()`。
    pub fn from_schemas(
        input_schema: Option<&str>,
        input_meta_schema: Option<&str>,
        output_schema: Option<&str>,
        output_meta_schema: Option<&str>,
    ) -> Result<Self, SchemaError> {
        let mut mapping = Self::default();
        if let Some(schema) = input_schema {
            let meta = input_meta_schema.ok_or(SchemaError::Configuration {
                side: SchemaSide::Input,
            })?;
            let schema = validated(SchemaSide::Input, schema, meta)?;
            mapping.apply_input_schema(&schema);
        }
        if let Some(schema) = output_schema {
            let meta = output_meta_schema.ok_or(SchemaError::Configuration {
                side: SchemaSide::Output,
            })?;
            let schema = validated(SchemaSide::Output, schema, meta)?;
            mapping.apply_output_schema(&schema);
        }
        Ok(mapping)
    }

    /// 设备记录中的 id 字段名
    pub fn id_key(&self) -> &str {
        &self.id_key
    }

    /// 设备记录中的 value 字段名
    pub fn value_key(&self) -> &str {
        &self.value_key
    }

    pub fn unit_key(&self) -> &str {
        &self.unit_key
    }

    pub fn threshold_key(&self) -> &str {
        &self.threshold_key
    }

    /// store 写入回执时间所用的键
    pub fn receipt_time_key(&self) -> &str {
        &self.receipt_time_key
    }

    /// 设备自带时间戳的字段名
    pub fn sensor_time_key(&self) -> &str {
        &self.sensor_time_key
    }

    /// 标注为 `other` 的字段（按 schema 顺序，不去重）
    pub fn other_keys(&self) -> &[String] {
        &self.other_keys
    }

    /// 规范键 → 输出键；不在表中的键保持原名
    pub fn translate<'a>(&'a self, key: &'a str) -> &'a str {
        self.translation_keys.get(key).map(String::as_str).unwrap_or(key)
    }

    fn apply_input_schema(&mut self, schema: &Value) {
        for (name, tag) in annotated_properties(schema) {
            let Some(role) = FieldRole::from_tag(tag) else {
                trace!("Ignoring unknown role annotation `{}` on `{}`", tag, name);
                continue;
            };
            debug!("Input property `{}` tagged as {}", name, role);
            match role {
                FieldRole::Id => self.id_key = name.to_string(),
                FieldRole::Value => self.value_key = name.to_string(),
                FieldRole::Unit => self.unit_key = name.to_string(),
                FieldRole::Threshold => self.threshold_key = name.to_string(),
                FieldRole::Time => {
                    // 设备时间占用了回执时间的键名，回执时间让位
                    if name == self.receipt_time_key {
                        self.receipt_time_key = FALLBACK_RECEIPT_TIME_KEY.to_string();
                    }
                    self.sensor_time_key = name.to_string();
                },
                FieldRole::Other => self.other_keys.push(name.to_string()),
            }
        }
    }

    fn apply_output_schema(&mut self, schema: &Value) {
        for (name, tag) in annotated_properties(schema) {
            debug!("Output property `{}` renames `{}`", name, tag);
            self.translation_keys.insert(tag.to_string(), name.to_string());
        }
    }
}

/// `items.properties` 下带字符串角色标注的属性（文档顺序）
fn annotated_properties(schema: &Value) -> impl Iterator<Item = (&str, &str)> {
    schema
        .get("items")
        .and_then(|items| items.get("properties"))
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|properties| properties.iter())
        .filter_map(|(name, property)| {
            property
                .get(ROLE_ANNOTATION)
                .and_then(Value::as_str)
                .map(|tag| (name.as_str(), tag))
        })
}

/// 解析 schema 与 meta-schema，并用后者校验前者
fn validated(side: SchemaSide, schema: &str, meta_schema: &str) -> Result<Value, SchemaError> {
    let invalid = |message: String| SchemaError::Validation { side, message };

    let meta_value: Value =
        serde_json::from_str(meta_schema).map_err(|e| invalid(format!("Invalid meta-schema JSON: {}", e)))?;
    let schema_value: Value =
        serde_json::from_str(schema).map_err(|e| invalid(format!("Invalid schema JSON: {}", e)))?;

    // 未声明 `$schema` 的 meta-schema 按 draft-04 处理
    let validator = if meta_value.get("$schema").is_some() {
        jsonschema::validator_for(&meta_value)
    } else {
        jsonschema::options()
            .with_draft(jsonschema::Draft::Draft4)
            .build(&meta_value)
    }
    .map_err(|e| invalid(format!("Invalid meta-schema: {}", e)))?;

    let errors: Vec<String> = validator
        .iter_errors(&schema_value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if !errors.is_empty() {
        return Err(invalid(errors.join("; ")));
    }

    Ok(schema_value)
}

/// `KeyMapping` 构造器
///
/// # Example
///
/// ```
/// use ardurep_store::SchemaKeyMapper;
///
/// let meta = r#"{"type": "object"}"#;
/// let schema = r#"{"items": {"properties": {"sensorValue": {"key": "value"}}}}"#;
///
/// let mapping = SchemaKeyMapper::new()
///     .input_schema(schema)
///     .input_meta_schema(meta)
///     .build()
///     .unwrap();
/// assert_eq!(mapping.value_key(), "sensorValue");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaKeyMapper {
    input_schema: Option<String>,
    input_meta_schema: Option<String>,
    output_schema: Option<String>,
    output_meta_schema: Option<String>,
}

impl SchemaKeyMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_schema(mut self, schema: impl Into<String>) -> Self {
        self.input_schema = Some(schema.into());
        self
    }

    pub fn input_meta_schema(mut self, meta_schema: impl Into<String>) -> Self {
        self.input_meta_schema = Some(meta_schema.into());
        self
    }

    pub fn output_schema(mut self, schema: impl Into<String>) -> Self {
        self.output_schema = Some(schema.into());
        self
    }

    pub fn output_meta_schema(mut self, meta_schema: impl Into<String>) -> Self {
        self.output_meta_schema = Some(meta_schema.into());
        self
    }

    /// 从文件读取输入 schema 对
    pub fn input_files(self, schema: impl AsRef<Path>, meta_schema: impl AsRef<Path>) -> Result<Self, SchemaError> {
        Ok(self.input_schema(read_schema(schema.as_ref())?).input_meta_schema(read_schema(meta_schema.as_ref())?))
    }

    /// 从文件读取输出 schema 对
    pub fn output_files(self, schema: impl AsRef<Path>, meta_schema: impl AsRef<Path>) -> Result<Self, SchemaError> {
        Ok(self
            .output_schema(read_schema(schema.as_ref())?)
            .output_meta_schema(read_schema(meta_schema.as_ref())?))
    }

    /// 校验并生成映射
    ///
    /// # 错误
    /// - `SchemaError::Configuration`: schema 缺少对应的 meta-schema
    /// - `SchemaError::Validation`: schema 未通过 meta-schema 校验
    pub fn build(&self) -> Result<KeyMapping, SchemaError> {
        KeyMapping::from_schemas(
            self.input_schema.as_deref(),
            self.input_meta_schema.as_deref(),
            self.output_schema.as_deref(),
            self.output_meta_schema.as_deref(),
        )
    }
}

/// 读取一个 schema 文档
pub fn read_schema(path: &Path) -> Result<String, SchemaError> {
    fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const META: &str = r#"{
        "$schema": "http://json-schema.org/draft-04/schema#",
        "type": "object",
        "required": ["items"],
        "properties": {
            "items": {
                "type": "object",
                "required": ["properties"],
                "properties": {
                    "properties": {
                        "type": "object",
                        "additionalProperties": {
                            "type": "object",
                            "properties": {
                                "key": {"enum": ["id", "value", "unit", "threshold", "time", "other"]}
                            }
                        }
                    }
                }
            }
        }
    }"#;

    #[test]
    fn test_defaults() {
        let mapping = KeyMapping::default();
        assert_eq!(mapping.id_key(), "id");
        assert_eq!(mapping.value_key(), "value");
        assert_eq!(mapping.unit_key(), "unit");
        assert_eq!(mapping.threshold_key(), "threshold");
        assert_eq!(mapping.receipt_time_key(), "time");
        assert_eq!(mapping.sensor_time_key(), "sensor_timestamp");
        assert!(mapping.other_keys().is_empty());
        assert_eq!(mapping.translate("value"), "value");
        assert_eq!(mapping.translate("battery"), "battery");
        assert_eq!(SchemaKeyMapper::new().build().unwrap(), mapping);
    }

    #[test]
    fn test_schema_without_meta_schema() {
        let schema = r#"{"items": {"properties": {}}}"#;

        let err = SchemaKeyMapper::new().input_schema(schema).build().unwrap_err();
        assert!(matches!(err, SchemaError::Configuration { side: SchemaSide::Input }));
        assert!(err.to_string().contains("without meta-schema"));

        let err = SchemaKeyMapper::new().output_schema(schema).build().unwrap_err();
        assert!(matches!(err, SchemaError::Configuration { side: SchemaSide::Output }));
    }

    #[test]
    fn test_meta_schema_alone_is_ignored() {
        let mapping = SchemaKeyMapper::new().input_meta_schema(META).build().unwrap();
        assert_eq!(mapping, KeyMapping::default());
    }

    #[test]
    fn test_input_roles() {
        let schema = r#"{"items": {"properties": {
            "sensorId": {"type": "string", "key": "id"},
            "sensorValue": {"key": "value"},
            "u": {"key": "unit"},
            "limit": {"key": "threshold"},
            "battery": {"key": "other"},
            "rssi": {"key": "other"},
            "comment": {"type": "string"}
        }}}"#;

        let mapping = SchemaKeyMapper::new().input_schema(schema).input_meta_schema(META).build().unwrap();
        assert_eq!(mapping.id_key(), "sensorId");
        assert_eq!(mapping.value_key(), "sensorValue");
        assert_eq!(mapping.unit_key(), "u");
        assert_eq!(mapping.threshold_key(), "limit");
        assert_eq!(mapping.other_keys(), ["battery".to_string(), "rssi".to_string()]);
        assert_eq!(mapping.receipt_time_key(), "time");
    }

    #[test]
    fn test_unknown_role_is_ignored() {
        let meta = r#"{"type": "object"}"#;
        let schema = r#"{"items": {"properties": {"x": {"key": "colour"}}}}"#;
        let mapping = SchemaKeyMapper::new().input_schema(schema).input_meta_schema(meta).build().unwrap();
        assert_eq!(mapping, KeyMapping::default());
    }

    #[test]
    fn test_later_property_wins() {
        let schema = r#"{"items": {"properties": {
            "first": {"key": "value"},
            "second": {"key": "value"}
        }}}"#;
        let mapping = SchemaKeyMapper::new().input_schema(schema).input_meta_schema(META).build().unwrap();
        assert_eq!(mapping.value_key(), "second");
    }

    #[test]
    fn test_time_collision_renames_receipt_key() {
        let schema = r#"{"items": {"properties": {"time": {"key": "time"}}}}"#;
        let mapping = SchemaKeyMapper::new().input_schema(schema).input_meta_schema(META).build().unwrap();
        assert_eq!(mapping.sensor_time_key(), "time");
        assert_eq!(mapping.receipt_time_key(), FALLBACK_RECEIPT_TIME_KEY);

        let schema = r#"{"items": {"properties": {"ts": {"key": "time"}}}}"#;
        let mapping = SchemaKeyMapper::new().input_schema(schema).input_meta_schema(META).build().unwrap();
        assert_eq!(mapping.sensor_time_key(), "ts");
        assert_eq!(mapping.receipt_time_key(), "time");
    }

    #[test]
    fn test_output_translation() {
        let schema = r#"{"items": {"properties": {
            "ourVeryCustomSensorName": {"key": "id"},
            "sensorValue": {"key": "value"},
            "untagged": {"type": "string"}
        }}}"#;
        let mapping = SchemaKeyMapper::new().output_schema(schema).output_meta_schema(META).build().unwrap();
        assert_eq!(mapping.translate("id"), "ourVeryCustomSensorName");
        assert_eq!(mapping.translate("value"), "sensorValue");
        assert_eq!(mapping.translate("unit"), "unit");
        // 输入侧保持默认
        assert_eq!(mapping.id_key(), "id");
    }

    #[test]
    fn test_validation_failure() {
        let schema = r#"{"items": {"properties": {"x": {"key": "colour"}}}}"#;
        let err = SchemaKeyMapper::new().input_schema(schema).input_meta_schema(META).build().unwrap_err();
        assert!(matches!(err, SchemaError::Validation { side: SchemaSide::Input, .. }));

        let err = SchemaKeyMapper::new()
            .output_schema(r#"{"no_items": true}"#)
            .output_meta_schema(META)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::Validation { side: SchemaSide::Output, .. }));
    }

    #[test]
    fn test_meta_schema_without_draft_uses_draft4() {
        // draft-04 的布尔型 exclusiveMaximum
        let meta = r#"{
            "type": "object",
            "properties": {
                "revision": {"type": "number", "maximum": 5, "exclusiveMaximum": true}
            }
        }"#;

        let mapping = SchemaKeyMapper::new()
            .input_schema(r#"{"revision": 4, "items": {"properties": {"v": {"key": "value"}}}}"#)
            .input_meta_schema(meta)
            .build()
            .unwrap();
        assert_eq!(mapping.value_key(), "v");

        let err = SchemaKeyMapper::new()
            .input_schema(r#"{"revision": 5}"#)
            .input_meta_schema(meta)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::Validation { side: SchemaSide::Input, .. }));
        assert!(!err.to_string().contains("Invalid meta-schema"), "{}", err);
    }

    #[test]
    fn test_invalid_json_documents() {
        let err = SchemaKeyMapper::new().input_schema("not json").input_meta_schema(META).build().unwrap_err();
        assert!(err.to_string().contains("Invalid schema JSON"));

        let err = SchemaKeyMapper::new().input_schema("{}").input_meta_schema("{").build().unwrap_err();
        assert!(err.to_string().contains("Invalid meta-schema JSON"));
    }

    #[test]
    fn test_output_failure_aborts_whole_build() {
        let input = r#"{"items": {"properties": {"sensorValue": {"key": "value"}}}}"#;
        let result = SchemaKeyMapper::new()
            .input_schema(input)
            .input_meta_schema(META)
            .output_schema(input)
            .build();
        assert!(matches!(result, Err(SchemaError::Configuration { side: SchemaSide::Output })));
    }

    #[test]
    fn test_input_files() {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("schema.json");
        let meta_path = dir.path().join("meta.json");
        fs::write(&schema_path, r#"{"items": {"properties": {"sensorValue": {"key": "value"}}}}"#).unwrap();
        fs::write(&meta_path, META).unwrap();

        let mapping = SchemaKeyMapper::new().input_files(&schema_path, &meta_path).unwrap().build().unwrap();
        assert_eq!(mapping.value_key(), "sensorValue");

        let err = SchemaKeyMapper::new()
            .input_files(dir.path().join("missing.json"), &meta_path)
            .unwrap_err();
        assert!(matches!(err, SchemaError::Io { .. }));
    }
}

//! # Ardurep Store
//!
//! 字段映射与传感器最新值存储。
//!
//! ## 模块
//!
//! - `schema`: 由 JSON Schema 角色标注推导输入字段名和输出重命名表
//! - `record`: 单个传感器的记录与单行渲染
//! - `store`: 线程安全的记录存储，提供文本渲染和 JSON 导出
//!
//! ## 示例
//!
//! ```
//! use ardurep_store::{SchemaKeyMapper, SensorStore};
//!
//! let meta = r#"{"type": "object"}"#;
//! let output = r#"{"items": {"properties": {"sensorValue": {"key": "value"}}}}"#;
//!
//! let mapping = SchemaKeyMapper::new()
//!     .output_schema(output)
//!     .output_meta_schema(meta)
//!     .build()
//!     .unwrap();
//! let store = SensorStore::new(mapping);
//! store.apply_frame(r#"[{"id":"light","value":"777"}]"#).unwrap();
//!
//! assert!(store.export_json(false, true).contains(r#""sensorValue":"777""#));
//! ```

pub mod record;
pub mod schema;
pub mod store;

pub use record::{SensorRecord, TIMESTAMP_FORMAT, format_timestamp};
pub use schema::{FieldRole, KeyMapping, SchemaError, SchemaKeyMapper, SchemaSide, read_schema};
pub use store::{SensorStore, StoreError, StoreSnapshot};

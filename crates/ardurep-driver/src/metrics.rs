//! Reader 运行指标
//!
//! 原子计数器，Reader 线程写入，任意线程读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 单个 Reader 的实时指标
///
/// # 使用示例
///
/// ```rust
/// use ardurep_driver::ReaderMetrics;
/// use std::sync::Arc;
/// use std::sync::atomic::Ordering;
///
/// let metrics = Arc::new(ReaderMetrics::default());
/// metrics.lines_total.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.lines_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct ReaderMetrics {
    /// 读到的总行数
    pub lines_total: AtomicU64,

    /// 成功应用到 store 的帧数
    pub frames_applied: AtomicU64,

    /// 无法解析而丢弃的帧数
    pub parse_errors: AtomicU64,

    /// 因缺少必需字段而中止的批次数
    pub missing_field_errors: AtomicU64,

    /// 非 UTF-8 行数
    pub decode_errors: AtomicU64,

    /// 读超时次数（正常现象，设备空闲时会超时）
    pub idle_polls: AtomicU64,

    /// 输入源错误次数
    pub source_errors: AtomicU64,
}

impl ReaderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取所有计数器的快照
    ///
    /// 使用 `Ordering::Relaxed`，不同计数器之间可能有微小的时间差。
    pub fn snapshot(&self) -> ReaderMetricsSnapshot {
        ReaderMetricsSnapshot {
            lines_total: self.lines_total.load(Ordering::Relaxed),
            frames_applied: self.frames_applied.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            missing_field_errors: self.missing_field_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照（不可变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReaderMetricsSnapshot {
    pub lines_total: u64,
    pub frames_applied: u64,
    pub parse_errors: u64,
    pub missing_field_errors: u64,
    pub decode_errors: u64,
    pub idle_polls: u64,
    pub source_errors: u64,
}

impl ReaderMetricsSnapshot {
    /// 被丢弃或中止的帧/行总数
    pub fn rejected_total(&self) -> u64 {
        self.parse_errors + self.missing_field_errors + self.decode_errors
    }

    /// 完整帧中成功应用的比例（百分比）
    ///
    /// 没有收到任何完整帧时返回 0.0。
    pub fn applied_rate(&self) -> f64 {
        let frames = self.frames_applied + self.parse_errors + self.missing_field_errors;
        if frames == 0 {
            return 0.0;
        }
        (self.frames_applied as f64 / frames as f64) * 100.0
    }
}

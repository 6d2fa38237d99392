//! Reader 循环模块
//!
//! 负责后台 Reader 线程的逐行读取、帧重组、批次应用和轮次计数。

use crate::error::DriverError;
use crate::metrics::ReaderMetrics;
use crate::source::{LineSource, SourceError};
use ardurep_protocol::FrameAssembler;
use ardurep_store::{SensorStore, StoreError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Reader 配置
///
/// # Example
///
/// ```
/// use ardurep_driver::ReaderConfig;
///
/// // 默认：100 轮，空闲时休眠 100ms，读超时 1s
/// let config = ReaderConfig::default();
///
/// // 永不因轮次结束
/// let config = ReaderConfig {
///     rounds: 0,
///     ..ReaderConfig::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// 轮次上限，0 表示不限
    ///
    /// 每个完整帧、每次空闲读超时、每个非 UTF-8 行各计一轮。
    pub rounds: u64,
    /// 读超时后的休眠时间（毫秒）
    pub poll_interval_ms: u64,
    /// 等待一行的最长时间（毫秒），由 `ReaderBuilder` 应用到输入源
    pub read_timeout_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            rounds: 100,
            poll_interval_ms: 100,
            read_timeout_ms: 1000,
        }
    }
}

impl ReaderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// 轮次计数状态机
///
/// | 状态 | tick 后 |
/// |------|---------|
/// | `Unbounded` | `Unbounded` |
/// | `Remaining(n > 1)` | `Remaining(n - 1)` |
/// | `Remaining(1)` | `Expired` |
/// | `Expired` | `Expired` |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Unbounded,
    Remaining(u64),
    Expired,
}

impl Lifetime {
    /// 从轮次数构造，0 表示不限
    pub fn from_rounds(rounds: u64) -> Self {
        if rounds == 0 { Self::Unbounded } else { Self::Remaining(rounds) }
    }

    /// 消耗一轮；返回之后是否仍然存活
    pub fn tick(&mut self) -> bool {
        *self = match *self {
            Self::Unbounded => Self::Unbounded,
            Self::Remaining(n) if n > 1 => Self::Remaining(n - 1),
            Self::Remaining(_) | Self::Expired => Self::Expired,
        };
        !self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::Remaining(n) => write!(f, "{} round(s) left", n),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Reader 线程循环
///
/// # 参数
/// - `source`: 行输入源（在循环中独占）
/// - `store`: 共享存储
/// - `config`: Reader 配置
/// - `is_running`: 运行标志，每轮开始时检查；循环结束时置为 false
/// - `metrics`: 指标计数器
///
/// # 返回值
/// - `Ok(())`: 被停止、轮次耗尽或输入结束
/// - `Err(DriverError::Source)`: 输入源读取失败（已记录 `error!`）
pub fn reader_loop(
    mut source: impl LineSource,
    store: Arc<SensorStore>,
    config: ReaderConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<ReaderMetrics>,
) -> Result<(), DriverError> {
    let mut assembler = FrameAssembler::new();
    let mut lifetime = Lifetime::from_rounds(config.rounds);
    let poll_interval = config.poll_interval();

    info!("Reader loop started ({})", lifetime);

    let result = loop {
        // Acquire: 看到 false 时必须看到 halt() 之前的写入
        if !is_running.load(Ordering::Acquire) {
            trace!("Reader: is_running flag is false, exiting");
            break Ok(());
        }

        match source.read_line() {
            Ok(Some(raw)) => {
                metrics.lines_total.fetch_add(1, Ordering::Relaxed);
                match assembler.feed(&raw) {
                    Ok(Some(frame)) => apply_frame(&store, &frame, &metrics),
                    Ok(None) => continue,
                    Err(e) => {
                        metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                        warn!("Dropping partial frame: {}", e);
                    },
                }
            },
            Ok(None) => {
                metrics.idle_polls.fetch_add(1, Ordering::Relaxed);
                spin_sleep::sleep(poll_interval);
            },
            Err(SourceError::Closed) => {
                info!("Reader: source closed");
                break Ok(());
            },
            Err(e) => {
                metrics.source_errors.fetch_add(1, Ordering::Relaxed);
                error!("Reader: source error, stopping: {}", e);
                break Err(DriverError::Source(e));
            },
        }

        if !lifetime.tick() {
            debug!("Reader: rounds exhausted");
            break Ok(());
        }
    };

    // Release: 其他线程看到 false 时，本线程之前的所有写入都可见
    is_running.store(false, Ordering::Release);
    let summary = metrics.snapshot();
    info!(
        "Reader loop stopped: {} line(s), {} frame(s) applied ({:.1}%), {} rejected",
        summary.lines_total,
        summary.frames_applied,
        summary.applied_rate(),
        summary.rejected_total()
    );
    result
}

/// 解码并应用一个完整帧；失败只记录，不中断循环
fn apply_frame(store: &SensorStore, frame: &str, metrics: &ReaderMetrics) {
    trace!("Reader: complete frame {}", frame);
    match store.apply_frame(frame) {
        Ok(count) => {
            metrics.frames_applied.fetch_add(1, Ordering::Relaxed);
            debug!("Applied frame with {} record(s)", count);
        },
        Err(StoreError::Parse(e)) => {
            metrics.parse_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Discarding frame: {}", e);
        },
        Err(e @ StoreError::MissingField { .. }) => {
            metrics.missing_field_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Batch aborted: {}", e);
        },
    }
}

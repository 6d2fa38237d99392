//! Reader 对外 API
//!
//! 提供 `Reader` 结构体，封装后台线程、运行标志和指标。

use crate::error::DriverError;
use crate::metrics::{ReaderMetrics, ReaderMetricsSnapshot};
use crate::pipeline::{ReaderConfig, reader_loop};
use crate::source::LineSource;
use ardurep_store::SensorStore;
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info};

/// Drop 时等待线程退出的上限
const DROP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

type ReaderResult = Result<(), DriverError>;

/// Extension trait for timeout-capable thread joins
trait JoinTimeout<T> {
    fn join_timeout(self, timeout: Duration) -> Result<T, DriverError>;
}

impl<T: Send + 'static> JoinTimeout<T> for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<T, DriverError> {
        let (tx, rx) = crossbeam_channel::bounded(1);

        // 看门狗线程代为 join，超时后它继续等待，进程退出时回收
        thread::spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) | Err(RecvTimeoutError::Disconnected) => Err(DriverError::ThreadPanicked),
            Err(RecvTimeoutError::Timeout) => Err(DriverError::Timeout),
        }
    }
}

/// 后台 Reader
///
/// 一个 Reader 独占一个输入源和一个线程，多个 Reader 可以共享同一个 `SensorStore`。
/// Drop 时会停止并等待线程退出（最多 2 秒）。
///
/// # Example
///
/// ```
/// use ardurep_driver::{BufReadSource, Reader, ReaderConfig};
/// use ardurep_store::SensorStore;
/// use std::io::Cursor;
/// use std::sync::Arc;
///
/// let store = Arc::new(SensorStore::default());
/// let input = Cursor::new(b"[\r\n  {\"id\":\"a\",\"value\":\"8\",\"unit\":\"m\"}\r\n]\r\n".to_vec());
///
/// let reader = Reader::spawn("replay", BufReadSource::new(input), store.clone(), ReaderConfig::default()).unwrap();
/// reader.join().unwrap();
///
/// assert!(store.render_text().contains("a 8m"));
/// ```
pub struct Reader {
    name: String,
    store: Arc<SensorStore>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<ReaderMetrics>,
    thread: Option<JoinHandle<ReaderResult>>,
}

impl Reader {
    /// 在新线程上启动 Reader 循环
    pub fn spawn<S>(
        name: impl Into<String>,
        source: S,
        store: Arc<SensorStore>,
        config: ReaderConfig,
    ) -> Result<Self, DriverError>
    where
        S: LineSource + Send + 'static,
    {
        let name = name.into();
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(ReaderMetrics::new());

        let thread = {
            let store = store.clone();
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            thread::Builder::new()
                .name(format!("ardurep-reader-{}", name))
                .spawn(move || reader_loop(source, store, config, is_running, metrics))
                .map_err(DriverError::Spawn)?
        };

        info!("Reader `{}` spawned", name);
        Ok(Self {
            name,
            store,
            is_running,
            metrics,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 共享存储
    pub fn store(&self) -> &Arc<SensorStore> {
        &self.store
    }

    /// 请求停止；循环在下一轮开始时退出
    ///
    /// 停止延迟上限为一次读超时或一次空闲休眠。
    pub fn halt(&self) {
        // Release: 确保之前的写入对 Reader 线程可见
        self.is_running.store(false, Ordering::Release);
    }

    /// 循环是否仍在运行
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 指标快照
    pub fn metrics(&self) -> ReaderMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 等待线程结束，返回循环的结果
    ///
    /// 不会主动停止 Reader；需要立即结束时先调用 [`halt`](Self::halt)。
    pub fn join(mut self) -> ReaderResult {
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| DriverError::ThreadPanicked)?,
            None => Ok(()),
        }
    }

    /// 带超时地等待线程结束
    ///
    /// 超时返回 `DriverError::Timeout`，线程不会被强制结束。
    pub fn join_timeout(mut self, timeout: Duration) -> ReaderResult {
        match self.thread.take() {
            Some(handle) => handle.join_timeout(timeout)?,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("name", &self.name)
            .field("is_running", &self.is_running())
            .finish()
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.halt();

        if let Some(handle) = self.thread.take() {
            match handle.join_timeout(DROP_JOIN_TIMEOUT) {
                Ok(Ok(())) => {},
                Ok(Err(e)) => error!("Reader `{}` stopped with error: {}", self.name, e),
                Err(_) => error!(
                    "Reader `{}` panicked or failed to shut down within {:?}",
                    self.name, DROP_JOIN_TIMEOUT
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceError;
    use std::time::Instant;

    /// 永远超时的输入源
    struct SilentSource;

    impl LineSource for SilentSource {
        fn read_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
            thread::sleep(Duration::from_millis(5));
            Ok(None)
        }
    }

    /// 第一次读取就 panic 的输入源
    struct PanickingSource;

    impl LineSource for PanickingSource {
        fn read_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
            panic!("source exploded");
        }
    }

    fn unbounded() -> ReaderConfig {
        ReaderConfig {
            rounds: 0,
            poll_interval_ms: 5,
            read_timeout_ms: 5,
        }
    }

    #[test]
    fn test_halt_stops_reader() {
        let store = Arc::new(SensorStore::default());
        let reader = Reader::spawn("silent", SilentSource, store, unbounded()).unwrap();
        assert!(reader.is_running());

        let start = Instant::now();
        reader.halt();
        reader.join_timeout(Duration::from_secs(1)).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_join_timeout_expires() {
        let store = Arc::new(SensorStore::default());
        let reader = Reader::spawn("silent", SilentSource, store, unbounded()).unwrap();
        let is_running = reader.is_running.clone();

        let err = reader.join_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, DriverError::Timeout));

        // 停止仍在运行的线程，避免泄漏到其他测试
        is_running.store(false, Ordering::Release);
    }

    #[test]
    fn test_panicking_source() {
        let store = Arc::new(SensorStore::default());
        let reader = Reader::spawn("panicky", PanickingSource, store, unbounded()).unwrap();
        assert!(matches!(reader.join(), Err(DriverError::ThreadPanicked)));
    }

    #[test]
    fn test_drop_halts_thread() {
        let store = Arc::new(SensorStore::default());
        let reader = Reader::spawn("dropped", SilentSource, store, unbounded()).unwrap();
        let is_running = reader.is_running.clone();

        drop(reader);
        assert!(!is_running.load(Ordering::Acquire));
    }

    #[test]
    fn test_rounds_exhaust_without_halt() {
        let store = Arc::new(SensorStore::default());
        let config = ReaderConfig {
            rounds: 3,
            ..unbounded()
        };
        let reader = Reader::spawn("bounded", SilentSource, store, config).unwrap();
        reader.join_timeout(Duration::from_secs(2)).unwrap();
    }
}

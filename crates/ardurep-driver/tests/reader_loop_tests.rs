//! Reader 循环集成测试
//!
//! 使用 mock 输入源验证：
//! 1. 噪声行（调试输出、空行、非 UTF-8）不影响帧重组
//! 2. 多个 Reader 共享同一存储
//! 3. halt() 后 Reader 在一个轮询周期内退出

use ardurep_driver::{DriverError, LineSource, Reader, ReaderConfig, ReaderMetrics, SourceError, reader_loop};
use ardurep_store::SensorStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::{Duration, Instant};

/// Mock 输入源：按顺序吐出行，耗尽后模拟读超时
struct MockLineSource {
    lines: VecDeque<Vec<u8>>,
    read_delay: Duration,
}

impl MockLineSource {
    fn new(lines: Vec<Vec<u8>>, read_delay: Duration) -> Self {
        Self {
            lines: VecDeque::from(lines),
            read_delay,
        }
    }
}

impl LineSource for MockLineSource {
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        match self.lines.pop_front() {
            Some(line) => Ok(Some(line)),
            None => {
                thread::sleep(self.read_delay);
                Ok(None)
            },
        }
    }
}

/// 一个设备帧（`\r\n` 行尾）
fn frame_lines(id: &str, value: u32) -> Vec<Vec<u8>> {
    vec![
        b"[\r\n".to_vec(),
        format!("  {{\"id\":\"{}\",\"value\":{}}}\r\n", id, value).into_bytes(),
        b"]\r\n".to_vec(),
    ]
}

/// 随机噪声行：永远不是 `[`、`]` 或数据行
fn noise_line(rng: &mut StdRng) -> Vec<u8> {
    match rng.gen_range(0..4) {
        0 => b"\r\n".to_vec(),
        1 => format!("debug: free memory {}\r\n", rng.gen_range(0..2048)).into_bytes(),
        2 => b" {\"id\":\"not-a-data-line\"}\r\n".to_vec(),
        _ => b"[ ]\r\n".to_vec(),
    }
}

fn fast_config(rounds: u64) -> ReaderConfig {
    ReaderConfig {
        rounds,
        poll_interval_ms: 1,
        read_timeout_ms: 1,
    }
}

#[test]
fn test_noise_between_frames_is_ignored() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut lines = Vec::new();
    for i in 0..50 {
        for _ in 0..rng.gen_range(0..5) {
            lines.push(noise_line(&mut rng));
        }
        lines.extend(frame_lines(&format!("sensor{}", i % 7), i));
    }

    let store = Arc::new(SensorStore::default());
    let metrics = Arc::new(ReaderMetrics::new());
    let result = reader_loop(
        MockLineSource::new(lines, Duration::ZERO),
        store.clone(),
        fast_config(50),
        Arc::new(AtomicBool::new(true)),
        metrics.clone(),
    );

    assert!(result.is_ok());
    assert_eq!(store.len(), 7);
    // 每个 id 保留最后一次的值
    assert_eq!(store.get("sensor0").unwrap().value.to_string(), "49");
    assert_eq!(store.get("sensor6").unwrap().value.to_string(), "48");

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.frames_applied, 50);
    assert_eq!(snapshot.rejected_total(), 0);
    assert_eq!(snapshot.idle_polls, 0);
}

#[test]
fn test_invalid_utf8_mid_frame_drops_only_that_frame() {
    let mut lines = frame_lines("a", 1);
    lines.push(b"[\r\n".to_vec());
    lines.push(vec![b' ', b' ', b'{', 0xc3, 0x28, b'}', b'\r', b'\n']);
    lines.push(b"]\r\n".to_vec());
    lines.extend(frame_lines("b", 2));

    let store = Arc::new(SensorStore::default());
    let metrics = Arc::new(ReaderMetrics::new());
    reader_loop(
        MockLineSource::new(lines, Duration::ZERO),
        store.clone(),
        fast_config(3),
        Arc::new(AtomicBool::new(true)),
        metrics.clone(),
    )
    .unwrap();

    assert!(store.get("a").is_some());
    assert!(store.get("b").is_some());
    assert_eq!(store.len(), 2);
    assert_eq!(metrics.snapshot().decode_errors, 1);
}

#[test]
fn test_two_readers_share_store() {
    let store = Arc::new(SensorStore::default());
    let config = ReaderConfig {
        rounds: 0,
        poll_interval_ms: 5,
        read_timeout_ms: 5,
    };

    let first = Reader::spawn(
        "first",
        MockLineSource::new(frame_lines("bar", 777), Duration::from_millis(5)),
        store.clone(),
        config.clone(),
    )
    .unwrap();
    let second = Reader::spawn(
        "second",
        MockLineSource::new(frame_lines("foo", 666), Duration::from_millis(5)),
        store.clone(),
        config,
    )
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while store.len() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    // 第一个停止后第二个仍在运行
    first.halt();
    first.join_timeout(Duration::from_secs(1)).unwrap();
    assert!(second.is_running());

    second.halt();
    second.join_timeout(Duration::from_secs(1)).unwrap();

    assert_eq!(store.get("bar").unwrap().value.to_string(), "777");
    assert_eq!(store.get("foo").unwrap().value.to_string(), "666");
}

#[test]
fn test_halt_latency_is_bounded() {
    let config = ReaderConfig {
        rounds: 0,
        poll_interval_ms: 20,
        read_timeout_ms: 20,
    };
    let reader = Reader::spawn(
        "idle",
        MockLineSource::new(Vec::new(), Duration::from_millis(20)),
        Arc::new(SensorStore::default()),
        config,
    )
    .unwrap();
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    reader.halt();
    reader.join_timeout(Duration::from_secs(1)).unwrap();

    // 一次读超时 + 一次空闲休眠，留出调度余量
    assert!(start.elapsed() < Duration::from_millis(500), "halt took {:?}", start.elapsed());
}

#[test]
fn test_failing_source_stops_only_its_reader() {
    struct FailingSource;

    impl LineSource for FailingSource {
        fn read_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
            Err(SourceError::Io(std::io::Error::other("device unplugged")))
        }
    }

    let store = Arc::new(SensorStore::default());
    let config = ReaderConfig {
        rounds: 0,
        poll_interval_ms: 5,
        read_timeout_ms: 5,
    };

    let healthy = Reader::spawn(
        "healthy",
        MockLineSource::new(Vec::new(), Duration::from_millis(5)),
        store.clone(),
        config.clone(),
    )
    .unwrap();
    let broken = Reader::spawn("broken", FailingSource, store, config).unwrap();

    let err = broken.join_timeout(Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, DriverError::Source(SourceError::Io(_))));

    assert!(healthy.is_running());
    healthy.halt();
    healthy.join_timeout(Duration::from_secs(1)).unwrap();
}

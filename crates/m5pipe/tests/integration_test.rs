//! m5pipe 統合テスト
//!
//! セッション + ストリーム + 疑似ホストの完全な経路をテストする。
//! 致命的エラーでプロセスが終了することは、テストバイナリ自身を子プロセスとして
//! 起動し直して確認する。

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use m5pipe::{
    FatalPolicy, GatePolicy, GraphicsCall, IoStream, OpenError, PipeSession, ProcessContext, StreamConfig,
};
use m5pipe_stream::LoopbackHost;

// ==============================================================
// ヘルパー
// ==============================================================

fn config() -> StreamConfig {
    StreamConfig::default()
        .with_page_size(4096)
        .with_gate(GatePolicy::unbounded(Duration::ZERO))
        .with_fatal_policy(FatalPolicy::Panic)
}

fn session(host: &LoopbackHost) -> PipeSession<&LoopbackHost> {
    PipeSession::with_trap(host, Arc::new(ProcessContext::with_pid(11)), config()).unwrap()
}

// ==============================================================
// 送受信
// ==============================================================

#[test]
fn test_commit_and_read_back() {
    m5pipe::init_logger();
    let host = LoopbackHost::new();
    let mut session = session(&host);
    let stream = session.stream_mut();

    let buf = stream.alloc_buffer(500).unwrap();
    assert!(buf.len() >= 500);
    buf[..5].copy_from_slice(b"hello");
    assert_eq!(stream.commit_buffer(5), 0);

    let mut reply = [0u8; 5];
    assert_eq!(stream.read_fully(Some(&mut reply), 5), Some(&b"hello"[..]));
    assert_eq!(host.written(), b"hello");
}

#[test]
fn test_large_write_is_split_into_pages() {
    let host = LoopbackHost::new();
    let mut session = session(&host);

    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(session.stream_mut().write_fully(Some(&payload), payload.len()), 0);

    let lens: Vec<u64> = host.data_calls(GraphicsCall::Write).iter().map(|c| c.len).collect();
    assert_eq!(lens, vec![4096, 4096, 1808]);
    // 1 回の論理転送につきゲートは 1 回
    assert_eq!(host.data_calls(GraphicsCall::Block).len(), 1);
    assert_eq!(host.written(), payload);
}

#[test]
fn test_slow_host_is_resumed_from_offset() {
    let host = LoopbackHost::new().with_max_chunk(1000);
    let mut session = session(&host);

    let payload: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
    assert_eq!(session.stream_mut().write_fully(Some(&payload), 2500), 0);
    assert_eq!(host.written(), payload);

    let mut back = vec![0u8; 2500];
    let data = session.stream_mut().read_fully(Some(&mut back), 2500).unwrap();
    assert_eq!(data, &payload[..]);
}

#[test]
fn test_partial_read() {
    let host = LoopbackHost::new();
    host.feed(b"abcdef");
    let mut session = session(&host);

    let mut buf = [0u8; 4];
    let mut len = 4;
    assert_eq!(session.stream_mut().read(Some(&mut buf), &mut len), Some(&b"abcd"[..]));
    assert_eq!(len, 4);

    let mut len = 4;
    assert_eq!(session.stream_mut().read(Some(&mut buf), &mut len), Some(&b"ef"[..]));
    assert_eq!(len, 2);

    let mut len = 4;
    assert_eq!(session.stream_mut().read(Some(&mut buf), &mut len), None);
}

#[test]
fn test_requests_carry_identity() {
    let host = LoopbackHost::new();
    let mut session = session(&host);
    session.stream_mut().write_fully(Some(b"x"), 1);

    let calls = host.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.pid == 11));
    assert!(calls.iter().all(|c| c.tid == m5pipe_trap::current_tid()));
    assert_eq!(calls[0].unique_id + 1, calls[1].unique_id);
}

#[test]
fn test_process_uid_shared_by_sessions() {
    let host = LoopbackHost::new();
    let a = session(&host);
    let b = std::thread::scope(|s| s.spawn(|| session(&host).process_uid()).join().unwrap());
    assert_eq!(a.process_uid(), b);
    assert_eq!((a.process_uid() >> 32) as u32, std::process::id());
}

#[test]
fn test_stats_json() {
    let host = LoopbackHost::new();
    let mut session = session(&host);
    session.stream_mut().write_fully(Some(&[0u8; 5000]), 5000);

    let value: serde_json::Value = serde_json::from_str(&session.stats_json()).unwrap();
    assert_eq!(value["bytes_written"], 5000);
    assert_eq!(value["chunk_calls"], 2);
    assert_eq!(value["gate_probes"], 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let host = LoopbackHost::new();
    let err = PipeSession::with_trap(
        &host,
        Arc::new(ProcessContext::with_pid(11)),
        config().with_buffer_size(100).with_max_buffer_size(10),
    )
    .err()
    .unwrap();
    assert!(matches!(err, OpenError::Config(_)));
    assert!(host.calls().is_empty());
}

// ==============================================================
// 致命的エラー（子プロセスで実行）
// ==============================================================

/// 子プロセスで実行するケース名
const CRASH_CASE_ENV: &str = "M5PIPE_CRASH_CASE";

/// 子プロセス側のエントリポイント。環境変数がなければ何もしない
#[test]
fn crash_child() {
    let Ok(case) = std::env::var(CRASH_CASE_ENV) else {
        return;
    };

    let host = LoopbackHost::new();
    let mut session = PipeSession::with_trap(
        &host,
        Arc::new(ProcessContext::with_pid(11)),
        config().with_fatal_policy(FatalPolicy::Abort),
    )
    .unwrap();
    let stream = session.stream_mut();

    match case.as_str() {
        "write_fully_null" => {
            stream.write_fully(None, 16);
        }
        "read_fully_null" => {
            let _ = stream.read_fully(None, 16);
        }
        "write_fully_zero_progress" => {
            host.script([0]);
            stream.write_fully(Some(&[1u8; 16]), 16);
        }
        "write_fully_zero_after_progress" => {
            host.script([4096, 0]);
            stream.write_fully(Some(&[1u8; 8192]), 8192);
        }
        other => panic!("unknown crash case {}", other),
    }

    // ここまで来たら終了していない
    std::process::exit(0);
}

fn run_crash_case(case: &str) -> std::process::Output {
    let exe = std::env::current_exe().unwrap();
    Command::new(exe)
        .args(["crash_child", "--exact", "--nocapture", "--test-threads=1"])
        .env(CRASH_CASE_ENV, case)
        .output()
        .unwrap()
}

fn assert_aborted(output: &std::process::Output, operation: &str) {
    assert!(!output.status.success(), "child exited normally: {:?}", output.status);

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(output.status.signal(), Some(libc::SIGABRT));
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains(&format!("{} failed", operation)),
        "missing diagnostic in stderr: {}",
        stderr
    );
}

#[test]
fn test_write_fully_null_aborts() {
    let output = run_crash_case("write_fully_null");
    assert_aborted(&output, "write_fully");
}

#[test]
fn test_read_fully_null_aborts() {
    let output = run_crash_case("read_fully_null");
    assert_aborted(&output, "read_fully");
}

#[test]
fn test_write_zero_progress_aborts() {
    let output = run_crash_case("write_fully_zero_progress");
    assert_aborted(&output, "write_fully");
}

#[test]
fn test_write_zero_after_progress_aborts() {
    let output = run_crash_case("write_fully_zero_after_progress");
    assert_aborted(&output, "write_fully");
}

//! End-to-end runs of the `mq` binary against the system's message queues.
//!
//! Tests that need real queues auto-skip when `/dev/mqueue` is not present or
//! not writable (containers without an mqueue mount, for example).

use mqtool::utils::{mqueue_fs_available, unique_queue_name};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::{Command, Output};
use std::time::{Duration, Instant};

fn mq(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mq"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run mq")
}

fn mq_with_log_filter(filter: &str, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mq"))
        .args(args)
        .env("RUST_LOG", filter)
        .output()
        .expect("run mq")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn mqueue_available() -> bool {
    if !mqueue_fs_available(Path::new("/dev/mqueue")) {
        eprintln!("Skipping: /dev/mqueue not present or not writable");
        return false;
    }
    true
}

/// Removes a queue at the end of a test, whatever happened.
struct Cleanup(String);

impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = mqtool::queue::unlink(&self.0);
    }
}

#[test]
fn help_exits_zero() {
    let output = mq(&["--help"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("openmode format"));
}

#[test]
fn bad_arguments_exit_one() {
    let output = mq(&[]);
    assert_eq!(output.status.code(), Some(1));

    let output = mq(&["read", "/whatever", "r1,2,3,4"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Too many numbers"));

    let output = mq(&["stat", "/a", "r", "/b"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("missing its open mode"));
}

#[test]
fn failure_report_ignores_log_filter() {
    for filter in ["off", "nix=debug", "error"] {
        let output = mq_with_log_filter(filter, &["stat", "/a", "r1,2,3,4"]);
        assert_eq!(output.status.code(), Some(1));
        let err = stderr(&output);
        assert!(err.contains("Too many numbers"), "RUST_LOG={}: {:?}", filter, err);
    }

    let output = mq_with_log_filter("off", &["ls", "--mqueue-dir", "/nonexistent/mqueue"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("opening /nonexistent/mqueue/ failed"));
}

#[test]
fn decoded_os_error_printed_with_logging_off() {
    if !mqueue_available() {
        return;
    }
    let name = unique_queue_name("mqtool_it", "quiet");

    let output = mq_with_log_filter("off", &["rm", &name]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("deleting failed with errno 2 = ENOENT"), "{:?}", err);
    assert!(err.contains("(generic desc: "), "{:?}", err);
}

#[test]
fn write_then_read_returns_same_message() {
    if !mqueue_available() {
        return;
    }
    let name = unique_queue_name("mqtool_it", "roundtrip");
    let _cleanup = Cleanup(name.clone());

    let output = mq(&["write", &name, "wc600,5,256", "7", "hello queue"]);
    assert!(output.status.success(), "write failed: {}", stderr(&output));

    let output = mq(&["read", &name, "r"]);
    assert!(output.status.success(), "read failed: {}", stderr(&output));
    assert_eq!(stdout(&output), " 7 hello queue\n");
}

#[test]
fn read_json_output() {
    if !mqueue_available() {
        return;
    }
    let name = unique_queue_name("mqtool_it", "json");
    let _cleanup = Cleanup(name.clone());

    assert!(mq(&["send", &name, "wc", "3", "payload"]).status.success());
    let output = mq(&["receive", &name, "r", "--format", "json"]);
    assert!(output.status.success(), "read failed: {}", stderr(&output));

    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["priority"], 3);
    assert_eq!(value["len"], 7);
    assert_eq!(value["message"], "payload");
    assert_eq!(value["payload"], serde_json::json!(b"payload".to_vec()));
}

#[test]
fn read_json_keeps_binary_payload_bytes() {
    if !mqueue_available() {
        return;
    }
    let name = unique_queue_name("mqtool_it", "binary");
    let _cleanup = Cleanup(name.clone());

    let status = Command::new(env!("CARGO_BIN_EXE_mq"))
        .args(["write", &name, "wc", "0"])
        .arg(OsStr::from_bytes(&[0xff, b'a', 0xfe]))
        .env_remove("RUST_LOG")
        .status()
        .expect("run mq");
    assert!(status.success());

    let output = mq(&["read", &name, "r", "--format", "json"]);
    assert!(output.status.success(), "read failed: {}", stderr(&output));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["len"], 3);
    assert_eq!(value["payload"], serde_json::json!([255, 97, 254]));
    assert_eq!(value["message"], "\u{fffd}a\u{fffd}");
}

#[test]
fn message_starting_with_hyphen_is_sent() {
    if !mqueue_available() {
        return;
    }
    let name = unique_queue_name("mqtool_it", "hyphen");
    let _cleanup = Cleanup(name.clone());

    let output = mq(&["write", &name, "wc", "2", "-x"]);
    assert!(output.status.success(), "write failed: {}", stderr(&output));
    let output = mq(&["read", &name, "r"]);
    assert_eq!(stdout(&output), " 2 -x\n");
}

#[test]
fn huge_timeout_does_not_overflow() {
    if !mqueue_available() {
        return;
    }
    let name = unique_queue_name("mqtool_it", "hugetimeout");
    let _cleanup = Cleanup(name.clone());

    let output = mq(&["read", &name, "rcn", &u64::MAX.to_string()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("EAGAIN"), "{}", stderr(&output));

    let output = mq(&["read", &name, "rn", "10000000000"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("EAGAIN"), "{}", stderr(&output));
}

#[test]
fn timed_read_on_empty_queue_times_out() {
    if !mqueue_available() {
        return;
    }
    let name = unique_queue_name("mqtool_it", "timeout");
    let _cleanup = Cleanup(name.clone());

    let start = Instant::now();
    let output = mq(&["read", &name, "rc", "1"]);
    let elapsed = start.elapsed();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("ETIMEDOUT"), "{}", stderr(&output));
    assert!(elapsed >= Duration::from_millis(500), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "returned after {:?}", elapsed);
}

#[test]
fn read_without_create_on_missing_queue_is_not_found() {
    if !mqueue_available() {
        return;
    }
    let name = unique_queue_name("mqtool_it", "absent");

    let output = mq(&["read", &name, "r", "1"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("opening failed with errno 2 = ENOENT"), "{}", err);
    assert!(err.contains("(generic desc: "), "{}", err);
}

#[test]
fn nonblocking_read_on_empty_queue_would_block() {
    if !mqueue_available() {
        return;
    }
    let name = unique_queue_name("mqtool_it", "nonblock");
    let _cleanup = Cleanup(name.clone());

    let output = mq(&["read", &name, "rcn"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("EAGAIN: queue is empty"), "{}", stderr(&output));
}

#[test]
fn nonblocking_write_on_full_queue_would_block() {
    if !mqueue_available() {
        return;
    }
    let name = unique_queue_name("mqtool_it", "full");
    let _cleanup = Cleanup(name.clone());

    assert!(mq(&["write", &name, "wcn1,16", "0", "one"]).status.success());
    let output = mq(&["write", &name, "wn", "0", "two"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("EAGAIN: queue is full"), "{}", stderr(&output));
}

#[test]
fn rm_then_stat_is_not_found() {
    if !mqueue_available() {
        return;
    }
    let name = unique_queue_name("mqtool_it", "rm");
    let _cleanup = Cleanup(name.clone());

    let output = mq(&["rm", &name]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("deleting failed with errno 2 = ENOENT"));

    assert!(mq(&["write", &name, "wc", "1", "x"]).status.success());
    let output = mq(&["unlink", &name]);
    assert!(output.status.success(), "rm failed: {}", stderr(&output));

    let output = mq(&["stat", &name, "r"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("ENOENT"));
}

#[test]
fn stat_reports_attributes_for_each_pair() {
    if !mqueue_available() {
        return;
    }
    let first = unique_queue_name("mqtool_it", "stat1");
    let second = unique_queue_name("mqtool_it", "stat2");
    let _cleanup = (Cleanup(first.clone()), Cleanup(second.clone()));

    assert!(mq(&["write", &first, "wc600,4,100", "1", "a"]).status.success());
    let output = mq(&["stat", &first, "r", &second, "rcn600,2,50"]);
    assert!(output.status.success(), "stat failed: {}", stderr(&output));

    let text = stdout(&output);
    assert!(text.contains(&format!(
        "name: {}\nmaxmsg: 4\nmsgsize: 100\ncurmsgs: 1\nflags: 0x0\n (nonblocking: no)\n",
        first
    )));
    assert!(text.contains(&format!("name: {}\nmaxmsg: 2\nmsgsize: 50\ncurmsgs: 0\n", second)));
    assert!(text.contains(" (nonblocking: yes)\n"));

    let output = mq(&["getattr", &first, "r", "--format", "json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["name"], first.as_str());
    assert_eq!(value["attributes"]["max_messages"], 4);
    assert_eq!(value["attributes"]["current_messages"], 1);
}

#[test]
fn ls_shows_remaining_queue_only() {
    if !mqueue_available() {
        return;
    }
    let kept = unique_queue_name("mqtool_it", "kept");
    let removed = unique_queue_name("mqtool_it", "removed");
    let _cleanup = (Cleanup(kept.clone()), Cleanup(removed.clone()));

    assert!(mq(&["stat", &kept, "rc", &removed, "rc"]).status.success());
    assert!(mq(&["rm", &removed]).status.success());

    let output = mq(&["ls"]);
    assert!(output.status.success(), "ls failed: {}", stderr(&output));
    let names: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert!(names.contains(&kept));
    assert!(!names.contains(&removed));
}

#[test]
fn ls_reads_configured_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("one"), b"").unwrap();
    std::fs::write(dir.path().join("two"), b"").unwrap();

    let output = mq(&["ls", "--mqueue-dir", dir.path().to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "/one\n/two\n");

    let missing = dir.path().join("missing");
    let output = mq(&["ls", "--mqueue-dir", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
}

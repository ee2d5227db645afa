#![cfg(unix)]
//! SSH checks against stand-in ssh clients

mod common;

use common::PUBLIC_IP;
use infra_harness::scenario::{check_echo, check_failing_echo, CheckError};
use infra_harness::{check_ssh_command, Host, KeyPair, RetryError, RetryPolicy, SshError};
use std::path::Path;
use std::time::Duration;

const TEXT: &str = "Hello, World";

fn keys(dir: &Path) -> KeyPair {
    let (private, public) = common::key_files(dir);
    KeyPair::from_files(private, public).unwrap()
}

fn host<'a>(keys: &'a KeyPair, ssh: &Path) -> Host<'a> {
    Host::new(PUBLIC_IP, keys, "emergency")
        .unwrap()
        .with_connect_timeout(Duration::from_secs(1))
        .with_ssh_program(Some(ssh))
}

fn quick(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(10))
}

#[smol_potat::test]
async fn test_echo_check_passes() {
    let dir = tempfile::tempdir().unwrap();
    let keys = keys(dir.path());
    let (ssh, log) = common::fake_ssh(dir.path());

    let output = check_echo(&host(&keys, &ssh), TEXT, quick(6)).await.unwrap();

    assert_eq!(output, TEXT);
    let lines = common::read_log(&log);
    assert_eq!(lines.len(), 1);
    let invocation = &lines[0];
    assert!(invocation.contains("-i "), "{invocation}");
    assert!(invocation.contains("BatchMode=yes"), "{invocation}");
    assert!(invocation.contains("StrictHostKeyChecking=no"), "{invocation}");
    assert!(invocation.contains("ConnectTimeout=1"), "{invocation}");
    assert!(invocation.contains(&format!("emergency@{PUBLIC_IP}")), "{invocation}");
}

#[smol_potat::test]
async fn test_failing_echo_check_sees_error_and_output() {
    let dir = tempfile::tempdir().unwrap();
    let keys = keys(dir.path());
    let (ssh, _log) = common::fake_ssh(dir.path());

    let output = check_failing_echo(&host(&keys, &ssh), TEXT, quick(6))
        .await
        .unwrap();

    assert_eq!(output, TEXT);
}

#[smol_potat::test]
async fn test_non_zero_exit_keeps_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let keys = keys(dir.path());
    let (ssh, _log) = common::fake_ssh(dir.path());

    let err = check_ssh_command(&host(&keys, &ssh), "echo -n 'Hello, World' && exit 1")
        .await
        .unwrap_err();

    match err {
        SshError::CommandFailed { code, stdout, .. } => {
            assert_eq!(code, 1);
            assert_eq!(stdout, TEXT);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[smol_potat::test]
async fn test_unreachable_host_exhausts_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let keys = keys(dir.path());
    let (ssh, log) = common::unreachable_ssh(dir.path());

    let err = check_echo(&host(&keys, &ssh), TEXT, quick(6))
        .await
        .unwrap_err();

    assert_eq!(common::read_log(&log).len(), 6);
    match err {
        RetryError::Exhausted {
            attempts,
            last_error: CheckError::Ssh(SshError::Connection { reason, .. }),
            ..
        } => {
            assert_eq!(attempts, 6);
            assert!(reason.contains("Connection refused"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[smol_potat::test]
async fn test_host_coming_up_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let keys = keys(dir.path());
    let (ssh, log) = common::flaky_ssh(dir.path(), 2);

    let output = check_echo(&host(&keys, &ssh), TEXT, quick(6)).await.unwrap();

    assert_eq!(output, TEXT);
    assert_eq!(common::read_log(&log).len(), 3);
}

#[smol_potat::test]
async fn test_wrong_output_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let keys = keys(dir.path());
    let (ssh, log) = common::canned_ssh(dir.path(), "Goodbye", 0);

    let err = check_echo(&host(&keys, &ssh), TEXT, quick(6))
        .await
        .unwrap_err();

    assert_eq!(common::read_log(&log).len(), 1);
    assert!(matches!(
        err,
        RetryError::Fatal {
            attempt: 1,
            error: CheckError::UnexpectedOutput { .. },
            ..
        }
    ));
}

#[smol_potat::test]
async fn test_missing_failure_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let keys = keys(dir.path());
    let (ssh, log) = common::canned_ssh(dir.path(), TEXT, 0);

    let err = check_failing_echo(&host(&keys, &ssh), TEXT, quick(6))
        .await
        .unwrap_err();

    assert_eq!(common::read_log(&log).len(), 1);
    assert_eq!(
        err.inner().to_string(),
        "expected SSH command to return an error but got none"
    );
}

#[smol_potat::test]
async fn test_failing_echo_retries_while_host_comes_up() {
    let dir = tempfile::tempdir().unwrap();
    let keys = keys(dir.path());
    let (ssh, log) = common::flaky_ssh(dir.path(), 2);

    let output = check_failing_echo(&host(&keys, &ssh), TEXT, quick(6))
        .await
        .unwrap();

    assert_eq!(output, TEXT);
    assert_eq!(common::read_log(&log).len(), 3);
}

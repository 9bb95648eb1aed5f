//! Unit tests for the SSH transport.

use rstest::{fixture, rstest};

use super::*;
use crate::test_support::ScriptedRunner;

#[fixture]
fn runner() -> ScriptedRunner {
    ScriptedRunner::new()
}

fn transport(runner: &ScriptedRunner) -> SshTransport<ScriptedRunner> {
    let config = SshConfig {
        ssh_identity_file: Some(String::from("/keys/id_ed25519")),
        ..SshConfig::default()
    };
    SshTransport::new(config, runner.clone())
        .unwrap_or_else(|err| panic!("transport config should be valid: {err}"))
}

#[rstest]
#[tokio::test]
async fn successful_session_is_reachable(runner: ScriptedRunner) {
    runner.push_success();
    let result = transport(&runner).connect("srv-abc12.gb1.brightbox.com").await;
    assert_eq!(result, Ok(()));
}

#[rstest]
#[tokio::test]
async fn builds_batch_mode_probe_command(runner: ScriptedRunner) {
    runner.push_success();
    transport(&runner)
        .connect("203.0.113.10")
        .await
        .unwrap_or_else(|err| panic!("probe should succeed: {err}"));

    let invocations = runner.invocations();
    let invocation = invocations
        .first()
        .unwrap_or_else(|| panic!("ssh should be invoked"));
    assert_eq!(invocation.program, "ssh");
    assert_eq!(
        invocation.command_string(),
        concat!(
            "ssh -p 22 -i /keys/id_ed25519 -o BatchMode=yes ",
            "-o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null ",
            "-o ConnectTimeout=10 ubuntu@203.0.113.10 true"
        )
    );
}

#[rstest]
#[case("ubuntu@203.0.113.10: Permission denied (publickey).")]
#[case("Received disconnect: Too many authentication failures")]
#[tokio::test]
async fn rejected_credentials_are_fatal(runner: ScriptedRunner, #[case] stderr: &str) {
    runner.push_output(Some(255), "", stderr);
    let err = transport(&runner)
        .connect("203.0.113.10")
        .await
        .expect_err("authentication failure expected");
    assert_eq!(err.kind(), TransportErrorKind::Authentication);
}

#[rstest]
#[case(Some(255), "ssh: connect to host 203.0.113.10 port 22: Connection refused")]
#[case(Some(255), "ssh: connect to host 203.0.113.10 port 22: Operation timed out")]
#[case(Some(1), "Permission denied")]
#[case(None, "")]
#[tokio::test]
async fn other_failures_are_connectivity(
    runner: ScriptedRunner,
    #[case] code: Option<i32>,
    #[case] stderr: &str,
) {
    runner.push_output(code, "", stderr);
    let err = transport(&runner)
        .connect("203.0.113.10")
        .await
        .expect_err("connection failure expected");
    assert_eq!(err.kind(), TransportErrorKind::Connectivity);
}

#[rstest]
#[tokio::test]
async fn spawn_failures_are_local(runner: ScriptedRunner) {
    let err = transport(&runner)
        .connect("203.0.113.10")
        .await
        .expect_err("empty script should fail to spawn");
    assert_eq!(err.kind(), TransportErrorKind::Local);
}

#[test]
fn rejects_blank_identity_file() {
    let config = SshConfig {
        ssh_identity_file: Some(String::from("  ")),
        ..SshConfig::default()
    };
    let err = SshTransport::new(config, ScriptedRunner::new()).expect_err("blank identity");
    assert!(
        err.to_string().contains("BOXLIFT_SSH_SSH_IDENTITY_FILE"),
        "unexpected message: {err}"
    );
}

#[test]
fn zero_reachability_timeout_is_unbounded() {
    assert_eq!(SshConfig::default().reachability_bound(), None);
    let bounded = SshConfig {
        reachability_timeout: 30,
        ..SshConfig::default()
    };
    assert_eq!(
        bounded.reachability_bound(),
        Some(std::time::Duration::from_secs(30))
    );
}

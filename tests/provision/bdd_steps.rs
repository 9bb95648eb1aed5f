//! BDD step definitions for the provisioning pipeline.

use std::sync::Arc;

use boxlift::{
    ComputeActionRunner, ProvisionOutcome, ProvisionPipeline, ProvisionState, SharedUi,
    TerminationHandler, TransportError,
};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{FAST_SETTINGS, ProvisionContext, ProvisionResult, ProvisionResultKind};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a provisioning pipeline")]
fn provisioning_pipeline(provision_context: ProvisionContext) -> ProvisionContext {
    provision_context
}

#[given("the server builds after \"{checks}\" status checks")]
fn server_builds_after(mut provision_context: ProvisionContext, checks: u32) -> ProvisionContext {
    provision_context.compute = provision_context
        .compute
        .clone()
        .building_for(checks.saturating_sub(1));
    provision_context
}

#[given("the server never finishes building")]
fn server_never_builds(mut provision_context: ProvisionContext) -> ProvisionContext {
    provision_context.compute = provision_context.compute.clone().building_for(u32::MAX);
    provision_context
}

#[given("SSH refuses \"{attempts}\" connection attempts")]
fn ssh_refuses(provision_context: ProvisionContext, attempts: usize) -> ProvisionContext {
    provision_context.transport.push_unreachable(attempts);
    provision_context
}

#[given("SSH rejects the credentials")]
fn ssh_rejects_credentials(provision_context: ProvisionContext) -> ProvisionContext {
    provision_context.transport.push_auth_failure();
    provision_context
}

#[given("the ssh client fails to start once")]
fn ssh_client_fails_once(provision_context: ProvisionContext) -> ProvisionContext {
    provision_context
        .transport
        .push_result(Err(TransportError::Spawn {
            program: String::from("ssh"),
            message: String::from("Resource temporarily unavailable"),
        }));
    provision_context
}

#[given("server creation fails with \"{response}\"")]
fn creation_fails(provision_context: ProvisionContext, response: String) -> ProvisionContext {
    provision_context.compute.fail_create(response);
    provision_context
}

#[given("the run is interrupted while the server builds")]
fn interrupted_while_building(mut provision_context: ProvisionContext) -> ProvisionContext {
    provision_context.compute = provision_context
        .compute
        .clone()
        .building_for(u32::MAX)
        .interrupting_on_fetch(provision_context.interrupt.clone());
    provision_context
}

#[given("the next stage fails with \"{message}\"")]
fn next_stage_fails(provision_context: ProvisionContext, message: String) -> ProvisionContext {
    provision_context.stage.fail_with(message);
    provision_context
}

#[when("I provision the server")]
fn provision_server(provision_context: ProvisionContext) -> Result<ProvisionContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let ui: SharedUi = Arc::new(provision_context.ui.clone());
    let pipeline = ProvisionPipeline::new(
        provision_context.compute.clone(),
        provision_context.transport.clone(),
        TerminationHandler::new(
            ComputeActionRunner::new(provision_context.compute.clone()),
            Arc::clone(&ui),
        ),
        provision_context.stage.clone(),
        ui,
    )
    .with_settings(FAST_SETTINGS);

    let request = provision_context.request.clone();
    let interrupt = provision_context.interrupt.clone();
    let result = runtime.block_on(async move {
        let mut state = ProvisionState::new(interrupt);
        match pipeline.run(&request, &mut state).await {
            Ok(ProvisionOutcome::Ready) => ProvisionResult::success(ProvisionResultKind::Ready),
            Ok(ProvisionOutcome::Aborted) => {
                ProvisionResult::success(ProvisionResultKind::Aborted)
            }
            Err(err) => {
                pipeline
                    .recover(&err, &mut state)
                    .await
                    .unwrap_or_else(|recover_err| panic!("recovery should succeed: {recover_err}"));
                ProvisionResult::failure(&err)
            }
        }
    });

    Ok(ProvisionContext {
        outcome: Some(result),
        ..provision_context
    })
}

#[then("the provisioning result is \"{kind}\"")]
fn provisioning_result(provision_context: &ProvisionContext, kind: String) -> Result<(), StepError> {
    let expected = parse_kind(&kind)?;
    let Some(outcome) = &provision_context.outcome else {
        return Err(StepError::Assertion(String::from("missing outcome")));
    };
    if outcome.kind == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, got {:?}: {}",
            outcome.kind, outcome.message
        )))
    }
}

#[then("the error mentions \"{text}\"")]
fn error_mentions(provision_context: &ProvisionContext, text: String) -> Result<(), StepError> {
    let Some(outcome) = &provision_context.outcome else {
        return Err(StepError::Assertion(String::from("missing outcome")));
    };
    if outcome.message.contains(&text) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected error to mention {text}, got: {}",
            outcome.message
        )))
    }
}

#[then("the provider was asked about the server \"{count}\" times")]
fn server_queried(provision_context: &ProvisionContext, count: usize) -> Result<(), StepError> {
    expect_count("status queries", provision_context.compute.status_queries(), count)
}

#[then("SSH was attempted \"{count}\" times")]
fn ssh_attempted(provision_context: &ProvisionContext, count: usize) -> Result<(), StepError> {
    expect_count("ssh attempts", provision_context.transport.attempts(), count)
}

#[then("the next stage ran \"{count}\" times")]
fn next_stage_ran(provision_context: &ProvisionContext, count: usize) -> Result<(), StepError> {
    expect_count("next stage calls", provision_context.stage.calls(), count)
}

#[then("the server was destroyed \"{count}\" times")]
fn server_destroyed(provision_context: &ProvisionContext, count: usize) -> Result<(), StepError> {
    expect_count(
        "destroy calls",
        provision_context.compute.destroyed().len(),
        count,
    )
}

#[then("no server was destroyed")]
fn no_server_destroyed(provision_context: &ProvisionContext) -> Result<(), StepError> {
    expect_count("destroy calls", provision_context.compute.destroyed().len(), 0)
}

fn expect_count(label: &str, actual: usize, expected: usize) -> Result<(), StepError> {
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected} {label}, got {actual}"
        )))
    }
}

fn parse_kind(kind: &str) -> Result<ProvisionResultKind, StepError> {
    match kind {
        "ready" => Ok(ProvisionResultKind::Ready),
        "aborted" => Ok(ProvisionResultKind::Aborted),
        "provider" => Ok(ProvisionResultKind::Provider),
        "build timeout" => Ok(ProvisionResultKind::BuildTimeout),
        "authentication" => Ok(ProvisionResultKind::Authentication),
        "handoff" => Ok(ProvisionResultKind::Handoff),
        "other" => Ok(ProvisionResultKind::Other),
        _ => Err(StepError::Assertion(format!("unknown result kind: {kind}"))),
    }
}

//! BDD scenarios for the provisioning pipeline.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisionContext, provision_context};

#[scenario(
    path = "tests/features/provision.feature",
    name = "Reach the ready state once the build and SSH settle"
)]
fn scenario_ready(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Stop on rejected SSH credentials without cleanup"
)]
fn scenario_authentication_failure(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Destroy the server when the build times out"
)]
fn scenario_build_timeout(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Surface the provider response when creation fails"
)]
fn scenario_create_failure(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Clean up when interrupted during the build"
)]
fn scenario_interrupted_build(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Destroy the server when the next stage fails"
)]
fn scenario_handoff_failure(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Keep waiting when the ssh client cannot start"
)]
fn scenario_ssh_spawn_failure(provision_context: ProvisionContext) {
    let _ = provision_context;
}

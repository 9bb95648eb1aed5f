//! Shared fixtures for provisioning BDD scenarios.

use std::time::Duration;

use boxlift::test_support::{RecordingStage, RecordingUi, ScriptedCompute, ScriptedTransport};
use boxlift::{Interrupt, PipelineSettings, ProvisionError, ProvisionRequest};
use rstest::fixture;

/// Poll intervals short enough to keep scenarios fast.
pub const FAST_SETTINGS: PipelineSettings = PipelineSettings {
    build_poll_interval: Duration::from_millis(1),
    ssh_poll_interval: Duration::from_millis(1),
    reachability_timeout: None,
};

#[derive(Clone, Debug)]
pub struct ProvisionContext {
    pub compute: ScriptedCompute,
    pub transport: ScriptedTransport,
    pub stage: RecordingStage,
    pub ui: RecordingUi,
    pub interrupt: Interrupt,
    pub request: ProvisionRequest,
    pub outcome: Option<ProvisionResult>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProvisionResultKind {
    Ready,
    Aborted,
    Provider,
    BuildTimeout,
    Authentication,
    Handoff,
    Other,
}

#[derive(Clone, Debug)]
pub struct ProvisionResult {
    pub kind: ProvisionResultKind,
    pub message: String,
}

impl ProvisionResult {
    pub const fn success(kind: ProvisionResultKind) -> Self {
        Self {
            kind,
            message: String::new(),
        }
    }

    pub fn failure(err: &ProvisionError) -> Self {
        let kind = match err {
            ProvisionError::ProviderRequest { .. } => ProvisionResultKind::Provider,
            ProvisionError::BuildTimeout { .. } => ProvisionResultKind::BuildTimeout,
            ProvisionError::AuthenticationFailed { .. } => ProvisionResultKind::Authentication,
            ProvisionError::Handoff(_) => ProvisionResultKind::Handoff,
            _ => ProvisionResultKind::Other,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

#[fixture]
pub fn provision_context() -> ProvisionContext {
    let request = ProvisionRequest::builder()
        .image_id("img-00001")
        .name("bdd-web")
        .zone(Some(String::from("zon-abc12")))
        .server_type(Some(String::from("typ-small")))
        .build_timeout(Duration::from_millis(50))
        .build()
        .unwrap_or_else(|err| panic!("provision request fixture should build: {err}"));

    ProvisionContext {
        compute: ScriptedCompute::new(),
        transport: ScriptedTransport::new(),
        stage: RecordingStage::new(),
        ui: RecordingUi::new(),
        interrupt: Interrupt::new(),
        request,
        outcome: None,
    }
}

//! Best-effort teardown of a partially or fully created server.

use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{BackendFuture, ComputeApi};
use crate::pipeline::ProvisionState;
use crate::ui::SharedUi;

/// Context handed to the destroy action.
///
/// It is derived from a run's state but never shares its interruption flag,
/// so a cancelled run can still clean up after itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CleanupContext {
    /// Server to delete, if one was ever created.
    pub instance_id: Option<String>,
    /// Always `false`: teardown must not be short-circuited.
    pub interrupted: bool,
    /// Always `false`: configuration was validated before the run started.
    pub validate_config: bool,
    /// Always `true`: teardown never prompts.
    pub force_confirm_destroy: bool,
}

impl CleanupContext {
    /// Derives a cleanup context from the state of a provisioning run.
    #[must_use]
    pub fn derive_from(state: &ProvisionState) -> Self {
        Self {
            instance_id: state.instance_id().map(str::to_owned),
            interrupted: false,
            validate_config: false,
            force_confirm_destroy: true,
        }
    }
}

/// Executes the destroy action against a cleanup context.
pub trait ActionRunner {
    /// Deletes the server named by `context`; must succeed when there is
    /// nothing to delete.
    fn destroy<'a>(&'a self, context: &'a CleanupContext) -> BackendFuture<'a, (), TerminateError>;
}

/// Errors raised by the destroy action and the termination handler.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TerminateError {
    /// Raised when the context does not confirm a destructive action.
    #[error("refusing to destroy server {instance_id} without confirmation")]
    NotConfirmed {
        /// Server that would have been deleted.
        instance_id: String,
    },
    /// Raised when the provider rejects the delete call.
    #[error("failed to destroy server {instance_id}: {message}")]
    Destroy {
        /// Server that could not be deleted.
        instance_id: String,
        /// Provider error message.
        message: String,
    },
}

/// [`ActionRunner`] that deletes servers through a [`ComputeApi`].
#[derive(Clone, Debug)]
pub struct ComputeActionRunner<C> {
    compute: C,
}

impl<C: ComputeApi> ComputeActionRunner<C> {
    /// Wraps a compute backend.
    #[must_use]
    pub const fn new(compute: C) -> Self {
        Self { compute }
    }

    async fn destroy_server(&self, context: &CleanupContext) -> Result<(), TerminateError> {
        let Some(id) = context.instance_id.as_deref() else {
            debug!("no server recorded; nothing to destroy");
            return Ok(());
        };
        if !context.force_confirm_destroy {
            return Err(TerminateError::NotConfirmed {
                instance_id: id.to_owned(),
            });
        }

        let destroy_failed = |err: C::Error| TerminateError::Destroy {
            instance_id: id.to_owned(),
            message: err.to_string(),
        };
        match self.compute.fetch_server(id).await.map_err(destroy_failed)? {
            Some(server) if !server.status.is_gone() => {
                self.compute.destroy_server(id).await.map_err(destroy_failed)
            }
            _ => {
                debug!(server = id, "server already gone");
                Ok(())
            }
        }
    }
}

impl<C> ActionRunner for ComputeActionRunner<C>
where
    C: ComputeApi + Sync,
{
    fn destroy<'a>(&'a self, context: &'a CleanupContext) -> BackendFuture<'a, (), TerminateError> {
        Box::pin(self.destroy_server(context))
    }
}

/// Issues the destroy action for a provisioning run at most once.
pub struct TerminationHandler<R> {
    runner: R,
    ui: SharedUi,
}

impl<R: ActionRunner> TerminationHandler<R> {
    /// Creates a handler that destroys through `runner`.
    #[must_use]
    pub const fn new(runner: R, ui: SharedUi) -> Self {
        Self { runner, ui }
    }

    /// Destroys the server recorded in `state`, if any.
    ///
    /// A run that already terminated successfully is left alone. On success
    /// the recorded instance identifier is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`TerminateError::Destroy`] when the destroy action fails; the
    /// instance identifier is kept so the caller still knows what leaked.
    pub async fn terminate(&self, state: &mut ProvisionState) -> Result<(), TerminateError> {
        if state.terminated() {
            debug!("termination already performed for this run");
            return Ok(());
        }

        let context = CleanupContext::derive_from(state);
        if let Some(id) = context.instance_id.as_deref() {
            self.ui.info(&format!("Terminating server {id}..."));
        }

        self.runner.destroy(&context).await?;

        info!(server = ?context.instance_id, "termination complete");
        state.mark_terminated();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};

    use super::*;
    use crate::poll::Interrupt;
    use crate::test_support::{RecordingUi, ScriptedCompute};

    #[fixture]
    fn compute() -> ScriptedCompute {
        ScriptedCompute::new()
    }

    type Handler = TerminationHandler<ComputeActionRunner<ScriptedCompute>>;

    fn handler(compute: &ScriptedCompute) -> Handler {
        TerminationHandler::new(
            ComputeActionRunner::new(compute.clone()),
            Arc::new(RecordingUi::new()),
        )
    }

    #[test]
    fn cleanup_context_clears_interruption_and_forces_confirmation() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let state = ProvisionState::for_instance("srv-aaaaa", interrupt);
        let context = CleanupContext::derive_from(&state);
        assert_eq!(
            context,
            CleanupContext {
                instance_id: Some(String::from("srv-aaaaa")),
                interrupted: false,
                validate_config: false,
                force_confirm_destroy: true,
            }
        );
    }

    #[rstest]
    #[tokio::test]
    async fn destroys_recorded_server_and_clears_id(compute: ScriptedCompute) {
        let id = compute.preload_server("srv-aaaaa");
        let mut state = ProvisionState::for_instance(&id, Interrupt::new());

        handler(&compute)
            .terminate(&mut state)
            .await
            .unwrap_or_else(|err| panic!("terminate failed: {err}"));

        assert_eq!(compute.destroyed(), vec![id]);
        assert_eq!(state.instance_id(), None);
    }

    #[rstest]
    #[tokio::test]
    async fn tolerates_runs_without_a_server(compute: ScriptedCompute) {
        let mut state = ProvisionState::new(Interrupt::new());
        let result = handler(&compute).terminate(&mut state).await;
        assert_eq!(result, Ok(()));
        assert!(compute.destroyed().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn skips_servers_the_provider_no_longer_knows(compute: ScriptedCompute) {
        let mut state = ProvisionState::for_instance("srv-gone0", Interrupt::new());
        let result = handler(&compute).terminate(&mut state).await;
        assert_eq!(result, Ok(()));
        assert!(compute.destroyed().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn second_call_is_a_no_op(compute: ScriptedCompute) {
        let id = compute.preload_server("srv-aaaaa");
        let mut state = ProvisionState::for_instance(&id, Interrupt::new());
        let handler = handler(&compute);

        handler
            .terminate(&mut state)
            .await
            .unwrap_or_else(|err| panic!("first terminate failed: {err}"));
        handler
            .terminate(&mut state)
            .await
            .unwrap_or_else(|err| panic!("second terminate failed: {err}"));

        assert_eq!(compute.destroyed().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn keeps_id_when_destroy_fails(compute: ScriptedCompute) {
        let id = compute.preload_server("srv-aaaaa");
        compute.fail_destroy();
        let mut state = ProvisionState::for_instance(&id, Interrupt::new());

        let err = handler(&compute)
            .terminate(&mut state)
            .await
            .expect_err("destroy should fail");

        assert!(matches!(err, TerminateError::Destroy { .. }), "{err:?}");
        assert_eq!(state.instance_id(), Some(id.as_str()));
    }

    #[rstest]
    #[tokio::test]
    async fn unconfirmed_context_is_refused(compute: ScriptedCompute) {
        let runner = ComputeActionRunner::new(compute.clone());
        let context = CleanupContext {
            instance_id: Some(compute.preload_server("srv-aaaaa")),
            interrupted: false,
            validate_config: false,
            force_confirm_destroy: false,
        };
        let err = runner.destroy(&context).await.expect_err("unconfirmed");
        assert!(matches!(err, TerminateError::NotConfirmed { .. }));
        assert!(compute.destroyed().is_empty());
    }
}

//! Progress reporting sink injected into each provisioning component.

use std::io::{self, Write};
use std::sync::Arc;

/// Receives human-readable progress messages. Purely observational.
pub trait Ui: Send + Sync {
    /// Reports normal progress.
    fn info(&self, message: &str);

    /// Reports a problem that does not stop the current operation.
    fn warn(&self, message: &str);
}

/// Shared handle to a [`Ui`] implementation.
pub type SharedUi = Arc<dyn Ui>;

/// Writes progress lines to standard error so stdout stays machine-readable.
#[derive(Clone, Copy, Debug, Default)]
pub struct StderrUi;

impl Ui for StderrUi {
    fn info(&self, message: &str) {
        writeln!(io::stderr(), "==> {message}").ok();
    }

    fn warn(&self, message: &str) {
        writeln!(io::stderr(), "==> warning: {message}").ok();
    }
}

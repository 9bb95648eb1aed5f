//! BDD coverage for the provisioning pipeline.

mod bdd_steps;
mod scenarios;
mod test_helpers;

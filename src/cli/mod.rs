//! Command-line interface definitions for the `boxlift` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `boxlift` binary.
#[derive(Debug, Parser)]
#[command(
    name = "boxlift",
    about = "Provision a Brightbox Cloud server and wait until SSH is ready",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create a server and wait for it to accept SSH sessions.
    #[command(name = "up", about = "Create a server and wait for SSH")]
    Up(UpCommand),
    /// Destroy a server by identifier.
    #[command(name = "destroy", about = "Destroy a server by identifier")]
    Destroy(DestroyCommand),
}

/// Arguments for the `boxlift up` subcommand.
///
/// Every flag overrides the matching configuration value for this run only.
#[derive(Debug, Parser)]
pub(crate) struct UpCommand {
    /// Image identifier to boot from (for example `img-3ikco`).
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Server name. Defaults to `boxlift-<uuid>`.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Zone handle or identifier (for example `gb1-a` or `zon-328ds`).
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
    /// Server type handle or identifier (for example `nano` or `typ-zx45f`).
    #[arg(long = "type", value_name = "TYPE")]
    pub(crate) server_type: Option<String>,
    /// Server group identifier. Repeat to join several groups.
    #[arg(long = "group", value_name = "GROUP")]
    pub(crate) groups: Vec<String>,
    /// User data passed inline.
    #[arg(long, value_name = "USER_DATA", conflicts_with = "user_data_file")]
    pub(crate) user_data: Option<String>,
    /// User data read from a local file.
    #[arg(long, value_name = "PATH", conflicts_with = "user_data")]
    pub(crate) user_data_file: Option<String>,
    /// Seconds to wait for the provider to finish building the server.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) build_timeout: Option<u64>,
}

/// Arguments for the `boxlift destroy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DestroyCommand {
    /// Server identifier (for example `srv-lv426`).
    #[arg(value_name = "SERVER_ID")]
    pub(crate) server_id: String,
}

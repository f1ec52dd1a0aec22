//! Command-line interface definitions for the `drydock` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, Subcommand};

/// Top-level CLI for the `drydock` binary.
#[derive(Debug, Parser)]
#[command(
    name = "drydock",
    about = "Create, stop, start and destroy a Compute Engine development VM",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Label of the machine to act on.
    #[arg(long, global = true, value_name = "LABEL", default_value = "default")]
    pub(crate) machine: String,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Lifecycle operations.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Create the instance, or start it again when it is stopped.
    #[command(name = "up", about = "Create or start the instance")]
    Up,
    /// Stop a running instance.
    #[command(name = "halt", about = "Stop the instance")]
    Halt,
    /// Terminate the instance.
    #[command(name = "destroy", about = "Terminate the instance")]
    Destroy(DestroyCommand),
    /// Stop and start the instance.
    #[command(name = "reload", about = "Stop and start the instance")]
    Reload,
    /// Re-run provisioning against a created instance.
    #[command(name = "provision", about = "Re-run guest provisioning")]
    Provision,
    /// Report the instance's lifecycle state.
    #[command(name = "status", about = "Show the instance state")]
    Status,
    /// Print an OpenSSH `Host` block for the instance.
    #[command(name = "ssh-config", about = "Print SSH connection settings")]
    SshConfig,
}

/// Arguments for the `drydock destroy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DestroyCommand {
    /// Skip the confirmation prompt.
    #[arg(long, short)]
    pub(crate) force: bool,
}

//! Command-line interface definitions for the `cloudjobs` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, ValueEnum};

/// Top-level CLI for the `cloudjobs` binary.
#[derive(Debug, Parser)]
#[command(
    name = "cloudjobs",
    about = "Wait for cloud provider jobs and classify transport failures",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Poll jobs until they finish and print their results.
    #[command(name = "wait", about = "Poll jobs until they finish and print their results")]
    Wait(WaitCommand),
    /// List the provider's jobs with their mapped status.
    #[command(name = "list", about = "List the provider's jobs with their mapped status")]
    List(ListCommand),
    /// Decide whether an error chain would be retried.
    #[command(name = "classify", about = "Decide whether an error chain would be retried")]
    Classify(ClassifyCommand),
}

/// Status rules used to interpret provider job records.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum MapperChoice {
    /// Progress percentage with an optional error object.
    #[default]
    Progress,
    /// CloudStack numeric job status and result code.
    #[value(name = "cloudstack")]
    CloudStack,
    /// GoGrid job state names.
    #[value(name = "gogrid")]
    GoGrid,
}

/// Arguments for the `cloudjobs wait` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct WaitCommand {
    /// Status rules for the provider answering the endpoint.
    #[arg(long, value_enum, default_value_t = MapperChoice::Progress)]
    pub(crate) mapper: MapperChoice,
    /// Jobs to wait for. Results print in the order given.
    #[arg(required = true, value_name = "JOB_ID")]
    pub(crate) job_ids: Vec<String>,
}

/// Arguments for the `cloudjobs list` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ListCommand {
    /// Status rules for the provider answering the endpoint.
    #[arg(long, value_enum, default_value_t = MapperChoice::Progress)]
    pub(crate) mapper: MapperChoice,
}

/// Arguments for the `cloudjobs classify` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ClassifyCommand {
    /// Error messages forming the causal chain, outermost first.
    #[arg(required = true, value_name = "MESSAGE")]
    pub(crate) messages: Vec<String>,
}

// # ExoCTK on AWS
//
// Runs the atmospheric retrieval test suite on a throwaway EC2 instance:
// launch from a launch template, install the environment over SSH, run the
// tests, copy the best-fit output back, terminate, and log every step to a
// per-run file.
//
// Cloud access is behind the `reqwest` feature and the SSH transport behind
// `ssh`; the pipeline itself only depends on the `Provisioner` and
// `ShellConnector` traits.

/// Shared HTTP client. Enabled with the `reqwest` feature.
#[cfg(feature = "reqwest")]
pub mod client;

/// EC2 API access and request signing. Enabled with the `reqwest` feature.
#[cfg(feature = "reqwest")]
pub mod aws;

/// `aws_config.json` loading.
pub mod config;

/// Instance handles, the provisioner seam and the termination guard.
pub mod instance;

/// Step sequencing with guaranteed termination.
pub mod pipeline;

/// Remote shell seam and the SSH transport.
pub mod remote;

pub mod retry;

/// Per-run log file, timer and remote output formatting.
pub mod run_log;

pub mod workflow;

pub use config::{AwsConfig, ConfigError};
pub use pipeline::PipelineError;

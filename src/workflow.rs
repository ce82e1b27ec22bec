//! The fixed recipe run on the instance: what gets uploaded, which commands
//! run, and which file comes back.

use std::path::PathBuf;

use crate::retry::RetryPolicy;

pub const BUILD_SCRIPT: &str = "exoctk-aws-build.sh";
pub const BUILD_COMMAND: &str = "chmod 700 exoctk-aws-build.sh && ./exoctk-aws-build.sh";
pub const TEST_COMMAND: &str = concat!(
    "export EXOCTK_DATA=\"\"",
    " && conda activate exoctk-aws",
    " && cd exoctk/exoctk/tests",
    " && pytest -s test_atmospheric_retrievals.py",
);
pub const RESULT_FILE: &str = "exoctk/exoctk/tests/BestFit.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    /// Local setup script, uploaded verbatim.
    pub build_script: PathBuf,
    /// Destination of the setup script, relative to the remote home directory.
    pub remote_build_script: String,
    pub build_command: String,
    pub test_command: String,
    /// Remote file fetched after the tests.
    pub result_file: String,
    /// Where the fetched file is written locally.
    pub result_destination: PathBuf,
    /// Connection attempts while the instance finishes booting.
    pub connect_retry: RetryPolicy,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            build_script: PathBuf::from(BUILD_SCRIPT),
            remote_build_script: BUILD_SCRIPT.to_string(),
            build_command: BUILD_COMMAND.to_string(),
            test_command: TEST_COMMAND.to_string(),
            result_file: RESULT_FILE.to_string(),
            result_destination: PathBuf::from("BestFit.txt"),
            connect_retry: RetryPolicy::SSH_CONNECT,
        }
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::error;

use exoctk_aws::aws::ec2::{Ec2Client, Ec2Provisioner};
use exoctk_aws::config::CONFIG_FILE;
use exoctk_aws::pipeline;
use exoctk_aws::remote::SshConnector;
use exoctk_aws::run_log::RunLog;
use exoctk_aws::workflow::Workflow;

#[derive(Parser, Debug)]
#[command(
    name = "aws_wrapper",
    about = "Run the atmospheric retrieval tests on a disposable EC2 instance"
)]
struct Args {
    /// Launch template and SSH key settings
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Directory for the per-run log file
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let log = RunLog::start(&args.log_dir)?;
    if let Some(path) = log.path() {
        println!("Log file initialized to {}", path.display());
    }
    log.log_environment();

    let workflow = Workflow::default();
    let connector = SshConnector::default();
    let result = log.in_scope(|| {
        let result = pipeline::run_from_file(
            &args.config,
            |config| {
                let client = Ec2Client::from_env(config.region.as_deref())
                    .context("Failed to set up the EC2 client")?;
                let provisioner = Ec2Provisioner::new(client);
                install_interrupt_handler(&provisioner);
                Ok(provisioner)
            },
            &connector,
            &workflow,
        );
        if let Err(ref e) = result {
            error!("{:#}", e);
        }
        result
    });
    log.log_execution_time();
    result
}

/// Terminates the live instance on Ctrl+C; the pipeline's own cleanup never
/// runs when the process is interrupted.
fn install_interrupt_handler(provisioner: &Ec2Provisioner) {
    let live = provisioner.live_instance();
    let client = provisioner.client().clone();
    let installed = ctrlc::set_handler(move || {
        let id = live.lock().ok().and_then(|mut l| l.take());
        if let Some(id) = id {
            eprintln!("Ctrl+C detected, terminating EC2 instance {}.", id);
            if let Err(e) = client.terminate_instances(&[&id]) {
                eprintln!("Failed to terminate EC2 instance {}: {:#}", id, e);
            }
        }
        std::process::exit(130);
    });
    if let Err(e) = installed {
        eprintln!("Failed to install Ctrl+C handler: {}", e);
    }
}

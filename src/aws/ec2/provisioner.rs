use anyhow::{Context, Result, bail};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::aws::ec2::client::{Ec2ApiError, Ec2Client};
use crate::aws::ec2::types::{Instance, InstanceStateChange};
use crate::instance::{InstanceHandle, InstanceState, Provisioner};
use crate::retry::RetryPolicy;

/// Poll schedule while waiting for `running` (10 minutes in total).
pub const RUNNING_WAITER: RetryPolicy = RetryPolicy::new(40, Duration::from_secs(15));

/// Id of the instance launched by this process and not yet terminated.
pub type LiveInstance = Arc<Mutex<Option<String>>>;

/// The EC2 actions the provisioner drives.
pub trait Ec2Api {
    fn run_instances_from_template(&self, template_id: &str) -> Result<Vec<Instance>>;
    fn describe_instances(&self, ids: &[&str]) -> Result<Vec<Instance>>;
    fn terminate_instances(&self, ids: &[&str]) -> Result<Vec<InstanceStateChange>>;
}

impl Ec2Api for Ec2Client {
    fn run_instances_from_template(&self, template_id: &str) -> Result<Vec<Instance>> {
        Ec2Client::run_instances_from_template(self, template_id)
    }

    fn describe_instances(&self, ids: &[&str]) -> Result<Vec<Instance>> {
        Ec2Client::describe_instances(self, ids)
    }

    fn terminate_instances(&self, ids: &[&str]) -> Result<Vec<InstanceStateChange>> {
        Ec2Client::terminate_instances(self, ids)
    }
}

pub struct Ec2Provisioner<A = Ec2Client> {
    client: A,
    waiter: RetryPolicy,
    live: LiveInstance,
}

impl<A: Ec2Api> Ec2Provisioner<A> {
    pub fn new(client: A) -> Self {
        Self::with_waiter(client, RUNNING_WAITER)
    }

    pub fn with_waiter(client: A, waiter: RetryPolicy) -> Self {
        Self {
            client,
            waiter,
            live: LiveInstance::default(),
        }
    }

    pub fn client(&self) -> &A {
        &self.client
    }

    /// Shared slot holding the instance this provisioner currently owns, for
    /// interrupt handlers that must clean up behind the pipeline's back.
    pub fn live_instance(&self) -> LiveInstance {
        Arc::clone(&self.live)
    }

    fn set_live(&self, id: Option<&str>) {
        if let Ok(mut live) = self.live.lock() {
            *live = id.map(str::to_string);
        }
    }

    fn describe(&self, id: &str) -> Result<Option<InstanceHandle>> {
        match self.client.describe_instances(&[id]) {
            Ok(instances) => Ok(instances
                .iter()
                .find(|i| i.instance_id == id)
                .map(|i| i.handle())),
            // A just-launched instance may not be visible to Describe yet.
            Err(e)
                if e.downcast_ref::<Ec2ApiError>()
                    .is_some_and(|api| api.code == "InvalidInstanceID.NotFound") =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl<A: Ec2Api> Provisioner for Ec2Provisioner<A> {
    fn launch(&self, template_id: &str) -> Result<InstanceHandle> {
        let instances = self
            .client
            .run_instances_from_template(template_id)
            .with_context(|| format!("Failed to launch from template {}", template_id))?;
        let instance = instances
            .first()
            .context("RunInstances returned no instance")?;
        let handle = instance.handle();
        self.set_live(Some(&handle.id));
        Ok(handle)
    }

    fn wait_until_running(&self, instance: &InstanceHandle) -> Result<InstanceHandle> {
        let attempts = self.waiter.attempts.max(1);
        for attempt in 1..=attempts {
            match self.describe(&instance.id)? {
                Some(handle) if handle.state == InstanceState::Running => {
                    info!(
                        "EC2 instance {} is running at {}",
                        handle.id,
                        handle.address().unwrap_or("<no public address>")
                    );
                    return Ok(handle);
                }
                Some(handle) if handle.state.is_dead_end() => {
                    bail!(
                        "EC2 instance {} entered state {} while waiting for running",
                        handle.id,
                        handle.state
                    );
                }
                Some(handle) => debug!(
                    "EC2 instance {} is {} ({}/{})",
                    handle.id, handle.state, attempt, attempts
                ),
                None => debug!(
                    "EC2 instance {} not visible yet ({}/{})",
                    instance.id, attempt, attempts
                ),
            }
            if attempt < attempts {
                thread::sleep(self.waiter.delay);
            }
        }
        bail!(
            "EC2 instance {} did not reach running after {} polls",
            instance.id,
            attempts
        )
    }

    fn terminate(&self, instance_id: &str) -> Result<InstanceState> {
        let changes = self.client.terminate_instances(&[instance_id])?;
        self.set_live(None);
        let state = changes
            .iter()
            .find(|c| c.instance_id == instance_id)
            .map(|c| c.current_state.state())
            .unwrap_or(InstanceState::ShuttingDown);
        debug!("EC2 instance {} is now {}", instance_id, state);
        Ok(state)
    }
}

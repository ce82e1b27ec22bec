//! # Compute Instances
//!
//! [`Provisioner`] is the seam between the pipeline and the cloud API.
//! [`InstanceGuard`] owns a launched instance for the rest of the run and makes
//! sure it is terminated on every exit path.

use anyhow::{Context, Result};
use std::fmt;
use tracing::{info, warn};

/// Lifecycle state as reported by EC2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Other(String),
}

impl InstanceState {
    pub fn from_name(name: &str) -> Self {
        match name {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Other(s) => s,
        }
    }

    /// States from which an instance never comes back to `running` on its own.
    pub fn is_dead_end(&self) -> bool {
        matches!(
            self,
            Self::ShuttingDown | Self::Terminated | Self::Stopping | Self::Stopped
        )
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    pub id: String,
    pub public_dns: Option<String>,
    pub public_ip: Option<String>,
    pub state: InstanceState,
}

impl InstanceHandle {
    /// Address to open SSH connections to: public DNS name, else public IP.
    pub fn address(&self) -> Result<&str> {
        self.public_dns
            .as_deref()
            .or(self.public_ip.as_deref())
            .with_context(|| format!("Instance {} has no public address", self.id))
    }
}

pub trait Provisioner {
    /// Launches exactly one instance from the launch template.
    fn launch(&self, template_id: &str) -> Result<InstanceHandle>;
    /// Blocks until `instance` is running and returns refreshed metadata.
    fn wait_until_running(&self, instance: &InstanceHandle) -> Result<InstanceHandle>;
    /// Requests termination and returns the state reported back. Does not wait.
    fn terminate(&self, instance_id: &str) -> Result<InstanceState>;
}

/// Terminates the instance when the run ends, however it ends.
pub struct InstanceGuard<'a, P: Provisioner + ?Sized> {
    provisioner: &'a P,
    handle: InstanceHandle,
    terminated: bool,
}

impl<'a, P: Provisioner + ?Sized> InstanceGuard<'a, P> {
    pub fn new(provisioner: &'a P, handle: InstanceHandle) -> Self {
        Self {
            provisioner,
            handle,
            terminated: false,
        }
    }

    pub fn handle(&self) -> &InstanceHandle {
        &self.handle
    }

    /// Replaces the handle with fresher metadata for the same instance.
    pub fn refresh(&mut self, handle: InstanceHandle) {
        debug_assert_eq!(handle.id, self.handle.id);
        self.handle = handle;
    }

    pub fn wait_until_running(&mut self) -> Result<()> {
        let running = self.provisioner.wait_until_running(&self.handle)?;
        self.refresh(running);
        Ok(())
    }

    /// Requests termination. The guard does nothing more once this returns,
    /// whether or not the request succeeded.
    pub fn terminate(mut self) -> Result<InstanceState> {
        self.terminated = true;
        let state = self
            .provisioner
            .terminate(&self.handle.id)
            .with_context(|| format!("Failed to terminate EC2 instance {}", self.handle.id))?;
        info!("Terminated EC2 instance {}", self.handle.id);
        Ok(state)
    }
}

impl<P: Provisioner + ?Sized> Drop for InstanceGuard<'_, P> {
    fn drop(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        match self.provisioner.terminate(&self.handle.id) {
            Ok(_) => info!("Terminated EC2 instance {}", self.handle.id),
            Err(e) => warn!(
                "Failed to terminate EC2 instance {}: {:#}",
                self.handle.id, e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct CountingProvisioner {
        terminated: RefCell<Vec<String>>,
    }

    impl Provisioner for CountingProvisioner {
        fn launch(&self, _template_id: &str) -> Result<InstanceHandle> {
            unreachable!()
        }
        fn wait_until_running(&self, instance: &InstanceHandle) -> Result<InstanceHandle> {
            Ok(InstanceHandle {
                state: InstanceState::Running,
                public_dns: Some("ec2-1-2-3-4.compute-1.amazonaws.com".to_string()),
                ..instance.clone()
            })
        }
        fn terminate(&self, instance_id: &str) -> Result<InstanceState> {
            self.terminated.borrow_mut().push(instance_id.to_string());
            Ok(InstanceState::ShuttingDown)
        }
    }

    fn pending(id: &str) -> InstanceHandle {
        InstanceHandle {
            id: id.to_string(),
            public_dns: None,
            public_ip: None,
            state: InstanceState::Pending,
        }
    }

    #[test]
    fn state_names_round_trip() {
        for name in ["pending", "running", "shutting-down", "terminated", "stopping", "stopped"] {
            assert_eq!(InstanceState::from_name(name).as_str(), name);
        }
        assert_eq!(
            InstanceState::from_name("rebooting"),
            InstanceState::Other("rebooting".to_string())
        );
        assert!(InstanceState::Terminated.is_dead_end());
        assert!(!InstanceState::Pending.is_dead_end());
    }

    #[test]
    fn address_prefers_dns_name() {
        let mut h = pending("i-1");
        assert!(h.address().is_err());
        h.public_ip = Some("1.2.3.4".to_string());
        assert_eq!(h.address().unwrap(), "1.2.3.4");
        h.public_dns = Some("ec2-1-2-3-4.compute-1.amazonaws.com".to_string());
        assert_eq!(h.address().unwrap(), "ec2-1-2-3-4.compute-1.amazonaws.com");
    }

    #[test]
    fn explicit_terminate_runs_once() {
        let p = CountingProvisioner::default();
        let mut guard = InstanceGuard::new(&p, pending("i-1"));
        guard.wait_until_running().unwrap();
        assert_eq!(guard.handle().state, InstanceState::Running);
        assert_eq!(guard.terminate().unwrap(), InstanceState::ShuttingDown);
        assert_eq!(*p.terminated.borrow(), vec!["i-1"]);
    }

    #[test]
    fn drop_terminates_forgotten_instance() {
        let p = CountingProvisioner::default();
        {
            let _guard = InstanceGuard::new(&p, pending("i-2"));
        }
        assert_eq!(*p.terminated.borrow(), vec!["i-2"]);
    }

    #[test]
    fn drop_terminates_on_panic() {
        let p = CountingProvisioner::default();
        let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = InstanceGuard::new(&p, pending("i-3"));
            panic!("boom");
        }));
        assert!(r.is_err());
        assert_eq!(*p.terminated.borrow(), vec!["i-3"]);
    }
}

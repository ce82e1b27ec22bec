//! # Elastic Compute Cloud (EC2)
//!
//! ## Submodules
//! - `client`: signed calls to the EC2 Query API.
//! - `provisioner`: the [`crate::instance::Provisioner`] implementation used by the pipeline.
//! - `types`: XML response models.

/// Signed EC2 Query API client.
pub mod client;
/// Launch / wait / terminate on top of the client.
pub mod provisioner;
/// XML response models.
pub mod types;

pub use crate::aws::ec2::client::{Ec2ApiError, Ec2Client};
pub use crate::aws::ec2::provisioner::{Ec2Api, Ec2Provisioner};
pub use crate::aws::ec2::types::*;

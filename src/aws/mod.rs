//! # Amazon Web Services
//!
//! Just enough of AWS to launch, inspect and terminate EC2 instances:
//! credential discovery and Signature Version 4 request signing (`auth`), and
//! a blocking client for the EC2 Query API (`ec2`).

pub mod auth;
pub mod ec2;
pub mod types;

pub use auth::{resolve_credentials, resolve_region};
pub use types::Credentials;

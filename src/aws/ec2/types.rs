//! # EC2 Response Types
//!
//! `serde` models of the XML bodies returned by the EC2 Query API. Only the
//! elements this crate reads are modelled; everything else is skipped.
//! EC2 wraps every list in a `...Set` element holding `<item>` children.

use serde::Deserialize;

use crate::instance::{InstanceHandle, InstanceState};

/// A `<...Set>` list element.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ItemSet<T> {
    #[serde(rename = "item", default)]
    pub items: Vec<T>,
}

impl<T> Default for ItemSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateXml {
    #[serde(default)]
    pub code: i32,
    pub name: String,
}

impl StateXml {
    pub fn state(&self) -> InstanceState {
        InstanceState::from_name(&self.name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub instance_id: String,
    pub instance_state: StateXml,
    #[serde(default)]
    pub instance_type: Option<String>,
    #[serde(default)]
    pub dns_name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub launch_time: Option<String>,
}

impl Instance {
    pub fn handle(&self) -> InstanceHandle {
        InstanceHandle {
            id: self.instance_id.clone(),
            public_dns: non_empty(&self.dns_name),
            public_ip: non_empty(&self.ip_address),
            state: self.instance_state.state(),
        }
    }
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInstancesResponse {
    #[serde(default)]
    pub reservation_id: Option<String>,
    #[serde(default)]
    pub instances_set: ItemSet<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    #[serde(default)]
    pub instances_set: ItemSet<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeInstancesResponse {
    #[serde(default)]
    pub reservation_set: ItemSet<Reservation>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStateChange {
    pub instance_id: String,
    pub current_state: StateXml,
    pub previous_state: StateXml,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateInstancesResponse {
    #[serde(default)]
    pub instances_set: ItemSet<InstanceStateChange>,
}

/// `<Response><Errors><Error>...` body sent with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Errors")]
    pub errors: ErrorList,
    #[serde(rename = "RequestID", default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorList {
    #[serde(rename = "Error", default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

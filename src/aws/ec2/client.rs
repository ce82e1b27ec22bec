use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::aws::auth::{self, SignableRequest};
use crate::aws::ec2::types::{
    DescribeInstancesResponse, ErrorResponse, Instance, InstanceStateChange, RunInstancesResponse,
    TerminateInstancesResponse,
};
use crate::aws::types::Credentials;
use crate::client::BLOCKING_CLIENT;

const EC2_API_VERSION: &str = "2016-11-15";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Error reported by the EC2 API itself (as opposed to transport failures).
#[derive(Debug, Error)]
#[error("EC2 {action} failed ({status}): {code}: {message}")]
pub struct Ec2ApiError {
    pub action: String,
    pub status: u16,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Ec2Client {
    credentials: Credentials,
    region: String,
    host: String,
}

impl Ec2Client {
    pub fn new(credentials: Credentials, region: &str) -> Self {
        Self {
            credentials,
            region: region.to_string(),
            host: format!("ec2.{}.amazonaws.com", region),
        }
    }

    /// Builds a client from the ambient AWS credentials. `region` overrides the
    /// region found in the environment.
    pub fn from_env(region: Option<&str>) -> Result<Self> {
        let credentials = auth::resolve_credentials()?;
        let region = auth::resolve_region(region)?;
        Ok(Self::new(credentials, &region))
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Launches one instance from `template_id`.
    pub fn run_instances_from_template(&self, template_id: &str) -> Result<Vec<Instance>> {
        let res: RunInstancesResponse = self.call(
            "RunInstances",
            &[
                param("LaunchTemplate.LaunchTemplateId", template_id),
                param("MinCount", "1"),
                param("MaxCount", "1"),
            ],
        )?;
        Ok(res.instances_set.items)
    }

    /// Describes the given instances, or every instance in the region when
    /// `ids` is empty.
    pub fn describe_instances(&self, ids: &[&str]) -> Result<Vec<Instance>> {
        let mut out = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut params = instance_id_params(ids);
            if let Some(ref token) = next_token {
                params.push(param("NextToken", token));
            }
            let res: DescribeInstancesResponse = self.call("DescribeInstances", &params)?;
            for reservation in res.reservation_set.items {
                out.extend(reservation.instances_set.items);
            }
            next_token = res.next_token.filter(|t| !t.is_empty());
            if next_token.is_none() {
                break;
            }
        }
        Ok(out)
    }

    pub fn terminate_instances(&self, ids: &[&str]) -> Result<Vec<InstanceStateChange>> {
        let res: TerminateInstancesResponse =
            self.call("TerminateInstances", &instance_id_params(ids))?;
        Ok(res.instances_set.items)
    }

    fn call<T: DeserializeOwned>(&self, action: &str, params: &[(String, String)]) -> Result<T> {
        let body = encode_form(action, params);
        let now = Utc::now();

        let mut headers = vec![
            ("content-type", FORM_CONTENT_TYPE.to_string()),
            ("host", self.host.clone()),
            ("x-amz-date", auth::amz_date(now)),
        ];
        if let Some(ref token) = self.credentials.session_token {
            headers.push(("x-amz-security-token", token.clone()));
        }
        let authorization = auth::authorization(
            &SignableRequest {
                method: "POST",
                path: "/",
                query: "",
                headers: &headers,
                payload: body.as_bytes(),
            },
            &self.credentials,
            &self.region,
            "ec2",
            now,
        );

        debug!("EC2 {} ({})", action, self.region);
        // reqwest derives the Host header from the URL.
        let mut request = BLOCKING_CLIENT.post(format!("https://{}/", self.host));
        for (name, value) in headers.iter().filter(|(name, _)| *name != "host") {
            request = request.header(*name, value);
        }
        let res = request
            .header("authorization", authorization)
            .body(body)
            .send()
            .with_context(|| format!("Failed to call EC2 {}", action))?;

        let status = res.status();
        let text = res
            .text()
            .with_context(|| format!("Failed to read EC2 {} response", action))?;
        if !status.is_success() {
            return Err(api_error(action, status.as_u16(), &text).into());
        }
        quick_xml::de::from_str(&text).with_context(|| format!("Invalid EC2 {} response", action))
    }
}

fn instance_id_params(ids: &[&str]) -> Vec<(String, String)> {
    // EC2 list parameters are 1-indexed: InstanceId.1, InstanceId.2, ...
    ids.iter()
        .enumerate()
        .map(|(i, id)| (format!("InstanceId.{}", i + 1), id.to_string()))
        .collect()
}

fn param(name: &str, value: &str) -> (String, String) {
    (name.to_string(), value.to_string())
}

fn encode_form(action: &str, params: &[(String, String)]) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("Action", action);
    form.append_pair("Version", EC2_API_VERSION);
    for (k, v) in params {
        form.append_pair(k, v);
    }
    form.finish()
}

fn api_error(action: &str, status: u16, body: &str) -> Ec2ApiError {
    let detail = quick_xml::de::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|r| r.errors.errors.into_iter().next());
    match detail {
        Some(d) => Ec2ApiError {
            action: action.to_string(),
            status,
            code: d.code,
            message: d.message,
        },
        None => Ec2ApiError {
            action: action.to_string(),
            status,
            code: "Unknown".to_string(),
            message: body.trim().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_body_carries_action_and_version() {
        let body = encode_form(
            "RunInstances",
            &[
                param("LaunchTemplate.LaunchTemplateId", "lt-0abc"),
                param("MinCount", "1"),
            ],
        );
        assert_eq!(
            body,
            "Action=RunInstances&Version=2016-11-15&LaunchTemplate.LaunchTemplateId=lt-0abc&MinCount=1"
        );
    }

    #[test]
    fn instance_ids_are_one_indexed() {
        let params = instance_id_params(&["i-a", "i-b"]);
        assert_eq!(
            params,
            vec![param("InstanceId.1", "i-a"), param("InstanceId.2", "i-b")]
        );
    }

    #[test]
    fn api_error_extracts_code() {
        let body = "<Response><Errors><Error><Code>InvalidInstanceID.NotFound</Code>\
                    <Message>The instance ID 'i-1' does not exist</Message></Error></Errors>\
                    <RequestID>x</RequestID></Response>";
        let e = api_error("DescribeInstances", 400, body);
        assert_eq!(e.code, "InvalidInstanceID.NotFound");
        assert_eq!(
            e.to_string(),
            "EC2 DescribeInstances failed (400): InvalidInstanceID.NotFound: The instance ID 'i-1' does not exist"
        );

        let e = api_error("RunInstances", 503, "Service Unavailable\n");
        assert_eq!(e.code, "Unknown");
        assert_eq!(e.message, "Service Unavailable");
    }

    #[test]
    fn endpoint_follows_region() {
        let c = Ec2Client::new(
            Credentials {
                access_key_id: "AKID".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
            },
            "us-east-2",
        );
        assert_eq!(c.region(), "us-east-2");
        assert_eq!(c.host, "ec2.us-east-2.amazonaws.com");
    }

    #[ignore]
    #[test]
    fn describe_instances_smoke() -> Result<()> {
        // Needs real AWS credentials; read-only.
        let client = Ec2Client::from_env(None)?;
        let _ = client.describe_instances(&[])?;
        Ok(())
    }
}

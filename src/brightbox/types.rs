//! Wire types for the Brightbox API.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::backend::{NamedResource, ServerRequest, ServerSnapshot, ServerStatus};

#[derive(Debug, Serialize)]
pub(super) struct CreateServerPayload<'a> {
    image: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    server_groups: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<String>,
}

impl<'a> CreateServerPayload<'a> {
    pub(super) fn from_request(request: &'a ServerRequest) -> Self {
        Self {
            image: &request.image_id,
            name: &request.name,
            server_type: request.server_type_id.as_deref(),
            zone: request.zone_id.as_deref(),
            server_groups: &request.server_groups,
            user_data: request.user_data.as_ref().map(|data| STANDARD.encode(data)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerResource {
    id: String,
    status: String,
    #[serde(default)]
    fqdn: Option<String>,
    #[serde(default)]
    cloud_ips: Vec<CloudIpResource>,
}

#[derive(Debug, Deserialize)]
struct CloudIpResource {
    #[serde(default)]
    public_ip: Option<String>,
}

impl ServerResource {
    /// Prefers the first mapped cloud IP and falls back to the server's
    /// DNS name.
    pub(super) fn into_snapshot(self) -> ServerSnapshot {
        let public_host = self
            .cloud_ips
            .into_iter()
            .find_map(|cloud_ip| cloud_ip.public_ip)
            .or(self.fqdn);
        ServerSnapshot {
            status: ServerStatus::parse(&self.status),
            id: self.id,
            public_host,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct HandleResource {
    id: String,
    #[serde(default)]
    handle: Option<String>,
}

impl From<HandleResource> for NamedResource {
    fn from(resource: HandleResource) -> Self {
        Self::new(resource.id, resource.handle.unwrap_or_default())
    }
}

// API client module: a small blocking HTTP client for the Apple School
// Manager REST API. Every request gets a freshly minted bearer token.

use crate::config::Config;
use crate::error::{AsmError, Result};
use crate::token::TokenIssuer;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON:API collection envelope. `data` may be missing or null.
#[derive(Deserialize, Debug)]
struct Collection<T> {
    data: Option<Vec<T>>,
}

/// A device record as returned by `GET /devices`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Device {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub attributes: DeviceAttributes,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAttributes {
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub device_management_server_id: Option<String>,
}

impl Device {
    pub fn model(&self) -> &str {
        self.attributes.model.as_deref().unwrap_or("Unknown")
    }

    /// Currently assigned server id, or `Unassigned`.
    pub fn current_server(&self) -> &str {
        self.attributes
            .device_management_server_id
            .as_deref()
            .unwrap_or("Unassigned")
    }
}

/// A management server as returned by `GET /device-management-servers`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Server {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub attributes: ServerAttributes,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerAttributes {
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub server_type: Option<String>,
}

/// PATCH body that moves a device to another management server:
/// `{"data":{"type":"devices","id":..,"attributes":{"deviceManagementServerId":..}}}`
#[derive(Serialize, Debug)]
pub struct AssignmentRequest<'a> {
    data: AssignmentData<'a>,
}

#[derive(Serialize, Debug)]
struct AssignmentData<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: &'a str,
    attributes: AssignmentAttributes<'a>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AssignmentAttributes<'a> {
    device_management_server_id: &'a str,
}

impl<'a> AssignmentRequest<'a> {
    pub fn new(device_id: &'a str, server_id: &'a str) -> Self {
        AssignmentRequest {
            data: AssignmentData {
                kind: "devices",
                id: device_id,
                attributes: AssignmentAttributes {
                    device_management_server_id: server_id,
                },
            },
        }
    }
}

/// Result of a serial-number search. A failed request is kept apart from
/// an empty result so the caller can report them differently.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceLookup {
    Found(Device),
    NotFound,
    TransportError(String),
}

/// The three calls the interactive flow needs.
pub trait AsmApi {
    fn search_device(&self, serial: &str) -> DeviceLookup;
    fn list_servers(&self) -> Result<Vec<Server>>;
    fn assign(&self, device_id: &str, server_id: &str) -> Result<serde_json::Value>;
}

/// Blocking client holding the HTTP connection pool, the base URL and the
/// token issuer used to authenticate each call.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    issuer: TokenIssuer,
}

impl ApiClient {
    pub fn new(base_url: &str, issuer: TokenIssuer) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            issuer,
        })
    }

    /// Build a client pointed at `config.base_url`.
    pub fn from_config(config: &Config, issuer: TokenIssuer) -> Result<Self> {
        Self::new(&config.base_url, issuer)
    }

    /// Attach a fresh token, send, and decode the body. Non-2xx statuses
    /// become `AsmError::Api` with the body preserved.
    fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let token = self.issuer.mint()?;
        debug!(issued_at = %token.issued_at, expires_at = %token.expires_at, "minted token");
        let res = req.bearer_auth(token.as_str()).send()?;

        let status = res.status();
        decode_response(status, res.text())
    }

    /// `GET /devices?filter[serialNumber]=..`, first match only.
    pub fn find_device(&self, serial: &str) -> Result<Option<Device>> {
        let url = format!("{}/devices", self.base_url);
        debug!(%url, serial, "searching device");
        let req = self
            .client
            .get(&url)
            .query(&[("filter[serialNumber]", serial)]);
        let page: Collection<Device> = self.send(req)?;
        Ok(page.data.and_then(|devices| devices.into_iter().next()))
    }
}

/// Turn a status and the (possibly failed) body read into a typed result.
/// A non-2xx status wins over a body that could not be read.
fn decode_response<T, E>(status: StatusCode, body: std::result::Result<String, E>) -> Result<T>
where
    T: DeserializeOwned,
    AsmError: From<E>,
{
    if !status.is_success() {
        return Err(AsmError::Api {
            status,
            body: body.unwrap_or_default(),
        });
    }
    let body = body?;
    if body.trim().is_empty() {
        return Ok(serde_json::from_value(serde_json::Value::Null)?);
    }
    Ok(serde_json::from_str(&body)?)
}

impl AsmApi for ApiClient {
    fn search_device(&self, serial: &str) -> DeviceLookup {
        match self.find_device(serial) {
            Ok(Some(device)) => DeviceLookup::Found(device),
            Ok(None) => DeviceLookup::NotFound,
            Err(e) => {
                error!(serial, error = %e, "device search failed");
                DeviceLookup::TransportError(e.to_string())
            }
        }
    }

    fn list_servers(&self) -> Result<Vec<Server>> {
        let url = format!("{}/device-management-servers", self.base_url);
        debug!(%url, "listing management servers");
        let page: Collection<Server> = self.send(self.client.get(&url)).map_err(|e| {
            error!(error = %e, "listing management servers failed");
            e
        })?;
        Ok(page.data.unwrap_or_default())
    }

    fn assign(&self, device_id: &str, server_id: &str) -> Result<serde_json::Value> {
        let url = format!("{}/devices/{}", self.base_url, device_id);
        debug!(%url, device_id, server_id, "assigning device");
        let body = AssignmentRequest::new(device_id, server_id);
        self.send(self.client.patch(&url).json(&body)).map_err(|e| {
            error!(device_id, server_id, error = %e, "device assignment failed");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;

    fn unreadable() -> std::result::Result<String, io::Error> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset while reading body"))
    }

    #[test]
    fn assignment_body_matches_json_api_shape() {
        let body = serde_json::to_value(AssignmentRequest::new("1001", "SRV-IPADS")).unwrap();
        assert_eq!(
            body,
            json!({
                "data": {
                    "type": "devices",
                    "id": "1001",
                    "attributes": { "deviceManagementServerId": "SRV-IPADS" }
                }
            })
        );
    }

    #[test]
    fn device_defaults_for_missing_attributes() {
        let device: Device = serde_json::from_value(json!({ "id": "1001" })).unwrap();
        assert_eq!(device.model(), "Unknown");
        assert_eq!(device.current_server(), "Unassigned");
    }

    #[test]
    fn device_reads_camel_case_attributes() {
        let device: Device = serde_json::from_value(json!({
            "id": "1001",
            "type": "orgDevices",
            "attributes": {
                "serialNumber": "C02ABC123456",
                "model": "MacBook Air",
                "deviceManagementServerId": null,
                "color": "MIDNIGHT"
            }
        }))
        .unwrap();
        assert_eq!(device.kind.as_deref(), Some("orgDevices"));
        assert_eq!(device.attributes.serial_number.as_deref(), Some("C02ABC123456"));
        assert_eq!(device.model(), "MacBook Air");
        assert_eq!(device.current_server(), "Unassigned");
    }

    #[test]
    fn collection_tolerates_null_data() {
        let page: Collection<Server> = serde_json::from_value(json!({ "data": null })).unwrap();
        assert!(page.data.is_none());
        let page: Collection<Server> = serde_json::from_value(json!({ "meta": {} })).unwrap();
        assert!(page.data.is_none());
    }

    #[test]
    fn error_status_survives_unreadable_body() {
        let err = decode_response::<serde_json::Value, _>(StatusCode::BAD_GATEWAY, unreadable()).unwrap_err();
        match err {
            AsmError::Api { status, body } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert!(body.is_empty());
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn error_status_keeps_readable_body() {
        let err = decode_response::<serde_json::Value, io::Error>(
            StatusCode::CONFLICT,
            Ok("{\"errors\":[]}".into()),
        )
        .unwrap_err();
        assert!(matches!(err, AsmError::Api { status, ref body } if status == StatusCode::CONFLICT && body.contains("errors")));
    }

    #[test]
    fn unreadable_success_body_is_io_error() {
        let err = decode_response::<serde_json::Value, _>(StatusCode::OK, unreadable()).unwrap_err();
        assert!(matches!(err, AsmError::Io(_)));
    }

    #[test]
    fn empty_success_body_decodes_as_null() {
        let value: serde_json::Value =
            decode_response::<_, io::Error>(StatusCode::NO_CONTENT, Ok("  ".into())).unwrap();
        assert!(value.is_null());
    }
}

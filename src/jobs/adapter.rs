use crate::remote::{RemoteClient, RemoteError};
use reqwest::Method;
use serde_json::Value as JsonValue;
use tracing::info;

const HOSTS_SCROLL: &str = "/devices/queries/devices-scroll/v1";
const DEVICES_QUERY: &str = "/devices/queries/devices/v1";
const DEVICE_DETAILS: &str = "/devices/entities/devices/v2";
const DETECTIONS_QUERY: &str = "/detects/queries/detects/v1";
const HASH_INDICATORS: &str = "/indicators/queries/devices/v1";
const FILES_QUERY: &str = "/files/queries/files/v1";
const NETWORK_CONTACTS: &str = "/network/queries/contacts/v1";
const DOMAIN_CONTACTS: &str = "/network/queries/domains/v1";
const PROCESSES_QUERY: &str = "/processes/queries/processes/v1";
const PROCESS_TREE: &str = "/processes/entities/tree/v1";

/// Named telemetry operations for one tenant.
///
/// Every operation is a single [`RemoteClient::call`] and returns the
/// `resources` array of the response, empty when the field is absent.
pub struct TelemetryAdapter {
    client: RemoteClient,
}

impl TelemetryAdapter {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    pub fn tenant_id(&self) -> &str {
        self.client.tenant_id()
    }

    pub async fn list_hosts(&self, limit: u32) -> Result<Vec<JsonValue>, RemoteError> {
        let hosts = self
            .query(HOSTS_SCROLL, &[("limit", limit.to_string())])
            .await?;
        info!("[{}] {} hosts found", self.tenant_id(), hosts.len());
        Ok(hosts)
    }

    pub async fn list_detections(&self, filter: &str) -> Result<Vec<JsonValue>, RemoteError> {
        let params = if filter.is_empty() {
            Vec::new()
        } else {
            vec![("filter", filter.to_string())]
        };
        let detections = self.query(DETECTIONS_QUERY, &params).await?;
        info!(
            "[{}] {} detections found",
            self.tenant_id(),
            detections.len()
        );
        Ok(detections)
    }

    pub async fn get_device_metadata(
        &self,
        device_ids: &[String],
    ) -> Result<Vec<JsonValue>, RemoteError> {
        let params: Vec<(&str, String)> = device_ids.iter().map(|id| ("ids", id.clone())).collect();
        self.query(DEVICE_DETAILS, &params).await
    }

    pub async fn search_devices_by_ip(&self, filter: &str) -> Result<Vec<JsonValue>, RemoteError> {
        self.query(DEVICES_QUERY, &[("filter", filter.to_string())])
            .await
    }

    pub async fn search_processes_by_hash(
        &self,
        sha256: &str,
    ) -> Result<Vec<JsonValue>, RemoteError> {
        self.query(
            HASH_INDICATORS,
            &[("type", "sha256".to_string()), ("value", sha256.to_string())],
        )
        .await
    }

    pub async fn search_files_by_path(&self, pattern: &str) -> Result<Vec<JsonValue>, RemoteError> {
        self.query(FILES_QUERY, &[("filter", format!("file_path:'{}'", pattern))])
            .await
    }

    pub async fn search_network_contacts(
        &self,
        remote_ip: &str,
    ) -> Result<Vec<JsonValue>, RemoteError> {
        self.query(NETWORK_CONTACTS, &[("remote_ip", remote_ip.to_string())])
            .await
    }

    pub async fn search_domain_contacts(
        &self,
        domain: &str,
    ) -> Result<Vec<JsonValue>, RemoteError> {
        self.query(DOMAIN_CONTACTS, &[("domain_name", domain.to_string())])
            .await
    }

    pub async fn search_processes_by_cmdline(
        &self,
        pattern: &str,
    ) -> Result<Vec<JsonValue>, RemoteError> {
        self.query(
            PROCESSES_QUERY,
            &[("filter", format!("command_line:'*{}*'", pattern))],
        )
        .await
    }

    /// Process tree rooted at `process_id`; `Null` when the API knows nothing of it.
    pub async fn get_process_tree(&self, process_id: &str) -> Result<JsonValue, RemoteError> {
        let tree = self
            .query(PROCESS_TREE, &[("id", process_id.to_string())])
            .await?;
        Ok(tree.into_iter().next().unwrap_or(JsonValue::Null))
    }

    async fn query(
        &self,
        operation: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<JsonValue>, RemoteError> {
        let body = self.client.call(Method::GET, operation, params).await?;
        Ok(resources_of(body))
    }
}

pub(crate) fn resources_of(body: JsonValue) -> Vec<JsonValue> {
    match body {
        JsonValue::Object(mut map) => match map.remove("resources") {
            Some(JsonValue::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Device id of a host entry: either a bare id string or an object
/// carrying `device_id` (or `id`).
pub(crate) fn device_id_of(host: &JsonValue) -> Option<String> {
    match host {
        JsonValue::String(id) => Some(id.clone()),
        JsonValue::Object(map) => map
            .get("device_id")
            .or_else(|| map.get("id"))
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resources_of() {
        assert_eq!(
            resources_of(json!({"resources": [1, 2], "meta": {}})),
            vec![json!(1), json!(2)]
        );
        assert!(resources_of(json!({"meta": {}})).is_empty());
        assert!(resources_of(json!({"resources": null})).is_empty());
        assert!(resources_of(json!([1, 2])).is_empty());
    }

    #[test]
    fn test_device_id_of() {
        assert_eq!(device_id_of(&json!("abc")), Some("abc".to_string()));
        assert_eq!(
            device_id_of(&json!({"device_id": "d1", "id": "x"})),
            Some("d1".to_string())
        );
        assert_eq!(device_id_of(&json!({"id": "x"})), Some("x".to_string()));
        assert_eq!(device_id_of(&json!({"hostname": "pc"})), None);
        assert_eq!(device_id_of(&json!(42)), None);
    }
}

use crate::error::{ClientError, Result};
use crate::traits::ApiClient;
use async_trait::async_trait;
use ccalloc_core::{ClusterCidr, Node};
use reqwest::Client;
use tracing::{debug, warn};

/// Lightweight HTTP client for the allocator to talk to the object-store API
/// server. Every operation maps to a single REST call; the finalizer and
/// podCIDRs writes go out as JSON merge patches so unrelated fields are left
/// alone.
pub struct HttpApiClient {
    base_url: String,
    client: Client,
}

impl HttpApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::transport_error(format!("GET {} failed: {}", path, e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::transport_error(format!(
                "GET {} failed with status {}: {}",
                path, status, body
            )));
        }

        resp.json::<T>()
            .await
            .map(Some)
            .map_err(|e| ClientError::transport_error(format!("failed to parse response: {}", e)))
    }

    async fn patch_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        kind: &'static str,
        name: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("PATCH {}", url);

        let resp = self
            .client
            .patch(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::transport_error(format!("PATCH {} failed: {}", path, e)))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Err(ClientError::conflict(kind, name));
        }
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::not_found(kind, name));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::transport_error(format!(
                "PATCH {} failed with status {}: {}",
                path, status, body
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ClientError::transport_error(format!("failed to parse response: {}", e)))
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        #[derive(serde::Deserialize)]
        struct NodeList {
            items: Vec<Node>,
        }
        let list: Option<NodeList> = self.get_json("/api/v1/nodes").await?;
        Ok(list.map(|l| l.items).unwrap_or_default())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        self.get_json(&format!("/api/v1/nodes/{}", name)).await
    }

    async fn patch_node_pod_cidrs(&self, name: &str, pod_cidrs: Vec<String>) -> Result<Node> {
        let body = serde_json::json!({ "spec": { "podCIDRs": pod_cidrs } });
        self.patch_json(&format!("/api/v1/nodes/{}", name), &body, "Node", name)
            .await
    }

    async fn list_cluster_cidrs(&self) -> Result<Vec<ClusterCidr>> {
        #[derive(serde::Deserialize)]
        struct ClusterCidrList {
            items: Vec<ClusterCidr>,
        }
        let list: Option<ClusterCidrList> = self
            .get_json("/apis/networking.x-k8s.io/v1/clustercidrs")
            .await?;
        Ok(list.map(|l| l.items).unwrap_or_default())
    }

    async fn get_cluster_cidr(&self, name: &str) -> Result<Option<ClusterCidr>> {
        self.get_json(&format!(
            "/apis/networking.x-k8s.io/v1/clustercidrs/{}",
            name
        ))
        .await
    }

    async fn create_cluster_cidr(&self, cc: &ClusterCidr) -> Result<()> {
        let url = format!(
            "{}/apis/networking.x-k8s.io/v1/clustercidrs",
            self.base_url
        );
        debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .json(cc)
            .send()
            .await
            .map_err(|e| ClientError::transport_error(format!("POST {} failed: {}", url, e)))?;
        if resp.status() == reqwest::StatusCode::CONFLICT {
            // Already exists; the bootstrap CLI treats this as a no-op.
            return Ok(());
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::transport_error(format!(
                "POST {} failed with status {}: {}",
                url, status, body
            )));
        }
        Ok(())
    }

    async fn add_finalizer(&self, name: &str) -> Result<()> {
        let body = serde_json::json!({
            "finalizers": { "add": [ccalloc_core::FINALIZER] }
        });
        let _: ClusterCidr = self
            .patch_json(
                &format!("/apis/networking.x-k8s.io/v1/clustercidrs/{}", name),
                &body,
                "ClusterCIDR",
                name,
            )
            .await?;
        Ok(())
    }

    async fn remove_finalizer(&self, name: &str) -> Result<()> {
        let body = serde_json::json!({
            "finalizers": { "remove": [ccalloc_core::FINALIZER] }
        });
        let _: ClusterCidr = self
            .patch_json(
                &format!("/apis/networking.x-k8s.io/v1/clustercidrs/{}", name),
                &body,
                "ClusterCIDR",
                name,
            )
            .await?;
        Ok(())
    }

    async fn delete_cluster_cidr(&self, name: &str) -> Result<()> {
        let url = format!(
            "{}/apis/networking.x-k8s.io/v1/clustercidrs/{}",
            self.base_url, name
        );
        debug!("DELETE {}", url);
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| ClientError::transport_error(format!("DELETE {} failed: {}", url, e)))?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status();
            return Err(ClientError::transport_error(format!(
                "DELETE {} failed with status {}",
                url, status
            )));
        }
        Ok(())
    }

    async fn emit_node_event(&self, node_name: &str, reason: &str, message: &str) {
        let body = serde_json::json!({
            "involvedObject": { "kind": "Node", "name": node_name },
            "reason": reason,
            "message": message,
        });
        let url = format!("{}/api/v1/events", self.base_url);
        if let Err(e) = self.client.post(&url).json(&body).send().await {
            warn!("failed to emit event for node {}: {}", node_name, e);
        }
    }

    async fn emit_cluster_cidr_event(&self, name: &str, reason: &str, message: &str) {
        let body = serde_json::json!({
            "involvedObject": { "kind": "ClusterCIDR", "name": name },
            "reason": reason,
            "message": message,
        });
        let url = format!("{}/api/v1/events", self.base_url);
        if let Err(e) = self.client.post(&url).json(&body).send().await {
            warn!("failed to emit event for ClusterCIDR {}: {}", name, e);
        }
    }
}

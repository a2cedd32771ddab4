use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::api::{Backend, Notifier};
use crate::config::BackendConfig;
use crate::error::ApiError;
use crate::types::{ExternalState, Phase, PhaseTask, Role, TaskRecord};

/// HTTP client for the admin REST backend.
///
/// All methods map network failures to `ApiError::Transport`, non-2xx
/// responses to `ApiError::Status`, and body problems to `ApiError::Decode`,
/// so callers can treat every remote failure uniformly.
#[derive(Debug, Clone)]
pub struct RestBackend {
    http: Client,
    base_url: String,
    record_resource: String,
}

#[derive(Deserialize)]
struct ProductEnvelope {
    #[serde(default, rename = "estadoId")]
    state_id: Option<i64>,
}

#[derive(Serialize)]
struct StateChange {
    #[serde(rename = "estadoId")]
    state_id: i64,
}

#[derive(Deserialize)]
struct PermissionEnvelope {
    #[serde(default, rename = "permitido")]
    granted: bool,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, String> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| format!("could not build HTTP client: {}", e))?;

        Ok(RestBackend {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            record_resource: config.record_resource.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|e| ApiError::Decode {
            endpoint: path.to_string(),
            detail: e.to_string(),
        })
    }

    async fn send_json<B: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.url(path);
        let response = self
            .http
            .request(method, &url)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl Backend for RestBackend {
    async fn list_phases(&self) -> Result<Vec<Phase>, ApiError> {
        self.get_json("fases").await
    }

    async fn list_phase_tasks(&self, phase_id: i64) -> Result<Vec<PhaseTask>, ApiError> {
        self.get_json(&format!("tarea-fases?faseId={}", phase_id))
            .await
    }

    async fn list_task_records(
        &self,
        product_id: i64,
        phase_id: i64,
    ) -> Result<Vec<TaskRecord>, ApiError> {
        self.get_json(&format!(
            "{}?productoId={}&faseId={}",
            self.record_resource, product_id, phase_id
        ))
        .await
    }

    async fn create_task_record(&self, record: &TaskRecord) -> Result<TaskRecord, ApiError> {
        let path = self.record_resource.clone();
        let response = self
            .send_json(reqwest::Method::POST, &path, record)
            .await?;
        response.json().await.map_err(|e| ApiError::Decode {
            endpoint: path,
            detail: e.to_string(),
        })
    }

    async fn update_task_record(&self, record: &TaskRecord) -> Result<(), ApiError> {
        let path = format!("{}/{}", self.record_resource, record.id);
        self.send_json(reqwest::Method::PUT, &path, record).await?;
        Ok(())
    }

    async fn list_external_states(&self) -> Result<Vec<ExternalState>, ApiError> {
        self.get_json("estados").await
    }

    async fn product_state_id(&self, product_id: i64) -> Result<Option<i64>, ApiError> {
        let product: ProductEnvelope = self.get_json(&format!("productos/{}", product_id)).await?;
        Ok(product.state_id)
    }

    async fn update_product_state(&self, product_id: i64, state_id: i64) -> Result<(), ApiError> {
        let path = format!("productos/{}/estado", product_id);
        self.send_json(reqwest::Method::PUT, &path, &StateChange { state_id })
            .await?;
        Ok(())
    }

    async fn role(&self, role_id: i64) -> Result<Role, ApiError> {
        self.get_json(&format!("roles/{}", role_id)).await
    }

    async fn has_permission(&self, resource: &str, action: &str) -> Result<bool, ApiError> {
        let permission: PermissionEnvelope = self
            .get_json(&format!("permisos?recurso={}&accion={}", resource, action))
            .await?;
        Ok(permission.granted)
    }
}

/// Supervisor notifications handed off through the backend's mail relay.
/// Hand-off succeeds when the relay accepts the message; actual delivery is
/// outside the engine's view.
#[derive(Debug, Clone)]
pub struct RestNotifier {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct OutboundMail<'a> {
    #[serde(rename = "destinatario")]
    recipient: &'a str,
    #[serde(rename = "asunto")]
    subject: &'a str,
    #[serde(rename = "cuerpo")]
    body: &'a str,
}

impl RestNotifier {
    pub fn new(config: &BackendConfig) -> Result<Self, String> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| format!("could not build HTTP client: {}", e))?;

        Ok(RestNotifier {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Notifier for RestNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ApiError> {
        let endpoint = "notificaciones";
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .http
            .post(&url)
            .json(&OutboundMail {
                recipient,
                subject,
                body,
            })
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

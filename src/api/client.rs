use crate::api::api_types::{ApiStaffResponse, ApiSuppliersResponse, ApiWriteResponse, is_truthy};
use crate::api::types::{StaffMember, SupplierRecord};
use crate::config::ServerConfig;
use crate::error::SyncError;
use crate::sync::QueueKind;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Hostnames that are served by the local development backend.
const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

/// Resolve the backend base URL for an app origin.
///
/// Loopback origins talk to the backend on its fixed local port; every other
/// origin (tunnels, reverse proxies, production) is used as-is.
pub fn resolve_base_url(origin: &Url, loopback_port: u16) -> String {
  match origin.host_str() {
    Some(host) if LOOPBACK_HOSTS.contains(&host) => format!("http://localhost:{}", loopback_port),
    _ => origin.origin().ascii_serialization(),
  }
}

/// Meal backend API client
#[derive(Clone)]
pub struct MealClient {
  http: reqwest::Client,
  base_url: String,
}

impl MealClient {
  pub fn new(config: &ServerConfig) -> Result<Self> {
    let origin = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid server origin '{}': {}", config.origin, e))?;
    let base_url = resolve_base_url(&origin, config.loopback_port);

    let http = reqwest::Client::builder()
      .timeout(config.request_timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    debug!("Backend base URL: {}", base_url);
    Ok(Self { http, base_url })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  /// Get active suppliers for a project
  pub async fn get_suppliers(&self, project: &str) -> Result<Vec<SupplierRecord>, SyncError> {
    let response: ApiSuppliersResponse = self
      .http
      .get(self.url("/api/fornecedores"))
      .query(&[("projeto", project)])
      .send()
      .await?
      .json()
      .await?;

    if is_truthy(&response.error) {
      return Err(SyncError::Application(
        response
          .message
          .unwrap_or_else(|| "Failed to load suppliers".to_string()),
      ));
    }

    Ok(response.fornecedores.into_iter().map(Into::into).collect())
  }

  /// Get the staff roster of a team
  pub async fn get_staff(&self, team: &str) -> Result<Vec<StaffMember>, SyncError> {
    let response: ApiStaffResponse = self
      .http
      .get(self.url("/api/colaboradores"))
      .query(&[("equipe", team)])
      .send()
      .await?
      .json()
      .await?;

    if is_truthy(&response.error) {
      return Err(SyncError::Application(
        response
          .message
          .unwrap_or_else(|| "Failed to load staff".to_string()),
      ));
    }

    Ok(response.colaboradores.into_iter().map(Into::into).collect())
  }

  /// Whether the backend answers its connection test endpoint
  pub async fn check_connection(&self) -> bool {
    match self.http.get(self.url("/api/teste-conexao")).send().await {
      Ok(resp) => resp.status().is_success(),
      Err(e) => {
        debug!("Connection check failed: {}", e);
        false
      }
    }
  }

  /// Post one pending write.
  ///
  /// The response must be JSON; a truthy `error` field is a failure whatever
  /// the HTTP status says.
  pub async fn submit(&self, kind: QueueKind, payload: &Value) -> Result<(), SyncError> {
    let response = self
      .http
      .post(self.url(kind.endpoint()))
      .json(payload)
      .send()
      .await?;

    let status = response.status();
    let body: ApiWriteResponse = response
      .json()
      .await
      .map_err(|e| SyncError::Network(format!("Unreadable response (HTTP {}): {}", status, e)))?;

    if body.is_error() {
      return Err(SyncError::Application(body.error_message()));
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn resolve(origin: &str) -> String {
    resolve_base_url(&Url::parse(origin).unwrap(), 8082)
  }

  #[test]
  fn test_loopback_hosts_use_local_port() {
    assert_eq!(resolve("http://localhost:3000/app"), "http://localhost:8082");
    assert_eq!(resolve("http://127.0.0.1"), "http://localhost:8082");
  }

  #[test]
  fn test_other_hosts_use_origin() {
    assert_eq!(
      resolve("https://abc123.ngrok-free.app/sistema-pedidos.html"),
      "https://abc123.ngrok-free.app"
    );
    assert_eq!(
      resolve("https://meals.example.com:8443/"),
      "https://meals.example.com:8443"
    );
  }

  #[test]
  fn test_client_uses_resolved_base() {
    let config = ServerConfig {
      origin: "https://meals.example.com/".to_string(),
      ..ServerConfig::default()
    };
    let client = MealClient::new(&config).unwrap();
    assert_eq!(client.base_url(), "https://meals.example.com");
    assert_eq!(
      client.url(QueueKind::Order.endpoint()),
      "https://meals.example.com/api/salvar-pedido"
    );
  }

  #[test]
  fn test_invalid_origin_is_rejected() {
    let config = ServerConfig {
      origin: "not a url".to_string(),
      ..ServerConfig::default()
    };
    assert!(MealClient::new(&config).is_err());
  }
}

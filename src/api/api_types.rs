//! Serde-deserializable types matching the meal backend's JSON responses.
//!
//! These types are separate from domain types to allow lenient deserialization
//! (numbers sent as strings, nulls where text is expected) while keeping
//! domain types focused on application needs.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::types::{StaffMember, SupplierRecord};

// ============================================================================
// Common envelope
// ============================================================================

/// JavaScript-style truthiness, which is how the backend's `error` flag has
/// always been interpreted by clients.
pub fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

/// Response to a write (`/api/salvar-pedido`, `/api/afericao-temperatura`).
#[derive(Debug, Deserialize)]
pub struct ApiWriteResponse {
  #[serde(default)]
  pub error: Value,
  #[serde(default)]
  pub message: Option<String>,
}

impl ApiWriteResponse {
  pub fn is_error(&self) -> bool {
    is_truthy(&self.error)
  }

  pub fn error_message(&self) -> String {
    self
      .message
      .clone()
      .unwrap_or_else(|| "backend reported an error without a message".to_string())
  }
}

// ============================================================================
// Reference data endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSuppliersResponse {
  #[serde(default)]
  pub error: Value,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub fornecedores: Vec<ApiSupplier>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSupplier {
  #[serde(rename = "FORNECEDOR", default, deserialize_with = "null_as_empty")]
  pub name: String,
  #[serde(rename = "FECHAMENTO", default)]
  pub closure_code: Option<String>,
  #[serde(rename = "VALOR", default, deserialize_with = "lenient_number")]
  pub unit_price: Option<f64>,
  #[serde(rename = "TIPO_FORN", default)]
  pub supplier_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiStaffResponse {
  #[serde(default)]
  pub error: Value,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub colaboradores: Vec<ApiStaffMember>,
}

#[derive(Debug, Deserialize)]
pub struct ApiStaffMember {
  #[serde(rename = "ID", default, deserialize_with = "lenient_id")]
  pub id: Option<i64>,
  #[serde(rename = "NOME", default, deserialize_with = "null_as_empty")]
  pub name: String,
  #[serde(rename = "FUNCAO", default)]
  pub role: Option<String>,
  #[serde(rename = "EQUIPE", default, deserialize_with = "null_as_empty")]
  pub team: String,
  #[serde(rename = "CLASSE", default)]
  pub class: Option<String>,
  #[serde(rename = "IS_LIDER", default)]
  pub is_leader: bool,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiSupplier> for SupplierRecord {
  fn from(s: ApiSupplier) -> Self {
    SupplierRecord {
      name: s.name,
      closure_code: s.closure_code,
      unit_price: s.unit_price,
      supplier_type: s.supplier_type,
    }
  }
}

impl From<ApiStaffMember> for StaffMember {
  fn from(m: ApiStaffMember) -> Self {
    // Leaders are flagged either explicitly or by the LDF class
    let is_leader = m.is_leader || m.class.as_deref() == Some("LDF");
    StaffMember {
      id: m.id.unwrap_or_default(),
      name: m.name,
      role: m.role,
      team: m.team,
      is_leader,
    }
  }
}

// ============================================================================
// Helpers
// ============================================================================

/// Accept a number, a numeric string, or null.
/// Blank or unparseable strings become None.
pub fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  Ok(match value {
    Some(Value::Number(n)) => n.as_f64(),
    Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
    _ => None,
  })
}

/// Accept an integer, an integral float, or an integer string.
/// Fractional or out-of-range values become None rather than being truncated.
pub fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  Ok(match value {
    Some(Value::Number(n)) => n.as_i64().or_else(|| {
      n.as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
        .map(|f| f as i64)
    }),
    Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
    _ => None,
  })
}

/// Treat null as an empty string.
pub fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

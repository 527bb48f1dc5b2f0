use serde::{Deserialize, Serialize};

/// Meal supplier from the reference list.
///
/// Serialized with the backend's column names so cached lists keep the shape
/// the rest of the app has always stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierRecord {
  #[serde(rename = "FORNECEDOR")]
  pub name: String,
  /// Billing-closure code; only meaningful for suppliers picked from the list
  #[serde(rename = "FECHAMENTO", default, skip_serializing_if = "Option::is_none")]
  pub closure_code: Option<String>,
  #[serde(rename = "VALOR", default, skip_serializing_if = "Option::is_none")]
  pub unit_price: Option<f64>,
  #[serde(rename = "TIPO_FORN", default, skip_serializing_if = "Option::is_none")]
  pub supplier_type: Option<String>,
}

/// Staff roster row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
  pub id: i64,
  pub name: String,
  pub role: Option<String>,
  pub team: String,
  pub is_leader: bool,
}

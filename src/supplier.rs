//! Supplier selection per meal type, billing-closure status and price.
//!
//! A closure code is only ever taken from a supplier that was picked from the
//! cached reference list. A custom, typed-in supplier never gets one, even
//! when its name happens to match a listed supplier.

use std::collections::HashMap;

use tracing::debug;

use crate::api::{CachedMealClient, SupplierRecord};
use crate::cache::TieredCache;

/// Option value reserved for "type a supplier name".
pub const CUSTOM_OPTION: &str = "__custom__";

/// Selection state for one meal type, as captured from the order form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionInput {
  pub is_custom: bool,
  /// Option value of the picked entry
  pub raw_value: String,
  /// Visible label of the picked entry
  pub label_text: String,
  /// Typed supplier name when custom
  pub free_text: String,
  /// Typed unit price, if any
  pub price_override: Option<String>,
}

impl SelectionInput {
  /// A supplier picked from the list.
  pub fn listed(label: &str) -> Self {
    Self::from_select(label, label, "")
  }

  /// A supplier typed in by the user.
  pub fn custom(name: &str) -> Self {
    Self::from_select(CUSTOM_OPTION, "", name)
  }

  /// Build from a select element's value and label plus the free-text field.
  pub fn from_select(raw_value: &str, label_text: &str, free_text: &str) -> Self {
    Self {
      is_custom: raw_value == CUSTOM_OPTION,
      raw_value: raw_value.to_string(),
      label_text: label_text.to_string(),
      free_text: free_text.to_string(),
      price_override: None,
    }
  }

  pub fn with_price(mut self, price: &str) -> Self {
    self.price_override = Some(price.to_string());
    self
  }
}

/// Resolved supplier for a meal type.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierSelection {
  pub is_custom: bool,
  pub display_name: String,
  /// Reference record; always `None` for custom suppliers
  pub cached: Option<SupplierRecord>,
}

/// Resolve a selection against the supplier list.
pub fn resolve_selection(input: &SelectionInput, suppliers: &[SupplierRecord]) -> SupplierSelection {
  if input.is_custom {
    return SupplierSelection {
      is_custom: true,
      display_name: input.free_text.trim().to_string(),
      cached: None,
    };
  }

  let display_name = input.label_text.trim().to_string();
  let cached = suppliers
    .iter()
    .find(|s| s.name.trim() == display_name)
    .cloned();

  SupplierSelection {
    is_custom: false,
    display_name,
    cached,
  }
}

/// Billing-closure code for a resolved selection, or empty.
pub fn closure_code(selection: &SupplierSelection) -> String {
  if selection.is_custom {
    return String::new();
  }
  selection
    .cached
    .as_ref()
    .and_then(|record| record.closure_code.as_deref())
    .map(str::trim)
    .unwrap_or_default()
    .to_string()
}

/// Unit price: a non-blank override wins (unparseable counts as 0), then the
/// cached price, then 0.
pub fn resolve_price(input: &SelectionInput, selection: &SupplierSelection) -> f64 {
  if let Some(text) = input.price_override.as_deref() {
    let text = text.trim();
    if !text.is_empty() {
      return match text.replace(',', ".").parse::<f64>() {
        Ok(price) if price.is_finite() => price,
        _ => 0.0,
      };
    }
  }

  selection
    .cached
    .as_ref()
    .and_then(|record| record.unit_price)
    .unwrap_or(0.0)
}

/// Per-meal supplier selections resolved against the cached supplier list.
pub struct SupplierResolver {
  cache: TieredCache,
  project: String,
  selections: HashMap<String, SelectionInput>,
}

impl SupplierResolver {
  pub fn new(cache: TieredCache, project: &str) -> Self {
    Self {
      cache,
      project: project.to_string(),
      selections: HashMap::new(),
    }
  }

  /// Register the current selection for `meal_type`.
  pub fn select(&mut self, meal_type: &str, input: SelectionInput) {
    self.selections.insert(meal_type.to_string(), input);
  }

  fn suppliers(&self) -> Vec<SupplierRecord> {
    self
      .cache
      .get(&CachedMealClient::suppliers_key(&self.project))
      .unwrap_or_default()
  }

  pub fn resolve(&self, meal_type: &str) -> Option<SupplierSelection> {
    let input = self.selections.get(meal_type)?;
    let selection = resolve_selection(input, &self.suppliers());
    debug!(
      "Resolved {} supplier '{}' from option '{}' (custom: {}, listed: {})",
      meal_type,
      selection.display_name,
      input.raw_value,
      selection.is_custom,
      selection.cached.is_some()
    );
    Some(selection)
  }

  pub fn closure_status(&self, meal_type: &str) -> String {
    self
      .resolve(meal_type)
      .map(|selection| closure_code(&selection))
      .unwrap_or_default()
  }

  pub fn price(&self, meal_type: &str) -> f64 {
    let Some(input) = self.selections.get(meal_type) else {
      return 0.0;
    };
    let selection = resolve_selection(input, &self.suppliers());
    resolve_price(input, &selection)
  }
}

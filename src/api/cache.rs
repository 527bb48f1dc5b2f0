//! Caching implementations for reference data types.

use crate::cache::Cacheable;

use super::types::{StaffMember, SupplierRecord};

impl Cacheable for SupplierRecord {
  fn collection_key() -> &'static str {
    "fornecedores"
  }

  fn entity_type() -> &'static str {
    "supplier"
  }
}

impl Cacheable for StaffMember {
  fn collection_key() -> &'static str {
    "colaboradores"
  }

  fn entity_type() -> &'static str {
    "staff member"
  }
}

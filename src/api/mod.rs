pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod types;

pub use cached_client::{CachedMealClient, Freshness};
pub use client::MealClient;
pub use types::SupplierRecord;

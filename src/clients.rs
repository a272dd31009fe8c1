pub mod gender_api;

pub use gender_api::{GenderApiClient, GenderApiConfig};

pub mod models;
pub mod services;

pub use models::address::{Address, AddressKind, Availability};
pub use services::error::RegistryError;
pub use services::registry::{connect, Registry};

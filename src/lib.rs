pub mod aliases;
pub mod chat;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod geolocation;
pub mod lookup;
pub mod postal_code;
pub mod resolver;
pub mod types;

#[cfg(test)]
mod test_support;

pub use aliases::AliasTable;
pub use chat::{AssistantClient, ChatSession};
pub use config::Config;
pub use directory::{ContactDirectory, OverlapPolicy, emergency_numbers};
pub use error::{AssistantError, DirectoryError, GeolocationError, LookupError};
pub use gateway::CompletionGateway;
pub use geolocation::{Coordinates, GeolocationService, NominatimClient};
pub use lookup::SmartLookup;
pub use resolver::{AddressResolver, ViaCepClient};
pub use types::{AddressResult, CityContacts, GeolocationResult, ServiceContact};

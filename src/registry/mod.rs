//! Registry access: fetching the server list and resolving entries to keys.

mod error;
mod fetch;
mod record;

pub use error::FetchError;
pub use fetch::{HttpRegistry, RegistryFetcher, parse_server_list};
pub use record::{RawRecord, resolve};

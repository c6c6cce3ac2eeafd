//! SmugMug v2 API access: OAuth 1.0a signing, the retrying client, wire
//! types and the account walk.

pub mod account;
pub mod client;
pub mod error;
pub mod oauth;
pub mod responses;
pub mod session;
pub mod types;

pub use account::AccountEnumerator;
pub use client::{ApiClient, ApiOptions};
pub use error::{ApiError, EnumerationError};
pub use oauth::Credentials;
pub use session::build_http_client;
pub use types::AssetNode;

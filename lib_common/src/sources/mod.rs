//! # Source Adapters
//!
//! One adapter per upstream governance API, each mapping its endpoints
//! and payloads into the common item model. All reconciliation logic
//! lives above the adapter trait; these stay declarative.

pub mod cosmos;
pub mod graphql;
pub mod sky;
pub mod snapshot;
pub mod tally;
pub mod xrpl;

pub use cosmos::CosmosAdapter;
pub use sky::SkyAdapter;
pub use snapshot::SnapshotAdapter;
pub use tally::TallyAdapter;
pub use xrpl::XrplAdapter;

use crate::core::errors::FetchError;
use crate::retrieve::api_client::ApiClient;

/// Build a client for a per-target base URL. A base URL that does not
/// parse is a watchlist mistake, so it surfaces as an invalid target
/// rather than a transient failure.
pub(crate) fn client_for(base_url: &str) -> Result<ApiClient, FetchError> {
    ApiClient::new(base_url, None)
        .map_err(|e| FetchError::InvalidTarget(format!("bad base URL {base_url:?}: {e}")))
}

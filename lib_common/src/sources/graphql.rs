//! Shared GraphQL envelope handling for the Snapshot and Tally
//! adapters.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::FetchError;

#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: Value,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

impl<T: DeserializeOwned> GraphQlResponse<T> {
    /// Unwrap the data payload. Rate-limit errors surface as
    /// [`FetchError::RateLimited`] so the retry loop backs off; other
    /// GraphQL errors are malformed-payload failures.
    pub fn into_data(self) -> Result<T, FetchError> {
        if !self.errors.is_empty() {
            let rendered = Value::Array(self.errors).to_string();
            if rendered.contains("Too Many Requests") {
                return Err(FetchError::RateLimited);
            }
            return Err(FetchError::Malformed(format!("GraphQL errors: {rendered}")));
        }
        self.data
            .ok_or_else(|| FetchError::Malformed("GraphQL response without data".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_error_is_classified() {
        let resp: GraphQlResponse<Value> = serde_json::from_str(
            r#"{"errors": [{"message": "Too Many Requests"}]}"#,
        )
        .unwrap();
        assert!(matches!(resp.into_data(), Err(FetchError::RateLimited)));
    }

    #[test]
    fn other_errors_are_malformed() {
        let resp: GraphQlResponse<Value> =
            serde_json::from_str(r#"{"errors": [{"message": "bad query"}]}"#).unwrap();
        assert!(matches!(resp.into_data(), Err(FetchError::Malformed(_))));
    }
}

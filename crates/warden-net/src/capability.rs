//! NIP-11 relay information document fetch (spec §4.3, §6.1).

use serde::Deserialize;

use crate::error::{NetError, Result};

/// The subset of a relay information document the core consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapabilityDocument {
    pub software: Option<String>,
    pub version: Option<String>,
    #[serde(default, rename = "supported_nips")]
    pub supported_nips: Vec<u64>,
}

impl CapabilityDocument {
    pub fn supports(&self, nip: u64) -> bool {
        self.supported_nips.contains(&nip)
    }
}

/// Maps `wss`/`ws` to `https`/`http` and performs the information-document
/// GET with the NIP-11 accept header.
pub async fn request_capability_document(client: &reqwest::Client, relay_url: &str) -> Result<CapabilityDocument> {
    let http_url = to_http_url(relay_url)
        .ok_or_else(|| NetError::Protocol(format!("relay url has no http mapping: {relay_url}")))?;

    let response = client
        .get(http_url)
        .header("Accept", "application/nostr+json")
        .send()
        .await
        .map_err(|e| NetError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        return Err(NetError::Transport(format!(
            "capability document request failed with status {}",
            response.status()
        )));
    }

    response
        .json::<CapabilityDocument>()
        .await
        .map_err(|e| NetError::Protocol(e.to_string()))
}

fn to_http_url(relay_url: &str) -> Option<String> {
    if let Some(rest) = relay_url.strip_prefix("wss://") {
        Some(format!("https://{rest}"))
    } else if let Some(rest) = relay_url.strip_prefix("ws://") {
        Some(format!("http://{rest}"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_wss_to_https() {
        assert_eq!(to_http_url("wss://relay.example/path"), Some("https://relay.example/path".to_string()));
    }

    #[test]
    fn maps_ws_to_http() {
        assert_eq!(to_http_url("ws://relay.example"), Some("http://relay.example".to_string()));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert_eq!(to_http_url("relay.example"), None);
    }

    #[test]
    fn deserializes_supported_nips() {
        let doc: CapabilityDocument =
            serde_json::from_str(r#"{"software":"strfry","version":"1.0","supported_nips":[1,11,77]}"#).unwrap();
        assert!(doc.supports(77));
        assert!(!doc.supports(42));
    }
}

use reqwest::{redirect, Url};
use std::time::Duration;

use crate::{Casket, Error, Success};

/// Append the `pgtId` and `pgtIou` parameters to a callback URL,
/// preserving any query string it already carries
pub fn add_callback_params(url: &Url, pgt_id: &str, pgt_iou: &str) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut()
        .append_pair("pgtId", pgt_id)
        .append_pair("pgtIou", pgt_iou);

    url
}

impl Casket {
    /// Verify that a service controls its proxy callback URL
    ///
    /// Three steps, all of which must pass:
    ///
    /// 1. The URL scheme must be HTTPS
    /// 2. The TLS certificate must be valid for the callback host
    /// 3. The callback must answer with a 2xx or 3xx status code
    ///
    /// Redirects are not followed; a well-formed redirect response is
    /// accepted as proof of control. The response body is never
    /// inspected, and the round trip is bounded by the configured
    /// timeout.
    pub async fn validate_proxy_callback(
        &self,
        pgt_url: &str,
        pgt_id: &str,
        pgt_iou: &str,
    ) -> Success {
        let url = Url::parse(pgt_url).map_err(|_| Error::CallbackFailed {
            reason: format!("Proxy callback URL {} is malformed", pgt_url),
        })?;

        // Ensure the scheme is HTTPS before any network round trip
        if url.scheme() != "https" {
            return Err(Error::CallbackFailed {
                reason: "Proxy callback URL scheme is not HTTPS".to_string(),
            });
        }

        let url = add_callback_params(&url, pgt_id, pgt_iou);

        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(Duration::from_secs(self.config.callback_timeout_seconds))
            .build()
            .map_err(|error| Error::CallbackFailed {
                reason: error.to_string(),
            })?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|error| Error::CallbackFailed {
                reason: error.to_string(),
            })?;

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(Error::CallbackFailed {
                reason: format!("Proxy callback returned {}", status),
            })
        }
    }
}

//! HTTP probe implementation.

use std::time::{Duration, Instant};

use super::{ProbeError, StatusPolicy};

/// Run an HTTP probe against the given URL, optionally through a proxy.
///
/// Returns the time from request dispatch to response headers received.
pub async fn run_http_probe(
    url: &str,
    proxy: Option<&str>,
    timeout: Duration,
    policy: StatusPolicy,
) -> Result<Duration, ProbeError> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .pool_max_idle_per_host(0);

    builder = match proxy {
        Some(proxy_url) => {
            // reqwest errors echo the URL, which may carry proxy credentials
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|_| ProbeError::Config("invalid proxy url".to_string()))?;
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    let client = builder
        .build()
        .map_err(|e| ProbeError::Network(e.to_string()))?;

    let start = Instant::now();

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Network(e.without_url().to_string())
        }
    })?;

    let elapsed = start.elapsed();

    let status = response.status();
    if !policy.accepts(status) {
        return Err(ProbeError::Http(format!("unexpected status {}", status)));
    }

    Ok(elapsed)
}

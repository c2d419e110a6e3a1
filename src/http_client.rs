use std::time::Duration;

use reqwest::{Client, header};

pub(crate) fn default_http_client_builder() -> reqwest::ClientBuilder {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::CONNECTION, header::HeaderValue::from_static("keep-alive"));

    Client::builder()
        .timeout(Duration::from_secs(60))
        // Hyper's connection pool only exposes two knobs: max idle connections per host
        // and idle connection timeout. There's no TTL on the connections themselves to
        // force a refresh if DNS records change underneath us. A 5 second idle timeout
        // is short enough that we still pick up DNS changes in practice.
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
}

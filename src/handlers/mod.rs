pub mod api;
pub mod redirect;

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Determine the real client IP, preferring common proxy headers.
pub(crate) fn client_ip(headers: &HeaderMap, addr: Option<SocketAddr>) -> Option<String> {
    // X-Forwarded-For can be a comma-separated list; take the first entry.
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = xff.split(',').next().map(str::trim) {
            if !ip.is_empty() {
                return Some(ip.to_owned());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return Some(real_ip.to_owned());
        }
    }

    addr.map(|a| a.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("5.6.7.8"));
        let addr = "9.9.9.9:80".parse().ok();

        assert_eq!(client_ip(&headers, addr).as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn falls_back_to_real_ip_then_socket() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("5.6.7.8"));
        let addr = "9.9.9.9:80".parse().ok();
        assert_eq!(client_ip(&headers, addr).as_deref(), Some("5.6.7.8"));

        assert_eq!(client_ip(&HeaderMap::new(), addr).as_deref(), Some("9.9.9.9"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}

use axum::http::Request;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tower_governor::{GovernorError, key_extractor::KeyExtractor};

use super::identity::ACCOUNT_HEADER;

/// Bucket a request is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKey {
    Account(i64),
    Ip(IpAddr),
}

/// Keys requests by account when the identity header is present, otherwise by
/// client IP. Tries X-Forwarded-For, X-Real-IP, then peer address, then falls
/// back to localhost so all unidentifiable requests share one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountOrIpKeyExtractor;

impl KeyExtractor for AccountOrIpKeyExtractor {
    type Key = ClientKey;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        if let Some(account) = req
            .headers()
            .get(ACCOUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok())
        {
            return Ok(ClientKey::Account(account));
        }

        // First hop of a proxy chain
        if let Some(ip) = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok())
        {
            return Ok(ClientKey::Ip(ip));
        }

        if let Some(ip) = req
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
        {
            return Ok(ClientKey::Ip(ip));
        }

        if let Some(connect_info) = req
            .extensions()
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
        {
            return Ok(ClientKey::Ip(connect_info.0.ip()));
        }

        Ok(ClientKey::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_for(headers: &[(&str, &str)]) -> ClientKey {
        let mut builder = Request::builder().uri("/api/readings");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let req = builder.body(()).unwrap();
        AccountOrIpKeyExtractor.extract(&req).unwrap()
    }

    #[test]
    fn account_header_takes_precedence() {
        assert_eq!(
            key_for(&[("x-account-id", "42"), ("x-forwarded-for", "10.0.0.1")]),
            ClientKey::Account(42)
        );
    }

    #[test]
    fn falls_back_to_first_forwarded_ip() {
        assert_eq!(
            key_for(&[("x-forwarded-for", "10.0.0.1, 192.168.1.1")]),
            ClientKey::Ip("10.0.0.1".parse().unwrap())
        );
    }

    #[test]
    fn invalid_account_uses_real_ip() {
        assert_eq!(
            key_for(&[("x-account-id", "abc"), ("x-real-ip", "172.16.0.9")]),
            ClientKey::Ip("172.16.0.9".parse().unwrap())
        );
    }

    #[test]
    fn unidentifiable_requests_share_localhost() {
        assert_eq!(key_for(&[]), ClientKey::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }
}

//! Client IP allow-listing for the webhook endpoint

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::{GatewayError, Result};

/// A network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix_len: u8,
}

impl IpRange {
    /// Accepts `a.b.c.d/n`, an IPv6 equivalent, or a bare address.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let (addr, prefix) = match value.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (value, None),
        };
        let network: IpAddr = addr
            .parse()
            .map_err(|_| GatewayError::ConfigError(format!("invalid IP range {:?}", value)))?;
        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix_len = match prefix {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| {
                    GatewayError::ConfigError(format!("invalid prefix length in {:?}", value))
                })?,
            None => max,
        };
        Ok(Self {
            network,
            prefix_len,
        })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            v4 => v4,
        };
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix_len as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix_len as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for IpRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Allows every client when no ranges are configured.
#[derive(Debug, Clone, Default)]
pub struct IpFilter {
    allowed: Vec<IpRange>,
}

impl IpFilter {
    pub fn new<S: AsRef<str>>(ranges: &[S]) -> Result<Self> {
        let allowed = ranges
            .iter()
            .map(|r| IpRange::parse(r.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { allowed })
    }

    pub fn ranges(&self) -> &[IpRange] {
        &self.allowed
    }

    pub fn is_allowed(&self, ip: Option<IpAddr>) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        match ip {
            Some(ip) => self.allowed.iter().any(|range| range.contains(ip)),
            None => false,
        }
    }
}

/// Rejects requests from clients outside the allow-list with 403.
pub async fn filter_client_ip(
    State(filter): State<Arc<IpFilter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if !filter.is_allowed(peer) {
        warn!("Rejected request from disallowed client {:?}", peer);
        return (
            StatusCode::FORBIDDEN,
            [(header::CONTENT_TYPE, "application/json")],
            "{}",
        )
            .into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn parses_ranges_and_addresses() {
        assert_eq!(IpRange::parse("192.168.1.0/24").unwrap().to_string(), "192.168.1.0/24");
        assert_eq!(IpRange::parse("0.0.0.0/0").unwrap().to_string(), "0.0.0.0/0");
        assert_eq!(IpRange::parse(" 10.0.0.1 ").unwrap().to_string(), "10.0.0.1/32");
        assert_eq!(IpRange::parse("fd00::/8").unwrap().to_string(), "fd00::/8");
    }

    #[test]
    fn rejects_invalid_ranges() {
        assert!(IpRange::parse("not-an-ip").is_err());
        assert!(IpRange::parse("10.0.0.0/33").is_err());
        assert!(IpRange::parse("10.0.0.0/x").is_err());
        assert!(IpFilter::new(&["10.0.0.0/8", "bogus"]).is_err());
    }

    #[test]
    fn matches_within_prefix() {
        let range = IpRange::parse("192.168.1.0/24").unwrap();
        assert!(range.contains(ip("192.168.1.77")));
        assert!(!range.contains(ip("192.168.2.1")));
        assert!(range.contains(ip("::ffff:192.168.1.5")));
        assert!(!range.contains(ip("fd00::1")));

        assert!(IpRange::parse("0.0.0.0/0").unwrap().contains(ip("8.8.8.8")));
        assert!(IpRange::parse("fd00::/8").unwrap().contains(ip("fd12::1")));
    }

    #[test]
    fn empty_filter_allows_everyone() {
        let filter = IpFilter::default();
        assert!(filter.is_allowed(Some(ip("1.2.3.4"))));
        assert!(filter.is_allowed(None));
    }

    #[test]
    fn configured_filter_requires_a_known_matching_peer() {
        let filter = IpFilter::new(&["104.192.136.0/21", "127.0.0.1"]).unwrap();
        assert!(filter.is_allowed(Some(ip("104.192.137.10"))));
        assert!(filter.is_allowed(Some(ip("127.0.0.1"))));
        assert!(!filter.is_allowed(Some(ip("127.0.0.2"))));
        assert!(!filter.is_allowed(None));
    }
}

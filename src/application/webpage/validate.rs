//! Address validation ahead of any network fetch.
//!
//! A URL is only handed to the browser after its host has been resolved and
//! every resolved address classified as publicly routable. Classifying the
//! hostname text alone is not enough, an attacker-controlled name can
//! resolve to a private address.

use std::net::IpAddr;
use std::time::Duration;

use tokio::net::lookup_host;
use tokio::time::timeout;
use url::{Host, Url};

use super::types::WebRenderError;

/// A stalled resolver must not hold the request open; past this budget the
/// host is treated as unresolvable.
const DNS_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn validate_url(raw: &str) -> Result<Url, WebRenderError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(WebRenderError::validation("URL not provided"));
    }

    let url = Url::parse(raw)
        .map_err(|err| WebRenderError::validation(format!("invalid URL: {err}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(WebRenderError::validation(format!(
                "scheme `{other}` is not allowed, only http and https"
            )));
        }
    }

    let host = url
        .host()
        .ok_or_else(|| WebRenderError::validation("URL has no host"))?;

    let addresses: Vec<IpAddr> = match host {
        Host::Ipv4(addr) => vec![IpAddr::V4(addr)],
        Host::Ipv6(addr) => vec![IpAddr::V6(addr)],
        Host::Domain(name) => {
            let port = url.port_or_known_default().unwrap_or(80);
            // Fail closed: an unresolvable host is rejected, not retried.
            let resolved = timeout(DNS_LOOKUP_TIMEOUT, lookup_host((name, port)))
                .await
                .map_err(|_| {
                    WebRenderError::validation(format!(
                        "could not resolve host `{name}`: lookup timed out"
                    ))
                })?
                .map_err(|err| {
                    WebRenderError::validation(format!("could not resolve host `{name}`: {err}"))
                })?;
            resolved.map(|socket| socket.ip()).collect()
        }
    };

    if addresses.is_empty() {
        return Err(WebRenderError::validation(format!(
            "host `{}` resolved to no addresses",
            url.host_str().unwrap_or_default()
        )));
    }

    for addr in &addresses {
        if !ip_is_public(*addr) {
            metrics::counter!("cambio_url_rejected_total").increment(1);
            return Err(WebRenderError::validation(format!(
                "host resolves to non-public address {addr}"
            )));
        }
    }

    Ok(url)
}

/// Classifies an address as publicly routable.
///
/// Rejected: loopback, unspecified, RFC 1918 private ranges, link-local
/// (which covers the cloud metadata address 169.254.169.254), carrier-grade
/// NAT, broadcast, IPv6 unique-local and link-local, and IPv4-mapped IPv6
/// forms of any of the above.
pub fn ip_is_public(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_unspecified()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || is_carrier_grade_nat(v4.octets()))
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return ip_is_public(IpAddr::V4(mapped));
            }
            let segments = v6.segments();
            !(v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique-local
                || (segments[0] & 0xfe00) == 0xfc00
                // fe80::/10 link-local
                || (segments[0] & 0xffc0) == 0xfe80)
        }
    }
}

// 100.64.0.0/10
fn is_carrier_grade_nat(octets: [u8; 4]) -> bool {
    octets[0] == 100 && (octets[1] & 0xc0) == 64
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::time::Duration;

    use super::{DNS_LOOKUP_TIMEOUT, ip_is_public, validate_url};

    fn classify(text: &str) -> bool {
        ip_is_public(text.parse::<IpAddr>().unwrap())
    }

    #[test]
    fn private_and_local_ranges_are_rejected() {
        for addr in [
            "127.0.0.1",
            "0.0.0.0",
            "10.1.2.3",
            "172.16.0.1",
            "172.31.255.254",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "255.255.255.255",
            "::1",
            "fc00::1",
            "fd12:3456::1",
            "fe80::1",
            "::ffff:10.0.0.1",
            "::ffff:127.0.0.1",
        ] {
            assert!(!classify(addr), "{addr} should be rejected");
        }
    }

    #[test]
    fn public_addresses_are_accepted() {
        for addr in ["93.184.216.34", "8.8.8.8", "172.32.0.1", "2606:2800:220:1::1"] {
            assert!(classify(addr), "{addr} should be accepted");
        }
    }

    #[tokio::test]
    async fn literal_private_hosts_are_rejected_without_dns() {
        for url in [
            "http://127.0.0.1:80/",
            "http://10.1.2.3/",
            "http://169.254.169.254/latest/meta-data/",
            "http://[::1]/",
        ] {
            let err = validate_url(url).await.unwrap_err();
            assert!(err.is_input_fault(), "{url} should be a validation error");
        }
    }

    #[tokio::test]
    async fn malformed_urls_are_rejected() {
        assert!(validate_url("").await.is_err());
        assert!(validate_url("not a url").await.is_err());
        assert!(validate_url("ftp://example.com/file").await.is_err());
        assert!(validate_url("file:///etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn literal_public_hosts_are_accepted() {
        let url = validate_url("http://93.184.216.34/").await.unwrap();
        assert_eq!(url.host_str(), Some("93.184.216.34"));
    }

    #[tokio::test]
    async fn unresolvable_hosts_fail_closed_within_the_lookup_budget() {
        let started = std::time::Instant::now();
        let err = validate_url("https://does-not-resolve.invalid/")
            .await
            .unwrap_err();

        assert!(err.is_input_fault(), "expected a validation error: {err}");
        assert!(
            started.elapsed() < DNS_LOOKUP_TIMEOUT + Duration::from_secs(2),
            "lookup was not bounded"
        );
    }
}

//! Address validation for monitored endpoints.
//!
//! Every address a user submits passes through [`validate`] before it is
//! handed to the tracker. The check is purely syntactic: hostnames are not
//! resolved, so a public name that later resolves to a private address is
//! the probe's problem, not this module's.
//!
//! Rules are applied in order:
//!
//! 1. Loopback, unspecified, or the `localhost` name → [`AddressRejection::LocalhostForbidden`]
//! 2. Private or otherwise non-routable ranges → [`AddressRejection::PrivateIpForbidden`]
//! 3. Anything else that parses as an IP or hostname is accepted

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Why an address was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum AddressRejection {
    /// The address points at the local machine.
    #[error("loopback and localhost addresses cannot be monitored")]
    LocalhostForbidden,

    /// The address is in a private or reserved range.
    #[error("private and reserved addresses cannot be monitored")]
    PrivateIpForbidden,

    /// The input is neither an IP address nor a well-formed hostname.
    #[error("not a valid IP address or hostname")]
    Malformed,
}

impl AddressRejection {
    /// Stable reason code reported to the submitting flow.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::LocalhostForbidden => "localhost_forbidden",
            Self::PrivateIpForbidden => "private_ip_forbidden",
            Self::Malformed => "invalid_address",
        }
    }
}

/// IPv4 blocks that are not reachable from the public internet.
///
/// `0.0.0.0/8` and `127.0.0.0/8` are absent: they mean "this machine"
/// and are reported as [`AddressRejection::LocalhostForbidden`].
const NON_ROUTABLE_V4: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(100, 64, 0, 0), 10),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 0, 0, 0), 24),
    (Ipv4Addr::new(192, 0, 2, 0), 24),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(198, 18, 0, 0), 15),
    (Ipv4Addr::new(198, 51, 100, 0), 24),
    (Ipv4Addr::new(203, 0, 113, 0), 24),
    (Ipv4Addr::new(224, 0, 0, 0), 4),
    (Ipv4Addr::new(240, 0, 0, 0), 4),
];

/// IPv6 blocks that are not reachable from the public internet.
const NON_ROUTABLE_V6: &[(Ipv6Addr, u8)] = &[
    (Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
    (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
    (Ipv6Addr::new(0xfec0, 0, 0, 0, 0, 0, 0, 0), 10),
    (Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0), 8),
    (Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0, 0), 32),
    (Ipv6Addr::new(0x0100, 0, 0, 0, 0, 0, 0, 0), 64),
];

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)*[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$")
        .expect("hostname pattern is a valid regex")
});

/// Maximum length of a DNS name in presentation form.
const MAX_HOSTNAME_LEN: usize = 253;

/// Validates an address a user wants to monitor.
///
/// Accepts a bare IP, a bracketed IPv6 literal, or a hostname, each
/// optionally followed by `:port`.
///
/// # Errors
///
/// Returns the first [`AddressRejection`] rule the address violates.
///
/// # Example
///
/// ```
/// use reachguard::address::{AddressRejection, validate};
///
/// assert!(validate("8.8.8.8").is_ok());
/// assert_eq!(validate("192.168.1.1"), Err(AddressRejection::PrivateIpForbidden));
/// assert_eq!(validate("localhost"), Err(AddressRejection::LocalhostForbidden));
/// ```
pub fn validate(address: &str) -> Result<(), AddressRejection> {
    let (host, _) = split_host_port(address.trim()).ok_or(AddressRejection::Malformed)?;
    let host = host.strip_suffix('.').unwrap_or(host).to_ascii_lowercase();

    if host == "localhost" || host.ends_with(".localhost") {
        return Err(AddressRejection::LocalhostForbidden);
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return classify_ip(ip);
    }

    if is_hostname(&host) {
        Ok(())
    } else {
        Err(AddressRejection::Malformed)
    }
}

/// Applies the loopback and private-range rules to a parsed IP.
///
/// # Errors
///
/// Returns the matching [`AddressRejection`] for local or non-routable IPs.
pub fn classify_ip(ip: IpAddr) -> Result<(), AddressRejection> {
    match ip {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return classify_v4(mapped);
            }
            if v6.is_loopback() || v6.is_unspecified() {
                return Err(AddressRejection::LocalhostForbidden);
            }
            let bits = u128::from(v6);
            if NON_ROUTABLE_V6
                .iter()
                .any(|&(net, prefix)| in_prefix_v6(bits, u128::from(net), prefix))
            {
                return Err(AddressRejection::PrivateIpForbidden);
            }
            Ok(())
        }
    }
}

fn classify_v4(ip: Ipv4Addr) -> Result<(), AddressRejection> {
    let [first, ..] = ip.octets();
    if first == 127 || first == 0 {
        return Err(AddressRejection::LocalhostForbidden);
    }

    let bits = u32::from(ip);
    if NON_ROUTABLE_V4
        .iter()
        .any(|&(net, prefix)| in_prefix_v4(bits, u32::from(net), prefix))
    {
        return Err(AddressRejection::PrivateIpForbidden);
    }
    Ok(())
}

const fn in_prefix_v4(addr: u32, net: u32, prefix: u8) -> bool {
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    addr & mask == net & mask
}

const fn in_prefix_v6(addr: u128, net: u128, prefix: u8) -> bool {
    let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
    addr & mask == net & mask
}

/// Splits an address into host and optional port, removing IPv6 brackets.
///
/// Returns `None` for input that cannot be an address at all (empty,
/// embedded whitespace, a malformed port or bracket).
///
/// ```
/// use reachguard::address::split_host_port;
///
/// assert_eq!(split_host_port("example.com:8443"), Some(("example.com", Some(8443))));
/// assert_eq!(split_host_port("[2001:4860::8888]"), Some(("2001:4860::8888", None)));
/// assert_eq!(split_host_port("2001:4860::8888"), Some(("2001:4860::8888", None)));
/// ```
#[must_use]
pub fn split_host_port(input: &str) -> Option<(&str, Option<u16>)> {
    if input.is_empty() || input.contains(char::is_whitespace) {
        return None;
    }

    if let Some(rest) = input.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        if tail.is_empty() {
            return Some((host, None));
        }
        let port = tail.strip_prefix(':').and_then(parse_port)?;
        return Some((host, Some(port)));
    }

    // Unbracketed IPv6 literals contain colons but no port.
    if input.parse::<Ipv6Addr>().is_ok() {
        return Some((input, None));
    }

    match input.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => Some((host, Some(parse_port(port)?))),
        Some(_) => None,
        None => Some((input, None)),
    }
}

fn parse_port(port: &str) -> Option<u16> {
    port.parse::<u16>().ok().filter(|&p| p != 0)
}

fn is_hostname(host: &str) -> bool {
    host.len() <= MAX_HOSTNAME_LEN
        && HOSTNAME.is_match(host)
        // An all-numeric name is a mistyped IPv4 literal, not a hostname.
        && !host.split('.').all(|label| label.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
#[path = "address_tests.rs"]
mod tests;

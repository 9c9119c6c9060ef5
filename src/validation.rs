use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::RangeInclusive;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::InputError;

pub const CANCEL_KEYWORD: &str = "exit";
pub const DEFAULT_START_PORT: u16 = 1;
pub const DEFAULT_END_PORT: u16 = 100;

lazy_static! {
    static ref IPV4_SHAPE: Regex = Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").unwrap();
    static ref HOSTNAME: Regex = Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9.\-]*[a-zA-Z0-9])?$").unwrap();
}

/// A validated scan target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Ip(Ipv4Addr),
    Hostname(String),
}

impl Target {
    /// The address to use without a lookup, if the target is a literal.
    pub fn literal(&self) -> Option<IpAddr> {
        match self {
            Target::Ip(ip) => Some(IpAddr::V4(*ip)),
            Target::Hostname(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Ip(ip) => write!(f, "{}", ip),
            Target::Hostname(name) => write!(f, "{}", name),
        }
    }
}

/// Inclusive port range with `1 <= start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Result<Self, InputError> {
        if start == 0 {
            return Err(InputError::PortOutOfRange(0));
        }
        if end == 0 {
            return Err(InputError::PortOutOfRange(0));
        }
        if start > end {
            return Err(InputError::StartAfterEnd { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    // A valid range always holds at least one port.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_PORT,
            end: DEFAULT_END_PORT,
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

pub fn is_cancel_keyword(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(CANCEL_KEYWORD)
}

/// Validate a target typed by the user or given on the command line.
///
/// Anything made only of digits and dots is held to the IPv4 rules, so
/// `256.1.1.1` and `1.2.3` are rejected rather than taken as hostnames.
/// Octets with leading zeros are rejected too, so the address shown in
/// reports is always the one that was typed.
pub fn validate_target(input: &str) -> Result<Target, InputError> {
    let input = input.trim();

    if input.is_empty() {
        return Err(InputError::Empty);
    }
    if is_cancel_keyword(input) {
        return Err(InputError::Cancelled);
    }

    if input.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return parse_ipv4(input)
            .map(Target::Ip)
            .ok_or_else(|| InputError::InvalidTarget(input.to_string()));
    }

    if HOSTNAME.is_match(input) {
        return Ok(Target::Hostname(input.to_string()));
    }

    Err(InputError::InvalidTarget(input.to_string()))
}

fn parse_ipv4(input: &str) -> Option<Ipv4Addr> {
    if !IPV4_SHAPE.is_match(input) {
        return None;
    }

    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(input.split('.')) {
        if part.len() > 1 && part.starts_with('0') {
            return None;
        }
        *slot = part.parse::<u8>().ok()?;
    }
    Some(Ipv4Addr::from(octets))
}

/// Validate raw start/end bounds. Empty input takes the defaults (1 and 100).
pub fn validate_port_range(start_raw: &str, end_raw: &str) -> Result<PortRange, InputError> {
    let start = parse_port(start_raw, DEFAULT_START_PORT)?;
    let end = parse_port(end_raw, DEFAULT_END_PORT)?;
    PortRange::new(start, end)
}

fn parse_port(raw: &str, default: u16) -> Result<u16, InputError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }

    let value: u64 = raw
        .parse()
        .map_err(|_| InputError::InvalidPort(raw.to_string()))?;

    match u16::try_from(value) {
        Ok(port) if port >= 1 => Ok(port),
        _ => Err(InputError::PortOutOfRange(value)),
    }
}

/// clap value parser for the positional target.
pub fn parse_target_arg(input: &str) -> Result<Target, String> {
    validate_target(input).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ipv4() {
        for ip in ["0.0.0.0", "127.0.0.1", "192.168.1.1", "255.255.255.255", "10.0.0.100"] {
            assert!(
                matches!(validate_target(ip), Ok(Target::Ip(_))),
                "{} should be accepted",
                ip
            );
        }
        assert_eq!(
            validate_target("192.168.1.1").unwrap(),
            Target::Ip(Ipv4Addr::new(192, 168, 1, 1))
        );
    }

    #[test]
    fn test_invalid_ipv4() {
        for ip in ["256.1.1.1", "1.2.3.999", "1.2.3", "1.2.3.4.5", "1..2.3", "1234.1.1.1"] {
            assert!(validate_target(ip).is_err(), "{} should be rejected", ip);
        }
    }

    #[test]
    fn test_ipv4_displays_as_typed() {
        for ip in ["10.0.0.010", "010.0.0.1", "192.168.001.1", "00.1.2.3"] {
            assert!(
                matches!(validate_target(ip), Err(InputError::InvalidTarget(_))),
                "{} should be rejected",
                ip
            );
        }
        for ip in ["10.0.0.0", "0.0.0.0", "172.16.100.1"] {
            assert_eq!(validate_target(ip).unwrap().to_string(), ip);
        }
    }

    #[test]
    fn test_valid_hostnames() {
        for host in ["localhost", "example.com", "my-host.example.org", "a", "x1", "1host"] {
            assert_eq!(
                validate_target(host).unwrap(),
                Target::Hostname(host.to_string())
            );
        }
    }

    #[test]
    fn test_invalid_hostnames() {
        for host in ["-example.com", "example.com.", ".example", "exa mple", "host_name", "café.fr", "-"] {
            assert!(
                matches!(validate_target(host), Err(InputError::InvalidTarget(_))),
                "{} should be rejected",
                host
            );
        }
    }

    #[test]
    fn test_empty_and_cancel() {
        assert_eq!(validate_target(""), Err(InputError::Empty));
        assert_eq!(validate_target("   "), Err(InputError::Empty));
        assert_eq!(validate_target("exit"), Err(InputError::Cancelled));
        assert_eq!(validate_target(" EXIT "), Err(InputError::Cancelled));
    }

    #[test]
    fn test_target_is_trimmed() {
        assert_eq!(
            validate_target("  10.0.0.1\n").unwrap(),
            Target::Ip(Ipv4Addr::new(10, 0, 0, 1))
        );
    }

    #[test]
    fn test_default_port_range() {
        let range = validate_port_range("", "").unwrap();
        assert_eq!(range, PortRange::new(1, 100).unwrap());
        assert_eq!(range.len(), 100);
    }

    #[test]
    fn test_port_range_partial_defaults() {
        assert_eq!(validate_port_range("50", "").unwrap(), PortRange::new(50, 100).unwrap());
        assert_eq!(validate_port_range("", "20").unwrap(), PortRange::new(1, 20).unwrap());
    }

    #[test]
    fn test_port_range_start_after_end() {
        assert_eq!(
            validate_port_range("200", "100"),
            Err(InputError::StartAfterEnd { start: 200, end: 100 })
        );
        // start > default end
        assert!(validate_port_range("150", "").is_err());
    }

    #[test]
    fn test_port_range_bounds() {
        assert_eq!(validate_port_range("0", "10"), Err(InputError::PortOutOfRange(0)));
        assert_eq!(validate_port_range("1", "65536"), Err(InputError::PortOutOfRange(65536)));
        assert_eq!(validate_port_range("65535", "65535").unwrap().len(), 1);
        assert_eq!(validate_port_range("1", "65535").unwrap().len(), 65535);
    }

    #[test]
    fn test_port_range_non_numeric() {
        assert!(matches!(validate_port_range("abc", "10"), Err(InputError::InvalidPort(_))));
        assert!(matches!(validate_port_range("1", "-5"), Err(InputError::InvalidPort(_))));
        assert!(matches!(validate_port_range("1.5", "10"), Err(InputError::InvalidPort(_))));
    }

    #[test]
    fn test_port_range_iter() {
        let range = PortRange::new(8000, 8002).unwrap();
        assert_eq!(range.ports().collect::<Vec<_>>(), vec![8000, 8001, 8002]);
        assert_eq!(range.to_string(), "8000-8002");
    }
}

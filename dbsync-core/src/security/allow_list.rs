//! IP allow-list parsing and matching.
//!
//! The list is a newline-delimited file of literal addresses and CIDR blocks.
//! Blank lines and `#` comments are ignored. A missing or empty list denies
//! every non-loopback caller.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// One allow-list line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowEntry {
    /// Exact address match
    Ip(IpAddr),
    /// Network block
    Cidr { network: IpAddr, prefix: u8 },
}

impl FromStr for AllowEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            None => s
                .parse::<IpAddr>()
                .map(|ip| Self::Ip(ip.to_canonical()))
                .map_err(|e| format!("invalid address '{}': {}", s, e)),
            Some((addr, prefix)) => {
                let network = addr
                    .trim()
                    .parse::<IpAddr>()
                    .map_err(|e| format!("invalid network '{}': {}", addr, e))?
                    .to_canonical();
                let prefix: u8 = prefix
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid prefix length in '{}'", s))?;
                let max = if network.is_ipv4() { 32 } else { 128 };
                if prefix > max {
                    return Err(format!("prefix /{} out of range in '{}'", prefix, s));
                }
                Ok(Self::Cidr { network, prefix })
            }
        }
    }
}

impl AllowEntry {
    /// True when `ip` is this address or lies inside this block.
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        match *self {
            Self::Ip(allowed) => allowed == ip,
            Self::Cidr { network, prefix } => match (network, ip) {
                (IpAddr::V4(net), IpAddr::V4(candidate)) => {
                    let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
                    u32::from(net) & mask == u32::from(candidate) & mask
                }
                (IpAddr::V6(net), IpAddr::V6(candidate)) => {
                    let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
                    u128::from(net) & mask == u128::from(candidate) & mask
                }
                _ => false,
            },
        }
    }
}

/// Ordered set of allowed addresses and networks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpAllowList {
    entries: Vec<AllowEntry>,
}

impl IpAllowList {
    /// Parses allow-list text. Unparseable lines are logged and skipped.
    ///
    /// ```rust
    /// use dbsync_core::security::IpAllowList;
    ///
    /// let list = IpAllowList::parse("# office\n203.0.113.7\n10.0.0.0/8\n");
    /// assert!(list.contains("10.1.2.3".parse().unwrap()));
    /// assert!(!list.contains("192.168.1.1".parse().unwrap()));
    /// ```
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default().trim())
            .filter(|line| !line.is_empty())
            .filter_map(|line| match line.parse::<AllowEntry>() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Ignoring allow-list entry: {}", e);
                    None
                }
            })
            .collect();
        Self { entries }
    }

    /// Builds a list from already-parsed entries.
    pub fn from_entries(entries: Vec<AllowEntry>) -> Self {
        Self { entries }
    }

    /// Exact or CIDR containment match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.entries.iter().any(|entry| entry.contains(ip))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AllowEntry] {
        &self.entries
    }
}

/// Where the allow-list comes from. Files are re-read on every check.
#[derive(Debug, Clone)]
pub enum AllowListSource {
    File(PathBuf),
    Static(IpAllowList),
}

impl Default for AllowListSource {
    fn default() -> Self {
        Self::Static(IpAllowList::default())
    }
}

impl AllowListSource {
    /// Loads the current list. An unreadable or missing file yields an empty list.
    pub fn load(&self) -> IpAllowList {
        match self {
            Self::Static(list) => list.clone(),
            Self::File(path) => match std::fs::read_to_string(path) {
                Ok(text) => IpAllowList::parse(&text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("Allow-list {} not found, denying remote callers", path.display());
                    IpAllowList::default()
                }
                Err(e) => {
                    tracing::warn!("Failed to read allow-list {}: {}", path.display(), e);
                    IpAllowList::default()
                }
            },
        }
    }
}

/// True for loopback addresses (including IPv4-mapped) and the literal `localhost`.
pub fn is_loopback(raw: &str) -> bool {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("localhost") {
        return true;
    }
    raw.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.to_canonical().is_loopback())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let list = IpAllowList::parse("\n# comment\n  198.51.100.4  \n\n10.0.0.0/8 # lan\nnot-an-ip\n");
        assert_eq!(list.entries().len(), 2);
        assert!(list.contains(ip("198.51.100.4")));
        assert!(list.contains(ip("10.200.0.1")));
    }

    #[test]
    fn test_cidr_boundaries() {
        let entry: AllowEntry = "192.168.1.0/24".parse().unwrap();
        assert!(entry.contains(ip("192.168.1.0")));
        assert!(entry.contains(ip("192.168.1.255")));
        assert!(!entry.contains(ip("192.168.2.0")));

        let all: AllowEntry = "0.0.0.0/0".parse().unwrap();
        assert!(all.contains(ip("8.8.8.8")));

        let single: AllowEntry = "203.0.113.9/32".parse().unwrap();
        assert!(single.contains(ip("203.0.113.9")));
        assert!(!single.contains(ip("203.0.113.8")));
    }

    #[test]
    fn test_ipv6_cidr_and_mapped_addresses() {
        let entry: AllowEntry = "2001:db8::/32".parse().unwrap();
        assert!(entry.contains(ip("2001:db8:1::5")));
        assert!(!entry.contains(ip("2001:db9::1")));

        let v4: AllowEntry = "10.0.0.0/8".parse().unwrap();
        assert!(v4.contains(ip("::ffff:10.1.1.1")));
    }

    #[test]
    fn test_invalid_entries() {
        assert!("10.0.0.0/33".parse::<AllowEntry>().is_err());
        assert!("10.0.0.0/x".parse::<AllowEntry>().is_err());
        assert!("example.com".parse::<AllowEntry>().is_err());
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("::1"));
        assert!(is_loopback("[::1]"));
        assert!(is_loopback("::ffff:127.0.0.1"));
        assert!(is_loopback("LOCALHOST"));
        assert!(!is_loopback("10.0.0.1"));
        assert!(!is_loopback("garbage"));
    }

    #[test]
    fn test_file_source_is_reread() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let source = AllowListSource::File(file.path().to_path_buf());
        assert!(source.load().is_empty());

        writeln!(file, "203.0.113.0/24").unwrap();
        file.flush().unwrap();
        assert!(source.load().contains(ip("203.0.113.50")));
    }

    #[test]
    fn test_missing_file_denies() {
        let dir = tempfile::tempdir().unwrap();
        let source = AllowListSource::File(dir.path().join("absent.txt"));
        assert!(source.load().is_empty());
    }
}

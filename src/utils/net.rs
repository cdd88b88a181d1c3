//! # Redes IPv4, ACL y Throttle
//! src/utils/net.rs
//!
//! - `a.b.c.d[/n]` → [`Network`]
//! - `access_control_list` (`+0.0.0.0/0,-10.0.0.0/8`) → [`Acl`]
//! - `throttle` (`*=1k,10.0.0.0/8=0,/downloads/=5m`) → [`ThrottleRules`]

use super::{matches, split_option_list};
use std::net::{IpAddr, Ipv4Addr};

/// Red IPv4 en notación `a.b.c.d/bits`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Network {
    net: u32,
    mask: u32,
}

impl Network {
    /// Red que contiene todas las direcciones (`*`)
    pub const ANY: Network = Network { net: 0, mask: 0 };

    /// Parsea `a.b.c.d` o `a.b.c.d/n`. Todo el string debe consumirse.
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use httpd_engine::utils::net::Network;
    /// use std::net::Ipv4Addr;
    ///
    /// let net = Network::parse("192.168.0.0/16").unwrap();
    /// assert!(net.contains_v4(Ipv4Addr::new(192, 168, 4, 2)));
    /// assert!(Network::parse("192.168.0/16").is_none());
    /// ```
    pub fn parse(spec: &str) -> Option<Network> {
        let (addr, bits) = match spec.find('/') {
            Some(slash) => (&spec[..slash], spec[slash + 1..].parse::<u32>().ok()?),
            None => (spec, 32),
        };
        if bits > 32 {
            return None;
        }

        let mut octets = [0u8; 4];
        let mut parts = addr.split('.');
        for octet in octets.iter_mut() {
            let part = parts.next()?;
            if part.is_empty() || !part.bytes().all(|c| c.is_ascii_digit()) {
                return None;
            }
            *octet = part.parse().ok()?;
        }
        if parts.next().is_some() {
            return None;
        }

        let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
        Some(Network {
            net: u32::from(Ipv4Addr::from(octets)) & mask,
            mask,
        })
    }

    pub fn contains_v4(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask == self.net
    }

    /// Las direcciones IPv6 solo pertenecen a una red IPv4 si son
    /// IPv4-mapped, o si la red es `*`.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => self.contains_v4(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => self.contains_v4(v4),
                None => self.mask == 0,
            },
        }
    }
}

/// Lista de control de acceso evaluada al aceptar cada conexión.
///
/// Cada regla es `+red` (permitir) o `-red` (denegar); la última regla
/// que contiene a la dirección decide. Sin reglas todo se permite; con
/// reglas, lo que no coincide con ninguna se deniega.
#[derive(Debug, Clone, Default)]
pub struct Acl {
    rules: Vec<(bool, Network)>,
}

impl Acl {
    /// Parsea la opción `access_control_list`
    ///
    /// # Errores
    ///
    /// Retorna el elemento inválido si falta el signo o la red está mal formada.
    pub fn parse(list: &str) -> Result<Acl, String> {
        let mut rules = Vec::new();
        for item in list.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let allow = match item.as_bytes()[0] {
                b'+' => true,
                b'-' => false,
                _ => return Err(format!("Bad access control list entry: {}", item)),
            };
            let spec = &item[1..];
            let network = if spec == "*" {
                Network::ANY
            } else {
                Network::parse(spec)
                    .ok_or_else(|| format!("Bad access control list entry: {}", item))?
            };
            rules.push((allow, network));
        }
        Ok(Acl { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn allows(&self, ip: IpAddr) -> bool {
        let mut allowed = self.rules.is_empty();
        for (allow, network) in &self.rules {
            if network.contains(ip) {
                allowed = *allow;
            }
        }
        allowed
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ThrottleKey {
    Any,
    Network(Network),
    Uri(String),
}

/// Reglas de throttle: límite de bytes/segundo por red o por prefijo de URI.
#[derive(Debug, Clone, Default)]
pub struct ThrottleRules {
    rules: Vec<(ThrottleKey, u64)>,
}

impl ThrottleRules {
    /// Parsea la opción `throttle`.
    ///
    /// El valor admite decimales y los sufijos `k` (×1024) y `m` (×1048576).
    /// Un valor `0` significa sin límite.
    pub fn parse(spec: &str) -> Result<ThrottleRules, String> {
        let mut rules = Vec::new();
        for (key, value) in split_option_list(spec) {
            let value = value.ok_or_else(|| format!("Bad throttle entry: {}", key))?;
            let rate = parse_rate(value).ok_or_else(|| format!("Bad throttle rate: {}", value))?;
            let key = if key == "*" {
                ThrottleKey::Any
            } else if let Some(network) = Network::parse(key) {
                ThrottleKey::Network(network)
            } else {
                ThrottleKey::Uri(key.to_string())
            };
            rules.push((key, rate));
        }
        Ok(ThrottleRules { rules })
    }

    /// Límite en bytes/segundo para una conexión y un URI (0 = ilimitado)
    pub fn limit_for(&self, remote: IpAddr, uri: &str) -> u64 {
        let mut limit = 0;
        for (key, rate) in &self.rules {
            let hit = match key {
                ThrottleKey::Any => true,
                ThrottleKey::Network(network) => network.contains(remote),
                ThrottleKey::Uri(pattern) => matches(pattern, uri),
            };
            if hit {
                limit = *rate;
            }
        }
        limit
    }
}

fn parse_rate(value: &str) -> Option<u64> {
    let value = value.trim();
    let (number, multiplier) = match value.as_bytes().last()? {
        b'k' | b'K' => (&value[..value.len() - 1], 1024.0),
        b'm' | b'M' => (&value[..value.len() - 1], 1_048_576.0),
        _ => (value, 1.0),
    };
    let rate: f64 = number.parse().ok()?;
    if rate < 0.0 || !rate.is_finite() {
        return None;
    }
    Some((rate * multiplier) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    // ==================== Network ====================

    #[test]
    fn test_parse_network() {
        let net = Network::parse("10.0.0.0/8").unwrap();
        assert!(net.contains(v4(10, 1, 2, 3)));
        assert!(!net.contains(v4(11, 0, 0, 1)));

        let host = Network::parse("127.0.0.1").unwrap();
        assert!(host.contains(v4(127, 0, 0, 1)));
        assert!(!host.contains(v4(127, 0, 0, 2)));
    }

    #[test]
    fn test_parse_network_rejects_garbage() {
        assert!(Network::parse("").is_none());
        assert!(Network::parse("1.2.3.4/33").is_none());
        assert!(Network::parse("1.2.3.256").is_none());
        assert!(Network::parse("1.2.3.4.5").is_none());
        assert!(Network::parse("a.b.c.d").is_none());
    }

    #[test]
    fn test_ipv4_mapped_ipv6() {
        let net = Network::parse("127.0.0.0/8").unwrap();
        let mapped: IpAddr = "::ffff:127.0.0.1".parse().unwrap();
        assert!(net.contains(mapped));
        let pure: IpAddr = "::1".parse().unwrap();
        assert!(!net.contains(pure));
        assert!(Network::ANY.contains(pure));
    }

    // ==================== ACL ====================

    #[test]
    fn test_empty_acl_allows_all() {
        let acl = Acl::parse("").unwrap();
        assert!(acl.is_empty());
        assert!(acl.allows(v4(8, 8, 8, 8)));
    }

    #[test]
    fn test_acl_default_deny_when_rules_exist() {
        let acl = Acl::parse("+192.168.0.0/16").unwrap();
        assert!(acl.allows(v4(192, 168, 1, 1)));
        assert!(!acl.allows(v4(10, 0, 0, 1)));
    }

    #[test]
    fn test_acl_last_match_wins() {
        let acl = Acl::parse("-0.0.0.0/0,+192.168.1.0/24,-192.168.1.13").unwrap();
        assert!(acl.allows(v4(192, 168, 1, 12)));
        assert!(!acl.allows(v4(192, 168, 1, 13)));
        assert!(!acl.allows(v4(10, 0, 0, 1)));
    }

    #[test]
    fn test_acl_star() {
        let acl = Acl::parse("+*,-10.0.0.0/8").unwrap();
        assert!(acl.allows(v4(1, 2, 3, 4)));
        assert!(!acl.allows(v4(10, 9, 9, 9)));
    }

    #[test]
    fn test_acl_malformed() {
        assert!(Acl::parse("192.168.0.0/16").is_err());
        assert!(Acl::parse("+192.168.0/16").is_err());
    }

    // ==================== Throttle ====================

    #[test]
    fn test_throttle_rates_and_suffixes() {
        let rules = ThrottleRules::parse("*=1k,10.0.0.0/8=0,/downloads/=5m").unwrap();
        assert_eq!(rules.limit_for(v4(1, 1, 1, 1), "/index.html"), 1024);
        assert_eq!(rules.limit_for(v4(10, 0, 0, 1), "/index.html"), 0);
        assert_eq!(rules.limit_for(v4(1, 1, 1, 1), "/downloads/big.iso"), 5 * 1_048_576);
        // La última regla que coincide gana
        assert_eq!(rules.limit_for(v4(10, 0, 0, 1), "/downloads/x"), 5 * 1_048_576);
    }

    #[test]
    fn test_throttle_fractional_rate() {
        let rules = ThrottleRules::parse("*=0.5k").unwrap();
        assert_eq!(rules.limit_for(v4(1, 1, 1, 1), "/"), 512);
    }

    #[test]
    fn test_throttle_rejects_bad_entries() {
        assert!(ThrottleRules::parse("*").is_err());
        assert!(ThrottleRules::parse("*=fast").is_err());
    }
}

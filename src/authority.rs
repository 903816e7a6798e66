//! The well-known Tor directory authorities (§3, §4.4).
//!
//! Grounded on `bushel.DIRECTORY_AUTHORITIES` for the endpoint list and on
//! `tor_dirmgr::authority::{Authority, default_authorities}` for the shape
//! (a name plus a v3 identity fingerprint) and the in-source table style.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Which port on an authority accepts a given kind of connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// A plaintext HTTP directory port.
    DirPort(SocketAddr),
    /// An onion-routing port; directory requests over this port are
    /// tunneled through a one-hop circuit (§4.4, `ENDPOINT_MODE`
    /// `DirectoryCache`/`Client`).
    OrPort(SocketAddr),
}

impl Endpoint {
    /// The underlying socket address, regardless of port kind.
    pub fn addr(&self) -> SocketAddr {
        match self {
            Endpoint::DirPort(a) | Endpoint::OrPort(a) => *a,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::DirPort(a) => write!(f, "{a} (dirport)"),
            Endpoint::OrPort(a) => write!(f, "{a} (orport)"),
        }
    }
}

/// A single directory authority: its memorable nickname, its v3 identity
/// fingerprint, and the endpoint the crawler reaches it at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    /// A memorable nickname, e.g. `"moria1"`.
    pub name: &'static str,
    /// The 40-hex-digit v3 identity fingerprint that this authority signs
    /// votes and certificates with.
    pub v3ident: &'static str,
    /// The endpoint the crawler contacts this authority at.
    pub endpoint: Endpoint,
}

fn dirport(name: &'static str, v3ident: &'static str, ip: &str, port: u16) -> Authority {
    let addr: IpAddr = ip.parse().expect("built-in authority address is valid");
    Authority {
        name,
        v3ident,
        endpoint: Endpoint::DirPort(SocketAddr::new(addr, port)),
    }
}

fn orport(name: &'static str, v3ident: &'static str, ip: &str, port: u16) -> Authority {
    let addr: IpAddr = ip.parse().expect("built-in authority address is valid");
    Authority {
        name,
        v3ident,
        endpoint: Endpoint::OrPort(SocketAddr::new(addr, port)),
    }
}

/// The current set of well-known directory authorities.
///
/// Endpoints and v3idents as published in the Tor consensus; nicknames and
/// addresses come from `bushel.DIRECTORY_AUTHORITIES`, v3idents from
/// `tor_dirmgr::authority::default_authorities`.
pub fn default_authorities() -> Vec<Authority> {
    vec![
        dirport(
            "moria1",
            "F533C81CEF0BC0267857C99B2F471ADF249FA232",
            "128.31.0.39",
            9131,
        ),
        orport(
            "tor26",
            "2F3DF9CA0E5D36F2685A2DA67184EB8DCB8CBA8C",
            "86.59.21.38",
            443,
        ),
        dirport(
            "dizum",
            "E8A9C45EDE6D711294FADF8E7951F4DE6CA56B58",
            "194.109.206.212",
            80,
        ),
        dirport(
            "gabelmoo",
            "ED03BB616EB2F60BEC80151114BB25CEF515B226",
            "131.188.40.189",
            80,
        ),
        dirport(
            "dannenberg",
            "0232AF901C31A04EE9848595AF9BB7620D4C5B2E",
            "193.23.244.244",
            80,
        ),
        dirport(
            "maatuska",
            "49015F787433103580E3B66A1707A00E60F2D15B",
            "171.25.193.9",
            443,
        ),
        dirport(
            "Faravahar",
            "EFCBE720AB3A82B99F9E953CD5BF50F7EEFC7B97",
            "154.35.175.225",
            80,
        ),
        dirport(
            "longclaw",
            "23D15D965BC35114467363C165C4F724B64B4F66",
            "199.58.81.140",
            80,
        ),
        dirport(
            "bastet",
            "27102BC123E7AF1D4741AE047E160C91ADC76B21",
            "204.13.164.11",
            80,
        ),
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nine_authorities() {
        assert_eq!(default_authorities().len(), 9);
    }

    #[test]
    fn first_is_moria1() {
        let auths = default_authorities();
        assert_eq!(auths[0].name, "moria1");
        assert_eq!(auths[0].v3ident.len(), 40);
    }

    #[test]
    fn tor26_uses_orport() {
        let auths = default_authorities();
        let tor26 = auths.iter().find(|a| a.name == "tor26").unwrap();
        assert!(matches!(tor26.endpoint, Endpoint::OrPort(_)));
    }

    #[test]
    fn names_are_unique() {
        let auths = default_authorities();
        let mut names: Vec<_> = auths.iter().map(|a| a.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), auths.len());
    }
}

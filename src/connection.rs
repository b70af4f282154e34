//! Connection candidate scoring and selection.
//!
//! A discovered server advertises several network paths (local address,
//! public address, relay). Relayed paths drop large lossless transfers often
//! enough that a direct path must always win when one exists, regardless of
//! locality.

use std::cmp::Reverse;
use std::net::IpAddr;

/// One reachable network path to a media server.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ServerConnection {
    /// Transport scheme, `http` or `https`.
    pub protocol: String,
    /// Host address as advertised by discovery; may be an IP or a hostname.
    pub address: String,
    pub port: u16,
    /// Composed URI for this path.
    pub uri: String,
    /// Advertised as being on the server's local network.
    pub local: bool,
    /// Proxied through the relay service.
    pub relay: bool,
    pub ipv6: bool,
}

/// Whether `address` falls in a standard private/local range.
///
/// Covers IPv4 10/8, 172.16/12, 192.168/16 and loopback, plus IPv6
/// link-local (fe80::/10), unique-local (fc00::/7) and loopback. Hostnames
/// that do not parse as IPs are treated as public.
pub fn is_private_address(address: &str) -> bool {
    let trimmed = address.trim_start_matches('[').trim_end_matches(']');
    match trimmed.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_private() || v4.is_loopback(),
        Ok(IpAddr::V6(v6)) => {
            let first_segment = v6.segments()[0];
            v6.is_loopback()
                || (first_segment & 0xffc0) == 0xfe80 // link-local
                || (first_segment & 0xfe00) == 0xfc00 // unique-local
        }
        Err(_) => false,
    }
}

/// Scores one candidate; higher wins.
pub fn score_connection(connection: &ServerConnection, local_dev: bool) -> i32 {
    let mut score = 0;

    let private = is_private_address(&connection.address);
    if local_dev {
        if connection.local {
            score += 100;
        }
        if private {
            score += 50;
        }
    } else {
        if !connection.local {
            score += 100;
        }
        if !private {
            score += 50;
        }
    }

    if connection.protocol.eq_ignore_ascii_case("https") {
        score += 20;
    }

    // Direct paths always beat relayed ones, whatever the locality says.
    if connection.relay {
        score -= 100;
    } else {
        score += 200;
    }

    if !connection.ipv6 {
        score += 10;
    }

    score
}

/// Picks the best candidate, or `None` for an empty list.
///
/// Pure and deterministic: the sort is stable, so ties resolve to the
/// earliest candidate in input order.
pub fn select_best_connection(
    connections: &[ServerConnection],
    local_dev: bool,
) -> Option<&ServerConnection> {
    let mut ranked: Vec<&ServerConnection> = connections.iter().collect();
    ranked.sort_by_key(|connection| Reverse(score_connection(connection, local_dev)));
    ranked.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(uri: &str, local: bool, relay: bool) -> ServerConnection {
        let protocol = uri.split(':').next().unwrap_or("http").to_string();
        ServerConnection {
            protocol,
            address: "203.0.113.10".to_string(),
            port: 32400,
            uri: uri.to_string(),
            local,
            relay,
            ipv6: false,
        }
    }

    #[test]
    fn test_selection_is_deterministic_for_fixed_input() {
        let candidates = vec![
            connection("https://one.example:32400", false, false),
            connection("https://two.example:32400", false, false),
            connection("http://three.example:32400", true, true),
        ];
        let first_pick = select_best_connection(&candidates, false)
            .map(|c| c.uri.clone())
            .expect("non-empty list should select");
        for _ in 0..20 {
            let pick = select_best_connection(&candidates, false).map(|c| c.uri.clone());
            assert_eq!(pick.as_deref(), Some(first_pick.as_str()));
        }
    }

    #[test]
    fn test_non_relay_always_beats_relay() {
        let relay = connection("https://relay.example:32400", false, true);
        let direct = connection("https://direct.example:32400", false, false);
        let candidates = [relay.clone(), direct.clone()];
        let picked = select_best_connection(&candidates, false)
            .expect("non-empty list should select");
        assert_eq!(picked.uri, direct.uri);

        // Order independence.
        let candidates = [direct.clone(), relay];
        let picked = select_best_connection(&candidates, false)
            .expect("non-empty list should select");
        assert_eq!(picked.uri, direct.uri);
    }

    #[test]
    fn test_sole_relay_candidate_is_still_selected() {
        let relay = connection("https://relay.example:32400", false, true);
        let picked = select_best_connection(std::slice::from_ref(&relay), false)
            .expect("sole candidate should win");
        assert_eq!(picked.uri, relay.uri);
    }

    #[test]
    fn test_empty_candidate_list_selects_nothing() {
        assert!(select_best_connection(&[], false).is_none());
        assert!(select_best_connection(&[], true).is_none());
    }

    #[test]
    fn test_local_dev_prefers_local_candidates() {
        let mut local = connection("http://192.168.1.20:32400", true, false);
        local.address = "192.168.1.20".to_string();
        let public = connection("https://public.example:32400", false, false);

        let candidates = [public.clone(), local.clone()];
        let picked = select_best_connection(&candidates, true)
            .expect("non-empty list should select");
        assert_eq!(picked.uri, local.uri);

        let candidates = [public.clone(), local];
        let picked = select_best_connection(&candidates, false)
            .expect("non-empty list should select");
        assert_eq!(picked.uri, public.uri);
    }

    #[test]
    fn test_https_breaks_otherwise_equal_candidates() {
        let plain = connection("http://one.example:32400", false, false);
        let tls = connection("https://two.example:32400", false, false);
        let candidates = [plain, tls.clone()];
        let picked = select_best_connection(&candidates, false)
            .expect("non-empty list should select");
        assert_eq!(picked.uri, tls.uri);
    }

    #[test]
    fn test_private_address_classification() {
        for address in [
            "10.0.0.1",
            "172.16.4.2",
            "172.31.255.254",
            "192.168.0.10",
            "127.0.0.1",
            "fe80::1",
            "fd12:3456::1",
            "fc00::1",
            "::1",
            "[fe80::2]",
        ] {
            assert!(is_private_address(address), "{address} should be private");
        }
        for address in [
            "8.8.8.8",
            "172.32.0.1",
            "193.168.0.1",
            "2600:1700::1",
            "plex.example.com",
        ] {
            assert!(!is_private_address(address), "{address} should be public");
        }
    }
}

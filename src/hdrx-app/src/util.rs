// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

/// Normalize a name to lowercase alphanumeric.
pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Split `host[:port]`, using `default_port` when no port is given.
///
/// Bracketed IPv6 literals (`[::1]:1234`) are accepted.
pub fn split_host_port(addr: &str, default_port: u16) -> Result<(String, u16), String> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err("empty address".into());
    }

    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| format!("unterminated '[' in '{addr}'"))?;
        (host, tail.strip_prefix(':'))
    } else {
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => (host, Some(port)),
            _ => (addr, None),
        }
    };

    let port = match port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| format!("invalid port '{p}' in '{addr}'"))?,
        None => default_port,
    };
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("RTL-SDR"), "rtlsdr");
        assert_eq!(normalize_name("rtl_tcp"), "rtltcp");
        assert_eq!(normalize_name("Soapy SDR"), "soapysdr");
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("localhost", 1234).unwrap(),
            ("localhost".to_string(), 1234)
        );
        assert_eq!(
            split_host_port("10.0.0.2:7373", 1234).unwrap(),
            ("10.0.0.2".to_string(), 7373)
        );
        assert_eq!(
            split_host_port("[::1]:9000", 1234).unwrap(),
            ("::1".to_string(), 9000)
        );
        assert_eq!(split_host_port("::1", 1234).unwrap(), ("::1".to_string(), 1234));
        assert!(split_host_port("host:http", 1234).is_err());
        assert!(split_host_port("", 1234).is_err());
    }
}

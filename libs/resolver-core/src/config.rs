//! Intake of the daemon configuration file.
//!
//! Only the `[Resolve]` section is recognized. The format is the usual
//! `KEY=value` dialect with `#`/`;` comments; values are split into words
//! with shell-style quoting rules.

use std::io;
use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context as _, Result};

/// Servers used until (and unless) a `DNS=` assignment replaces them.
pub const FALLBACK_DNS_SERVERS: &str = "8.8.8.8 8.8.4.4 2001:4860:4860::8888 2001:4860:4860::8844";

/// Parsed view of the configuration file.
///
/// `dns` holds the raw `DNS=` assignment values in source order. They are
/// applied to the Manager one by one because an empty assignment clears
/// the global server list rather than being a no-op.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveConfig {
    pub dns: Vec<String>,
}

/// Read and parse the configuration file. A missing file is not an error.
pub fn load(path: &Path) -> Result<ResolveConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");

            return Ok(ResolveConfig::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    Ok(parse(&content))
}

fn parse(content: &str) -> ResolveConfig {
    let mut config = ResolveConfig::default();
    let mut in_resolve_section = false;

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') {
            in_resolve_section = line == "[Resolve]";
            continue;
        }

        if !in_resolve_section {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            tracing::warn!(%line, "Ignoring malformed configuration line");
            continue;
        };

        match key.trim() {
            "DNS" => config.dns.push(value.trim().to_owned()),
            key => tracing::warn!(%key, "Ignoring unknown [Resolve] option"),
        }
    }

    config
}

/// Split a whitespace-separated (optionally quoted) list of IP literals.
/// Invalid literals are skipped with a warning.
pub fn parse_ip_list(value: &str) -> Vec<IpAddr> {
    let Some(words) = shlex::split(value) else {
        tracing::warn!(%value, "Failed to split DNS server list");

        return Vec::new();
    };

    words
        .iter()
        .filter_map(|word| match word.parse::<IpAddr>() {
            Ok(address) => Some(address),
            Err(_) => {
                tracing::warn!(address = %word, "Ignoring invalid DNS address");

                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_dns_assignments_in_source_order() {
        let config = parse(
            "[Resolve]\n\
             DNS=1.1.1.1 8.8.8.8\n\
             DNS=\n\
             DNS=9.9.9.9\n",
        );

        assert_eq!(config.dns, vec!["1.1.1.1 8.8.8.8", "", "9.9.9.9"]);
    }

    #[test]
    fn ignores_options_outside_the_resolve_section() {
        let config = parse(
            "[Network]\n\
             DNS=1.1.1.1\n\
             [Resolve]\n\
             DNS=8.8.8.8\n\
             [Other]\n\
             DNS=9.9.9.9\n",
        );

        assert_eq!(config.dns, vec!["8.8.8.8"]);
    }

    #[test]
    fn skips_comments_and_unknown_keys() {
        let config = parse(
            "[Resolve]\n\
             # a comment\n\
             ; another comment\n\
             LLMNR=yes\n\
             DNS=1.1.1.1\n",
        );

        assert_eq!(config.dns, vec!["1.1.1.1"]);
    }

    #[test]
    fn parse_ip_list_skips_invalid_literals() {
        let addresses = parse_ip_list("1.1.1.1 not-an-ip ::1");

        assert_eq!(
            addresses,
            vec![
                "1.1.1.1".parse::<IpAddr>().unwrap(),
                "::1".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn parse_ip_list_understands_quoting() {
        let addresses = parse_ip_list(r#""8.8.8.8" '2001:4860:4860::8888'"#);

        assert_eq!(
            addresses,
            vec![
                "8.8.8.8".parse::<IpAddr>().unwrap(),
                "2001:4860:4860::8888".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn parse_ip_list_rejects_unbalanced_quotes() {
        assert_eq!(parse_ip_list("\"1.1.1.1"), Vec::<IpAddr>::new());
    }

    #[test]
    fn parse_ip_list_of_empty_value_is_empty() {
        assert_eq!(parse_ip_list(""), Vec::<IpAddr>::new());
    }

    #[test]
    fn missing_file_yields_default_config() {
        let config = load(Path::new("/nonexistent/resolverd.conf")).unwrap();

        assert_eq!(config, ResolveConfig::default());
    }
}

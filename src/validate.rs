//! DNS name validation

use regex::Regex;
use std::sync::LazyLock;

/// Maximum length of a fully qualified domain name
pub const MAX_FQDN_LEN: usize = 253;

/// Maximum length of a single DNS label
pub const MAX_LABEL_LEN: usize = 63;

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("valid label pattern")
});

static TLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z]{2,63}|xn--[A-Za-z0-9-]{1,59})$").expect("valid tld pattern")
});

/// A single hostname label (no dots)
pub fn is_label(s: &str) -> bool {
    LABEL.is_match(s)
}

/// A domain name with at least two labels and an alphabetic TLD
pub fn is_domain(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_FQDN_LEN {
        return false;
    }

    let labels: Vec<&str> = s.split('.').collect();
    let Some((tld, rest)) = labels.split_last() else {
        return false;
    };

    !rest.is_empty() && rest.iter().all(|l| is_label(l)) && TLD.is_match(tld)
}

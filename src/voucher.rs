//! Voucher Code Extraction
//!
//! Users paste whole gift links, bare codes, or codes with stray
//! punctuation. `extract` normalizes all of them into the alphanumeric
//! code the provider expects. It never fails; an empty result is rejected
//! downstream as an invalid voucher.

use regex::Regex;
use std::sync::OnceLock;

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"v=([a-zA-Z0-9]+)").expect("static regex"))
}

/// Extract the canonical voucher code from a user-supplied link
///
/// A `v=<alphanumeric>` query marker wins; otherwise every
/// non-alphanumeric character is stripped from the input.
pub fn extract(link: &str) -> String {
    if let Some(caps) = marker_re().captures(link) {
        return caps[1].to_string();
    }
    link.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

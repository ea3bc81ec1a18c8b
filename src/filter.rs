//! Filter engine: phone-number lists and per-destination keyword rules.
//!
//! Everything here is a pure function of its inputs so routing can compute
//! the eligible (message, destination) pairs before dispatching anything.
//!
//! - Blacklist hit → message rejected for every destination
//! - Whitelist on → origin must be listed
//! - Keyword filter → body contains a keyword literally, or matches one as a regex

use regex::Regex;
use tracing::debug;

use crate::message::{Destination, FilterRule, ListKind, Message};

/// Outcome of the phone-number stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneVerdict {
    Admit,
    NotWhitelisted,
    Blacklisted,
}

impl PhoneVerdict {
    pub fn admits(&self) -> bool {
        matches!(self, Self::Admit)
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Admit => "admit",
            Self::NotWhitelisted => "not_whitelisted",
            Self::Blacklisted => "blacklisted",
        }
    }
}

fn listed(address: &str, kind: ListKind, rules: &[FilterRule]) -> bool {
    rules
        .iter()
        .any(|r| r.kind == kind && r.phone_number == address)
}

/// Evaluate an address against the whitelist/blacklist toggles.
///
/// With both toggles on, the blacklist is checked first.
pub fn phone_verdict(
    address: &str,
    whitelist_enabled: bool,
    blacklist_enabled: bool,
    rules: &[FilterRule],
) -> PhoneVerdict {
    if blacklist_enabled && listed(address, ListKind::Blacklist, rules) {
        return PhoneVerdict::Blacklisted;
    }
    if whitelist_enabled && !listed(address, ListKind::Whitelist, rules) {
        return PhoneVerdict::NotWhitelisted;
    }
    PhoneVerdict::Admit
}

/// Split a destination's comma-separated keyword string.
///
/// Entries are trimmed and empty entries dropped, so `""` or `" , "` yields
/// no keywords at all. `"alert, down"` therefore matches `down`, not the
/// literal `" down"`.
pub fn parse_keywords(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .collect()
}

/// Case-sensitive literal substring match against any keyword.
pub fn matches_keywords(body: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| body.contains(k))
}

/// Regex match against any keyword. Keywords that do not compile are skipped.
pub fn matches_regex(body: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| match Regex::new(k) {
        Ok(re) => re.is_match(body),
        Err(e) => {
            debug!(keyword = %k, error = %e, "Keyword is not a valid regex");
            false
        }
    })
}

/// Keyword stage for one destination. Passes when the destination has no
/// active keywords.
pub fn passes_keyword_filter(body: &str, destination: &Destination) -> bool {
    let keywords = destination.active_keywords();
    if keywords.is_empty() {
        return true;
    }
    matches_keywords(body, &keywords) || matches_regex(body, &keywords)
}

/// Full admission check for one message and one destination.
pub fn should_accept(
    message: &Message,
    destination: &Destination,
    whitelist_enabled: bool,
    blacklist_enabled: bool,
    rules: &[FilterRule],
) -> bool {
    phone_verdict(&message.from, whitelist_enabled, blacklist_enabled, rules).admits()
        && passes_keyword_filter(&message.body, destination)
}

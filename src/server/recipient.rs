//! Recipient normalization for the transport's addressing scheme.

/// Suffix marking an individual-chat address.
pub const ADDRESS_SUFFIX: &str = "@c.us";
/// Shortest normalized recipient accepted.
pub const MIN_RECIPIENT_LEN: usize = 10;

/// Keep only ASCII digits and `+`. Returns `None` when fewer than
/// [`MIN_RECIPIENT_LEN`] characters remain.
pub fn normalize_recipient(raw: &str) -> Option<String> {
    let normalized: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    (normalized.len() >= MIN_RECIPIENT_LEN).then_some(normalized)
}

/// Full transport address for a normalized recipient.
pub fn to_address(normalized: &str) -> String {
    if normalized.contains(ADDRESS_SUFFIX) {
        normalized.to_string()
    } else {
        format!("{normalized}{ADDRESS_SUFFIX}")
    }
}

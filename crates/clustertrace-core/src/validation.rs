//! Namespace syntax validation for query filters (§6.4): "Namespaces must
//! match the standard character/length rules (<=63, lowercase-alphanumeric-
//! and-hyphens, not leading/trailing hyphen)". Pure, stateless, no crate
//! needed; the same DNS-1123 label shape Kubernetes itself enforces on the
//! write side, re-checked here on the read side since the engine never
//! trusts that every caller already validated it upstream.

const MAX_NAMESPACE_LEN: usize = 63;

/// `true` for the empty string (meaning "unconstrained", §4.6) or a valid
/// DNS-1123 label: lowercase alphanumeric or `-`, not leading/trailing `-`,
/// at most 63 characters.
pub fn is_valid_namespace_filter(namespace: &str) -> bool {
    if namespace.is_empty() {
        return true;
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return false;
    }
    if !namespace.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }
    !namespace.starts_with('-') && !namespace.ends_with('-')
}

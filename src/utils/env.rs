/// Get environment variable with PAYHOOK_ prefix, falling back to unprefixed version
///
/// Checks `PAYHOOK_{key}` first, then `{key}`.
///
/// # Examples
///
/// ```rust
/// use payhook::utils::get_env_with_prefix;
///
/// // Checks PAYHOOK_WEBHOOK_MAX_ATTEMPTS first, then WEBHOOK_MAX_ATTEMPTS
/// let max_attempts = get_env_with_prefix("WEBHOOK_MAX_ATTEMPTS");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("PAYHOOK_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Names of the gateways declared through `PAYHOOK_GATEWAY_<NAME>_SECRET`.
///
/// Names are lowercased; the result is sorted so configuration is
/// deterministic regardless of environment ordering.
pub fn gateway_names_from_env() -> Vec<String> {
    let mut names: Vec<String> = std::env::vars()
        .filter_map(|(key, _)| {
            key.strip_prefix("PAYHOOK_GATEWAY_")
                .and_then(|rest| rest.strip_suffix("_SECRET"))
                .filter(|name| !name.is_empty())
                .map(str::to_lowercase)
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

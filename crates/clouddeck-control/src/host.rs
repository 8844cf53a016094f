//! Recognition of the managed machine's address.

use clouddeck_store::CredentialStore;

/// Reduce an address to a bare host.
///
/// A URL yields its host. Anything else loses its path, IPv6 brackets and a
/// single trailing `:port`. The result is lowercased.
#[must_use]
pub fn normalize_address(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        if let Some(host) = reqwest::Url::parse(address)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
        {
            return host.trim_matches(['[', ']']).to_ascii_lowercase();
        }
    }

    let mut host = match address.find('/') {
        Some(index) if index > 0 => &address[..index],
        _ => address,
    };

    if let Some(inner) = host.strip_prefix('[') {
        host = inner.find(']').map_or(inner, |end| &inner[..end]);
    } else if host.matches(':').count() == 1 {
        if let Some((name, _port)) = host.split_once(':') {
            host = name;
        }
    }

    host.trim().to_ascii_lowercase()
}

/// Returns `true` if `address` names the machine recorded in `store`.
///
/// Unreadable or missing stored addresses never match.
#[must_use]
pub fn is_clouddeck_host(store: &dyn CredentialStore, address: &str) -> bool {
    let candidate = normalize_address(address);
    if candidate.is_empty() {
        return false;
    }
    match store.stored_server_address() {
        Ok(Some(stored)) => {
            let stored = normalize_address(&stored);
            !stored.is_empty() && stored == candidate
        }
        Ok(None) => false,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read stored server address");
            false
        }
    }
}

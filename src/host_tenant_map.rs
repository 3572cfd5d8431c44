//! Host → tenant override table (spec.md §4.H step 4).
//!
//! Grounded on `original_source/backend/app/processing/tenant_mapping.py`:
//! a flat JSON object of `host -> tenant_id`, keys lowercased and
//! whitespace-folded to hyphens at load time. Missing file yields an empty
//! map, same "never raise on missing config" posture as the tenant
//! registry.

use std::collections::HashMap;
use std::path::Path;

pub struct HostTenantMap(HashMap<String, String>);

impl HostTenantMap {
    pub fn load(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Self(HashMap::new());
        };
        let Ok(raw) = serde_json::from_str::<HashMap<String, String>>(&contents) else {
            return Self(HashMap::new());
        };
        let normalized = raw
            .into_iter()
            .map(|(k, v)| (normalize_key(&k), v))
            .collect();
        Self(normalized)
    }

    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    pub fn lookup(&self, host: &str) -> Option<&str> {
        if host.is_empty() {
            return None;
        }
        self.0.get(&normalize_key(host)).map(String::as_str)
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_map() {
        let map = HostTenantMap::load(Path::new("/nonexistent/host_tenant_map.json"));
        assert_eq!(map.lookup("anything"), None);
    }

    #[test]
    fn keys_are_normalized() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"Delaware Hotel": "acme"}"#).unwrap();
        let map = HostTenantMap::load(file.path());
        assert_eq!(map.lookup("delaware-hotel"), Some("acme"));
        assert_eq!(map.lookup("DELAWARE HOTEL"), Some("acme"));
    }

    #[test]
    fn empty_host_never_matches() {
        let map = HostTenantMap::empty();
        assert_eq!(map.lookup(""), None);
    }
}

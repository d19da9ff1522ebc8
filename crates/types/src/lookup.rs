//! Case-insensitive map lookups.
//!
//! Workflow identifiers (stage names, API references, environment names,
//! catalog versions) compare case-insensitively. These helpers centralize the
//! scan so callers do not hand-roll `eq_ignore_ascii_case` loops.

use indexmap::IndexMap;
use std::collections::HashMap;

/// Looks up a key in an ordered map ignoring ASCII case.
pub fn get_ignore_case<'m, V>(map: &'m IndexMap<String, V>, key: &str) -> Option<&'m V> {
    map.iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
        .map(|(_, value)| value)
}

/// Looks up a key in an unordered string map ignoring ASCII case.
pub fn get_str_ignore_case<'m>(map: &'m HashMap<String, String>, key: &str) -> Option<&'m str> {
    map.iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    #[test]
    fn indexmap_lookup_ignores_case() {
        let map = indexmap! {"BaseUrl".to_string() => 1};
        assert_eq!(get_ignore_case(&map, "baseurl"), Some(&1));
        assert_eq!(get_ignore_case(&map, "BASEURL"), Some(&1));
        assert_eq!(get_ignore_case(&map, "other"), None);
    }

    #[test]
    fn hashmap_lookup_ignores_case() {
        let mut map = HashMap::new();
        map.insert("Region".to_string(), "eu".to_string());
        assert_eq!(get_str_ignore_case(&map, "REGION"), Some("eu"));
        assert_eq!(get_str_ignore_case(&map, "missing"), None);
    }
}

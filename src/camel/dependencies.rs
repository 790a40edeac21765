//! Dependency notation helpers

/// Convert the various camel dependency spellings (`camel-xxx`, `camel-quarkus-xxx`,
/// `camel-quarkus:xxx`, `camel-k-xxx`) into the unified `camel:xxx` / `camel-k:xxx` form.
pub fn normalize_dependency(dependency: &str) -> String {
    if let Some(rest) = dependency.strip_prefix("camel-quarkus-") {
        format!("camel:{}", rest)
    } else if let Some(rest) = dependency.strip_prefix("camel-quarkus:") {
        format!("camel:{}", rest)
    } else if let Some(rest) = dependency.strip_prefix("camel-k-") {
        format!("camel-k:{}", rest)
    } else if dependency.starts_with("camel-k:") {
        dependency.to_string()
    } else if let Some(rest) = dependency.strip_prefix("camel-") {
        format!("camel:{}", rest)
    } else {
        dependency.to_string()
    }
}

/// Insert `dependency` keeping `list` sorted and free of duplicates
pub fn add_sorted_unique(list: &mut Vec<String>, dependency: String) {
    if let Err(position) = list.binary_search(&dependency) {
        list.insert(position, dependency);
    }
}

//! Endpoint URI extraction from route sources

use super::CamelCatalog;
use crate::apis::{Language, SourceSpec};
use regex::Regex;
use std::collections::BTreeSet;

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("unable to determine the language of source {0}")]
    UnknownLanguage(String),
}

/// Endpoints found in a source
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceMetadata {
    pub from_uris: Vec<String>,
    pub to_uris: Vec<String>,
}

impl SourceMetadata {
    /// Schemes of every endpoint, sorted
    pub fn schemes(&self) -> BTreeSet<String> {
        self.from_uris
            .iter()
            .chain(self.to_uris.iter())
            .filter_map(|uri| uri_scheme(uri))
            .map(str::to_string)
            .collect()
    }

    pub fn from_schemes(&self) -> BTreeSet<String> {
        self.from_uris
            .iter()
            .filter_map(|uri| uri_scheme(uri))
            .map(str::to_string)
            .collect()
    }

    /// True when a consumer endpoint is served over HTTP according to the catalog
    pub fn exposes_http(&self, catalog: &CamelCatalog) -> bool {
        self.from_schemes()
            .iter()
            .any(|scheme| catalog.scheme(scheme).is_some_and(|s| s.http))
    }

    pub fn merge(&mut self, other: SourceMetadata) {
        self.from_uris.extend(other.from_uris);
        self.to_uris.extend(other.to_uris);
    }
}

/// Scheme part of an endpoint URI (`timer` for `timer:tick?period=1000`)
pub fn uri_scheme(uri: &str) -> Option<&str> {
    let (scheme, _) = uri.split_once(':')?;
    let valid = scheme
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_'));
    valid.then_some(scheme)
}

/// Extracts endpoint metadata from sources
#[cfg_attr(test, mockall::automock)]
pub trait SourceInspector: Send + Sync {
    fn inspect(&self, source: &SourceSpec) -> Result<SourceMetadata, InspectError>;
}

struct LanguagePatterns {
    from: Vec<Regex>,
    to: Vec<Regex>,
}

/// Regex based inspector covering the Java-like DSLs, XML and YAML
pub struct UriInspector {
    code: LanguagePatterns,
    xml: LanguagePatterns,
    yaml: LanguagePatterns,
}

const URI: &str = r#"([a-zA-Z][\w+.-]*:[^"'\s]*)"#;

fn compile(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                tracing::warn!("Ignoring invalid endpoint pattern {}: {}", pattern, err);
                None
            }
        })
        .collect()
}

impl Default for UriInspector {
    fn default() -> Self {
        Self {
            code: LanguagePatterns {
                from: compile(&[
                    format!(r#"\bfrom\s*\(\s*["']{}["']"#, URI),
                    // REST DSL is served by the platform HTTP consumer
                    r#"\b(rest)\s*\(\s*\)|\b(rest)\s*\(\s*["']"#.to_string(),
                ]),
                to: compile(&[format!(
                    r#"\b(?:to|toD|toF|wireTap|enrich|pollEnrich)\s*\(\s*["']{}["']"#,
                    URI
                )]),
            },
            xml: LanguagePatterns {
                from: compile(&[format!(r#"<from\s+uri\s*=\s*["']{}["']"#, URI)]),
                to: compile(&[format!(
                    r#"<(?:to|toD|wireTap|enrich|pollEnrich)\s+uri\s*=\s*["']{}["']"#,
                    URI
                )]),
            },
            yaml: LanguagePatterns {
                from: compile(&[format!(
                    r#"\bfrom[ \t]*:[ \t]*(?:\r?\n[ \t]*)?(?:uri[ \t]*:[ \t]*)?["']?{}"#,
                    URI
                )]),
                to: compile(&[format!(
                    r#"\b(?:to|toD|to-d|wireTap|uri)[ \t]*:[ \t]*["']?{}"#,
                    URI
                )]),
            },
        }
    }
}

impl UriInspector {
    fn patterns(&self, language: Language) -> &LanguagePatterns {
        match language {
            Language::Xml => &self.xml,
            Language::Yaml => &self.yaml,
            Language::Java | Language::Groovy | Language::JavaScript | Language::Kotlin => {
                &self.code
            }
        }
    }
}

fn captures(patterns: &[Regex], content: &str) -> Vec<String> {
    let mut found = Vec::new();
    for regex in patterns {
        for caps in regex.captures_iter(content) {
            // first participating group
            if let Some(m) = caps.iter().skip(1).flatten().next() {
                let value = m.as_str();
                let uri = if value == "rest" { "rest:" } else { value };
                found.push(uri.to_string());
            }
        }
    }
    found
}

impl SourceInspector for UriInspector {
    fn inspect(&self, source: &SourceSpec) -> Result<SourceMetadata, InspectError> {
        let language = source
            .infer_language()
            .ok_or_else(|| InspectError::UnknownLanguage(source.name.clone()))?;
        let patterns = self.patterns(language);

        let from_uris = captures(&patterns.from, &source.content);
        // YAML `uri:` keys also match the consumer block, keep them only once
        let to_uris = captures(&patterns.to, &source.content)
            .into_iter()
            .filter(|uri| !from_uris.contains(uri))
            .collect();

        Ok(SourceMetadata { from_uris, to_uris })
    }
}

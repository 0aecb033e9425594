//! Field Discovery Engine.
//!
//! Scans raw template text and produces the deduplicated set of placeholder
//! fields. Two pattern families run over the same text and are merged:
//! delimited/bare tokens become `Replace` fields, label tokens become `Right`
//! fields, and `Replace` wins when a name shows up in both.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{DomainError, DomainResult};

use super::types::{Field, ReplacementMap, SubstitutionStyle};

/// Delimited placeholder: `{{NAME}}`.
pub static REPLACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^}]*)\}\}").unwrap());

/// Bare all-uppercase/underscore token of length >= 2, heuristic fallback for
/// templates that never use delimiters.
static BARE_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][A-Z0-9_]+\b").unwrap());

/// Label token: a run of word/hyphen characters immediately followed by a
/// colon or dash, e.g. `Name:`.
static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\w-]+)[:\-]").unwrap());

const MAX_FIELD_NAME_LEN: usize = 64;
const MAX_DASHES: usize = 5;

/// Tuning knobs for discovery. Defaults preserve the historical behavior; the
/// deny-list exists because nothing distinguishes an all-caps acronym in prose
/// from an intended placeholder.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    /// Disable to only accept `{{...}}` delimited tokens as Replace fields.
    pub disable_bare_tokens: bool,
    /// Candidate names that are never reported as fields.
    pub deny_list: HashSet<String>,
}

pub struct FieldDiscovery {
    config: DiscoveryConfig,
}

impl Default for FieldDiscovery {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}

impl FieldDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Discover the distinct placeholder fields of `text`, in first-appearance
    /// order. Fails with `UnrecognizedTemplateFormat` when the text is blank.
    pub fn discover(&self, text: &str) -> DomainResult<Vec<Field>> {
        if text.trim().is_empty() {
            return Err(DomainError::UnrecognizedTemplateFormat);
        }

        let mut fields: Vec<Field> = Vec::new();
        let mut replace_names: HashSet<String> = HashSet::new();

        // Family 1: delimited tokens, then the bare-token fallback outside of
        // any delimited span.
        for cap in REPLACE_RE.captures_iter(text) {
            let name = cap[1].trim();
            if self.accepts(name) && replace_names.insert(name.to_string()) {
                fields.push(Field::new(name, SubstitutionStyle::Replace));
            }
        }

        if !self.config.disable_bare_tokens {
            let delimited_spans: Vec<(usize, usize)> = REPLACE_RE
                .find_iter(text)
                .map(|m| (m.start(), m.end()))
                .collect();
            for m in BARE_TOKEN_RE.find_iter(text) {
                let inside = delimited_spans
                    .iter()
                    .any(|&(s, e)| m.start() >= s && m.end() <= e);
                if inside {
                    continue;
                }
                let name = m.as_str().trim();
                if self.accepts(name) && replace_names.insert(name.to_string()) {
                    fields.push(Field::new(name, SubstitutionStyle::Replace));
                }
            }
        }

        // Family 2: label tokens. A name already claimed as Replace stays
        // Replace; delimited tokens take precedence.
        let mut right_names: HashSet<String> = HashSet::new();
        for cap in LABEL_RE.captures_iter(text) {
            let name = cap[1].trim();
            if self.accepts(name)
                && !replace_names.contains(name)
                && right_names.insert(name.to_string())
            {
                fields.push(Field::new(name, SubstitutionStyle::Right));
            }
        }

        Ok(fields)
    }

    /// Noise filters applied to both pattern families.
    fn accepts(&self, name: &str) -> bool {
        if name.is_empty() || name.len() >= MAX_FIELD_NAME_LEN {
            return false;
        }
        if self.config.deny_list.contains(name) {
            return false;
        }
        // Table borders and rules show up as runs of one punctuation char.
        let mut chars = name.chars();
        if let Some(first) = chars.next() {
            if first.is_ascii_punctuation() && chars.all(|c| c == first) {
                return false;
            }
        }
        if name.matches('-').count() > MAX_DASHES {
            return false;
        }
        true
    }
}

/// Substitutes every Replace-style token of `text` using the same patterns as
/// discovery. Unmatched tokens are left as-is; a bound null value substitutes
/// to the empty string. Right fields are untouched here.
pub fn substitute_replace_tokens(text: &str, replacements: &ReplacementMap) -> String {
    // Both pattern families match against the original text only, so a value
    // that happens to look like a token is never substituted again.
    let mut spans: Vec<(usize, usize, String)> = Vec::new();

    let delimited: Vec<(usize, usize)> = REPLACE_RE
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();

    for cap in REPLACE_RE.captures_iter(text) {
        let whole = cap.get(0).map(|m| (m.start(), m.end()));
        let name = cap[1].trim();
        if let (Some((start, end)), Some((SubstitutionStyle::Replace, value))) =
            (whole, replacements.get(name))
        {
            spans.push((start, end, value.clone().unwrap_or_default()));
        }
    }

    for m in BARE_TOKEN_RE.find_iter(text) {
        let inside = delimited
            .iter()
            .any(|&(s, e)| m.start() >= s && m.end() <= e);
        if inside {
            continue;
        }
        if let Some((SubstitutionStyle::Replace, value)) = replacements.get(m.as_str()) {
            spans.push((m.start(), m.end(), value.clone().unwrap_or_default()));
        }
    }

    spans.sort_by_key(|&(start, _, _)| start);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end, value) in spans {
        out.push_str(&text[cursor..start]);
        out.push_str(&value);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(fields: &[Field]) -> Vec<(&str, SubstitutionStyle)> {
        fields.iter().map(|f| (f.name.as_str(), f.style)).collect()
    }

    #[test]
    fn blank_text_is_unrecognized() {
        let discovery = FieldDiscovery::default();
        assert!(matches!(
            discovery.discover("   \n\t "),
            Err(DomainError::UnrecognizedTemplateFormat)
        ));
    }

    #[test]
    fn delimited_and_label_families_are_merged() {
        let discovery = FieldDiscovery::default();
        let fields = discovery
            .discover("Hello {{NAME}}, balance: and Date- end")
            .unwrap();
        assert_eq!(
            names(&fields),
            vec![
                ("NAME", SubstitutionStyle::Replace),
                ("balance", SubstitutionStyle::Right),
                ("Date", SubstitutionStyle::Right),
            ]
        );
    }

    #[test]
    fn delimited_takes_precedence_over_label() {
        let discovery = FieldDiscovery::default();
        let fields = discovery.discover("{{Amount}} then Amount: here").unwrap();
        assert_eq!(names(&fields), vec![("Amount", SubstitutionStyle::Replace)]);
    }

    #[test]
    fn bare_uppercase_tokens_are_replace_candidates() {
        let discovery = FieldDiscovery::default();
        let fields = discovery.discover("send to FULL_NAME today").unwrap();
        assert_eq!(
            names(&fields),
            vec![("FULL_NAME", SubstitutionStyle::Replace)]
        );
    }

    #[test]
    fn bare_tokens_inside_delimiters_are_not_doubled() {
        let discovery = FieldDiscovery::default();
        let fields = discovery.discover("{{NAME}}").unwrap();
        assert_eq!(names(&fields), vec![("NAME", SubstitutionStyle::Replace)]);
    }

    #[test]
    fn noise_candidates_are_filtered() {
        let discovery = FieldDiscovery::default();
        let long = format!("{{{{{}}}}}", "X".repeat(80));
        let text = format!("{} {{{{----}}}} ok {{{{REAL}}}}", long);
        let fields = discovery.discover(&text).unwrap();
        assert_eq!(names(&fields), vec![("REAL", SubstitutionStyle::Replace)]);
    }

    #[test]
    fn dash_heavy_candidates_are_filtered() {
        let discovery = FieldDiscovery::default();
        let fields = discovery.discover("{{a-b-c-d-e-f-g}} {{REAL}}").unwrap();
        assert!(fields.iter().any(|f| f.name == "REAL"));
        assert!(fields.iter().all(|f| f.name != "a-b-c-d-e-f-g"));
    }

    #[test]
    fn discovery_is_idempotent() {
        let discovery = FieldDiscovery::default();
        let text = "Agreement {{NO}} between NAME and {{PARTY}}. Signed: today";
        let first = discovery.discover(text).unwrap();
        let second = discovery.discover(text).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn replace_and_right_never_share_a_name() {
        let discovery = FieldDiscovery::default();
        let text = "{{Total}} Total: and Total- again {{Total}}";
        let fields = discovery.discover(text).unwrap();
        let replace: Vec<_> = fields
            .iter()
            .filter(|f| f.style == SubstitutionStyle::Replace)
            .map(|f| &f.name)
            .collect();
        let right: Vec<_> = fields
            .iter()
            .filter(|f| f.style == SubstitutionStyle::Right)
            .map(|f| &f.name)
            .collect();
        assert!(replace.iter().all(|n| !right.contains(n)));
    }

    #[test]
    fn deny_list_suppresses_candidates() {
        let mut config = DiscoveryConfig::default();
        config.deny_list.insert("USA".to_string());
        let discovery = FieldDiscovery::new(config);
        let fields = discovery.discover("made in USA for {{NAME}}").unwrap();
        assert_eq!(names(&fields), vec![("NAME", SubstitutionStyle::Replace)]);
    }

    #[test]
    fn bare_token_fallback_can_be_disabled() {
        let discovery = FieldDiscovery::new(DiscoveryConfig {
            disable_bare_tokens: true,
            ..Default::default()
        });
        let fields = discovery.discover("ACRONYM prose {{NAME}}").unwrap();
        assert_eq!(names(&fields), vec![("NAME", SubstitutionStyle::Replace)]);
    }

    #[test]
    fn substitution_uses_the_discovery_patterns() {
        let mut map = ReplacementMap::new();
        map.insert(
            "NAME".to_string(),
            (SubstitutionStyle::Replace, Some("Ann".to_string())),
        );
        map.insert(
            "MISSING_VALUE".to_string(),
            (SubstitutionStyle::Replace, None),
        );
        map.insert(
            "balance".to_string(),
            (SubstitutionStyle::Right, Some("100".to_string())),
        );

        let out =
            substitute_replace_tokens("Hello {{NAME}}, MISSING_VALUE, {{OTHER}} balance", &map);
        assert_eq!(out, "Hello Ann, , {{OTHER}} balance");
    }

    #[test]
    fn injected_values_are_not_re_substituted() {
        let mut map = ReplacementMap::new();
        map.insert(
            "A".to_string(),
            (SubstitutionStyle::Replace, Some("TOTAL".to_string())),
        );
        map.insert(
            "TOTAL".to_string(),
            (SubstitutionStyle::Replace, Some("99".to_string())),
        );

        assert_eq!(substitute_replace_tokens("{{A}}", &map), "TOTAL");
        assert_eq!(substitute_replace_tokens("TOTAL {{A}}", &map), "99 TOTAL");
    }
}

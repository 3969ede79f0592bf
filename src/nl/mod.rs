//! Natural-language phrase interpretation
//!
//! Maps a free-form phrase to a canonical provider command using the
//! per-provider dictionary. Matching is longest-phrase-first substring
//! lookup over the normalized input; ties keep dictionary order. No
//! parameterization is performed on the user text.

use regex::Regex;
use std::sync::OnceLock;

use crate::providers::ProviderSpec;

fn filler_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(please|can you|could you|would you|i want to|i need to|i would like to)\s+")
            .expect("invalid filler regex")
    })
}

/// Lowercase, strip leading filler words and a trailing "for me",
/// collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    let mut query = text.trim().to_lowercase();
    loop {
        let stripped = filler_prefix().replace(&query, "").into_owned();
        if stripped == query {
            break;
        }
        query = stripped;
    }
    if let Some(stripped) = query.strip_suffix("for me") {
        query = stripped.trim_end().to_string();
    }
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Interpret a phrase against the provider dictionary.
///
/// Returns the canonical command of the longest matching phrase, or
/// `None` when nothing in the dictionary applies.
pub fn interpret(spec: &ProviderSpec, text: &str) -> Option<String> {
    let query = normalize(text);
    if query.is_empty() {
        return None;
    }

    // Stable sort keeps declared order within one key length.
    let mut entries: Vec<&(String, String)> = spec.nl_phrases.iter().collect();
    entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    entries
        .iter()
        .find(|(phrase, _)| query.contains(phrase.as_str()))
        .map(|(_, command)| command.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderSpec;
    use crate::ProviderKind;

    #[test]
    fn normalizes_filler_words() {
        assert_eq!(normalize("Please list my   vms"), "list my vms");
        assert_eq!(normalize("could you show users for me"), "show users");
        assert_eq!(normalize("can you please list buckets"), "list buckets");
    }

    #[test]
    fn azure_vm_listing() {
        let spec = ProviderSpec::for_kind(ProviderKind::Azure);
        assert_eq!(interpret(&spec, "list my vms"), Some("az vm list".to_string()));
        assert_eq!(interpret(&spec, "Please list my VMs"), Some("az vm list".to_string()));
    }

    #[test]
    fn longest_phrase_wins() {
        let spec = ProviderSpec::for_kind(ProviderKind::Azure);
        // "list sql databases" must beat the bare "databases" entry.
        assert_eq!(
            interpret(&spec, "list sql databases"),
            Some("az sql db list".to_string())
        );
        // "network security groups" must beat "groups".
        assert_eq!(
            interpret(&spec, "show network security groups"),
            Some("az network nsg list".to_string())
        );
    }

    #[test]
    fn gcp_and_aws_dictionaries_resolve() {
        let gcp = ProviderSpec::for_kind(ProviderKind::Gcp);
        assert_eq!(
            interpret(&gcp, "list kubernetes clusters"),
            Some("gcloud container clusters list".to_string())
        );

        let aws = ProviderSpec::for_kind(ProviderKind::Aws);
        assert_eq!(
            interpret(&aws, "who am i"),
            Some("aws sts get-caller-identity".to_string())
        );
    }

    #[test]
    fn unknown_phrase_returns_none() {
        let spec = ProviderSpec::for_kind(ProviderKind::Aws);
        assert_eq!(interpret(&spec, "make me a sandwich"), None);
        assert_eq!(interpret(&spec, ""), None);
    }
}

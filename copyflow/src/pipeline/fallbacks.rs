//! Values substituted for absent optional keys.
//!
//! An empty fallback lets the template's `{{#if}}` guard drop the section
//! or take its `{{else}}` branch.

use crate::core::StateKey;

/// Fallback value of each optional key.
pub const FALLBACKS: &[(StateKey, &str)] = &[
    (StateKey::StyleReport, ""),
    (StateKey::DraftInstructions, ""),
    (StateKey::AnalysisReport, ""),
    (StateKey::RefinementInstructions, ""),
    (StateKey::RequirementsText, "无甲方需求信息。"),
    (StateKey::OutlineMarkdown, "无创作大纲信息。"),
];

/// Returns the fallback for `key`, or an empty string if it has none.
#[must_use]
pub fn fallback_for(key: StateKey) -> &'static str {
    FALLBACKS
        .iter()
        .find(|(k, _)| *k == key)
        .map_or("", |(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::catalog::catalog;

    #[test]
    fn test_final_polish_context_fallbacks() {
        assert_eq!(fallback_for(StateKey::RequirementsText), "无甲方需求信息。");
        assert_eq!(fallback_for(StateKey::OutlineMarkdown), "无创作大纲信息。");
    }

    #[test]
    fn test_section_fallbacks_are_empty() {
        assert_eq!(fallback_for(StateKey::StyleReport), "");
        assert_eq!(fallback_for(StateKey::AnalysisReport), "");
        assert_eq!(fallback_for(StateKey::PolishOutput), "");
    }

    #[test]
    fn test_every_optional_key_has_an_entry() {
        for def in catalog() {
            for key in def.optional {
                assert!(
                    FALLBACKS.iter().any(|(k, _)| k == key),
                    "{key} has no fallback entry"
                );
            }
        }
    }
}

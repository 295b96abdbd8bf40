use once_cell::sync::Lazy;
use regex::Regex;

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid non-alnum regex"));

/// Lowercases, turns punctuation into spaces and collapses whitespace.
pub fn normalize_name(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let spaced = NON_ALNUM.replace_all(&lowered, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when `needle` appears in `haystack` on word boundaries. Both sides are
/// expected to be outputs of [`normalize_name`].
pub fn contains_words(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let padded_haystack = format!(" {haystack} ");
    let padded_needle = format!(" {needle} ");
    padded_haystack.contains(&padded_needle)
}

pub fn non_blank(input: Option<&str>) -> Option<String> {
    input
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_name_strips_punctuation() {
        assert_eq!(
            normalize_name("  2B N1 A - 29 Shoreditch   Heights "),
            "2b n1 a 29 shoreditch heights"
        );
    }

    #[test]
    fn contains_words_respects_boundaries() {
        assert!(contains_words("2b n1 a 29 shoreditch heights", "shoreditch heights"));
        assert!(!contains_words("old streetflat", "street"));
        assert!(!contains_words("anything", ""));
    }

    #[test]
    fn non_blank_drops_whitespace() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" Amy ")), Some("Amy".to_string()));
        assert_eq!(non_blank(None), None);
    }
}

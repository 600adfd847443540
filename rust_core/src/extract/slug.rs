//! URL slug helpers shared by both extraction paths.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// `"Jane Doe Jr."` -> `"jane-doe-jr"`
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .replace('.', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Capitalize the first letter of every word, lower-case the rest.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Tournament name from a competition path segment:
/// `"roland-garros-c123"` -> `"Roland Garros"`.
pub fn tournament_from_segment(segment: &str) -> String {
    let stripped = match segment.rsplit_once("-c") {
        Some((head, id)) if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => head,
        _ => segment,
    };
    let cleaned: String = stripped
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    title_case(&cleaned)
}

/// Words of the trailing `<slug>-m<digits>` of a match path.
pub fn match_slug_words(path: &str) -> Option<Vec<String>> {
    static MATCH_SLUG: OnceLock<Option<Regex>> = OnceLock::new();
    let re = MATCH_SLUG
        .get_or_init(|| Regex::new(r"/([a-z0-9\-]+)-m\d+/?$").ok())
        .as_ref()?;
    let caps = re.captures(path)?;
    let words: Vec<String> = caps[1]
        .split('-')
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect();
    if words.len() < 2 {
        return None;
    }
    Some(words)
}

/// Split slug words into two title-cased names. `first_word_count` guides
/// the split; an invalid count falls back to halving the words.
pub fn split_participant_slug(words: &[String], first_word_count: usize) -> Option<(String, String)> {
    if words.len() < 2 {
        return None;
    }
    let split = if first_word_count > 0 && first_word_count < words.len() {
        first_word_count
    } else {
        words.len() / 2
    };
    Some((
        title_case(&words[..split].join(" ")),
        title_case(&words[split..].join(" ")),
    ))
}

/// Case-insensitive check for at least one common word.
pub fn shares_word(a: &str, b: &str) -> bool {
    let left: HashSet<String> = a.split_whitespace().map(|w| w.to_lowercase()).collect();
    b.split_whitespace().any(|w| left.contains(&w.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Jane Doe"), "jane-doe");
        assert_eq!(slugify("  J. Doe  Jr. "), "j-doe-jr");
        assert_eq!(slugify("Paris Open"), "paris-open");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("roland garros"), "Roland Garros");
        assert_eq!(title_case("ATP  finals"), "Atp Finals");
    }

    #[test]
    fn test_tournament_from_segment() {
        assert_eq!(tournament_from_segment("roland-garros-c123"), "Roland Garros");
        assert_eq!(tournament_from_segment("atp-madrid"), "Atp Madrid");
        assert_eq!(tournament_from_segment("wta-rome-c7-x"), "Wta Rome C7 X");
    }

    #[test]
    fn test_match_slug_words() {
        let words = match_slug_words("/tennis-stennis/paris-c1/jane-doe-ann-lee-m123").unwrap();
        assert_eq!(words, vec!["jane", "doe", "ann", "lee"]);
        assert!(match_slug_words("/tennis-stennis/paris-c1").is_none());
        assert!(match_slug_words("/x/solo-m5").is_none());
        // pattern is compiled once and reused across cards
        assert_eq!(
            match_slug_words("/x/bo-li-m9/"),
            Some(vec!["bo".to_string(), "li".to_string()])
        );
    }

    #[test]
    fn test_split_guided_by_label_word_count() {
        let words: Vec<String> = ["juan", "martin", "del", "potro", "ann", "lee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            split_participant_slug(&words, 4),
            Some(("Juan Martin Del Potro".to_string(), "Ann Lee".to_string()))
        );
        // count equal to the word total is not a split point
        assert_eq!(
            split_participant_slug(&words, 6),
            Some(("Juan Martin Del".to_string(), "Potro Ann Lee".to_string()))
        );
    }

    #[test]
    fn test_shares_word() {
        assert!(shares_word("Jane Doe", "jane smith"));
        assert!(!shares_word("Janedoe", "Jane Doe"));
        assert!(!shares_word("", "Jane"));
    }
}

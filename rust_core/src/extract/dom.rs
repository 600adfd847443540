//! Rendered-markup extraction path.

use super::slug::{match_slug_words, shares_word, split_participant_slug, tournament_from_segment};
use super::{ExtractConfig, ExtractError};
use crate::types::{MatchRecord, ScrapeStamp};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

/// Compiled CSS selectors for one card layout.
#[derive(Debug)]
pub struct CardSelectors {
    pub card: Selector,
    label: Selector,
    anchor: Selector,
    any_anchor: Selector,
    time: Selector,
}

impl CardSelectors {
    pub fn compile(config: &ExtractConfig) -> Result<Self, ExtractError> {
        Ok(Self {
            card: selector(&config.card_selector)?,
            label: selector(&config.label_selector)?,
            anchor: selector(&config.anchor_selector)?,
            any_anchor: selector("a[href]")?,
            time: selector(&config.time_selector)?,
        })
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a time label into `(date, time)` tokens.
///
/// `"Auj. 15:00"` -> `("Auj.", "15:00")`, `"Jeu. 01/01 15:00"` ->
/// `("Jeu. 01/01", "15:00")`, `"15:00"` -> `("", "15:00")`.
pub fn split_time_label(text: &str, relative_day_tokens: &[String]) -> (String, String) {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return (String::new(), String::new());
    };

    if relative_day_tokens.iter().any(|t| t == first) {
        let time = if tokens.len() > 1 { tokens[tokens.len() - 1] } else { "" };
        return (first.to_string(), time.to_string());
    }

    match tokens.len() {
        1 if first.contains(':') => (String::new(), first.to_string()),
        1 => (first.to_string(), String::new()),
        2 => (tokens[0].to_string(), tokens[1].to_string()),
        _ => (format!("{} {}", tokens[0], tokens[1]), tokens[2].to_string()),
    }
}

/// Names for one card: slug-derived names replace a visible label only when
/// they share a word with it (or the label is empty).
fn reconcile_names(labels: (&str, &str), path: &str) -> (String, String) {
    let (label_a, label_b) = labels;
    let from_slug = match_slug_words(path).and_then(|words| {
        let guide = label_a.split_whitespace().count();
        split_participant_slug(&words, guide)
    });

    let Some((slug_a, slug_b)) = from_slug else {
        return (label_a.to_string(), label_b.to_string());
    };

    let pick = |label: &str, slug: String| {
        if label.is_empty() || shares_word(label, &slug) {
            slug
        } else {
            label.to_string()
        }
    };
    (pick(label_a, slug_a), pick(label_b, slug_b))
}

fn card_record(
    card: ElementRef<'_>,
    selectors: &CardSelectors,
    base: &Url,
    config: &ExtractConfig,
    stamp: &ScrapeStamp,
) -> Result<MatchRecord, ExtractError> {
    let labels: Vec<String> = card.select(&selectors.label).map(element_text).collect();
    let label_a = labels.first().map(String::as_str).unwrap_or_default();
    let label_b = labels.get(1).map(String::as_str).unwrap_or_default();

    let href = card
        .select(&selectors.anchor)
        .next()
        .or_else(|| card.select(&selectors.any_anchor).next())
        .and_then(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .ok_or_else(|| ExtractError::Card(format!("{label_a} vs {label_b}: no href")))?;

    let url = base
        .join(href)
        .map_err(|e| ExtractError::Card(format!("bad href '{href}': {e}")))?;

    let (participant_a, participant_b) = reconcile_names((label_a, label_b), url.path());
    if participant_a.is_empty() || participant_b.is_empty() {
        return Err(ExtractError::Card(format!("{url}: fewer than two names")));
    }

    let (event_date, event_time) = card
        .select(&selectors.time)
        .next()
        .map(element_text)
        .map(|text| split_time_label(&text, &config.relative_day_tokens))
        .unwrap_or_default();

    let tournament = url
        .path_segments()
        .and_then(|mut segments| segments.nth(1))
        .map(tournament_from_segment)
        .unwrap_or_default();

    Ok(MatchRecord::new(participant_a, participant_b, url.to_string(), stamp)
        .with_schedule(event_date, event_time)
        .with_tournament(tournament))
}

/// Outcome of the DOM path.
#[derive(Debug, Default)]
pub struct DomExtraction {
    pub records: Vec<MatchRecord>,
    /// Card elements found, usable or not
    pub cards: usize,
}

pub fn extract_cards(
    document: &Html,
    selectors: &CardSelectors,
    config: &ExtractConfig,
    stamp: &ScrapeStamp,
) -> Result<DomExtraction, ExtractError> {
    let base = Url::parse(&config.site_base).map_err(|e| ExtractError::BaseUrl(format!("{}: {e}", config.site_base)))?;
    let mut out = DomExtraction::default();
    let mut seen_urls = HashSet::new();

    for (idx, card) in document.select(&selectors.card).enumerate() {
        out.cards += 1;
        match card_record(card, selectors, &base, config, stamp) {
            Ok(record) => {
                if seen_urls.insert(record.source_url.clone()) {
                    debug!("Card {}: {}", idx + 1, record.label());
                    out.records.push(record);
                }
            }
            Err(e) => debug!("Card {}: {}", idx + 1, e),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> ScrapeStamp {
        ScrapeStamp {
            date: "2024-04-30".to_string(),
            time: "08:00:00".to_string(),
        }
    }

    fn card(a: &str, b: &str, href: &str, time: &str) -> String {
        format!(
            r#"<sports-events-event-card>
                 <a class="cardEvent" href="{href}">
                   <div class="event_infoTime">{time}</div>
                   <div class="scoreboard_contestantLabel">{a}</div>
                   <div class="scoreboard_contestantLabel">{b}</div>
                 </a>
               </sports-events-event-card>"#
        )
    }

    fn run(html: &str) -> DomExtraction {
        let config = ExtractConfig::default();
        let selectors = CardSelectors::compile(&config).unwrap();
        let document = Html::parse_document(html);
        extract_cards(&document, &selectors, &config, &stamp()).unwrap()
    }

    fn tokens() -> Vec<String> {
        vec!["Auj.".to_string(), "Dem.".to_string()]
    }

    #[test]
    fn test_split_time_label() {
        assert_eq!(split_time_label("Auj. 15:00", &tokens()), ("Auj.".into(), "15:00".into()));
        assert_eq!(split_time_label("Dem.", &tokens()), ("Dem.".into(), "".into()));
        assert_eq!(
            split_time_label("Jeu. 01/01 15:00", &tokens()),
            ("Jeu. 01/01".into(), "15:00".into())
        );
        assert_eq!(split_time_label("01/05 09:30", &tokens()), ("01/05".into(), "09:30".into()));
        assert_eq!(split_time_label("09:30", &tokens()), ("".into(), "09:30".into()));
        assert_eq!(split_time_label("  ", &tokens()), ("".into(), "".into()));
    }

    #[test]
    fn test_visible_labels_kept_when_slug_disagrees() {
        let html = card("Jane Doe", "Ann Lee", "/tennis-stennis/paris-open-c42/janedoe-annlee-m123", "Auj. 15:00");
        let out = run(&html);
        assert_eq!(out.cards, 1);
        let record = &out.records[0];
        assert_eq!(record.participant_a, "Jane Doe");
        assert_eq!(record.participant_b, "Ann Lee");
        assert_eq!(
            record.source_url,
            "https://www.betclic.fr/tennis-stennis/paris-open-c42/janedoe-annlee-m123"
        );
        assert_eq!(record.tournament, "Paris Open");
        assert_eq!(record.event_date, "Auj.");
        assert_eq!(record.event_time, "15:00");
    }

    #[test]
    fn test_slug_expands_abbreviated_labels() {
        let html = card("J. Doe", "A. Lee", "/tennis-stennis/wta-rome-c7/jane-doe-ann-lee-m55", "Dem. 11:00");
        let out = run(&html);
        let record = &out.records[0];
        assert_eq!(record.participant_a, "Jane Doe");
        assert_eq!(record.participant_b, "Ann Lee");
    }

    #[test]
    fn test_missing_label_filled_from_slug() {
        let html = card("", "", "/tennis-stennis/wta-rome-c7/jane-doe-ann-lee-m55", "");
        let out = run(&html);
        assert_eq!(out.records[0].participant_a, "Jane Doe");
        assert_eq!(out.records[0].participant_b, "Ann Lee");
        assert_eq!(out.records[0].event_time, "");
    }

    #[test]
    fn test_cards_without_href_dropped_and_urls_deduped() {
        let mut html = String::from("<html><body>");
        html.push_str(&card("A B", "C D", "/tennis-stennis/x-c1/a-b-c-d-m1", "Auj. 10:00"));
        html.push_str(&card("A B", "C D", "/tennis-stennis/x-c1/a-b-c-d-m1", "Auj. 10:00"));
        html.push_str(
            r#"<sports-events-event-card>
                 <div class="scoreboard_contestantLabel">E F</div>
                 <div class="scoreboard_contestantLabel">G H</div>
               </sports-events-event-card>"#,
        );
        html.push_str("</body></html>");

        let out = run(&html);
        assert_eq!(out.cards, 3);
        assert_eq!(out.records.len(), 1);
    }
}

// Selector-driven HTML extraction for configured sites
use crate::config::ExtractionRule;
use crate::model::{ParserError, ScrapeItem};
use crate::utils::{resolve_link, squash_whitespace};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const ITEM_FIELD: &str = "item";
pub const LINK_FIELD: &str = "link";
pub const TITLE_FIELD: &str = "title";

struct FieldRule {
    name: String,
    selectors: Vec<Selector>,
    attribute: Option<String>,
}

impl FieldRule {
    /// First selector that yields a non-empty value wins.
    fn extract(&self, element: ElementRef<'_>) -> Option<String> {
        for selector in &self.selectors {
            let Some(node) = element.select(selector).next() else {
                continue;
            };
            let value = match &self.attribute {
                Some(attr) => node.value().attr(attr).map(|v| v.trim().to_string()),
                None => Some(squash_whitespace(&node.text().collect::<String>())),
            };
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                return Some(value);
            }
        }
        None
    }
}

/// A site's selector rules, compiled once at startup.
pub struct SiteExtractor {
    item: Vec<(String, Selector)>,
    fields: Vec<FieldRule>,
}

fn compile_list(field: &str, raw: &[String]) -> Result<Vec<Selector>, ParserError> {
    raw.iter()
        .map(|s| {
            Selector::parse(s).map_err(|_| ParserError::InvalidSelector {
                field: field.to_string(),
                selector: s.clone(),
            })
        })
        .collect()
}

impl SiteExtractor {
    pub fn compile(rules: &BTreeMap<String, ExtractionRule>) -> Result<Self, ParserError> {
        let item_rule = rules
            .get(ITEM_FIELD)
            .filter(|r| !r.selectors.is_empty())
            .ok_or_else(|| ParserError::MissingField(ITEM_FIELD.into()))?;
        let item = item_rule
            .selectors
            .iter()
            .cloned()
            .zip(compile_list(ITEM_FIELD, &item_rule.selectors)?)
            .collect();

        let mut fields = Vec::new();
        for (name, rule) in rules.iter().filter(|(name, _)| name.as_str() != ITEM_FIELD) {
            let attribute = match (&rule.attribute, name.as_str()) {
                (Some(attr), _) => Some(attr.clone()),
                (None, LINK_FIELD) => Some("href".to_string()),
                (None, _) => None,
            };
            fields.push(FieldRule {
                name: name.clone(),
                selectors: compile_list(name, &rule.selectors)?,
                attribute,
            });
        }

        Ok(Self { item, fields })
    }

    /// Raw CSS of the item container selectors, in fallback order.
    pub fn item_selectors(&self) -> Vec<String> {
        self.item.iter().map(|(raw, _)| raw.clone()).collect()
    }

    /// Extracts one item per container match. Missing fields are logged and
    /// left out; they never drop the item or the batch.
    pub fn extract(&self, html: &str, base_url: &str, page_url: &str) -> Vec<ScrapeItem> {
        let document = Html::parse_document(html);

        let Some((raw, container)) = self
            .item
            .iter()
            .find(|(_, sel)| document.select(sel).next().is_some())
        else {
            warn!("No item container matched on {}", page_url);
            return Vec::new();
        };
        debug!("Using item selector: {}", raw);

        let mut items = Vec::new();
        for element in document.select(container) {
            let mut title = None;
            let mut link = None;
            let mut metadata = BTreeMap::new();
            let mut missing = Vec::new();

            for field in &self.fields {
                match (field.extract(element), field.name.as_str()) {
                    (Some(v), TITLE_FIELD) => title = Some(v),
                    (Some(v), LINK_FIELD) => link = Some(resolve_link(base_url, &v)),
                    (Some(v), _) => {
                        metadata.insert(field.name.clone(), v);
                    }
                    (None, _) => missing.push(field.name.as_str()),
                }
            }

            if !missing.is_empty() {
                warn!("Extraction incomplete on item #{}: missing {:?}", items.len(), missing);
            }

            items.push(ScrapeItem {
                url: link.unwrap_or_else(|| page_url.to_string()),
                title: title.unwrap_or_default(),
                html: element.html(),
                metadata,
            });
        }

        items
    }
}

/// Collects `<meta name|property=.. content=..>` pairs. Later duplicates win.
pub fn meta_tags(html: &str) -> BTreeMap<String, String> {
    let document = Html::parse_document(html);
    let mut metadata = BTreeMap::new();
    let Ok(selector) = Selector::parse("meta") else {
        return metadata;
    };

    for meta in document.select(&selector) {
        let node = meta.value();
        let name = node.attr("name").or_else(|| node.attr("property"));
        if let (Some(name), Some(content)) = (name, node.attr("content")) {
            if !name.is_empty() {
                metadata.insert(name.to_string(), content.to_string());
            }
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <div class="event-card">
            <a href="/event/1"><h3>Rust Meetup</h3></a>
            <span class="time">Sat  12:00</span>
            <span class="loc">Taipei</span>
          </div>
          <div class="event-card">
            <a href="https://other.example/event/2"><h3>Go Night</h3></a>
            <span class="time">Sun 18:00</span>
          </div>
        </body></html>"#;

    fn rule(selectors: &[&str]) -> ExtractionRule {
        ExtractionRule {
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            attribute: None,
        }
    }

    fn rules() -> BTreeMap<String, ExtractionRule> {
        let mut rules = BTreeMap::new();
        rules.insert("item".to_string(), rule(&["li.card", "div.event-card"]));
        rules.insert("title".to_string(), rule(&["h2", "h3"]));
        rules.insert("link".to_string(), rule(&["a"]));
        rules.insert("time".to_string(), rule(&[".time"]));
        rules.insert("location".to_string(), rule(&[".loc"]));
        rules
    }

    #[test]
    fn extracts_items_with_fallback_selectors() {
        let extractor = SiteExtractor::compile(&rules()).unwrap();
        let items = extractor.extract(LISTING, "https://www.accupass.com", "https://www.accupass.com/search");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Rust Meetup");
        assert_eq!(items[0].url, "https://www.accupass.com/event/1");
        assert_eq!(items[0].metadata["time"], "Sat 12:00");
        assert_eq!(items[0].metadata["location"], "Taipei");
        assert!(items[0].html.contains("event-card"));
        assert_eq!(items[1].url, "https://other.example/event/2");
    }

    #[test]
    fn missing_field_keeps_partial_item() {
        let extractor = SiteExtractor::compile(&rules()).unwrap();
        let items = extractor.extract(LISTING, "https://www.accupass.com", "https://www.accupass.com/search");
        assert!(!items[1].metadata.contains_key("location"));
        assert_eq!(items[1].title, "Go Night");
    }

    #[test]
    fn no_container_yields_empty_batch() {
        let extractor = SiteExtractor::compile(&rules()).unwrap();
        assert!(extractor.extract("<p>nothing</p>", "https://a.com", "https://a.com").is_empty());
    }

    #[test]
    fn compile_requires_item_and_valid_css() {
        let mut no_item = rules();
        no_item.remove("item");
        assert!(matches!(SiteExtractor::compile(&no_item), Err(ParserError::MissingField(_))));

        let mut bad = rules();
        bad.insert("time".to_string(), rule(&["span[["]));
        assert!(matches!(
            SiteExtractor::compile(&bad),
            Err(ParserError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn meta_tags_reads_name_and_property() {
        let html = r#"<html><head>
            <meta charset="utf-8">
            <meta name="description" content="A page">
            <meta property="og:title" content="OG">
            <meta name="keywords">
        </head><body></body></html>"#;
        let meta = meta_tags(html);
        assert_eq!(meta.len(), 2);
        assert_eq!(meta["description"], "A page");
        assert_eq!(meta["og:title"], "OG");
    }
}

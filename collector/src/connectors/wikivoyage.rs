use super::SourceConnector;
use crate::model::Place;
use async_trait::async_trait;
use collector_core::{Result, Transport};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

const WIKI_URL: &str = "https://en.wikivoyage.org/wiki/";

static HEADLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<span[^>]*class="[^"]*mw-headline[^"]*"[^>]*>(.*?)</span>"#)
        .expect("valid headline regex")
});
static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h[2-6][^>]*>(.*?)</h[2-6]>").expect("valid heading regex"));
static HEADING_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<h[1-6][^>]*>").expect("valid heading regex"));
static PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p>(.*?)</p>").expect("valid paragraph regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<]+?>").expect("valid tag regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

pub fn page_title(city: &str) -> String {
    city.trim().replace(' ', "_")
}

fn strip_tags(html: &str) -> String {
    TAG.replace_all(html, "").into_owned()
}

/// Maps each section heading to the text of the paragraphs that follow it,
/// up to the next heading. Sections without paragraphs are dropped.
pub fn extract_sections(html: &str) -> Map<String, Value> {
    let headline = if HEADLINE.is_match(html) { &*HEADLINE } else { &*HEADING };
    let mut sections = Map::new();

    for caps in headline.captures_iter(html) {
        let (Some(whole), Some(title)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = strip_tags(title.as_str()).trim().to_string();
        if name.is_empty() {
            continue;
        }

        let rest = &html[whole.end()..];
        let body = match HEADING_OPEN.find(rest) {
            Some(next) => &rest[..next.start()],
            None => rest,
        };

        let paragraphs: Vec<String> = PARAGRAPH
            .captures_iter(body)
            .filter_map(|p| p.get(1))
            .map(|p| WHITESPACE.replace_all(&strip_tags(p.as_str()), " ").trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();

        if !paragraphs.is_empty() {
            sections.insert(name, Value::String(paragraphs.join("\n")));
        }
    }

    sections
}

pub struct CultureSection {
    transport: Arc<Transport>,
}

impl CultureSection {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceConnector for CultureSection {
    fn section(&self) -> &'static str {
        "culture_wikivoyage"
    }

    async fn fetch(&self, place: &Place) -> Result<Option<Value>> {
        let url = format!("{WIKI_URL}{}", page_title(&place.name));
        let html = self.transport.get_text(&url, &[], None).await?;
        let sections = extract_sections(&html);
        Ok((!sections.is_empty()).then_some(Value::Object(sections)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn titles_use_underscores() {
        assert_eq!(page_title("Rio de Janeiro"), "Rio_de_Janeiro");
    }

    #[test]
    fn collects_paragraphs_until_next_heading() {
        let html = r#"
            <h2><span class="mw-headline" id="Understand">Understand</span></h2>
            <p>Vilnius is the <b>capital</b>
               of Lithuania.</p>
            <p>  </p>
            <p>Its old town is listed by UNESCO.</p>
            <h2><span class="mw-headline" id="Get_in">Get in</span></h2>
            <ul><li>no paragraphs here</li></ul>
            <h2><span class="mw-headline" id="Eat">Eat</span></h2>
            <p>Try cepelinai.</p>
        "#;

        let sections = extract_sections(html);

        assert_eq!(
            Value::Object(sections),
            json!({
                "Understand": "Vilnius is the capital of Lithuania.\nIts old town is listed by UNESCO.",
                "Eat": "Try cepelinai."
            })
        );
    }

    #[test]
    fn falls_back_to_plain_headings() {
        let html = r#"<h2 id="See">See</h2><p>The cathedral.</p><h3>Do</h3><p>Walk.</p>"#;
        let sections = extract_sections(html);
        assert_eq!(sections.get("See"), Some(&json!("The cathedral.")));
        assert_eq!(sections.get("Do"), Some(&json!("Walk.")));
    }
}

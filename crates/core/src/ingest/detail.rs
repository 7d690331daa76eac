use crate::ingest::dashboard::element_text;
use scraper::{ElementRef, Html, Selector};

const SKIPPED_SECTION: &str = "Message Board";

fn is_heading(el: &ElementRef<'_>) -> bool {
    matches!(el.value().name(), "h2" | "h3")
}

/// Flattens an IPO detail page into `--- Section: <heading> ---` blocks for the prompt.
///
/// Returns `None` when the page has no `div#main`, which is how placeholder pages look.
pub fn parse_detail_text(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let main_sel = Selector::parse("div#main").ok()?;
    let heading_sel = Selector::parse("h2, h3").ok()?;
    let main = doc.select(&main_sel).next()?;

    let mut out = String::new();
    for heading in main.select(&heading_sel) {
        let title = element_text(heading);
        if title.contains(SKIPPED_SECTION) {
            continue;
        }

        let mut parts = Vec::new();
        for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
            if is_heading(&sibling) {
                break;
            }
            let text = element_text(sibling);
            if !text.is_empty() {
                parts.push(text);
            }
        }

        out.push_str(&format!("\n\n--- Section: {title} ---\n"));
        out.push_str(&parts.join(" "));
    }

    Some(out.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_sections_until_next_heading() {
        let html = r#"<html><body>
            <div id="nav"><h2>Navigation</h2><p>skip me</p></div>
            <div id="main">
              <h2>Acme IPO Details</h2>
              <table><tr><td>Price Band</td><td>Rs 100 to 110</td></tr></table>
              <p>Fresh issue   only.</p>
              <h3>Financials</h3>
              <p>Revenue up 20%.</p>
              <h2>Message Board</h2>
              <p>noise</p>
            </div>
          </body></html>"#;

        let text = parse_detail_text(html).unwrap();
        assert!(text.starts_with("--- Section: Acme IPO Details ---"));
        assert!(text.contains("Price Band Rs 100 to 110 Fresh issue only."));
        assert!(text.contains("--- Section: Financials ---\nRevenue up 20%."));
        assert!(!text.contains("Message Board"));
        assert!(!text.contains("skip me"));
    }

    #[test]
    fn placeholder_page_without_main_is_none() {
        assert!(parse_detail_text("<html><body><p>coming soon</p></body></html>").is_none());
    }
}

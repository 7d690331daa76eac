use crate::config::Settings;
use crate::domain::{Category, ListingRecord, Snapshot};
use crate::ingest::page::PageSource;
use crate::ingest::{FetchError, ListingFetcher};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;

const MAINBOARD_HEADING: &str = "Current IPOs (Mainboard)";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 45;

// Rows shorter than this are separators or ads, not listings.
const MIN_CELLS: usize = 4;
const DEFAULT_NAME_COLUMN: usize = 0;
const DEFAULT_STATUS_COLUMN: usize = 3;

pub struct DashboardFetcher {
    pages: Arc<dyn PageSource>,
    url: String,
    timeout: Duration,
}

impl DashboardFetcher {
    pub fn new(pages: Arc<dyn PageSource>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pages,
            url: url.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings, pages: Arc<dyn PageSource>) -> Self {
        let timeout_secs = std::env::var("DASHBOARD_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

        Self::new(
            pages,
            settings.dashboard_url.clone(),
            Duration::from_secs(timeout_secs),
        )
    }
}

#[async_trait::async_trait]
impl ListingFetcher for DashboardFetcher {
    fn source_name(&self) -> &'static str {
        "chittorgarh_dashboard"
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let html = tokio::time::timeout(self.timeout, self.pages.get_html(&self.url))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        let (current, upcoming) = parse_dashboard(&html, &origin_of(&self.url))?;
        tracing::info!(
            source = self.source_name(),
            current = current.len(),
            upcoming = upcoming.len(),
            "fetched IPO dashboard"
        );
        Ok(Snapshot::new(current, upcoming))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Name,
    PriceBand,
    IssueSize,
    OpenDate,
    CloseDate,
    ListingDate,
    Status,
    Other(String),
}

impl Column {
    fn classify(header: &str, idx: usize) -> Self {
        let h = header.to_ascii_lowercase();
        if h.contains("status") {
            Column::Status
        } else if h.contains("listing") {
            Column::ListingDate
        } else if h.contains("open") {
            Column::OpenDate
        } else if h.contains("clos") {
            Column::CloseDate
        } else if h.contains("price") {
            Column::PriceBand
        } else if h.contains("size") {
            Column::IssueSize
        } else if h.contains("company") || h.contains("issuer") || h.contains("name") {
            Column::Name
        } else if header.is_empty() {
            Column::Other(format!("column_{idx}"))
        } else {
            Column::Other(header.to_string())
        }
    }
}

#[derive(Debug)]
struct Layout {
    columns: Vec<Column>,
    name: usize,
    status: usize,
}

impl Layout {
    fn from_headers(headers: &[String]) -> Self {
        let columns: Vec<Column> = headers
            .iter()
            .enumerate()
            .map(|(idx, h)| Column::classify(h, idx))
            .collect();
        let name = columns
            .iter()
            .position(|c| *c == Column::Name)
            .unwrap_or(DEFAULT_NAME_COLUMN);
        let status = columns
            .iter()
            .position(|c| *c == Column::Status)
            .unwrap_or(DEFAULT_STATUS_COLUMN);
        Self {
            columns,
            name,
            status,
        }
    }

    fn column(&self, idx: usize) -> Column {
        if idx == self.name {
            return Column::Name;
        }
        if idx == self.status {
            return Column::Status;
        }
        self.columns
            .get(idx)
            .cloned()
            .unwrap_or_else(|| Column::Other(format!("column_{idx}")))
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::ParseFailure(format!("bad selector {css}: {e}")))
}

pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn origin_of(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(u) => u.origin().ascii_serialization(),
        Err(_) => String::new(),
    }
}

fn absolute_url(origin: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{origin}{href}")
    } else {
        format!("{origin}/{href}")
    }
}

/// First `table` after the `h2` carrying the mainboard heading, in document order.
fn mainboard_table(doc: &Html) -> Result<ElementRef<'_>, FetchError> {
    let mut seen_heading = false;
    for el in doc.root_element().descendants().filter_map(ElementRef::wrap) {
        let name = el.value().name();
        if !seen_heading {
            if name == "h2" && element_text(el).contains(MAINBOARD_HEADING) {
                seen_heading = true;
            }
        } else if name == "table" {
            return Ok(el);
        }
    }

    if seen_heading {
        Err(FetchError::ParseFailure(format!(
            "no table follows the \"{MAINBOARD_HEADING}\" heading"
        )))
    } else {
        Err(FetchError::ParseFailure(format!(
            "\"{MAINBOARD_HEADING}\" heading not found"
        )))
    }
}

/// Splits the dashboard's mainboard table into CURRENT and UPCOMING listings.
///
/// Missing cells become empty strings; only a missing heading or table fails.
pub fn parse_dashboard(
    html: &str,
    origin: &str,
) -> Result<(Vec<ListingRecord>, Vec<ListingRecord>), FetchError> {
    let doc = Html::parse_document(html);
    let table = mainboard_table(&doc)?;

    let row_sel = selector("tr")?;
    let th_sel = selector("th")?;
    let td_sel = selector("td")?;
    let link_sel = selector("a[href]")?;

    let headers: Vec<String> = table
        .select(&row_sel)
        .find(|row| row.select(&th_sel).next().is_some())
        .map(|row| row.select(&th_sel).map(element_text).collect())
        .unwrap_or_default();
    let layout = Layout::from_headers(&headers);

    let mut current = Vec::new();
    let mut upcoming = Vec::new();

    for row in table.select(&row_sel) {
        let cells: Vec<ElementRef<'_>> = row.select(&td_sel).collect();
        if cells.len() < MIN_CELLS {
            continue;
        }

        let Some(category) = cells
            .get(layout.status)
            .and_then(|c| Category::from_status(&element_text(*c)))
        else {
            continue;
        };

        let Some(name_cell) = cells.get(layout.name) else {
            continue;
        };
        let name = element_text(*name_cell);
        if name.is_empty() {
            continue;
        }

        let target = match category {
            Category::Current => &mut current,
            Category::Upcoming => &mut upcoming,
        };

        let mut record = ListingRecord::new(category, target.len(), name);
        record.url = name_cell
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| absolute_url(origin, href))
            .unwrap_or_default();

        for (idx, cell) in cells.iter().enumerate() {
            let text = element_text(*cell);
            match layout.column(idx) {
                Column::Name | Column::Status => {}
                Column::PriceBand => record.price_band = text,
                Column::IssueSize => record.issue_size = text,
                Column::OpenDate => record.open_date = text,
                Column::CloseDate => record.close_date = text,
                Column::ListingDate => record.listing_date = text,
                Column::Other(key) => {
                    if !text.is_empty() {
                        record.extra.insert(key, text);
                    }
                }
            }
        }

        target.push(record);
    }

    Ok((current, upcoming))
}

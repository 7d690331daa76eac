use crate::domain::ReportSections;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Snapshot,
    BusinessOverview,
    FinancialHealth,
    PositiveIndicators,
    RiskFactors,
    Verdict,
}

// Matched as lowercase prefixes of the heading title.
const ALIASES: &[(&str, Section)] = &[
    ("ipo snapshot", Section::Snapshot),
    ("snapshot", Section::Snapshot),
    ("issue snapshot", Section::Snapshot),
    ("business overview", Section::BusinessOverview),
    ("company overview", Section::BusinessOverview),
    ("financial health", Section::FinancialHealth),
    ("financial performance", Section::FinancialHealth),
    ("financials", Section::FinancialHealth),
    ("positive indicators", Section::PositiveIndicators),
    ("strengths", Section::PositiveIndicators),
    ("negative indicators", Section::RiskFactors),
    ("risk factors", Section::RiskFactors),
    ("risks", Section::RiskFactors),
    ("final verdict", Section::Verdict),
    ("verdict", Section::Verdict),
];

impl Section {
    fn from_title(title: &str) -> Option<Self> {
        let title = title.trim().to_ascii_lowercase();
        ALIASES
            .iter()
            .find(|(alias, _)| title.starts_with(alias))
            .map(|(_, section)| *section)
    }

    fn body_mut(self, sections: &mut ReportSections) -> &mut String {
        match self {
            Section::Snapshot => &mut sections.snapshot,
            Section::BusinessOverview => &mut sections.business_overview,
            Section::FinancialHealth => &mut sections.financial_health,
            Section::PositiveIndicators => &mut sections.positive_indicators,
            Section::RiskFactors => &mut sections.risk_factors,
            Section::Verdict => &mut sections.verdict,
        }
    }
}

fn is_emphasis(c: char) -> bool {
    c == '*' || c == '_'
}

/// Recognises a heading line and returns its section plus any text after the title.
///
/// A heading must look like one: numbered (`3.` / `3)`), `#`-prefixed, bold, or a bare
/// `Title:` line with nothing after the colon.
fn split_heading(line: &str) -> Option<(Section, &str)> {
    let mut rest = line.trim_start_matches('#').trim_start();
    let mut marked = rest.len() != line.len();

    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let after = &rest[digits..];
        if let Some(after) = after.strip_prefix('.').or_else(|| after.strip_prefix(')')) {
            rest = after.trim_start();
            marked = true;
        }
    }

    // A single list marker followed by a space opens a bullet, never a heading.
    let mut lead = rest.chars();
    if matches!(lead.next(), Some('*' | '-')) && lead.next().is_some_and(char::is_whitespace) {
        return None;
    }

    let bold = rest.starts_with("**") || rest.starts_with("__");
    let body = rest.trim_start_matches(is_emphasis);
    let (title, tail) = match body.find(':') {
        Some(i) => (&body[..i], &body[i + 1..]),
        None => (body, ""),
    };
    let tail = tail.trim_start_matches(is_emphasis).trim();
    let bare_title_line = body.contains(':') && tail.is_empty();

    if !(marked || bold || bare_title_line) {
        return None;
    }

    let title = title.trim_matches(|c: char| is_emphasis(c) || c.is_whitespace());
    Section::from_title(title).map(|section| (section, tail))
}

fn append_line(body: &mut String, line: &str) {
    if !body.is_empty() {
        body.push('\n');
    }
    body.push_str(line);
}

/// Splits a free-text analysis into the six fixed sections.
///
/// Never fails: text before the first known heading is dropped, unknown headings stay
/// in the section they appear in, and missing sections are left empty.
pub fn split_sections(text: &str) -> ReportSections {
    let mut sections = ReportSections::default();
    let mut current: Option<Section> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((section, tail)) = split_heading(line) {
            current = Some(section);
            if !tail.is_empty() {
                append_line(section.body_mut(&mut sections), tail);
            }
            continue;
        }

        if let Some(section) = current {
            append_line(section.body_mut(&mut sections), line);
        }
    }

    sections
}

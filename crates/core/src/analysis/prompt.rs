use crate::domain::ListingRecord;

fn push_field(out: &mut String, label: &str, value: &str) {
    let value = value.trim();
    out.push_str(label);
    out.push_str(": ");
    out.push_str(if value.is_empty() { "not disclosed" } else { value });
    out.push('\n');
}

/// Builds the analyst prompt. The same record and details always give the same text.
pub fn build_prompt(record: &ListingRecord, details: Option<&str>) -> String {
    let mut data = String::new();
    push_field(&mut data, "Company", &record.name);
    push_field(&mut data, "Status", record.category.label());
    push_field(&mut data, "Price Band", &record.price_band);
    push_field(&mut data, "Issue Size", &record.issue_size);
    push_field(&mut data, "Open Date", &record.open_date);
    push_field(&mut data, "Close Date", &record.close_date);
    push_field(&mut data, "Listing Date", &record.listing_date);
    for (label, value) in &record.extra {
        push_field(&mut data, label, value);
    }
    if let Some(details) = details.map(str::trim).filter(|d| !d.is_empty()) {
        data.push('\n');
        data.push_str(details);
        data.push('\n');
    }

    [
        "You are an experienced IPO analyst writing for a retail investor.",
        "Use ONLY the data between the markers below. Do not invent figures.",
        "Answer with exactly these six numbered headings, in this order:",
        "1. **IPO Snapshot:** Issue size, price band and key dates.",
        "2. **Business Overview:** One or two sentences on what the company does.",
        "3. **Financial Health:** Revenue and profit trends visible in the data.",
        "4. **Positive Indicators:** Bulleted reasons to consider applying.",
        "5. **Risk Factors:** Bulleted reasons for caution.",
        "6. **Final Verdict:** One balanced paragraph starting with \"Based on the available data...\".",
        "",
        "--- IPO DATA START ---",
        data.trim_end(),
        "--- IPO DATA END ---",
    ]
    .join("\n")
}

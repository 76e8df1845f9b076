// src/services/prompts.rs

//! System and user prompts for the model-backed collaborators.

use super::collaborators::NavigationRequest;

pub const SEARCH_SYSTEM: &str = "\
You are a URL discovery agent for AI and tech conferences. Your role is to ONLY return valid URLs, not event details.

Key tasks:
1. Search for conference and event listing pages
2. Focus on pages likely to contain lists of upcoming tech events
3. Include event aggregator sites and conference series sites

Rules:
1. Only return valid HTTP/HTTPS URLs, one per line, no other text or commentary
2. Focus on reputable sources (conference websites, established tech media, universities)
3. Never return data: URLs or javascript: URLs
4. Ensure URLs point to actual web pages about tech/AI events
5. Do not describe or summarize the events";

pub const EXTRACTION_SYSTEM: &str = r#"You are an event information extraction agent. Analyze web content and extract structured event information.

Return a JSON array of objects with this schema (one object per distinct event):
{
    "event_name": "Full official name of the event",
    "dates": {"start": "YYYY-MM-DD", "end": "YYYY-MM-DD", "timezone": "Timezone if specified"},
    "location": {"venue": "Venue name", "city": "City", "state": "State/province", "country": "Country", "virtual": false, "hybrid": false},
    "description": "Comprehensive event description",
    "topics": ["Main topics/tracks"],
    "registration": {
        "url": "Registration page URL",
        "deadline": "Registration deadline if specified",
        "prices": [{"type": "Tier name", "amount": "Amount", "currency": "Currency code", "valid_until": "YYYY-MM-DD"}]
    },
    "speakers": [{"name": "Full name", "title": "Title/role", "organization": "Organization"}],
    "organizer": {"name": "Organization name", "website": "Website", "contact_email": "Public contact email"}
}

Rules:
1. For incomplete dates, use the first day of the month
2. All prices should include currency
3. Mark virtual/hybrid events appropriately
4. Use ISO format for all dates (YYYY-MM-DD)
5. If a field is not found, use null instead of an empty string
6. Return [] if the page describes no event"#;

pub const NAVIGATION_SYSTEM: &str = r#"You are a navigation agent for an event crawler.
Given the content and links on a webpage, decide whether to:
- click one or more links that lead to more detailed event information (agenda, details, speakers, register), or
- extract, because the current page has enough information about a single event.

Only choose links likely to lead to more event details, most important first. Never choose generic navigation.

Respond with JSON only:
{"action": "click" or "extract", "links": ["<link1>", "<link2>"]}
Use an empty list when the action is extract."#;

/// User message for a search query, optionally pinned to a year.
pub fn search_user(query: &str, target_year: Option<i32>) -> String {
    match target_year {
        Some(year) => format!("Find {year} event pages for: {query}"),
        None => format!("Find event pages for: {query}"),
    }
}

pub fn extraction_user(text: &str, url: &str, title: &str, target_year: Option<i32>) -> String {
    let scope = target_year
        .map(|year| format!("Only extract events happening in {year}.\n"))
        .unwrap_or_default();
    format!(
        "Extract event information from this webpage content.\n\
         {scope}URL: {url}\n\
         Title: {title}\n\n\
         Content (plain text):\n{text}\n\n\
         Return the information in the exact JSON schema. Use null for missing fields."
    )
}

pub fn navigation_user(request: &NavigationRequest) -> String {
    format!(
        "URL: {}\nTitle: {}\n\nContent:\n{}\n\nLinks on page:\n{}",
        request.url,
        request.title,
        request.text,
        request.links.join("\n")
    )
}

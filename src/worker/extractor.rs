use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use crate::domain::{parse_salary_range, JobRecord};

const MIN_TITLE_LEN: usize = 3;
const MAX_TITLE_LEN: usize = 120;

/// Link texts that point at listings rather than a single posting
const NAVIGATION_TEXTS: [&str; 5] = ["view all", "see all", "apply", "learn more", "open roles"];

fn job_path_regex() -> &'static Regex {
    static JOB_PATH_RE: OnceLock<Regex> = OnceLock::new();
    JOB_PATH_RE.get_or_init(|| {
        Regex::new(r"(?i)/(jobs?|careers?|positions?|openings?|roles?)/[^/?#]+")
            .expect("job path regex is valid")
    })
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Pull job postings out of a careers page
///
/// Structured `JobPosting` JSON-LD wins when present; otherwise anchors that
/// link to individual posting paths are used.
pub fn extract_postings(
    html: &str,
    company: &str,
    source_url: &str,
    scraped_at: DateTime<Utc>,
) -> Vec<JobRecord> {
    let document = Html::parse_document(html);

    let mut records = extract_json_ld(&document, company, source_url, scraped_at);
    if records.is_empty() {
        records = extract_links(&document, company, source_url, scraped_at);
    }

    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.identity_key()));
    records
}

fn extract_json_ld(
    document: &Html,
    company: &str,
    source_url: &str,
    scraped_at: DateTime<Utc>,
) -> Vec<JobRecord> {
    let Some(script) = selector(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    let mut values = Vec::new();
    for element in document.select(&script) {
        let raw: String = element.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        values.push(value);
    }

    let mut postings = Vec::new();
    for value in &values {
        collect_job_postings(value, &mut postings);
    }

    postings
        .into_iter()
        .filter_map(|posting| posting_to_record(posting, company, source_url, scraped_at))
        .collect()
}

fn collect_job_postings<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_job_postings(v, out)),
        Value::Object(map) => {
            if map.get("@type").and_then(Value::as_str) == Some("JobPosting") {
                out.push(value);
            }
            if let Some(graph) = map.get("@graph") {
                collect_job_postings(graph, out);
            }
        }
        _ => {}
    }
}

fn posting_to_record(
    posting: &Value,
    company: &str,
    source_url: &str,
    scraped_at: DateTime<Utc>,
) -> Option<JobRecord> {
    let title = posting.get("title")?.as_str()?.trim();
    if title.len() < MIN_TITLE_LEN {
        return None;
    }

    let location = posting
        .get("jobLocation")
        .map(|loc| match loc {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        })
        .and_then(|loc| {
            let address = loc.get("address")?;
            address
                .get("addressLocality")
                .or_else(|| address.get("addressRegion"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| {
            posting
                .get("jobLocationType")
                .and_then(Value::as_str)
                .filter(|t| t.eq_ignore_ascii_case("TELECOMMUTE"))
                .map(|_| "Remote".to_string())
        })
        .unwrap_or_default();

    let url = posting
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or(source_url);

    let department = posting
        .get("occupationalCategory")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let (salary_min, salary_max) = posting
        .get("baseSalary")
        .and_then(|s| s.get("value"))
        .map(|v| {
            // Non-positive amounts are treated as missing
            let to_thousands = |n: f64| {
                let k = if n >= 1000.0 { n / 1000.0 } else { n };
                let k = k.round();
                (1.0..=f64::from(i32::MAX)).contains(&k).then_some(k as i32)
            };
            let min = v.get("minValue").and_then(Value::as_f64).and_then(to_thousands);
            let max = v.get("maxValue").and_then(Value::as_f64).and_then(to_thousands);
            match (min, max, v.get("value").and_then(Value::as_f64)) {
                (None, None, Some(single)) => {
                    let k = to_thousands(single);
                    (k, k)
                }
                (min, max, _) => (min, max),
            }
        })
        .or_else(|| {
            posting
                .get("baseSalary")
                .and_then(Value::as_str)
                .map(parse_salary_range)
        })
        .unwrap_or((None, None));

    let skills: Vec<String> = match posting.get("skills") {
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    Some(
        JobRecord::new(company, title, location, url, scraped_at)
            .with_department(department)
            .with_salary(salary_min, salary_max)
            .with_skills(skills),
    )
}

fn extract_links(
    document: &Html,
    company: &str,
    source_url: &str,
    scraped_at: DateTime<Utc>,
) -> Vec<JobRecord> {
    let Some(anchor) = selector("a[href]") else {
        return Vec::new();
    };
    let base = Url::parse(source_url).ok();

    document
        .select(&anchor)
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            if !job_path_regex().is_match(href) {
                return None;
            }

            let title = element
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if title.len() < MIN_TITLE_LEN || title.len() > MAX_TITLE_LEN {
                return None;
            }
            let lower = title.to_lowercase();
            if NAVIGATION_TEXTS.iter().any(|nav| lower.starts_with(nav)) {
                return None;
            }

            let location = element
                .value()
                .attr("data-location")
                .unwrap_or_default()
                .to_string();
            let url = base
                .as_ref()
                .and_then(|b| b.join(href).ok())
                .map(|u| u.to_string())
                .unwrap_or_else(|| href.to_string());

            Some(JobRecord::new(company, title, location, url, scraped_at))
        })
        .collect()
}

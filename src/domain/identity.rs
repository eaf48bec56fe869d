use sha2::{Digest, Sha256};
use url::Url;

/// Hosted applicant-tracking boards where the company lives in the first path segment
const ATS_HOSTS: [&str; 5] = [
    "jobs.lever.co",
    "boards.greenhouse.io",
    "job-boards.greenhouse.io",
    "jobs.ashbyhq.com",
    "apply.workable.com",
];

/// Host prefixes that carry no company information
const GENERIC_SUBDOMAINS: [&str; 5] = ["www", "careers", "jobs", "boards", "apply"];

/// Normalize a company name into its registry key
///
/// Lower-cases and keeps only alphanumeric characters, so
/// `"OpenAI"`, `"openai"` and `"Open AI"` all map to `"openai"`.
pub fn normalize_company(company: &str) -> String {
    company
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Lower-case and collapse whitespace runs into single spaces
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a job title for duplicate grouping
///
/// Punctuation is treated as a word separator, so `"Software Engineer, Infra"`
/// and `"software engineer - infra"` group together.
pub fn normalize_title(title: &str) -> String {
    let spaced: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    normalize_text(&spaced)
}

/// Stable identity key for a posting: SHA-256 over normalized (company, title, location)
pub fn identity_key(company: &str, title: &str, location: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_company(company).as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalize_text(title).as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalize_text(location).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Derive a company key from a careers page URL
///
/// Returns `None` when the URL cannot be parsed or carries no usable host.
pub fn company_key_from_url(source_url: &str) -> Option<String> {
    let url = Url::parse(source_url).ok()?;
    let host = url.host_str()?.to_lowercase();

    if ATS_HOSTS.contains(&host.as_str()) {
        let slug = url.path_segments()?.find(|s| !s.is_empty())?;
        let key = normalize_company(slug);
        return (!key.is_empty()).then_some(key);
    }

    let labels: Vec<&str> = host
        .split('.')
        .filter(|label| !GENERIC_SUBDOMAINS.contains(label))
        .collect();

    // Drop the TLD; what remains right-most is the registrable name
    let name = match labels.len() {
        0 => return None,
        1 => labels[0],
        n => labels[n - 2],
    };

    let key = normalize_company(name);
    (!key.is_empty()).then_some(key)
}

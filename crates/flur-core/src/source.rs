//! Acquisition tier decision for a profile.
//!
//! Fixed priority, first match wins: a structured OParl endpoint, then the
//! SessionNet-style HTML scraper, then web search. Building the connector for
//! the chosen tier lives with the HTTP client code.

use crate::models::Profile;

/// URL fragments that identify a council information system we can scrape.
const SCRAPER_MARKERS: &[&str] = &["sessionnet", "/bi/", "ris"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProvider {
    /// Brave Search API.
    Primary,
    /// Google Custom Search JSON API.
    Secondary,
}

/// Which search providers have credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchAvailability {
    pub primary: bool,
    pub secondary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionTier {
    StructuredApi { endpoint: String },
    Scraper { base_url: String },
    Search(SearchProvider),
}

pub fn is_scraper_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    SCRAPER_MARKERS.iter().any(|m| lower.contains(m))
}

/// Decide how to acquire documents for `profile`. `None` means skip it.
pub fn select_tier(profile: &Profile, search: SearchAvailability) -> Option<AcquisitionTier> {
    if let Some(endpoint) = profile
        .oparl_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
    {
        return Some(AcquisitionTier::StructuredApi {
            endpoint: endpoint.to_string(),
        });
    }

    if let Some(url) = profile
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        && is_scraper_url(url)
    {
        return Some(AcquisitionTier::Scraper {
            base_url: url.to_string(),
        });
    }

    if search.primary {
        Some(AcquisitionTier::Search(SearchProvider::Primary))
    } else if search.secondary {
        Some(AcquisitionTier::Search(SearchProvider::Secondary))
    } else {
        None
    }
}

//! Source connectors and the selector that binds one to a profile.

pub mod oparl;
pub mod search;
pub mod sessionnet;

use flur_core::error::AppError;
use flur_core::models::{Document, Profile};
use flur_core::source::{AcquisitionTier, SearchAvailability, SearchProvider, select_tier};
use flur_core::traits::{Connector, ConnectorSelector, Fetcher};

pub use oparl::OParlConnector;
pub use search::{BraveSearch, GoogleSearch, SearchBackend, SearchConnector};
pub use sessionnet::SessionNetConnector;

/// The connector chosen for one profile.
#[derive(Clone)]
pub enum SourceConnector<F> {
    OParl(OParlConnector<F>),
    SessionNet(SessionNetConnector<F>),
    Search(SearchConnector),
}

impl<F: Fetcher> Connector for SourceConnector<F> {
    fn name(&self) -> &'static str {
        match self {
            SourceConnector::OParl(c) => c.name(),
            SourceConnector::SessionNet(c) => c.name(),
            SourceConnector::Search(c) => c.name(),
        }
    }

    async fn fetch_documents(&self, profile: &Profile) -> Result<Vec<Document>, AppError> {
        match self {
            SourceConnector::OParl(c) => c.fetch_documents(profile).await,
            SourceConnector::SessionNet(c) => c.fetch_documents(profile).await,
            SourceConnector::Search(c) => c.fetch_documents(profile).await,
        }
    }

    async fn enrich(&self, document: Document) -> Result<Document, AppError> {
        match self {
            SourceConnector::OParl(c) => c.enrich(document).await,
            SourceConnector::SessionNet(c) => c.enrich(document).await,
            SourceConnector::Search(c) => c.enrich(document).await,
        }
    }
}

/// Builds the connector for a profile's acquisition tier.
///
/// Crawl-target connectors share the one fetcher; search connectors are only
/// offered when their credentials were configured.
#[derive(Clone)]
pub struct SourceSelector<F> {
    fetcher: F,
    brave: Option<BraveSearch>,
    google: Option<GoogleSearch>,
}

impl<F: Fetcher> SourceSelector<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            brave: None,
            google: None,
        }
    }

    pub fn with_brave(mut self, brave: BraveSearch) -> Self {
        self.brave = Some(brave);
        self
    }

    pub fn with_google(mut self, google: GoogleSearch) -> Self {
        self.google = Some(google);
        self
    }

    pub fn search_availability(&self) -> SearchAvailability {
        SearchAvailability {
            primary: self.brave.is_some(),
            secondary: self.google.is_some(),
        }
    }
}

impl<F: Fetcher> ConnectorSelector for SourceSelector<F> {
    type Connector = SourceConnector<F>;

    fn select(&self, profile: &Profile) -> Option<SourceConnector<F>> {
        let tier = select_tier(profile, self.search_availability());
        let connector = match tier? {
            AcquisitionTier::StructuredApi { endpoint } => {
                SourceConnector::OParl(OParlConnector::new(endpoint, self.fetcher.clone()))
            }
            AcquisitionTier::Scraper { base_url } => SourceConnector::SessionNet(
                SessionNetConnector::new(base_url, self.fetcher.clone()),
            ),
            AcquisitionTier::Search(SearchProvider::Primary) => SourceConnector::Search(
                SearchConnector::new(SearchBackend::Brave(self.brave.clone()?)),
            ),
            AcquisitionTier::Search(SearchProvider::Secondary) => SourceConnector::Search(
                SearchConnector::new(SearchBackend::Google(self.google.clone()?)),
            ),
        };
        tracing::info!(profile = %profile.name, connector = connector.name(), "Selected connector");
        Some(connector)
    }
}

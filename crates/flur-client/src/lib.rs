pub mod connectors;
pub mod fetcher;
pub mod ner;
pub mod pdf;
pub mod robots;

pub use connectors::{SourceConnector, SourceSelector};
pub use fetcher::{FetcherConfig, ResilientFetcher};
pub use ner::HttpEntityRecognizer;
pub use pdf::{CommandOcr, LopdfExtractor};
pub use robots::{RobotsPolicy, RobotsRules};

//! OParl (1.0/1.1) connector: System -> Body -> Paper list.

use flur_core::error::AppError;
use flur_core::models::{Document, Profile};
use flur_core::traits::{Connector, Fetcher, RequestOptions};
use serde_json::Value;

/// Paper list pages followed via `links.next` per crawl.
const MAX_PAPER_PAGES: usize = 5;

#[derive(Clone)]
pub struct OParlConnector<F> {
    endpoint: String,
    fetcher: F,
}

impl<F: Fetcher> OParlConnector<F> {
    pub fn new(endpoint: impl Into<String>, fetcher: F) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            endpoint: endpoint.trim().trim_end_matches('/').to_string(),
            fetcher,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// GET a JSON resource. `Ok(None)` when the source is unreachable this cycle.
    async fn get_json(&self, url: &str) -> Result<Option<Value>, AppError> {
        let options = RequestOptions::new().header("Accept", "application/json");
        let Some(response) = self.fetcher.get(url, &options).await else {
            tracing::warn!(url = %url, "OParl resource unreachable");
            return Ok(None);
        };
        if response.status != 200 {
            tracing::warn!(url = %url, status = response.status, "OParl request failed");
            return Ok(None);
        }
        response
            .json::<Value>()
            .map(Some)
            .map_err(|e| AppError::ExtractionError(format!("Malformed OParl JSON from {url}: {e}")))
    }

    /// Raw paper objects of the first body.
    pub async fn papers(&self) -> Result<Vec<Value>, AppError> {
        let Some(system) = self.get_json(&self.endpoint).await? else {
            return Ok(Vec::new());
        };
        tracing::debug!(
            system = %system.get("name").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "Connected to OParl system"
        );

        let Some(body_url) = first_body_url(&system) else {
            tracing::warn!(endpoint = %self.endpoint, "OParl system lists no body");
            return Ok(Vec::new());
        };
        let Some(raw_body) = self.get_json(&body_url).await? else {
            return Ok(Vec::new());
        };
        let Some(paper_url) = unwrap_body(raw_body)
            .as_ref()
            .and_then(|body| body.get("paper"))
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            tracing::warn!(body = %body_url, "OParl body has no paper endpoint");
            return Ok(Vec::new());
        };

        let mut papers = Vec::new();
        let mut next = Some(paper_url);
        let mut pages = 0;
        while let Some(url) = next.take() {
            let Some(page) = self.get_json(&url).await? else {
                break;
            };
            papers.extend(list_items(&page));
            pages += 1;
            if pages < MAX_PAPER_PAGES {
                next = next_page(&page);
            }
        }

        tracing::info!(endpoint = %self.endpoint, papers = papers.len(), "Fetched OParl papers");
        Ok(papers)
    }
}

impl<F: Fetcher> Connector for OParlConnector<F> {
    fn name(&self) -> &'static str {
        "oparl"
    }

    async fn fetch_documents(&self, _profile: &Profile) -> Result<Vec<Document>, AppError> {
        Ok(self.papers().await?.iter().filter_map(paper_to_document).collect())
    }
}

/// `body` may be a URL, an object with `id`, or a list of either.
fn first_body_url(system: &Value) -> Option<String> {
    let body = match system.get("body")? {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match body {
        Value::String(url) => Some(url.clone()),
        Value::Object(obj) => obj.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Body endpoints often answer with a `{ "data": [...] }` list wrapper.
fn unwrap_body(raw: Value) -> Option<Value> {
    match raw {
        Value::Object(mut obj) if obj.contains_key("data") => match obj.remove("data")? {
            Value::Array(items) => items.into_iter().next(),
            body => Some(body),
        },
        body => Some(body),
    }
}

fn list_items(page: &Value) -> Vec<Value> {
    match page {
        Value::Array(items) => items.clone(),
        Value::Object(obj) => obj
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn next_page(page: &Value) -> Option<String> {
    page.get("links")?
        .get("next")?
        .as_str()
        .map(str::to_string)
}

pub fn paper_to_document(paper: &Value) -> Option<Document> {
    let text = |key: &str| paper.get(key).and_then(Value::as_str).map(str::to_string);

    let id = text("id")?;
    let title = text("name").or_else(|| text("reference")).unwrap_or_default();
    let mut document = Document::new(id.clone(), title);
    document.doc_type = text("type");
    document.published = text("date");
    document.url = text("web").or(Some(id));
    document.file_url = ["mainFile", "file", "auxiliaryFile"]
        .iter()
        .filter_map(|key| paper.get(*key))
        .find_map(file_url);
    Some(document)
}

/// A file reference may be a list, an OParl File object, or a bare URL.
fn file_url(files: &Value) -> Option<String> {
    let file = match files {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match file {
        Value::String(url) => Some(url.clone()),
        Value::Object(obj) => obj
            .get("accessUrl")
            .or_else(|| obj.get("downloadUrl"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flur_core::testutil::{MockFetcher, make_test_profile};
    use serde_json::json;

    const SYSTEM: &str = "https://oparl.musterstadt.de/oparl/v1/system";
    const BODY: &str = "https://oparl.musterstadt.de/oparl/v1/body";
    const PAPERS: &str = "https://oparl.musterstadt.de/oparl/v1/body/1/paper";
    const PAPERS_2: &str = "https://oparl.musterstadt.de/oparl/v1/body/1/paper?page=2";

    fn oparl_fixture() -> MockFetcher {
        MockFetcher::new()
            .with_json(SYSTEM, json!({ "name": "Musterstadt", "body": [BODY] }))
            .with_json(
                BODY,
                json!({ "data": [{ "id": "https://oparl.musterstadt.de/oparl/v1/body/1", "paper": PAPERS }] }),
            )
            .with_json(
                PAPERS,
                json!({
                    "data": [
                        {
                            "id": "https://oparl.musterstadt.de/paper/1",
                            "name": "Aufstellungsbeschluss Solarpark Nord",
                            "type": "https://schema.oparl.org/1.1/Paper",
                            "date": "2024-05-02",
                            "mainFile": { "accessUrl": "https://oparl.musterstadt.de/file/1.pdf" }
                        },
                        { "name": "no id, skipped" }
                    ],
                    "links": { "next": PAPERS_2 }
                }),
            )
            .with_json(
                PAPERS_2,
                json!({
                    "data": [{
                        "id": "https://oparl.musterstadt.de/paper/2",
                        "name": "Haushaltssatzung",
                        "auxiliaryFile": [{ "downloadUrl": "https://oparl.musterstadt.de/file/2.pdf" }]
                    }],
                    "links": {}
                }),
            )
    }

    #[tokio::test]
    async fn walks_system_body_and_paper_pages() {
        let fetcher = oparl_fixture();
        let connector = OParlConnector::new(format!("{SYSTEM}/"), fetcher.clone());
        assert_eq!(connector.endpoint(), SYSTEM);

        let docs = connector.fetch_documents(&make_test_profile()).await.unwrap();
        assert_eq!(docs.len(), 2);

        assert_eq!(docs[0].external_id, "https://oparl.musterstadt.de/paper/1");
        assert_eq!(docs[0].title, "Aufstellungsbeschluss Solarpark Nord");
        assert_eq!(docs[0].published.as_deref(), Some("2024-05-02"));
        assert_eq!(
            docs[0].file_url.as_deref(),
            Some("https://oparl.musterstadt.de/file/1.pdf")
        );
        assert_eq!(
            docs[1].file_url.as_deref(),
            Some("https://oparl.musterstadt.de/file/2.pdf")
        );

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 4);
        assert!(
            requests[0]
                .options
                .headers
                .contains(&("Accept".to_string(), "application/json".to_string()))
        );
    }

    #[tokio::test]
    async fn unreachable_system_yields_no_documents() {
        let connector = OParlConnector::new(SYSTEM, MockFetcher::new());
        let docs = connector.fetch_documents(&make_test_profile()).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let fetcher = MockFetcher::new().with_body(SYSTEM, "<html>maintenance</html>");
        let connector = OParlConnector::new(SYSTEM, fetcher);
        let err = connector.fetch_documents(&make_test_profile()).await.unwrap_err();
        assert!(matches!(err, AppError::ExtractionError(_)));
    }

    #[test]
    fn body_reference_shapes() {
        assert_eq!(
            first_body_url(&json!({ "body": "https://x/body" })).as_deref(),
            Some("https://x/body")
        );
        assert_eq!(
            first_body_url(&json!({ "body": [{ "id": "https://x/body/1" }] })).as_deref(),
            Some("https://x/body/1")
        );
        assert_eq!(first_body_url(&json!({ "body": [] })), None);

        let unwrapped = unwrap_body(json!({ "data": { "paper": "https://x/p" } })).unwrap();
        assert_eq!(unwrapped["paper"], "https://x/p");
        assert_eq!(unwrap_body(json!({ "data": [] })), None);
    }

    #[test]
    fn paper_file_shapes() {
        let bare = json!({ "id": "p", "file": "https://x/f.pdf" });
        assert_eq!(
            paper_to_document(&bare).unwrap().file_url.as_deref(),
            Some("https://x/f.pdf")
        );

        let none = json!({ "id": "p", "reference": "DS 12/2024" });
        let doc = paper_to_document(&none).unwrap();
        assert_eq!(doc.title, "DS 12/2024");
        assert_eq!(doc.file_url, None);
        assert_eq!(doc.url.as_deref(), Some("p"));
    }
}

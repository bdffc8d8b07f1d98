//! Web search service backed by the Serper API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::service::{unknown_tool, McpService, ToolDefinition};

const DEFAULT_BASE_URL: &str = "https://google.serper.dev";

fn default_num_results() -> u32 {
    10
}

fn default_search_type() -> String {
    "search".into()
}

fn default_country() -> String {
    "us".into()
}

fn default_language() -> String {
    "en".into()
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_num_results")]
    num_results: u32,
    #[serde(default = "default_search_type")]
    search_type: String,
    #[serde(default = "default_country")]
    country: String,
    #[serde(default = "default_language")]
    language: String,
}

/// Google search via the Serper API.
#[derive(Debug)]
pub struct WebSearchService {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
    running: AtomicBool,
}

impl WebSearchService {
    /// Build from a service config mapping.
    ///
    /// The API key comes from the `serper_api_key` config entry or the
    /// `SERPER_API_KEY` environment variable; missing both is a
    /// construction error.
    pub fn from_config(config: &Value) -> Result<Self> {
        let api_key = config
            .get("serper_api_key")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| std::env::var("SERPER_API_KEY").ok())
            .ok_or_else(|| {
                Error::Config("SERPER_API_KEY not found in config or environment".into())
            })?;

        let base_url = config
            .get("base_url")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_key,
            base_url,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            running: AtomicBool::new(false),
        })
    }

    async fn perform_search(&self, arguments: Value) -> Value {
        let args: SearchArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
        };

        let endpoint = match args.search_type.as_str() {
            "search" => "/search",
            "images" => "/images",
            "news" => "/news",
            "shopping" => "/shopping",
            "places" => "/places",
            other => return json!({ "error": format!("Invalid search type: {other}") }),
        };

        let payload = json!({
            "q": args.query,
            "num": args.num_results,
            "gl": args.country,
            "hl": args.language,
        });

        let response = self
            .http
            .post(format!("{}{}", self.base_url, endpoint))
            .header("X-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                return json!({
                    "error": format!("Search request failed: {e}"),
                    "status": "failed",
                })
            }
        };

        let results: Value = match response.json().await {
            Ok(results) => results,
            Err(e) => {
                return json!({
                    "error": format!("Failed to parse search response: {e}"),
                    "status": "failed",
                })
            }
        };

        let formatted = format_results(&results, &args.search_type);

        json!({
            "status": "success",
            "query": args.query,
            "search_type": args.search_type,
            "results": results,
            "formatted_results": formatted,
            "credits_used": results.get("credits").cloned().unwrap_or(json!(1)),
        })
    }
}

/// Build a compact, rank-ordered summary of the raw Serper payload.
fn format_results(results: &Value, search_type: &str) -> Value {
    let mut formatted = json!({
        "search_parameters": results.get("searchParameters").cloned().unwrap_or(json!({})),
        "total_results": 0,
        "formatted_results": [],
    });

    let (list_key, map_entry): (&str, fn(usize, &Value) -> Value) = match search_type {
        "search" => ("organic", |rank, r| {
            json!({
                "rank": rank,
                "title": r["title"].as_str().unwrap_or(""),
                "link": r["link"].as_str().unwrap_or(""),
                "snippet": r["snippet"].as_str().unwrap_or(""),
                "date": r["date"].as_str().unwrap_or(""),
            })
        }),
        "images" => ("images", |rank, r| {
            json!({
                "rank": rank,
                "title": r["title"].as_str().unwrap_or(""),
                "image_url": r["imageUrl"].as_str().unwrap_or(""),
                "source_url": r["link"].as_str().unwrap_or(""),
                "source": r["source"].as_str().unwrap_or(""),
            })
        }),
        "news" => ("news", |rank, r| {
            json!({
                "rank": rank,
                "title": r["title"].as_str().unwrap_or(""),
                "link": r["link"].as_str().unwrap_or(""),
                "snippet": r["snippet"].as_str().unwrap_or(""),
                "date": r["date"].as_str().unwrap_or(""),
                "source": r["source"].as_str().unwrap_or(""),
            })
        }),
        "shopping" => ("shopping", |rank, r| {
            json!({
                "rank": rank,
                "title": r["title"].as_str().unwrap_or(""),
                "link": r["link"].as_str().unwrap_or(""),
                "price": r["price"].as_str().unwrap_or(""),
                "source": r["source"].as_str().unwrap_or(""),
            })
        }),
        "places" => ("places", |rank, r| {
            json!({
                "rank": rank,
                "title": r["title"].as_str().unwrap_or(""),
                "address": r["address"].as_str().unwrap_or(""),
                "phone": r["phoneNumber"].as_str().unwrap_or(""),
                "website": r["website"].as_str().unwrap_or(""),
                "category": r["category"].as_str().unwrap_or(""),
            })
        }),
        _ => return formatted,
    };

    if let Some(entries) = results.get(list_key).and_then(Value::as_array) {
        formatted["total_results"] = json!(entries.len());
        formatted["formatted_results"] = Value::Array(
            entries
                .iter()
                .enumerate()
                .map(|(i, r)| map_entry(i + 1, r))
                .collect(),
        );
    }

    if search_type == "search" {
        for (source_key, target_key) in [
            ("knowledgeGraph", "knowledge_graph"),
            ("peopleAlsoAsk", "people_also_ask"),
            ("relatedSearches", "related_searches"),
        ] {
            if let Some(extra) = results.get(source_key) {
                formatted[target_key] = extra.clone();
            }
        }
    }

    formatted
}

#[async_trait]
impl McpService for WebSearchService {
    fn name(&self) -> &str {
        "web_search"
    }

    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("web search service started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("web search service stopped");
        Ok(())
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "web_search".into(),
            description: "Search Google using the Serper API".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "num_results": {
                        "type": "integer",
                        "description": "Number of results to return (default: 10, max: 100)",
                        "default": 10,
                        "minimum": 1,
                        "maximum": 100
                    },
                    "search_type": {
                        "type": "string",
                        "description": "Type of search",
                        "enum": ["search", "images", "news", "shopping", "places"],
                        "default": "search"
                    },
                    "country": {
                        "type": "string",
                        "description": "Country code for localized results (e.g. 'us', 'uk')",
                        "default": "us"
                    },
                    "language": {
                        "type": "string",
                        "description": "Language code for results (e.g. 'en', 'es')",
                        "default": "en"
                    }
                },
                "required": ["query"]
            }),
        }]
    }

    async fn call_tool(&self, tool: &str, arguments: Value, _session_id: Option<&str>) -> Value {
        match tool {
            "web_search" => self.perform_search(arguments).await,
            _ => unknown_tool(tool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> WebSearchService {
        WebSearchService::from_config(&json!({ "serper_api_key": "test-key" })).unwrap()
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        // only when the environment does not provide one either
        if std::env::var("SERPER_API_KEY").is_ok() {
            return;
        }
        let err = WebSearchService::from_config(&json!({})).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn invalid_search_type_is_a_tool_error() {
        let service = service();
        let result = service
            .call_tool(
                "web_search",
                json!({ "query": "rust", "search_type": "videos" }),
                None,
            )
            .await;
        assert_eq!(result["error"], "Invalid search type: videos");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_tool_error() {
        let service = service();
        let result = service.call_tool("bogus", json!({}), None).await;
        assert_eq!(result["error"], "Unknown tool: bogus");
    }

    #[test]
    fn formats_organic_results() {
        let raw = json!({
            "searchParameters": { "q": "rust" },
            "organic": [
                { "title": "Rust", "link": "https://rust-lang.org", "snippet": "A language" },
                { "title": "Docs", "link": "https://doc.rust-lang.org" }
            ],
            "relatedSearches": [{ "query": "rust book" }]
        });

        let formatted = format_results(&raw, "search");
        assert_eq!(formatted["total_results"], 2);
        assert_eq!(formatted["formatted_results"][0]["rank"], 1);
        assert_eq!(formatted["formatted_results"][0]["title"], "Rust");
        assert_eq!(formatted["formatted_results"][1]["snippet"], "");
        assert!(formatted.get("related_searches").is_some());
        assert!(formatted.get("knowledge_graph").is_none());
    }

    #[test]
    fn formats_news_results() {
        let raw = json!({
            "news": [{ "title": "Release", "source": "blog", "date": "today" }]
        });
        let formatted = format_results(&raw, "news");
        assert_eq!(formatted["total_results"], 1);
        assert_eq!(formatted["formatted_results"][0]["source"], "blog");
    }
}

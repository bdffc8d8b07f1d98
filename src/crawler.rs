//! Web crawler service: fetches a page and extracts readable content.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::service::{unknown_tool, McpService, ToolDefinition};

const DEFAULT_MAX_CONTENT_LENGTH: usize = 1024 * 1024;

/// Tags whose content never counts as page content.
const SKIP_TAGS: [&str; 9] = [
    "script", "style", "noscript", "head", "nav", "header", "footer", "aside", "iframe",
];

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CrawlArgs {
    url: String,
    #[serde(default)]
    extract_links: bool,
    #[serde(default)]
    extract_images: bool,
    #[serde(default = "default_true")]
    extract_metadata: bool,
    #[serde(default)]
    clean_html: bool,
    #[serde(default)]
    custom_headers: HashMap<String, String>,
}

/// Webpage content extraction service.
#[derive(Debug)]
pub struct WebCrawlerService {
    max_content_length: usize,
    http: reqwest::Client,
    running: AtomicBool,
}

impl WebCrawlerService {
    /// Build from a service config mapping.
    ///
    /// Recognized keys: `timeout` seconds (default 30),
    /// `max_content_length` bytes (default 1 MiB).
    pub fn from_config(config: &Value) -> Result<Self> {
        let timeout = config.get("timeout").and_then(Value::as_u64).unwrap_or(30);
        let max_content_length = config
            .get("max_content_length")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_CONTENT_LENGTH as u64) as usize;

        Ok(Self {
            max_content_length,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout))
                .build()?,
            running: AtomicBool::new(false),
        })
    }

    async fn crawl_page(&self, arguments: Value) -> Value {
        let args: CrawlArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => return json!({ "error": format!("invalid arguments: {e}") }),
        };

        let Ok(base_url) = reqwest::Url::parse(&args.url) else {
            return json!({ "error": "Invalid URL provided" });
        };
        if !matches!(base_url.scheme(), "http" | "https") || base_url.host().is_none() {
            return json!({ "error": "Invalid URL provided" });
        }

        let mut request = self.http.get(base_url.clone());
        for (name, value) in default_headers() {
            request = request.header(name, value);
        }
        for (name, value) in &args.custom_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => response,
            Err(e) => {
                return json!({
                    "error": format!("Failed to fetch webpage: {e}"),
                    "status": "failed",
                    "url": args.url,
                })
            }
        };

        if let Some(declared) = response.content_length() {
            if declared as usize > self.max_content_length {
                return json!({ "error": format!("Content too large: {declared} bytes") });
            }
        }

        let final_url = response.url().to_string();
        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return json!({
                    "error": format!("Failed to fetch webpage: {e}"),
                    "status": "failed",
                    "url": args.url,
                })
            }
        };
        let body = &body[..body.len().min(self.max_content_length)];
        let content = String::from_utf8_lossy(body).into_owned();

        // `Html` is not Send; everything below is synchronous so it never
        // lives across an await point.
        let document = Html::parse_document(&content);

        let mut result = json!({
            "url": final_url,
            "status_code": status_code,
            "content_type": content_type,
            "content_length": content.len(),
            "status": "success",
        });

        if args.extract_metadata {
            result["metadata"] = extract_metadata(&document);
        }

        if args.clean_html {
            result["content"] = json!(extract_clean_html(&document));
            result["content_type_returned"] = json!("html");
        } else {
            result["content"] = json!(extract_text(&document));
            result["content_type_returned"] = json!("text");
        }

        if args.extract_links {
            result["links"] = extract_links(&document, &base_url);
        }
        if args.extract_images {
            result["images"] = extract_images(&document, &base_url);
        }

        result
    }
}

/// Browser-like headers so ordinary pages serve their full content.
fn default_headers() -> [(&'static str, &'static str); 5] {
    [
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Referer", "https://www.google.com/"),
        ("Upgrade-Insecure-Requests", "1"),
    ]
}

fn extract_metadata(document: &Html) -> Value {
    let mut meta_tags = serde_json::Map::new();
    let meta_selector = Selector::parse("meta").unwrap();
    for meta in document.select(&meta_selector) {
        let name = meta
            .value()
            .attr("name")
            .or_else(|| meta.value().attr("property"))
            .or_else(|| meta.value().attr("http-equiv"));
        if let (Some(name), Some(content)) = (name, meta.value().attr("content")) {
            meta_tags.insert(name.to_string(), json!(content));
        }
    }

    let get = |key: &str| meta_tags.get(key).cloned().unwrap_or(json!(""));

    let title_selector = Selector::parse("title").unwrap();
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let html_selector = Selector::parse("html").unwrap();
    let language = document
        .select(&html_selector)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .unwrap_or("")
        .to_string();

    let canonical_selector = Selector::parse("link[rel=\"canonical\"]").unwrap();
    let canonical = document
        .select(&canonical_selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .unwrap_or("")
        .to_string();

    json!({
        "title": title,
        "description": get("description"),
        "keywords": get("keywords"),
        "author": get("author"),
        "og_title": get("og:title"),
        "og_description": get("og:description"),
        "og_image": get("og:image"),
        "language": language,
        "canonical": canonical,
        "meta_tags": Value::Object(meta_tags),
    })
}

fn extract_text(document: &Html) -> String {
    let body_selector = Selector::parse("body").unwrap();
    let text = match document.select(&body_selector).next() {
        Some(body) => element_text(&body),
        None => element_text(&document.root_element()),
    };

    let chunks: Vec<&str> = text.split_whitespace().collect();
    chunks.join(" ")
}

fn element_text(element: &ElementRef) -> String {
    let mut text = String::new();
    for node in element.children() {
        if let Some(el) = ElementRef::wrap(node) {
            if SKIP_TAGS.contains(&el.value().name()) {
                continue;
            }
            text.push_str(&element_text(&el));
            text.push(' ');
        } else if let Some(txt) = node.value().as_text() {
            text.push_str(txt);
        }
    }
    text
}

fn extract_clean_html(document: &Html) -> String {
    let root = ["main", "article", "body"]
        .iter()
        .find_map(|tag| {
            let selector = Selector::parse(tag).unwrap();
            document.select(&selector).next()
        });

    match root {
        Some(root) => element_clean_html(&root),
        None => element_clean_html(&document.root_element()),
    }
}

/// Rebuild an element's markup without attributes and without the skip-list
/// subtrees.
fn element_clean_html(element: &ElementRef) -> String {
    let mut html = String::new();
    for node in element.children() {
        if let Some(el) = ElementRef::wrap(node) {
            let tag = el.value().name();
            if SKIP_TAGS.contains(&tag) {
                continue;
            }
            let inner = element_clean_html(&el);
            if inner.trim().is_empty() && tag != "img" && tag != "br" {
                continue;
            }
            html.push_str(&format!("<{tag}>{inner}</{tag}>"));
        } else if let Some(txt) = node.value().as_text() {
            html.push_str(txt.trim());
        }
    }
    html
}

fn extract_links(document: &Html, base_url: &reqwest::Url) -> Value {
    let selector = Selector::parse("a[href]").unwrap();
    let links: Vec<Value> = document
        .select(&selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim();
            if href.is_empty() || href.starts_with('#') {
                return None;
            }
            let url = base_url.join(href).ok()?;
            Some(json!({
                "url": url.to_string(),
                "text": el.text().collect::<String>().trim(),
                "title": el.value().attr("title").unwrap_or("").trim(),
            }))
        })
        .collect();
    Value::Array(links)
}

fn extract_images(document: &Html, base_url: &reqwest::Url) -> Value {
    let selector = Selector::parse("img[src]").unwrap();
    let images: Vec<Value> = document
        .select(&selector)
        .filter_map(|el| {
            let src = el.value().attr("src")?.trim();
            if src.is_empty() {
                return None;
            }
            let url = base_url.join(src).ok()?;
            Some(json!({
                "url": url.to_string(),
                "alt": el.value().attr("alt").unwrap_or("").trim(),
                "title": el.value().attr("title").unwrap_or("").trim(),
            }))
        })
        .collect();
    Value::Array(images)
}

#[async_trait]
impl McpService for WebCrawlerService {
    fn name(&self) -> &str {
        "web_crawler"
    }

    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("web crawler service started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("web crawler service stopped");
        Ok(())
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "crawl_page".into(),
            description:
                "Crawl and extract content from a webpage, cleaning up scripts and non-content elements"
                    .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "URL of the webpage to crawl" },
                    "extract_links": {
                        "type": "boolean",
                        "description": "Whether to extract links from the page",
                        "default": false
                    },
                    "extract_images": {
                        "type": "boolean",
                        "description": "Whether to extract image URLs from the page",
                        "default": false
                    },
                    "extract_metadata": {
                        "type": "boolean",
                        "description": "Whether to extract page metadata (title, description, ...)",
                        "default": true
                    },
                    "clean_html": {
                        "type": "boolean",
                        "description": "Whether to return cleaned HTML instead of plain text",
                        "default": false
                    },
                    "custom_headers": {
                        "type": "object",
                        "description": "Custom headers to use for the request",
                        "default": {}
                    }
                },
                "required": ["url"]
            }),
        }]
    }

    async fn call_tool(&self, tool: &str, arguments: Value, _session_id: Option<&str>) -> Value {
        match tool {
            "crawl_page" => self.crawl_page(arguments).await,
            _ => unknown_tool(tool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <title>Test Page</title>
            <meta name="description" content="A test page">
            <meta property="og:title" content="OG Test">
            <link rel="canonical" href="https://example.com/canonical">
            <style>.x { color: red; }</style>
        </head>
        <body>
            <nav><a href="/home">Home</a></nav>
            <h1>Hello World</h1>
            <p>Visible <b>text</b> here.</p>
            <script>var hidden = 1;</script>
            <a href="/about" title="About us">About</a>
            <a href="#anchor">Skip me</a>
            <img src="/logo.png" alt="Logo">
        </body>
        </html>
    "##;

    fn service() -> WebCrawlerService {
        WebCrawlerService::from_config(&json!({})).unwrap()
    }

    #[tokio::test]
    async fn invalid_url_is_a_tool_error() {
        let service = service();
        let result = service
            .call_tool("crawl_page", json!({ "url": "not a url" }), None)
            .await;
        assert_eq!(result["error"], "Invalid URL provided");

        let result = service
            .call_tool("crawl_page", json!({ "url": "ftp://example.com/x" }), None)
            .await;
        assert_eq!(result["error"], "Invalid URL provided");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_tool_error() {
        let service = service();
        let result = service.call_tool("bogus", json!({}), None).await;
        assert_eq!(result["error"], "Unknown tool: bogus");
    }

    #[test]
    fn text_extraction_skips_scripts_and_chrome() {
        let document = Html::parse_document(PAGE);
        let text = extract_text(&document);
        assert!(text.contains("Hello World"));
        assert!(text.contains("Visible text here."));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn metadata_extraction() {
        let document = Html::parse_document(PAGE);
        let metadata = extract_metadata(&document);
        assert_eq!(metadata["title"], "Test Page");
        assert_eq!(metadata["description"], "A test page");
        assert_eq!(metadata["og_title"], "OG Test");
        assert_eq!(metadata["language"], "en");
        assert_eq!(metadata["canonical"], "https://example.com/canonical");
        assert_eq!(metadata["meta_tags"]["og:title"], "OG Test");
        assert_eq!(metadata["author"], "");
    }

    #[test]
    fn link_extraction_resolves_and_filters() {
        let document = Html::parse_document(PAGE);
        let base = reqwest::Url::parse("https://example.com/page").unwrap();
        let links = extract_links(&document, &base);
        let links = links.as_array().unwrap();

        // the anchor link is filtered, nav + about remain
        assert_eq!(links.len(), 2);
        assert_eq!(links[0]["url"], "https://example.com/home");
        assert_eq!(links[1]["url"], "https://example.com/about");
        assert_eq!(links[1]["title"], "About us");
    }

    #[test]
    fn image_extraction_resolves_urls() {
        let document = Html::parse_document(PAGE);
        let base = reqwest::Url::parse("https://example.com/").unwrap();
        let images = extract_images(&document, &base);
        let images = images.as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["url"], "https://example.com/logo.png");
        assert_eq!(images[0]["alt"], "Logo");
    }

    #[test]
    fn clean_html_drops_scripts_and_attributes() {
        let document = Html::parse_document(PAGE);
        let html = extract_clean_html(&document);
        assert!(html.contains("<h1>Hello World</h1>"));
        assert!(html.contains("<b>text</b>"));
        assert!(!html.contains("script"));
        assert!(!html.contains("nav"));
        assert!(!html.contains("href"));
    }
}

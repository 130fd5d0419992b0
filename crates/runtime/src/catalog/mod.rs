//! Static API catalog
//!
//! A curated list of public HTTP APIs the knowledge pipeline can draw
//! from, with the metadata the selector scores on. Entries favor
//! keyless, CORS-friendly endpoints; reliability scores reflect
//! observed uptime of the public instances.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub mod selector;

pub use selector::{preferred_categories, select_relevant_apis, tokenize_objective, ScoredApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    None,
    ApiKey,
    OAuth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSpec {
    pub requests: u32,
    /// Window length in milliseconds.
    pub time_window: u64,
}

/// One catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub name: String,
    pub description: String,
    pub url: String,
    pub category: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub auth_type: AuthType,
    pub https: bool,
    pub cors: bool,
    pub reliability_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<RateLimitSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_patterns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_endpoint: Option<String>,
}

impl ApiEndpoint {
    fn new(
        name: &str,
        description: &str,
        url: &str,
        category: &str,
        keywords: &[&str],
        reliability_score: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            url: url.to_string(),
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            auth_type: AuthType::None,
            https: url.starts_with("https://"),
            cors: true,
            reliability_score,
            rate_limits: None,
            endpoint_patterns: None,
            documentation_url: None,
            health_check_endpoint: None,
        }
    }

    fn with_auth(mut self, auth_type: AuthType) -> Self {
        self.auth_type = auth_type;
        self
    }

    fn with_cors(mut self, cors: bool) -> Self {
        self.cors = cors;
        self
    }

    fn with_rate_limits(mut self, requests: u32, time_window: u64) -> Self {
        self.rate_limits = Some(RateLimitSpec {
            requests,
            time_window,
        });
        self
    }

    fn with_docs(mut self, docs: &str) -> Self {
        self.documentation_url = Some(docs.to_string());
        self
    }
}

/// The full catalog, built once.
pub fn catalog() -> &'static [ApiEndpoint] {
    static CATALOG: OnceLock<Vec<ApiEndpoint>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

/// Find an entry by name (case-insensitive).
pub fn find_by_name(name: &str) -> Option<&'static ApiEndpoint> {
    catalog()
        .iter()
        .find(|api| api.name.eq_ignore_ascii_case(name))
}

fn build_catalog() -> Vec<ApiEndpoint> {
    vec![
        ApiEndpoint::new(
            "Open Library",
            "Book metadata and full-text search across the Internet Archive collection",
            "https://openlibrary.org/search.json?q=programming&limit=5",
            "books",
            &["books", "library", "authors", "reading", "literature", "isbn"],
            0.9,
        )
        .with_docs("https://openlibrary.org/developers/api"),
        ApiEndpoint::new(
            "Google Books",
            "Volume search over the Google Books index",
            "https://www.googleapis.com/books/v1/volumes?q=software",
            "books",
            &["books", "volumes", "publishers", "reading", "search"],
            0.95,
        )
        .with_rate_limits(100, 60_000),
        ApiEndpoint::new(
            "arXiv",
            "Preprint abstracts and metadata for physics, math and computer science",
            "https://export.arxiv.org/api/query?search_query=all:computing&max_results=5",
            "science",
            &["papers", "research", "preprints", "physics", "math", "science"],
            0.85,
        )
        .with_cors(false)
        .with_docs("https://info.arxiv.org/help/api/index.html"),
        ApiEndpoint::new(
            "NASA APOD",
            "Astronomy picture of the day with explanatory captions",
            "https://api.nasa.gov/planetary/apod?api_key=DEMO_KEY",
            "science",
            &["space", "astronomy", "nasa", "images", "science"],
            0.9,
        )
        .with_auth(AuthType::ApiKey)
        .with_rate_limits(30, 3_600_000)
        .with_docs("https://api.nasa.gov/"),
        ApiEndpoint::new(
            "Spaceflight News",
            "Launch and spaceflight journalism aggregated across outlets",
            "https://api.spaceflightnewsapi.net/v4/articles/?limit=5",
            "science",
            &["space", "launches", "rockets", "astronomy", "news", "science"],
            0.85,
        ),
        ApiEndpoint::new(
            "Hacker News",
            "Front-page story ids and items from the YC news aggregator",
            "https://hacker-news.firebaseio.com/v0/topstories.json",
            "news",
            &["news", "technology", "startups", "discussion", "trending"],
            0.95,
        ),
        ApiEndpoint::new(
            "Wikipedia",
            "Page summaries from the REST content API",
            "https://en.wikipedia.org/api/rest_v1/page/summary/Knowledge",
            "reference",
            &["encyclopedia", "reference", "facts", "summary", "wiki", "knowledge"],
            0.98,
        )
        .with_rate_limits(200, 60_000),
        ApiEndpoint::new(
            "Free Dictionary",
            "English definitions, phonetics and usage examples",
            "https://api.dictionaryapi.dev/api/v2/entries/en/orchestrate",
            "reference",
            &["dictionary", "definitions", "words", "language", "reference"],
            0.8,
        ),
        ApiEndpoint::new(
            "GitHub Search",
            "Repository search over the public GitHub index",
            "https://api.github.com/search/repositories?q=language:rust&per_page=5",
            "development",
            &["code", "repositories", "github", "development", "opensource", "programming"],
            0.95,
        )
        .with_rate_limits(10, 60_000)
        .with_docs("https://docs.github.com/en/rest"),
        ApiEndpoint::new(
            "httpbin",
            "HTTP request/response inspection endpoints",
            "https://httpbin.org/json",
            "tools",
            &["http", "testing", "debugging", "tools", "inspection"],
            0.75,
        ),
        ApiEndpoint::new(
            "JSONPlaceholder",
            "Stable fake REST resources for prototyping and tests",
            "https://jsonplaceholder.typicode.com/todos?_limit=10",
            "testing",
            &["testing", "prototype", "mock", "fixtures", "rest"],
            0.9,
        ),
        ApiEndpoint::new(
            "NVD CVE",
            "CVE vulnerability records from the National Vulnerability Database",
            "https://services.nvd.nist.gov/rest/json/cves/2.0?resultsPerPage=5",
            "security",
            &["security", "vulnerabilities", "cve", "exploits", "audit"],
            0.8,
        )
        .with_rate_limits(5, 30_000)
        .with_cors(false),
        ApiEndpoint::new(
            "REST Countries",
            "Country facts: demographics, currencies, borders",
            "https://restcountries.com/v3.1/all?fields=name,population,region",
            "data",
            &["countries", "demographics", "population", "geography", "data"],
            0.85,
        ),
        ApiEndpoint::new(
            "World Bank",
            "Development indicators and country statistics",
            "https://api.worldbank.org/v2/country?format=json&per_page=5",
            "analytics",
            &["economics", "indicators", "statistics", "analytics", "development", "data"],
            0.85,
        )
        .with_cors(false),
        ApiEndpoint::new(
            "Frankfurter",
            "Daily foreign-exchange reference rates",
            "https://api.frankfurter.app/latest",
            "finance",
            &["currency", "exchange", "rates", "finance", "money"],
            0.85,
        ),
        ApiEndpoint::new(
            "CoinGecko",
            "Cryptocurrency market prices and metadata",
            "https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&per_page=5",
            "finance",
            &["crypto", "bitcoin", "markets", "prices", "finance"],
            0.8,
        )
        .with_rate_limits(10, 60_000),
        ApiEndpoint::new(
            "Art Institute of Chicago",
            "Artwork records and images from the AIC collection",
            "https://api.artic.edu/api/v1/artworks?limit=5",
            "art",
            &["art", "paintings", "museum", "collection", "images"],
            0.85,
        )
        .with_docs("https://api.artic.edu/docs/"),
        ApiEndpoint::new(
            "The Color API",
            "Color conversions, naming and scheme generation",
            "https://www.thecolorapi.com/scheme?hex=0047AB&count=5",
            "color",
            &["color", "palette", "design", "scheme", "hex"],
            0.8,
        ),
        ApiEndpoint::new(
            "Nager.Date",
            "Public holiday calendar per country",
            "https://date.nager.at/api/v3/NextPublicHolidays/US",
            "calendar",
            &["holidays", "calendar", "dates", "scheduling", "planning"],
            0.85,
        ),
        ApiEndpoint::new(
            "Bored API",
            "Random activity suggestions with type and participant filters",
            "https://bored.api.lewagon.com/api/activity",
            "productivity",
            &["activities", "productivity", "suggestions", "planning"],
            0.7,
        ),
        ApiEndpoint::new(
            "ReqRes",
            "Hosted REST integration endpoints with predictable payloads",
            "https://reqres.in/api/users?page=1",
            "integration",
            &["integration", "rest", "users", "webhooks", "pipeline"],
            0.75,
        ),
    ]
}

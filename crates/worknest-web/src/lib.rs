//! Axum + Askama presentation layer for the WorkNest marketplace.
//!
//! Handlers fetch the latest listing snapshot, run it through the catalog
//! engine, and render pages plus htmx partials. Category and tab are
//! mirrored into query parameters so filtered views stay shareable; the
//! mirror is one-directional and never authoritative.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use uuid::Uuid;
use worknest_catalog::{apply_filters, encode_component, related_listings, FilterState, Tab};
use worknest_chat::{ChatWidget, Speaker, TopicRegistry, BOT_REPLY_DELAY};
use worknest_core::{ListingKind, ListingRecord, ALL};
use worknest_fetch::{FixtureRecordSource, HttpRecordSource, HttpSourceConfig, RecordSource};

pub const CRATE_NAME: &str = "worknest-web";

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn RecordSource>,
    pub topics: TopicRegistry,
    pub asset_root: PathBuf,
}

impl AppState {
    pub fn new(
        source: Arc<dyn RecordSource>,
        topics: TopicRegistry,
        asset_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            topics,
            asset_root: asset_root.into(),
        }
    }
}

/// Query-parameter mirror of the session filter state. All fields are
/// optional; absent means the corresponding default ("All", empty query,
/// gigs tab).
#[derive(Debug, Deserialize, Default)]
struct MarketplaceQuery {
    tab: Option<String>,
    category: Option<String>,
    q: Option<String>,
    difficulty: Option<String>,
    #[serde(rename = "type")]
    listing_type: Option<String>,
}

impl MarketplaceQuery {
    fn filter_state(&self) -> FilterState {
        let mut filter = FilterState {
            category: self.category.clone().unwrap_or_else(|| ALL.to_string()),
            search_query: self.q.clone().unwrap_or_default(),
            active_tab: self
                .tab
                .as_deref()
                .and_then(|t| t.parse().ok())
                .unwrap_or_default(),
            ..FilterState::default()
        };
        if let Some(difficulty) = &self.difficulty {
            filter.secondary.insert("difficulty".to_string(), difficulty.clone());
        }
        if let Some(listing_type) = &self.listing_type {
            filter.secondary.insert("type".to_string(), listing_type.clone());
        }
        filter
    }
}

#[derive(Debug, Clone)]
struct ListingRow {
    id: String,
    kind_label: &'static str,
    title: String,
    description: String,
    category: String,
    price: String,
    posted: String,
    skills: String,
}

#[derive(Debug, Clone)]
struct FacetRow {
    category: String,
    count: usize,
    selected: bool,
    href: String,
}

#[derive(Debug, Clone)]
struct RelatedRow {
    id: String,
    title: String,
    category: String,
    price: String,
}

#[derive(Debug, Clone)]
struct TopicRow {
    id: String,
    label: String,
}

#[derive(Debug, Clone)]
struct TurnRow {
    speaker: &'static str,
    text: String,
    delayed: bool,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    total_gigs: usize,
    total_posts: usize,
    total_categories: usize,
}

#[derive(Template)]
#[template(path = "marketplace.html")]
struct MarketplacePageTemplate {
    tab: String,
    gigs_count: usize,
    posts_count: usize,
    gigs_tab_href: String,
    posts_tab_href: String,
    selected_category: String,
    selected_difficulty: String,
    selected_listing_type: String,
    search_query: String,
    all_selected: bool,
    all_href: String,
    facets: Vec<FacetRow>,
    rows: Vec<ListingRow>,
    filtered: bool,
    clear_href: String,
}

#[derive(Template)]
#[template(path = "listings_table_partial.html")]
struct ListingsTablePartialTemplate {
    rows: Vec<ListingRow>,
    filtered: bool,
    clear_href: String,
}

#[derive(Template)]
#[template(path = "facets_partial.html")]
struct FacetsPartialTemplate {
    all_selected: bool,
    all_href: String,
    facets: Vec<FacetRow>,
}

#[derive(Template)]
#[template(path = "listing_detail.html")]
struct ListingDetailTemplate {
    kind_label: &'static str,
    title: String,
    description: String,
    category: String,
    price: String,
    posted: String,
    skills: String,
    skills_heading: &'static str,
    back_href: String,
    related: Vec<RelatedRow>,
}

#[derive(Template)]
#[template(path = "chat_topics_partial.html")]
struct ChatTopicsPartialTemplate {
    topics: Vec<TopicRow>,
}

#[derive(Template)]
#[template(path = "chat_conversation_partial.html")]
struct ChatConversationPartialTemplate {
    turns: Vec<TurnRow>,
    bot_delay_ms: u64,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/marketplace", get(marketplace_page_handler))
        .route("/marketplace/table", get(listings_table_handler))
        .route("/marketplace/facets", get(facets_handler))
        .route("/marketplace/{id}", get(listing_detail_handler))
        .route("/chat", get(chat_topics_handler))
        .route("/chat/reply/{topic_id}", get(chat_reply_handler))
        .route("/assets/static/app.css", get(app_css_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("WORKNEST_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);

    let source: Arc<dyn RecordSource> = match std::env::var("WORKNEST_LISTINGS_URL") {
        Ok(url) => {
            let mut config = HttpSourceConfig::new(url);
            if let Some(timeout) = std::env::var("WORKNEST_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
            {
                config.timeout = std::time::Duration::from_secs(timeout);
            }
            Arc::new(HttpRecordSource::new(config)?)
        }
        Err(_) => Arc::new(FixtureRecordSource::new("fixtures/listings.json")),
    };

    let topics = TopicRegistry::from_yaml_file("topics.yaml").unwrap_or_else(|err| {
        tracing::warn!("chat topics unavailable: {err:#}");
        TopicRegistry::default()
    });

    let state = AppState::new(source, topics, "assets");
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "worknest web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn load_records(state: &AppState) -> Result<Vec<ListingRecord>, Response> {
    state
        .source
        .fetch_records(Uuid::new_v4())
        .await
        .map_err(|err| server_error(anyhow::anyhow!(err)))
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let records = match load_records(&state).await {
        Ok(records) => records,
        Err(resp) => return resp,
    };
    let total_gigs = records.iter().filter(|r| r.kind == ListingKind::Gig).count();
    let total_posts = records.len() - total_gigs;
    let total_categories = records
        .iter()
        .map(|r| r.category.as_str())
        .filter(|c| !c.is_empty())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    render_html(IndexTemplate {
        total_gigs,
        total_posts,
        total_categories,
    })
}

async fn marketplace_page_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarketplaceQuery>,
) -> Response {
    let records = match load_records(&state).await {
        Ok(records) => records,
        Err(resp) => return resp,
    };
    let filter = query.filter_state();
    let view = apply_filters(&records, &filter);

    render_html(MarketplacePageTemplate {
        tab: filter.active_tab.to_string(),
        gigs_count: view.counts.gigs,
        posts_count: view.counts.posts,
        gigs_tab_href: tab_href(&filter, Tab::Gigs),
        posts_tab_href: tab_href(&filter, Tab::Posts),
        selected_category: if filter.category == ALL {
            String::new()
        } else {
            filter.category.clone()
        },
        selected_difficulty: secondary_value(&filter, "difficulty"),
        selected_listing_type: secondary_value(&filter, "type"),
        search_query: filter.search_query.clone(),
        all_selected: filter.category == ALL,
        all_href: all_categories_href(&filter),
        facets: facet_rows(&records, &filter),
        rows: view.visible.iter().map(listing_row).collect(),
        filtered: filter.is_filtered(),
        clear_href: clear_href(&filter),
    })
}

async fn listings_table_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarketplaceQuery>,
) -> Response {
    let records = match load_records(&state).await {
        Ok(records) => records,
        Err(resp) => return resp,
    };
    let filter = query.filter_state();
    let view = apply_filters(&records, &filter);
    let mut resp = render_html(ListingsTablePartialTemplate {
        rows: view.visible.iter().map(listing_row).collect(),
        filtered: filter.is_filtered(),
        clear_href: clear_href(&filter),
    });
    resp.headers_mut().insert(
        header::HeaderName::from_static("hx-trigger"),
        header::HeaderValue::from_static("listingsTableLoaded"),
    );
    resp
}

async fn facets_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MarketplaceQuery>,
) -> Response {
    let records = match load_records(&state).await {
        Ok(records) => records,
        Err(resp) => return resp,
    };
    let filter = query.filter_state();
    render_html(FacetsPartialTemplate {
        all_selected: filter.category == ALL,
        all_href: all_categories_href(&filter),
        facets: facet_rows(&records, &filter),
    })
}

async fn listing_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let records = match load_records(&state).await {
        Ok(records) => records,
        Err(resp) => return resp,
    };
    let Some(record) = records.iter().find(|r| r.id == id) else {
        return (StatusCode::NOT_FOUND, Html("Listing not found".to_string())).into_response();
    };

    let related = related_listings(&records, &record.id)
        .into_iter()
        .map(|r| RelatedRow {
            id: r.id.clone(),
            title: r.title.clone(),
            category: r.category.clone(),
            price: format_price(r.price),
        })
        .collect();

    let back_tab = match record.kind {
        ListingKind::Gig => Tab::Gigs,
        ListingKind::Job => Tab::Posts,
    };
    let back_filter = FilterState {
        active_tab: back_tab,
        ..FilterState::default()
    };

    render_html(ListingDetailTemplate {
        kind_label: kind_label(record.kind),
        title: record.title.clone(),
        description: record.description.clone(),
        category: record.category.clone(),
        price: format_price(record.price),
        posted: record.created_at.format("%b %e, %Y").to_string(),
        skills: record.skills.join(", "),
        skills_heading: match record.kind {
            ListingKind::Gig => "Skills",
            ListingKind::Job => "Requirements",
        },
        back_href: back_filter.query_string(),
        related,
    })
}

async fn chat_topics_handler(State(state): State<Arc<AppState>>) -> Response {
    render_html(ChatTopicsPartialTemplate {
        topics: state
            .topics
            .topics()
            .map(|t| TopicRow {
                id: t.id.clone(),
                label: t.label.clone(),
            })
            .collect(),
    })
}

async fn chat_reply_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(topic_id): AxumPath<String>,
) -> Response {
    // Stateless exchange: each request builds a fresh widget, so the
    // partial shows only the selected topic's user/bot pair. Embedders
    // holding a long-lived ChatWidget get the accumulated transcript.
    let mut widget = ChatWidget::new();
    if widget.select_topic(&state.topics, &topic_id).is_none() {
        return (StatusCode::NOT_FOUND, Html("Unknown topic".to_string())).into_response();
    }

    let turns = widget
        .transcript()
        .iter()
        .map(|turn| TurnRow {
            speaker: match turn.speaker {
                Speaker::User => "user",
                Speaker::Bot => "bot",
            },
            text: turn.text.clone(),
            delayed: turn.speaker == Speaker::Bot,
        })
        .collect();

    render_html(ChatConversationPartialTemplate {
        turns,
        bot_delay_ms: BOT_REPLY_DELAY.as_millis() as u64,
    })
}

async fn app_css_handler(State(state): State<Arc<AppState>>) -> Response {
    let css_path = state.asset_root.join("static/app.css");
    match tokio::fs::read_to_string(&css_path).await {
        Ok(css) => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Html("/* missing app.css */".to_string())).into_response(),
    }
}

fn kind_label(kind: ListingKind) -> &'static str {
    match kind {
        ListingKind::Gig => "Gig",
        ListingKind::Job => "Job",
    }
}

fn format_price(price: f64) -> String {
    if price == price.trunc() {
        format!("${price:.0}")
    } else {
        format!("${price:.2}")
    }
}

fn listing_row(record: &ListingRecord) -> ListingRow {
    ListingRow {
        id: record.id.clone(),
        kind_label: kind_label(record.kind),
        title: record.title.clone(),
        description: record.description.clone(),
        category: record.category.clone(),
        price: format_price(record.price),
        posted: record.created_at.format("%b %e, %Y").to_string(),
        skills: record.skills.join(", "),
    }
}

/// Full query string for navigation links. Unlike the shareable
/// category/tab mirror in `FilterState::query_string`, tab and chip hrefs
/// carry the search query and secondary selections too, so switching tabs
/// or categories only re-partitions and never drops active filters.
fn nav_query(filter: &FilterState) -> String {
    let mut query = format!("?tab={}", filter.active_tab);
    if filter.category != ALL {
        query.push_str("&category=");
        query.push_str(&encode_component(&filter.category));
    }
    if !filter.search_query.is_empty() {
        query.push_str("&q=");
        query.push_str(&encode_component(&filter.search_query));
    }
    for (attribute, selected) in &filter.secondary {
        if selected.as_str() != ALL {
            query.push('&');
            query.push_str(&encode_component(attribute));
            query.push('=');
            query.push_str(&encode_component(selected));
        }
    }
    query
}

fn secondary_value(filter: &FilterState, attribute: &str) -> String {
    filter
        .secondary
        .get(attribute)
        .filter(|v| v.as_str() != ALL)
        .cloned()
        .unwrap_or_default()
}

/// Category chips with per-category counts over the whole snapshot.
fn facet_rows(records: &[ListingRecord], filter: &FilterState) -> Vec<FacetRow> {
    let mut counts = BTreeMap::<String, usize>::new();
    for record in records {
        if !record.category.is_empty() {
            *counts.entry(record.category.clone()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .map(|(category, count)| {
            let chip_filter = FilterState {
                category: category.clone(),
                ..filter.clone()
            };
            FacetRow {
                selected: filter.category == category,
                href: format!("/marketplace{}", nav_query(&chip_filter)),
                category,
                count,
            }
        })
        .collect()
}

fn all_categories_href(filter: &FilterState) -> String {
    let all_filter = FilterState {
        category: ALL.to_string(),
        ..filter.clone()
    };
    format!("/marketplace{}", nav_query(&all_filter))
}

fn tab_href(filter: &FilterState, tab: Tab) -> String {
    let switched = FilterState {
        active_tab: tab,
        ..filter.clone()
    };
    nav_query(&switched)
}

fn clear_href(filter: &FilterState) -> String {
    format!("/marketplace{}", filter.cleared().query_string())
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

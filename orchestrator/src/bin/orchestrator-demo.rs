//! Demo binary: seeds one job against the in-memory repository adapters,
//! runs it through the real cascade/extraction pipeline, and serves
//! `/metrics`, `/_liveness`, `/_readiness` the way `hook-worker::main` does.
//!
//! There is no HTTP job-submission API here (out of scope for this core —
//! see DESIGN.md); a real deployment wires its own route layer on top of
//! `Orchestrator`.

use std::future::ready;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use envconfig::Envconfig;
use health::HealthRegistry;

use cascade::{CascadeEngine, FetcherRegistry, ReqwestHttpFetcher};
use orchestrator::{Orchestrator, Scraper, Settings};
use scrape_common::{ExtractionRule, Job, JobMode, JobRepository, SelectorKind, UrlRecord};

async fn index() -> &'static str {
    "scrape-orchestrator"
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let settings = Settings::init_from_env().expect("invalid configuration");

    let liveness = HealthRegistry::new("liveness");
    let worker_liveness = liveness
        .register("orchestrator".to_string(), time::Duration::seconds(60))
        .await;
    worker_liveness.report_healthy().await;

    let store = Arc::new(orchestrator::memory_repo::InMemoryStore::new());

    let demo_url =
        std::env::var("DEMO_URL").unwrap_or_else(|_| "https://example.com".to_string());
    store.add_job(Job::new("demo-job", "demo", JobMode::Single));
    store.add_url(UrlRecord::new("demo-url", "demo-job", demo_url));
    store.add_rule(ExtractionRule {
        id: "demo-rule".to_string(),
        job_id: "demo-job".to_string(),
        field_name: "title".to_string(),
        selector_kind: SelectorKind::Css,
        selector: "title".to_string(),
        attribute: None,
        is_list: false,
        is_required: false,
        display_order: 0,
    });

    let registry = FetcherRegistry::new(vec![Arc::new(ReqwestHttpFetcher::new())]);
    let cascade = Arc::new(CascadeEngine::new(registry));
    let scraper = Arc::new(Scraper::new(cascade, None, settings.vision_enabled));

    let orch = Arc::new(Orchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        settings.clone(),
        scraper,
    ));

    orch.start("demo-job").await.expect("failed to start demo job");

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())));
    let router = router.merge(orchestrator::metrics::setup_metrics_router());

    let bind = settings.bind();
    let http_server = orchestrator::metrics::serve(router, &bind);

    tokio::select! {
        result = http_server => {
            if let Err(e) = result {
                tracing::error!("http server exited: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested, stopping jobs");
            orch.stop_all().await;
        }
    }
}

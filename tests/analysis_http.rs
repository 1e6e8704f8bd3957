//! HTTP client against a local stand-in for the classification service.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use misinfo_watch::analyze::AnalysisError;
use misinfo_watch::{
    CacheStore, Classifier, Feed, HttpAnalysisClient, ItemEvent, Label, Node, WatchConfig,
    Watcher,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server");
    });
    addr
}

fn client(addr: SocketAddr) -> HttpAnalysisClient {
    HttpAnalysisClient::new(
        format!("http://{addr}/analyze"),
        Duration::from_secs(2),
        Duration::from_secs(5),
    )
    .expect("client")
}

async fn full_response(Json(body): Json<Value>) -> Json<Value> {
    let content = body["content"].as_str().unwrap_or_default().to_lowercase();
    let label = if content.contains("autism") {
        "misinformation"
    } else {
        "opinion"
    };
    Json(json!({
        "summary": label,
        "classification": { "labels": [label, "factual"], "scores": [0.91, 0.09] },
        "google_fact_check": { "claims": [{
            "text": "Vaccines cause autism",
            "claimReview": [{ "textualRating": "False", "publisher": { "name": "Health Desk" } }]
        }]},
        "claimbuster": { "score": 0.72, "verdict": "check-worthy" },
        "detailed_analysis": []
    }))
}

#[tokio::test]
async fn parses_a_full_response() {
    let addr = serve(Router::new().route("/analyze", post(full_response))).await;
    let report = client(addr)
        .analyze("Vaccines cause autism")
        .await
        .expect("report");

    assert_eq!(report.label, Label::Misinformation);
    let lines = report.detail_lines();
    assert_eq!(lines[0], "Verdict: MISINFORMATION");
    assert!(lines.iter().any(|l| l == " - misinformation: 91.00%"));
    assert!(lines.iter().any(|l| l.contains("Health Desk")));
    assert!(lines.iter().any(|l| l == " - Score: 72.00%"));
}

#[tokio::test]
async fn missing_fields_still_yield_a_label() {
    let app = Router::new().route(
        "/analyze",
        post(|| async { Json(json!({ "huggingface": { "labels": ["Factual"] } })) }),
    );
    let addr = serve(app).await;
    assert_eq!(client(addr).classify("anything").await, Label::Factual);

    let app = Router::new().route("/analyze", post(|| async { Json(json!({})) }));
    let addr = serve(app).await;
    assert_eq!(client(addr).classify("anything").await, Label::Unknown);
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let app = Router::new().route(
        "/analyze",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
    );
    let addr = serve(app).await;
    let c = client(addr);
    match c.analyze("x").await {
        Err(AnalysisError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "model crashed");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert_eq!(c.classify("x").await, Label::Failed);
}

#[tokio::test]
async fn non_json_body_is_a_protocol_error() {
    let app = Router::new().route("/analyze", post(|| async { "<html>oops</html>" }));
    let addr = serve(app).await;
    assert!(matches!(
        client(addr).analyze("x").await,
        Err(AnalysisError::Protocol(_))
    ));

    let app = Router::new().route("/analyze", post(|| async { Json(json!([1, 2, 3])) }));
    let addr = serve(app).await;
    assert!(matches!(
        client(addr).analyze("x").await,
        Err(AnalysisError::Protocol(_))
    ));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let l = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        l.local_addr().expect("addr")
    };
    assert!(matches!(
        client(addr).analyze("x").await,
        Err(AnalysisError::Transport(_))
    ));
}

#[tokio::test]
async fn watcher_uses_the_remote_service_once_per_text() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/analyze",
            post(
                |State(hits): State<Arc<AtomicUsize>>, body: Json<Value>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    full_response(body).await
                },
            ),
        )
        .with_state(hits.clone());
    let addr = serve(app).await;

    let cfg = WatchConfig {
        endpoint: format!("http://{addr}/analyze"),
        ..WatchConfig::default()
    };
    let classifier = Arc::new(HttpAnalysisClient::from_config(&cfg).expect("client"));
    let watcher = Watcher::new(&cfg, classifier, CacheStore::in_memory());
    let mut events = watcher.subscribe_events();

    let feed = Feed::new();
    let timeline = feed.append(feed.root(), Node::element("section"));
    watcher.start(&feed, timeline.clone()).expect("start");

    let tweet = |t: &str| {
        Node::element("article").child(Node::element("div").attr("lang", "en").text(t))
    };
    feed.append(&timeline, tweet("Vaccines cause autism"));
    feed.append(&timeline, tweet("Vaccines cause autism"));

    let mut labels = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while labels.len() < 2 {
            if let Ok(ItemEvent::Labeled { label, .. }) = events.recv().await {
                labels.push(label);
            }
        }
    })
    .await
    .expect("labels arrived");

    assert_eq!(labels, vec![Label::Misinformation; 2]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let report = watcher
        .report_for("Vaccines cause autism")
        .expect("report kept");
    assert!(report.first_claim().is_some());
}

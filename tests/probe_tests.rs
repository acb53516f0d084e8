//! Integration tests for the emitter wire format and the robots cache
//!
//! These use wiremock to stand in for the ingest sink and crawled hosts,
//! checking the externally visible contracts: batch JSON on the wire,
//! spool replay behavior, and robots policy evaluation end to end.

use chrono::Utc;
use orbweaver::config::{load_config, CliOverrides};
use orbweaver::emit::Emitter;
use orbweaver::graph::{Batch, Contribution, DomainNode, Edge, EdgeKind};
use orbweaver::metrics::Metrics;
use orbweaver::probe::external_domains;
use orbweaver::robots::RobotsCache;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(ingest: &str, spool_dir: &std::path::Path) -> orbweaver::Config {
    let overrides = CliOverrides {
        domains: Some("unused.txt".to_string()),
        probe: Some("probe-1".to_string()),
        run: Some("run-1".to_string()),
        ingest: Some(ingest.to_string()),
        spool_dir: Some(spool_dir.to_str().unwrap().to_string()),
        ..Default::default()
    };
    load_config(None, overrides).unwrap()
}

fn sample_contribution() -> Contribution {
    let now = Utc::now();
    Contribution {
        nodes_domain: vec![DomainNode {
            host: "example.com".to_string(),
            apex: "example.com".to_string(),
            first_seen: now,
            last_seen: now,
        }],
        nodes_ip: vec![],
        nodes_cert: vec![],
        edges: vec![Edge {
            kind: EdgeKind::LinksTo,
            source: "example.com".to_string(),
            target: "www.iana.org".to_string(),
            observed_at: now,
            probe_id: "probe-1".to_string(),
            run_id: "run-1".to_string(),
        }],
    }
}

#[tokio::test]
async fn test_sink_receives_wire_exact_batch_json() {
    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&sink)
        .await;

    let spool = tempfile::tempdir().unwrap();
    let config = test_config(&sink.uri(), spool.path());
    let emitter = Emitter::new(&config, Metrics::new()).unwrap();

    emitter.append(sample_contribution());
    emitter.flush().await;

    let requests = sink.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].headers.get("content-type").unwrap(),
        "application/json"
    );

    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["probe_id"], "probe-1");
    assert_eq!(body["run_id"], "run-1");
    assert_eq!(body["nodes_domain"][0]["host"], "example.com");
    assert_eq!(body["edges"][0]["type"], "LINKS_TO");
    assert_eq!(body["edges"][0]["source"], "example.com");
    assert_eq!(body["edges"][0]["target"], "www.iana.org");
}

#[tokio::test]
async fn test_drain_replays_prior_spool_files_in_order() {
    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&sink)
        .await;

    let spool = tempfile::tempdir().unwrap();

    // Three batches left behind by an earlier run with the sink down
    for (i, name) in [
        "20250601T100000.000000001.json",
        "20250601T100001.000000002.json",
        "20250601T100002.000000003.json",
    ]
    .iter()
    .enumerate()
    {
        let mut batch = Batch::new("probe-1", "run-0");
        batch.absorb(sample_contribution());
        batch.run_id = format!("run-0-{i}");
        std::fs::write(
            spool.path().join(name),
            serde_json::to_vec(&batch).unwrap(),
        )
        .unwrap();
    }

    let config = test_config(&sink.uri(), spool.path());
    let emitter = Emitter::new(&config, Metrics::new()).unwrap();
    emitter.drain().await;

    // All three delivered and removed
    assert_eq!(std::fs::read_dir(spool.path()).unwrap().count(), 0);
    let requests = sink.received_requests().await.unwrap();
    let runs: Vec<String> = requests
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["run_id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(runs, vec!["run-0-0", "run-0-1", "run-0-2"]);
}

#[tokio::test]
async fn test_drain_keeps_spool_files_while_sink_down() {
    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&sink)
        .await;

    let spool = tempfile::tempdir().unwrap();
    let mut batch = Batch::new("probe-1", "run-0");
    batch.absorb(sample_contribution());
    std::fs::write(
        spool.path().join("20250601T100000.000000001.json"),
        serde_json::to_vec(&batch).unwrap(),
    )
    .unwrap();

    let config = test_config(&sink.uri(), spool.path());
    let emitter = Emitter::new(&config, Metrics::new()).unwrap();
    emitter.drain().await;

    assert_eq!(std::fs::read_dir(spool.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_robots_deny_evaluated_from_live_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
        .mount(&server)
        .await;

    let host = server.uri().trim_start_matches("http://").to_string();
    let cache = RobotsCache::new(reqwest::Client::new(), "orbweaver-test/0.1");
    let rules = cache.get(&host).await;
    assert!(!rules.allowed("orbweaver-test/0.1", "/"));

    // Second lookup answers from cache (wiremock saw exactly one request)
    let rules = cache.get(&host).await;
    assert!(!rules.allowed("orbweaver-test/0.1", "/"));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[test]
fn test_root_page_scenario_yields_external_apex_distinct_hosts() {
    // The shape of a typical root page: one external link plus assets on
    // the site's own apex
    let html = r#"
        <html><head>
            <link rel="stylesheet" href="/style.css">
            <script src="https://static.example.com/app.js"></script>
        </head><body>
            <a href="https://www.iana.org/">More information...</a>
        </body></html>
    "#;
    let hosts = external_domains("example.com", html);
    assert_eq!(hosts, vec!["www.iana.org"]);
}

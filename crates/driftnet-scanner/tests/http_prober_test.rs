use driftnet_core::{Access, CandidateName, ProbeConfig, RegionCode};
use driftnet_scanner::{HttpProber, ProbeOutcome, Prober};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>acme-prod</Name></ListBucketResult>"#;

const VHOST: &str = "/acme-prod.s3.us-east-1";
const PATH_STYLE: &str = "/s3.us-east-1/acme-prod";

async fn answer(server: &MockServer, verb: &str, route: &str, status: u16, body: &str) {
    Mock::given(method(verb))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

async fn probe(server: &MockServer) -> ProbeOutcome {
    let prober = HttpProber::new(&ProbeConfig::default())
        .expect("build prober")
        .with_endpoint(server.uri());
    let name = CandidateName::new("acme-prod").expect("valid bucket");
    prober
        .probe(&name, RegionCode::UsEast1, Duration::from_secs(5))
        .await
}

/// Requests the server saw, as `METHOD path`
async fn requests(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .expect("request recording enabled")
        .iter()
        .map(|request| format!("{} {}", request.method, request.url.path()))
        .collect()
}

#[tokio::test]
async fn test_path_style_answers_after_virtual_hosted_404() {
    let server = MockServer::start().await;
    answer(&server, "HEAD", VHOST, 404, "").await;
    answer(&server, "HEAD", PATH_STYLE, 200, "").await;
    answer(&server, "GET", PATH_STYLE, 200, LISTING).await;

    let outcome = probe(&server).await;
    let ProbeOutcome::Public(finding) = outcome else {
        panic!("expected a public finding, got {outcome:?}");
    };
    assert_eq!(finding.access, Access::Public);
    assert_eq!(finding.status, 200);
    assert!(finding.url.ends_with(PATH_STYLE));
    assert_eq!(
        requests(&server).await,
        vec![
            format!("HEAD {VHOST}"),
            format!("HEAD {PATH_STYLE}"),
            format!("GET {PATH_STYLE}"),
        ]
    );
}

#[tokio::test]
async fn test_not_found_only_after_every_endpoint() {
    let server = MockServer::start().await;
    answer(&server, "HEAD", VHOST, 404, "").await;
    answer(&server, "HEAD", PATH_STYLE, 400, "").await;

    let outcome = probe(&server).await;
    assert!(
        matches!(outcome, ProbeOutcome::NotFound { status: 404, .. }),
        "got {outcome:?}"
    );
    assert_eq!(
        requests(&server).await,
        vec![format!("HEAD {VHOST}"), format!("HEAD {PATH_STYLE}")]
    );
}

#[tokio::test]
async fn test_forbidden_virtual_hosted_is_private_without_listing() {
    let server = MockServer::start().await;
    answer(&server, "HEAD", VHOST, 403, "").await;

    let outcome = probe(&server).await;
    let ProbeOutcome::Private(finding) = outcome else {
        panic!("expected a private finding, got {outcome:?}");
    };
    assert_eq!(finding.access, Access::Private);
    assert_eq!(requests(&server).await, vec![format!("HEAD {VHOST}")]);
}

#[tokio::test]
async fn test_failing_endpoint_is_not_a_negative() {
    let server = MockServer::start().await;
    answer(&server, "HEAD", VHOST, 503, "").await;
    answer(&server, "HEAD", PATH_STYLE, 404, "").await;

    let outcome = probe(&server).await;
    assert!(
        matches!(outcome, ProbeOutcome::TransientError { status: Some(503), .. }),
        "got {outcome:?}"
    );
    assert_eq!(requests(&server).await.len(), 2);
}

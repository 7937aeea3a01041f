//! HTTP collaborators against a mock server

use std::time::Duration;

use courses_common::CourseKey;
use courses_ingest::enrich::{BulletinProvider, EnrichmentProvider};
use courses_ingest::sink::{BulkTransport, HttpBulkTransport};
use courses_ingest::{ProviderError, SinkError};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BULLETIN_PAGE: &str = r#"<html><body><table>
<tr valign=top><td bgcolor=#99CCFF>Course Description</td>
 <td bgcolor=#DADADA>Selected topics in
   computer science.</td></tr>
<tr valign=top><td bgcolor=#99CCFF>Web Site</td>
 <td bgcolor=#DADADA>none</td></tr>
</table></body></html>"#;

const TIMEOUT: Duration = Duration::from_secs(5);

fn provider(server: &MockServer) -> BulletinProvider {
    let template = format!(
        "{}/subj/{{dept}}/{{symbol_number}}-{{term}}-{{section}}/",
        server.uri()
    );
    BulletinProvider::new(template, Duration::from_secs(5)).unwrap()
}

fn course() -> CourseKey {
    CourseKey::parse("COMS4995W001").unwrap()
}

#[tokio::test]
async fn test_bulletin_description_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subj/COMS/W4995-20143-001/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BULLETIN_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let description = provider(&server).lookup(&course(), "20143").await.unwrap();
    assert_eq!(description.as_deref(), Some("Selected topics in computer science."));
}

#[tokio::test]
async fn test_bulletin_page_without_description() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Not offered</body></html>"))
        .mount(&server)
        .await;

    let description = provider(&server).lookup(&course(), "20143").await.unwrap();
    assert_eq!(description, None);
}

#[tokio::test]
async fn test_bulletin_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = provider(&server).lookup(&course(), "20143").await.unwrap_err();
    match err {
        ProviderError::Status { status, url } => {
            assert_eq!(status.as_u16(), 404);
            assert!(url.ends_with("/subj/COMS/W4995-20143-001/"));
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_bulletin_unreachable() {
    // Nothing listens on port 1
    let provider = BulletinProvider::new(
        "http://127.0.0.1:1/{dept}/{symbol_number}-{term}-{section}/",
        Duration::from_secs(5),
    )
    .unwrap();

    let err = provider.lookup(&course(), "20143").await.unwrap_err();
    assert!(matches!(err, ProviderError::Request { .. }));
}

#[tokio::test]
async fn test_bulk_post() {
    let server = MockServer::start().await;
    let body = "{\"index\":{\"_index\":\"courses\",\"_id\":\"COMS4995W001\"}}\n{\"Course\":\"COMS4995W001\"}\n";

    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .and(body_string(body))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "took": 3,
            "errors": false,
            "items": [{"index": {"_id": "COMS4995W001", "status": 201}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpBulkTransport::new(&format!("{}/", server.uri()), "courses", TIMEOUT).unwrap();
    transport.send(body.to_string(), 1).await.unwrap();
}

#[tokio::test]
async fn test_bulk_rejections_are_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": true,
            "items": [
                {"index": {"_id": "a", "status": 201}},
                {"index": {"_id": "b", "status": 400, "error": {"type": "mapper_parsing_exception"}}}
            ]
        })))
        .mount(&server)
        .await;

    let transport = HttpBulkTransport::new(&server.uri(), "courses", TIMEOUT).unwrap();
    let err = transport.send(String::from("{}\n{}\n{}\n{}\n"), 2).await.unwrap_err();
    assert!(matches!(
        err,
        SinkError::Rejected {
            failed: 1,
            documents: 2
        }
    ));
}

#[tokio::test]
async fn test_bulk_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("cluster unavailable"))
        .mount(&server)
        .await;

    let transport = HttpBulkTransport::new(&server.uri(), "courses", TIMEOUT).unwrap();
    let err = transport.send(String::from("{}\n{}\n"), 1).await.unwrap_err();
    match err {
        SinkError::Status { status, body } => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(body, "cluster unavailable");
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_reset_index() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpBulkTransport::new(&server.uri(), "courses", TIMEOUT).unwrap();
    transport.reset_index().await.unwrap();
}

#[tokio::test]
async fn test_bulk_request_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"errors": false, "items": []}))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let transport =
        HttpBulkTransport::new(&server.uri(), "courses", Duration::from_millis(200)).unwrap();
    let err = transport.send(String::from("{}\n{}\n"), 1).await.unwrap_err();
    match err {
        SinkError::Http(source) => assert!(source.is_timeout()),
        other => panic!("unexpected error: {other}"),
    }
}

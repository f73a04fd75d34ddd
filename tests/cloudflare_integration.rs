//! Integration tests for the Cloudflare client and IPv6 discovery using wiremock

use corpdk_provision::ProvisionError;
use corpdk_provision::ddns::{
    CloudflareClient, DdnsAgent, DnsProvider, IpFinder, RecordRequest, UpdateOutcome,
};
use serde_json::json;
use std::net::Ipv6Addr;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOST: &str = "rpi4-qzhtkwma.mac.corpdk.com";

fn envelope(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": result,
    }))
}

fn record(id: &str, content: &str, proxied: bool) -> serde_json::Value {
    json!({
        "id": id,
        "zone_id": "zone-1",
        "name": HOST,
        "type": "AAAA",
        "content": content,
        "proxied": proxied,
        "ttl": 1,
    })
}

fn client(server: &MockServer) -> CloudflareClient {
    CloudflareClient::with_base_url(server.uri(), Some("test-token".to_string())).unwrap()
}

async fn mount_zone(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("name", "corpdk.com"))
        .respond_with(envelope(json!([{ "id": "zone-1", "name": "corpdk.com" }])))
        .mount(server)
        .await;
}

async fn mount_finder(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/ip6"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

// ==================== Cloudflare API ====================

/// Zone lookup sends the bearer token and unwraps the envelope
#[tokio::test]
async fn test_find_zones_with_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("name", "corpdk.com"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(envelope(json!([{ "id": "zone-1", "name": "corpdk.com" }])))
        .expect(1)
        .mount(&server)
        .await;

    let zones = client(&server).find_zones("corpdk.com").await.unwrap();
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].id, "zone-1");
}

#[tokio::test]
async fn test_get_zone() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones/zone-1"))
        .respond_with(envelope(json!({ "id": "zone-1", "name": "corpdk.com", "status": "active" })))
        .mount(&server)
        .await;

    let zone = client(&server).get_zone("zone-1").await.unwrap();
    assert_eq!(zone.name, "corpdk.com");
}

#[tokio::test]
async fn test_list_aaaa_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .and(query_param("name", HOST))
        .and(query_param("type", "AAAA"))
        .and(query_param("match", "all"))
        .respond_with(envelope(json!([record("rec-1", "2001:db8::1", true)])))
        .mount(&server)
        .await;

    let records = client(&server).list_aaaa("zone-1", HOST).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_type, "AAAA");
    assert!(records[0].proxied);
}

#[tokio::test]
async fn test_update_and_create_bodies() {
    let server = MockServer::start().await;
    let ip: Ipv6Addr = "2001:db8::2".parse().unwrap();

    Mock::given(method("PUT"))
        .and(path("/zones/zone-1/dns_records/rec-1"))
        .and(body_partial_json(json!({
            "name": HOST, "type": "AAAA", "content": "2001:db8::2", "proxied": true
        })))
        .respond_with(envelope(record("rec-1", "2001:db8::2", true)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/zones/zone-1/dns_records"))
        .and(body_partial_json(json!({
            "name": HOST, "type": "AAAA", "content": "2001:db8::2", "ttl": 60
        })))
        .respond_with(envelope(record("rec-2", "2001:db8::2", false)))
        .expect(1)
        .mount(&server)
        .await;

    let cloudflare = client(&server);
    let updated = cloudflare
        .update_record("zone-1", "rec-1", &RecordRequest::update(HOST, &ip, true))
        .await
        .unwrap();
    assert_eq!(updated.content, "2001:db8::2");

    let created = cloudflare
        .create_record("zone-1", &RecordRequest::create(HOST, &ip))
        .await
        .unwrap();
    assert_eq!(created.id, "rec-2");
}

/// A failed envelope is reported with Cloudflare's error codes
#[tokio::test]
async fn test_error_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "success": false,
            "errors": [{ "code": 9109, "message": "Invalid access token" }],
            "messages": [],
            "result": null,
        })))
        .mount(&server)
        .await;

    let err = client(&server).find_zones("corpdk.com").await.unwrap_err();
    assert!(matches!(err, ProvisionError::Dns { .. }));
    assert!(err.to_string().contains("9109 Invalid access token"));
}

#[tokio::test]
async fn test_unreadable_response() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/zones/zone-1"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad gateway</html>"))
        .mount(&server)
        .await;

    let err = client(&server).get_zone("zone-1").await.unwrap_err();
    assert!(err.to_string().contains("unreadable response"));
}

// ==================== IPv6 Discovery ====================

#[tokio::test]
async fn test_finder_skips_non_ipv6_answers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.7"))
        .mount(&server)
        .await;
    mount_finder(&server, "2001:db8::42\n").await;

    let finder = IpFinder::with_urls(vec![
        format!("{}/v4", server.uri()),
        format!("{}/ip6", server.uri()),
    ])
    .unwrap();

    let ip = finder.discover().await.unwrap();
    assert_eq!(ip, "2001:db8::42".parse::<Ipv6Addr>().unwrap());
}

#[tokio::test]
async fn test_finder_reports_every_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.7"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>rate limited</p>"))
        .mount(&server)
        .await;

    let finder = IpFinder::with_urls(vec![
        format!("{}/v4", server.uri()),
        format!("{}/html", server.uri()),
    ])
    .unwrap();

    let err = finder.discover().await.unwrap_err();
    match err {
        ProvisionError::IpDiscovery(report) => {
            assert!(report.contains("/v4"));
            assert!(report.contains("203.0.113.7"));
            assert!(report.contains("rate limited"));
        }
        other => panic!("Expected IpDiscovery, got {:?}", other),
    }
}

// ==================== DDNS Agent ====================

#[tokio::test]
async fn test_agent_leaves_matching_record() {
    let server = MockServer::start().await;
    mount_finder(&server, "2001:db8::1").await;
    mount_zone(&server).await;

    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(envelope(json!([record("rec-1", "2001:db8::1", false)])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(envelope(record("rec-1", "2001:db8::1", false)))
        .expect(0)
        .mount(&server)
        .await;

    let cloudflare = client(&server);
    let finder = IpFinder::with_urls(vec![format!("{}/ip6", server.uri())]).unwrap();
    let outcomes = DdnsAgent::new(&cloudflare, &finder)
        .run(&[HOST.to_string()])
        .await
        .unwrap();

    assert_eq!(outcomes, vec![(HOST.to_string(), UpdateOutcome::Unchanged)]);
}

#[tokio::test]
async fn test_agent_creates_missing_record() {
    let server = MockServer::start().await;
    mount_finder(&server, "2001:db8::1").await;
    mount_zone(&server).await;

    // First read finds nothing, the read-back after the create finds the record
    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(envelope(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(envelope(json!([record("rec-9", "2001:db8::1", false)])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(envelope(record("rec-9", "2001:db8::1", false)))
        .expect(1)
        .mount(&server)
        .await;

    let cloudflare = client(&server);
    let finder = IpFinder::with_urls(vec![format!("{}/ip6", server.uri())]).unwrap();
    let outcomes = DdnsAgent::new(&cloudflare, &finder)
        .run(&[HOST.to_string()])
        .await
        .unwrap();

    assert_eq!(outcomes[0].1, UpdateOutcome::Created);
}

#[tokio::test]
async fn test_agent_collects_host_errors() {
    let server = MockServer::start().await;
    mount_finder(&server, "2001:db8::1").await;
    mount_zone(&server).await;

    Mock::given(method("GET"))
        .and(path("/zones/zone-1/dns_records"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "errors": [{ "code": 1004, "message": "DNS Validation Error" }],
            "result": null,
        })))
        .mount(&server)
        .await;

    let hosts = vec![HOST.to_string(), "other.mac.corpdk.com".to_string()];
    let cloudflare = client(&server);
    let finder = IpFinder::with_urls(vec![format!("{}/ip6", server.uri())]).unwrap();
    let err = DdnsAgent::new(&cloudflare, &finder)
        .run(&hosts)
        .await
        .unwrap_err();

    match err {
        ProvisionError::UpdateFailed(errors) => {
            assert_eq!(errors.len(), 2);
            assert!(errors[0].starts_with(&format!("Error Updating {}", HOST)));
            assert!(errors[1].starts_with("Error Updating other.mac.corpdk.com"));
        }
        other => panic!("Expected UpdateFailed, got {:?}", other),
    }
}

//! Unit tests for the Brightbox backend.

use rstest::rstest;
use serde_json::{Value, json};

use super::*;
use crate::backend::ServerStatus;

fn server_request(groups: Vec<String>, user_data: Option<&[u8]>) -> ServerRequest {
    ServerRequest {
        image_id: String::from("img-3ikco"),
        name: String::from("web"),
        server_type_id: Some(String::from("typ-zx45f")),
        zone_id: None,
        server_groups: groups,
        user_data: user_data.map(<[u8]>::to_vec),
    }
}

fn payload_json(request: &ServerRequest) -> Value {
    serde_json::to_value(CreateServerPayload::from_request(request))
        .unwrap_or_else(|err| panic!("payload should serialise: {err}"))
}

#[test]
fn empty_server_groups_are_omitted() {
    let payload = payload_json(&server_request(Vec::new(), None));
    assert_eq!(
        payload,
        json!({"image": "img-3ikco", "name": "web", "server_type": "typ-zx45f"})
    );
}

#[test]
fn server_groups_and_user_data_are_sent() {
    let request = server_request(vec![String::from("grp-98v4n")], Some(b"#!/bin/sh\n".as_slice()));
    let payload = payload_json(&request);
    assert_eq!(payload["server_groups"], json!(["grp-98v4n"]));
    assert_eq!(payload["user_data"], json!("IyEvYmluL3NoCg=="));
}

#[test]
fn binary_user_data_is_encoded_unchanged() {
    let gzip_header: &[u8] = &[0x1f, 0x8b, 0x08, 0x00, 0xff, 0xfe];
    let payload = payload_json(&server_request(Vec::new(), Some(gzip_header)));
    assert_eq!(payload["user_data"], json!("H4sIAP/+"));
}

#[rstest]
#[case(
    json!({"id": "srv-lv426", "status": "active", "fqdn": "srv-lv426.gb1.brightbox.com",
           "cloud_ips": [{"public_ip": "109.107.35.16"}]}),
    Some("109.107.35.16")
)]
#[case(
    json!({"id": "srv-lv426", "status": "active", "fqdn": "srv-lv426.gb1.brightbox.com"}),
    Some("srv-lv426.gb1.brightbox.com")
)]
#[case(json!({"id": "srv-lv426", "status": "creating"}), None)]
fn snapshot_prefers_cloud_ip(#[case] body: Value, #[case] expected: Option<&str>) {
    let server: ServerResource = serde_json::from_value(body)
        .unwrap_or_else(|err| panic!("server should decode: {err}"));
    let snapshot = server.into_snapshot();
    assert_eq!(snapshot.id, "srv-lv426");
    assert_eq!(snapshot.public_host.as_deref(), expected);
}

#[test]
fn snapshot_maps_status() {
    let server: ServerResource =
        serde_json::from_value(json!({"id": "srv-lv426", "status": "deleted"}))
            .unwrap_or_else(|err| panic!("server should decode: {err}"));
    assert_eq!(server.into_snapshot().status, ServerStatus::Deleted);
}

#[test]
fn handle_resources_become_named_resources() {
    let entries: Vec<HandleResource> = serde_json::from_value(json!([
        {"id": "zon-328ds", "handle": "gb1-a"},
        {"id": "zon-aaaaa"}
    ]))
    .unwrap_or_else(|err| panic!("zones should decode: {err}"));
    let named: Vec<NamedResource> = entries.into_iter().map(NamedResource::from).collect();
    assert_eq!(
        named,
        vec![
            NamedResource::new("zon-328ds", "gb1-a"),
            NamedResource::new("zon-aaaaa", "")
        ]
    );
}

#[test]
fn endpoint_strips_trailing_slash() {
    let backend = BrightboxBackend::new("https://api.gb1.brightbox.com/", "token")
        .unwrap_or_else(|err| panic!("backend should build: {err}"));
    assert_eq!(
        backend.endpoint("servers/srv-lv426"),
        "https://api.gb1.brightbox.com/1.0/servers/srv-lv426"
    );
}

#[rstest]
#[case(DEFAULT_API_URL, "  ", "access token")]
#[case("api.gb1.brightbox.com", "token", "http://")]
fn rejects_unusable_settings(#[case] url: &str, #[case] token: &str, #[case] fragment: &str) {
    let err = BrightboxBackend::new(url, token).expect_err("settings should be rejected");
    assert!(err.to_string().contains(fragment), "unexpected message: {err}");
}

#[test]
fn http_errors_keep_body_verbatim() {
    let body = br#"{"error_name":"missing_resource"}"#;
    let err = BrightboxBackend::http_error(StatusCode::UNPROCESSABLE_ENTITY, body);
    assert_eq!(
        err.to_string(),
        r#"HTTP 422: {"error_name":"missing_resource"}"#
    );
}

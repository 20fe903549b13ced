//! Shared test helpers for COS integration tests
//!
//! Every helper mounts mocks on a path-style endpoint, so bucket requests
//! arrive at `/{BUCKET}/` and object requests at `/{BUCKET}/{key}`.

use std::sync::Arc;
use std::time::Duration;

use cloudshelf_core::bucket::{Bucket, BucketSettings};
use cloudshelf_core::domain::ObjectKey;
use cloudshelf_core::ports::BucketContext;
use cloudshelf_core::retry::RetryPolicy;
use cloudshelf_cos::{CosClient, CosProvider, Credentials};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BUCKET: &str = "photos-1250000000";
pub const REGION: &str = "ap-guangzhou";

/// Starts a mock server and returns a provider pointing at it
pub async fn setup_cos_mock() -> (MockServer, CosProvider) {
    let server = MockServer::start().await;
    let client = CosClient::new(Credentials::new("AKIDtest", "test-secret"))
        .expect("build client")
        .with_endpoint(&server.uri())
        .expect("valid endpoint");
    (server, CosProvider::new(client))
}

pub fn ctx() -> BucketContext {
    BucketContext::new(BUCKET, REGION)
}

pub fn key(s: &str) -> ObjectKey {
    ObjectKey::new(s.to_string()).unwrap()
}

pub fn bucket_path() -> String {
    format!("/{BUCKET}/")
}

pub fn object_path(key: &str) -> String {
    format!("/{BUCKET}/{key}")
}

/// Bucket over the provider with fast retries
pub fn bucket(provider: CosProvider) -> Bucket {
    let settings = BucketSettings {
        page_limit: 2,
        retry: RetryPolicy::new(2, Duration::from_millis(1)),
        ..BucketSettings::default()
    };
    Bucket::new(ctx(), Arc::new(provider), settings)
}

/// Renders a `ListBucketResult` document
pub fn list_result(keys: &[(&str, u64)], prefixes: &[&str], next_marker: Option<&str>) -> String {
    let mut doc = format!(
        "<ListBucketResult><Name>{BUCKET}</Name><IsTruncated>{}</IsTruncated>",
        next_marker.is_some()
    );
    if let Some(marker) = next_marker {
        doc.push_str(&format!("<NextMarker>{marker}</NextMarker>"));
    }
    for (key, size) in keys {
        doc.push_str(&format!(
            "<Contents><Key>{key}</Key><LastModified>2024-03-01T08:00:00.000Z</LastModified>\
             <ETag>\"d41d8cd98f00b204e9800998ecf8427e\"</ETag><Size>{size}</Size></Contents>"
        ));
    }
    for prefix in prefixes {
        doc.push_str(&format!("<CommonPrefixes><Prefix>{prefix}</Prefix></CommonPrefixes>"));
    }
    doc.push_str("</ListBucketResult>");
    doc
}

pub fn xml_response(status: u16, body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_string(body.into())
        .insert_header("Content-Type", "application/xml")
}

pub fn error_response(status: u16, code: &str) -> ResponseTemplate {
    xml_response(
        status,
        format!("<Error><Code>{code}</Code><Message>{code} from mock</Message></Error>"),
    )
}

/// Mounts `GET /?acl` granting public read (or owner only)
pub async fn mount_acl(server: &MockServer, public: bool) {
    let all_users = if public {
        "<Grant><Grantee><URI>http://cam.qcloud.com/groups/global/AllUsers</URI></Grantee>\
         <Permission>READ</Permission></Grant>"
    } else {
        ""
    };
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .and(query_param("acl", ""))
        .respond_with(xml_response(
            200,
            format!(
                "<AccessControlPolicy><AccessControlList>\
                 <Grant><Grantee><ID>owner</ID></Grantee><Permission>FULL_CONTROL</Permission></Grant>\
                 {all_users}</AccessControlList></AccessControlPolicy>"
            ),
        ))
        .mount(server)
        .await;
}

/// Mounts `GET /?domain` with the given enabled domains
pub async fn mount_domains(server: &MockServer, domains: &[&str]) {
    let rules: String = domains
        .iter()
        .map(|d| format!("<DomainRule><Status>ENABLED</Status><Name>{d}</Name><Type>REST</Type></DomainRule>"))
        .collect();
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .and(query_param("domain", ""))
        .respond_with(xml_response(
            200,
            format!("<DomainConfiguration>{rules}</DomainConfiguration>"),
        ))
        .mount(server)
        .await;
}

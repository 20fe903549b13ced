//! Integration tests for listing, ACL and domain discovery

use cloudshelf_core::domain::{Permission, ProviderError};
use cloudshelf_core::ports::{IProviderAdapter, ListRequest};
use wiremock::matchers::{header_exists, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, bucket_path, ctx, xml_response};

// ============================================================================
// list_page
// ============================================================================

#[tokio::test]
async fn test_list_page_sends_signed_query() {
    let (server, provider) = common::setup_cos_mock().await;

    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .and(query_param("prefix", "docs/"))
        .and(query_param("delimiter", "/"))
        .and(query_param("max-keys", "100"))
        .and(query_param_is_missing("marker"))
        .and(header_exists("authorization"))
        .respond_with(xml_response(
            200,
            common::list_result(&[("docs/readme.md", 12)], &["docs/img/"], None),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let page = provider
        .list_page(
            &ctx(),
            &ListRequest {
                prefix: "docs/".into(),
                delimiter: Some("/".into()),
                cursor: None,
                limit: 100,
            },
        )
        .await
        .expect("list page");

    assert_eq!(page.objects.len(), 1);
    assert_eq!(page.objects[0].key().as_str(), "docs/readme.md");
    assert_eq!(page.objects[0].size(), Some(12));
    assert_eq!(page.common_prefixes, vec!["docs/img/".to_string()]);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn test_authorization_header_uses_q_sign() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .respond_with(xml_response(200, common::list_result(&[], &[], None)))
        .mount(&server)
        .await;

    provider
        .list_page(
            &ctx(),
            &ListRequest {
                prefix: String::new(),
                delimiter: None,
                cursor: None,
                limit: 10,
            },
        )
        .await
        .expect("list page");

    let requests = server.received_requests().await.expect("recording enabled");
    let auth = requests[0]
        .headers
        .get("authorization")
        .expect("authorization header")
        .to_str()
        .unwrap()
        .to_string();
    assert!(auth.starts_with("q-sign-algorithm=sha1&q-ak=AKIDtest&"));
    assert!(auth.contains("q-header-list=host"));
    assert!(auth.contains("q-url-param-list=max-keys;prefix"));
}

#[tokio::test]
async fn test_list_error_statuses_are_classified() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .and(query_param("prefix", "denied/"))
        .respond_with(common::error_response(403, "AccessDenied"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .and(query_param("prefix", "busy/"))
        .respond_with(common::error_response(503, "ServiceUnavailable"))
        .mount(&server)
        .await;

    let request = |prefix: &str| ListRequest {
        prefix: prefix.into(),
        delimiter: Some("/".into()),
        cursor: None,
        limit: 10,
    };

    let denied = provider.list_page(&ctx(), &request("denied/")).await;
    assert!(matches!(denied, Err(ProviderError::Permission(_))));

    let busy = provider.list_page(&ctx(), &request("busy/")).await;
    assert!(matches!(busy, Err(ProviderError::TransientNetwork(_))));
}

#[tokio::test]
async fn test_malformed_listing_is_invalid_response() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ListBucketResult><Contents>"))
        .mount(&server)
        .await;

    let result = provider
        .list_page(
            &ctx(),
            &ListRequest {
                prefix: String::new(),
                delimiter: None,
                cursor: None,
                limit: 10,
            },
        )
        .await;
    assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
}

// ============================================================================
// ACL and domains
// ============================================================================

#[tokio::test]
async fn test_get_acl_public_and_private() {
    let (server, provider) = common::setup_cos_mock().await;
    common::mount_acl(&server, true).await;
    assert_eq!(provider.get_acl(&ctx()).await.unwrap(), Permission::Public);

    let (server, provider) = common::setup_cos_mock().await;
    common::mount_acl(&server, false).await;
    assert_eq!(provider.get_acl(&ctx()).await.unwrap(), Permission::Private);
}

#[tokio::test]
async fn test_get_domains() {
    let (server, provider) = common::setup_cos_mock().await;
    common::mount_domains(&server, &["cdn.example.com", "img.example.com"]).await;

    let domains = provider.get_domains(&ctx()).await.unwrap();
    assert_eq!(domains, vec!["cdn.example.com", "img.example.com"]);
}

#[tokio::test]
async fn test_missing_domain_configuration_is_empty() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .and(query_param("domain", ""))
        .respond_with(common::error_response(404, "NoSuchDomainConfiguration"))
        .mount(&server)
        .await;

    assert!(provider.get_domains(&ctx()).await.unwrap().is_empty());
}

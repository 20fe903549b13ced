//! End-to-end tests of a core `Bucket` driven over the COS adapter

use cloudshelf_core::bucket::ListOptions;
use cloudshelf_core::domain::{BucketPhase, ItemOutcome, Permission, ProviderError};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::Mock;

use crate::common::{self, bucket_path, key, xml_response};

#[tokio::test]
async fn test_bind_degrades_when_acl_is_unreadable() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .and(query_param("acl", ""))
        .respond_with(common::error_response(403, "AccessDenied"))
        .mount(&server)
        .await;
    common::mount_domains(&server, &["cdn.example.com"]).await;
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .and(query_param("prefix", ""))
        .respond_with(xml_response(200, common::list_result(&[("a.png", 3)], &[], None)))
        .mount(&server)
        .await;

    let mut bucket = common::bucket(provider);
    let report = bucket.bind(&CancellationToken::new()).await.expect("bind");

    assert!(report.is_partial());
    assert!(matches!(report.acl_error, Some(ProviderError::Permission(_))));
    assert_eq!(report.domains, vec!["cdn.example.com".to_string()]);
    assert_eq!(bucket.permission(), Permission::Unknown);
    assert_eq!(bucket.phase(), BucketPhase::Idle);
    assert_eq!(bucket.resources().len(), 1);

    let url = bucket.generate_url(&key("a.png"), None).unwrap();
    assert_eq!(url, "http://cdn.example.com/photos-1250000000/a.png");
}

#[tokio::test]
async fn test_paginated_listing_has_no_duplicates() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .and(query_param("prefix", ""))
        .and(query_param_is_missing("marker"))
        .respond_with(xml_response(
            200,
            common::list_result(&[("a.txt", 1), ("b.txt", 1)], &[], Some("b.txt")),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .and(query_param("marker", "b.txt"))
        .respond_with(xml_response(
            200,
            // COS may repeat the boundary key; it must not be listed twice.
            common::list_result(&[("b.txt", 1), ("c.txt", 1)], &["d/"], None),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mut bucket = common::bucket(provider);
    let outcome = bucket
        .list_all(ListOptions::root(), &CancellationToken::new())
        .await
        .expect("list all");

    assert!(outcome.exhausted);
    assert!(bucket.pagination_cursor().is_none());
    let mut keys: Vec<&str> = bucket.resources().iter().map(|r| r.key().as_str()).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["a.txt", "b.txt", "c.txt", "d/"]);
}

#[tokio::test]
async fn test_partial_bulk_delete_returns_report() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("GET"))
        .and(path(bucket_path()))
        .and(query_param("prefix", ""))
        .respond_with(xml_response(
            200,
            common::list_result(&[("a.txt", 1), ("b.txt", 1), ("c.txt", 1)], &[], None),
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(bucket_path()))
        .and(query_param("delete", ""))
        .respond_with(xml_response(
            200,
            "<DeleteResult>\
             <Deleted><Key>a.txt</Key></Deleted>\
             <Deleted><Key>c.txt</Key></Deleted>\
             <Error><Key>b.txt</Key><Code>AccessDenied</Code><Message>denied</Message></Error>\
             </DeleteResult>",
        ))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let mut bucket = common::bucket(provider);
    bucket
        .list_resources(ListOptions::root(), &cancel)
        .await
        .expect("listing");

    let report = bucket
        .remove_resources(&[key("a.txt"), key("b.txt"), key("c.txt")], &cancel)
        .await;

    assert!(report.is_partial_failure());
    assert_eq!(report.succeeded().count(), 2);
    assert!(matches!(
        report.outcome_of("b.txt"),
        Some(ItemOutcome::Failed(ProviderError::Permission(_)))
    ));
    let remaining: Vec<&str> = bucket.resources().iter().map(|r| r.key().as_str()).collect();
    assert_eq!(remaining, vec!["b.txt"]);
}

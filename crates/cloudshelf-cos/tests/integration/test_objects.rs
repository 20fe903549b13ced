//! Integration tests for object uploads, copies, deletes and URLs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cloudshelf_core::domain::ProviderError;
use cloudshelf_core::ports::{IProviderAdapter, ObjectBody};
use wiremock::matchers::{body_string, body_string_contains, header, header_exists, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, bucket_path, ctx, key, object_path, xml_response};

const COPY_RESULT: &str = r#"<CopyObjectResult><ETag>"0cc175b9c0f1b6a831c399e269772661"</ETag><LastModified>2024-03-01T08:00:00Z</LastModified></CopyObjectResult>"#;

// ============================================================================
// Uploads
// ============================================================================

#[tokio::test]
async fn test_put_object_streams_body_and_reports_progress() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("PUT"))
        .and(path(object_path("notes/hello.txt")))
        .and(header("content-length", "11"))
        .and(header_exists("authorization"))
        .and(body_string("hello world"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("ETag", "\"5eb63bbbe01eeed093cb22bb8f5acdc3\""),
        )
        .expect(1)
        .mount(&server)
        .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = seen.clone();
    let body: ObjectBody = Box::new(std::io::Cursor::new(b"hello world".to_vec()));

    let resource = provider
        .put_object(
            &ctx(),
            &key("notes/hello.txt"),
            body,
            11,
            Some(Arc::new(move |f: f64| sink_seen.lock().unwrap().push(f))),
        )
        .await
        .expect("upload");

    assert_eq!(resource.size(), Some(11));
    assert_eq!(
        resource.content_hash().map(|h| h.as_str()),
        Some("5eb63bbbe01eeed093cb22bb8f5acdc3")
    );
    let seen = seen.lock().unwrap();
    assert_eq!(seen.last().copied(), Some(1.0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_put_object_quota_error() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("PUT"))
        .and(path(object_path("big.bin")))
        .respond_with(common::error_response(400, "EntityTooLarge"))
        .mount(&server)
        .await;

    let body: ObjectBody = Box::new(std::io::Cursor::new(vec![0u8; 4]));
    let err = provider
        .put_object(&ctx(), &key("big.bin"), body, 4, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::QuotaExceeded(_)));
}

#[tokio::test]
async fn test_fetch_remote_relays_source_into_put() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("GET"))
        .and(path("/source/pic.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNGDATA".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(object_path("pics/pic.png")))
        .and(body_string("PNGDATA"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc123\""))
        .expect(1)
        .mount(&server)
        .await;

    let source = format!("{}/source/pic.png", server.uri());
    let resource = provider
        .fetch_remote(&ctx(), &source, &key("pics/pic.png"))
        .await
        .expect("fetch");
    assert_eq!(resource.size(), Some(7));
}

#[tokio::test]
async fn test_fetch_remote_missing_source() {
    let (server, provider) = common::setup_cos_mock().await;
    let source = format!("{}/source/missing.png", server.uri());
    let err = provider
        .fetch_remote(&ctx(), &source, &key("missing.png"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));
}

// ============================================================================
// Deletes
// ============================================================================

#[tokio::test]
async fn test_delete_object_missing_is_success() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("DELETE"))
        .and(path(object_path("gone.txt")))
        .respond_with(common::error_response(404, "NoSuchKey"))
        .mount(&server)
        .await;

    provider
        .delete_object(&ctx(), &key("gone.txt"))
        .await
        .expect("idempotent delete");
}

#[tokio::test]
async fn test_batch_delete_reports_each_key() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("POST"))
        .and(path(bucket_path()))
        .and(query_param("delete", ""))
        .and(header_exists("content-md5"))
        .and(body_string_contains("<Key>a.txt</Key>"))
        .respond_with(xml_response(
            200,
            "<DeleteResult>\
             <Deleted><Key>a.txt</Key></Deleted>\
             <Deleted><Key>b.txt</Key></Deleted>\
             <Error><Key>locked.txt</Key><Code>AccessDenied</Code><Message>denied</Message></Error>\
             </DeleteResult>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let keys = vec![key("a.txt"), key("b.txt"), key("locked.txt")];
    let results = provider.delete_objects(&ctx(), &keys).await.expect("batch");

    assert_eq!(results.len(), 3);
    assert!(results[&key("a.txt")].is_ok());
    assert!(results[&key("b.txt")].is_ok());
    assert!(matches!(
        results[&key("locked.txt")],
        Err(ProviderError::Permission(_))
    ));
}

// ============================================================================
// Copy and rename
// ============================================================================

#[tokio::test]
async fn test_rename_copies_then_deletes() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("PUT"))
        .and(path(object_path("b/file.txt")))
        .and(header(
            "x-cos-copy-source",
            "photos-1250000000.cos.ap-guangzhou.myqcloud.com/a/file.txt",
        ))
        .respond_with(xml_response(200, COPY_RESULT))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(object_path("b/file.txt")))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"0cc175b9c0f1b6a831c399e269772661\""))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(object_path("a/file.txt")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let resource = provider
        .rename_object(&ctx(), &key("a/file.txt"), &key("b/file.txt"))
        .await
        .expect("rename");
    assert_eq!(resource.key().as_str(), "b/file.txt");
    assert!(resource.content_hash().is_some());
}

#[tokio::test]
async fn test_rename_with_failed_delete_is_duplicated() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("PUT"))
        .and(path(object_path("b/file.txt")))
        .respond_with(xml_response(200, COPY_RESULT))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(object_path("a/file.txt")))
        .respond_with(common::error_response(403, "AccessDenied"))
        .mount(&server)
        .await;

    let err = provider
        .rename_object(&ctx(), &key("a/file.txt"), &key("b/file.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Duplicated { ref target_key, .. } if target_key == "b/file.txt"));
}

#[tokio::test]
async fn test_failed_copy_never_deletes_source() {
    let (server, provider) = common::setup_cos_mock().await;
    Mock::given(method("PUT"))
        .and(path(object_path("b/file.txt")))
        .respond_with(xml_response(
            200,
            "<Error><Code>InternalError</Code><Message>copy failed</Message></Error>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let result = provider
        .rename_object(&ctx(), &key("a/file.txt"), &key("b/file.txt"))
        .await;
    assert!(result.is_err());
}

// ============================================================================
// URLs
// ============================================================================

#[tokio::test]
async fn test_sign_url_only_when_required() {
    let (server, provider) = common::setup_cos_mock().await;

    let public = provider
        .sign_url(&ctx(), &key("a b.png"), Duration::from_secs(60), false)
        .unwrap();
    assert_eq!(public, format!("{}/{}/a%20b.png", server.uri(), common::BUCKET));

    let private = provider
        .sign_url(&ctx(), &key("a b.png"), Duration::from_secs(60), true)
        .unwrap();
    assert!(private.starts_with(&public));
    assert!(private.contains("q-signature="));
    assert!(private.contains("q-ak=AKIDtest"));
}

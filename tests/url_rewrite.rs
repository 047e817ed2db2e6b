use edge_auth::policy::RulePolicy;
use edge_auth::rewrite::{UrlRewriter, REWRITE_POLICY};
use edge_auth::{EdgeHandler, EdgeRequest, EdgeResponse, Outcome};
use std::sync::Arc;

fn rewriter() -> UrlRewriter {
    UrlRewriter::new(Arc::new(RulePolicy::from_json(REWRITE_POLICY, None).unwrap()))
}

fn request(uri: &str, querystring: &str) -> EdgeRequest {
    EdgeRequest::new("GET", uri, querystring)
        .with_header("Host", "app.dev.example.com")
        .with_header("User-Agent", "curl/8.0")
}

fn rewritten(uri: &str, querystring: &str) -> EdgeRequest {
    match rewriter().handle(request(uri, querystring)).unwrap() {
        Outcome::Forward(request) => request,
        Outcome::Respond(response) => panic!("unexpected response {response:?}"),
    }
}

fn redirected(uri: &str, querystring: &str) -> EdgeResponse {
    match rewriter().handle(request(uri, querystring)).unwrap() {
        Outcome::Respond(response) => response,
        Outcome::Forward(request) => panic!("unexpected forward {request:?}"),
    }
}

#[test]
fn passthrough_when_path_is_a_file_with_extension() {
    let result = rewritten("/test.html", "");
    assert_eq!(result, request("/test.html", ""));
}

#[test]
fn redirect_to_path_with_trailing_slash() {
    let response = redirected("/foo", "foo=bar");
    assert_eq!(response.status, "301");
    assert_eq!(response.header("location"), Some("/foo/?foo=bar"));
    assert_eq!(response.headers.len(), 1);

    let response = redirected("/foo", "");
    assert_eq!(response.header("location"), Some("/foo/"));
}

#[test]
fn append_index_html_to_directories() {
    let result = rewritten("/foo/", "foo=bar");
    assert_eq!(result.uri, "/foo/index.html");
    assert_eq!(result.querystring, "foo=bar");
    assert_eq!(result.header("user-agent"), Some("curl/8.0"));

    assert_eq!(rewritten("/", "").uri, "/index.html");
}

#[test]
fn product_with_id_in_path() {
    let result = rewritten("/product/testing-foo-00000000-aaaa-bbbb-cccc-111111111111/", "foo=bar");
    assert_eq!(result.uri, "/product/index.html");
    assert_eq!(result.querystring, "foo=bar&productId=00000000-aaaa-bbbb-cccc-111111111111");
}

#[test]
fn product_with_id_and_serial_in_path() {
    let result = rewritten("/product/testing-foo-00000000-aaaa-bbbb-cccc-111111111111/123", "foo=bar");
    assert_eq!(result.uri, "/product/index.html");
    assert_eq!(
        result.querystring,
        "foo=bar&productId=00000000-aaaa-bbbb-cccc-111111111111&productSerial=123"
    );
}

#[test]
fn withdrawal_without_params() {
    let result = rewritten("/withdrawal/", "");
    assert_eq!(result.uri, "/withdrawal/index.html");
    assert_eq!(result.querystring, "");
}

#[test]
fn withdrawal_with_id_shows_the_product() {
    let result = rewritten("/withdrawal/00000000-aaaa-bbbb-cccc-222222222222", "");
    assert_eq!(result.uri, "/product/index.html");
    assert_eq!(result.querystring, "productId=00000000-aaaa-bbbb-cccc-222222222222");
}

#[test]
fn withdrawal_with_id_and_serial() {
    let result = rewritten("/withdrawal/00000000-aaaa-bbbb-cccc-222222222222/234", "");
    assert_eq!(result.uri, "/withdrawal/index.html");
    assert_eq!(
        result.querystring,
        "productId=00000000-aaaa-bbbb-cccc-222222222222&productSerial=234"
    );
}

#[test]
fn drops_without_params() {
    let result = rewritten("/drops/", "");
    assert_eq!(result.uri, "/drops/index.html");
    assert_eq!(result.querystring, "");
}

#[test]
fn drops_with_id() {
    let result = rewritten("/drops/00000000-aaaa-bbbb-cccc-333333333333", "");
    assert_eq!(result.uri, "/drops/index.html");
    assert_eq!(result.querystring, "dropId=00000000-aaaa-bbbb-cccc-333333333333");
}

#[test]
fn malformed_product_id_falls_back_to_directory_rules() {
    let response = redirected("/product/not-a-uuid", "");
    assert_eq!(response.header("location"), Some("/product/not-a-uuid/"));
}

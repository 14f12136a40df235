//! Version negotiation through `accept-version`.

mod common;

use common::{send, versioned_get};
use oxide_dispatch::{Method, Request, RouteSpec, Server, ServerOptions, VersionTieBreak};

fn two_versions(options: ServerOptions) -> Server {
    let server = Server::with_options(options);
    server
        .get(RouteSpec::path("/foo/:id").version("1.2.3"), send("v1"))
        .unwrap();
    server
        .get(RouteSpec::path("/foo/:id").version("3.2.1"), send("v3"))
        .unwrap();
    server
}

fn text(req: Request) -> Request {
    req.header("Accept", "text/plain")
}

#[tokio::test]
async fn test_range_selects_matching_version() {
    let server = two_versions(ServerOptions::default());

    let res = server.handle(text(versioned_get("/foo/bar", "~1.2"))).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body_string().unwrap(), "v1");

    let res = server.handle(text(versioned_get("/foo/bar", "~3"))).await;
    assert_eq!(res.body_string().unwrap(), "v3");

    let res = server.handle(text(versioned_get("/foo/bar", ">=1.0.0"))).await;
    assert_eq!(res.body_string().unwrap(), "v3");
}

#[tokio::test]
async fn test_unsatisfied_range_is_400_with_range_as_message() {
    let server = two_versions(ServerOptions::default());

    let res = server.handle(versioned_get("/foo/bar", "~2.1")).await;
    assert_eq!(res.status, 400);
    let body: serde_json::Value = res.json().unwrap();
    assert_eq!(body["code"], "InvalidVersion");
    assert_eq!(body["message"], "~2.1");
}

#[tokio::test]
async fn test_padded_range_is_echoed_verbatim() {
    let server = two_versions(ServerOptions::default());

    let res = server.handle(text(versioned_get("/foo/bar", " ~1.2 "))).await;
    assert_eq!(res.body_string().unwrap(), "v1");

    let res = server.handle(versioned_get("/foo/bar", " ~2.1 ")).await;
    assert_eq!(res.status, 400);
    let body: serde_json::Value = res.json().unwrap();
    assert_eq!(body["message"], " ~2.1 ");
}

#[tokio::test]
async fn test_unparseable_range_is_400() {
    let server = two_versions(ServerOptions::default());

    let res = server.handle(versioned_get("/foo/bar", "banana")).await;
    assert_eq!(res.status, 400);
    let body: serde_json::Value = res.json().unwrap();
    assert_eq!(body["message"], "banana");
}

#[tokio::test]
async fn test_no_range_uses_tie_break() {
    let first = two_versions(ServerOptions::default());
    let res = first.handle(text(Request::get("/foo/bar"))).await;
    assert_eq!(res.body_string().unwrap(), "v1");

    let last = two_versions(
        ServerOptions::new().version_tie_break(VersionTieBreak::LastRegistered),
    );
    let res = last.handle(text(Request::get("/foo/bar"))).await;
    assert_eq!(res.body_string().unwrap(), "v3");
}

#[tokio::test]
async fn test_api_version_header_alias() {
    let server = two_versions(ServerOptions::default());
    let res = server
        .handle(text(Request::get("/foo/bar").header("X-Api-Version", "3.2.1")))
        .await;
    assert_eq!(res.body_string().unwrap(), "v3");
}

#[tokio::test]
async fn test_unversioned_route_accepts_any_range() {
    let server = Server::new();
    server.get("/plain", send("plain")).unwrap();

    let res = server.handle(text(versioned_get("/plain", "~9"))).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body_string().unwrap(), "plain");
}

#[tokio::test]
async fn test_unversioned_candidates_ignore_version_header() {
    let server = Server::new();
    server.get("/foo/:id", send("first")).unwrap();
    server.get("/foo/:name", send("second")).unwrap();

    let res = server.handle(text(Request::get("/foo/x"))).await;
    assert_eq!(res.body_string().unwrap(), "first");

    for range in ["~1", "banana"] {
        let res = server.handle(text(versioned_get("/foo/x", range))).await;
        assert_eq!(res.status, 200, "range {range}");
        assert_eq!(res.body_string().unwrap(), "first", "range {range}");
    }
}

#[tokio::test]
async fn test_mixed_candidates_prefer_latest_qualifying() {
    let server = Server::new();
    server.get("/mix", send("unversioned")).unwrap();
    server
        .get(RouteSpec::path("/mix").version("2.0.0"), send("v2"))
        .unwrap();

    let res = server.handle(text(versioned_get("/mix", "^2"))).await;
    assert_eq!(res.body_string().unwrap(), "v2");

    let res = server.handle(text(versioned_get("/mix", "^5"))).await;
    assert_eq!(res.body_string().unwrap(), "unversioned");
}

#[tokio::test]
async fn test_default_version_applies_to_unversioned_routes() {
    let server = Server::with_options(ServerOptions::new().default_version("1.0.0"));
    server.get("/foo", send("default")).unwrap();

    let res = server.handle(text(versioned_get("/foo", "~1"))).await;
    assert_eq!(res.status, 200);

    let res = server.handle(versioned_get("/foo", "~2")).await;
    assert_eq!(res.status, 400);
}

#[tokio::test]
async fn test_version_check_only_after_method_match() {
    let server = two_versions(ServerOptions::default());
    let res = server
        .handle(Request::new(Method::Post, "/foo/bar").header("accept-version", "~2.1"))
        .await;
    assert_eq!(res.status, 405);
}

use anyhow::Context as _;
use apibridge_openapi_tools::{
    ApiSourceConfig, InvocationContext, OpenApiToolSource, OpenApiToolsError,
};
use apibridge_test_support::MockUpstream;
use serde_json::{Value, json};

fn items_api(base_url: &str) -> Value {
    json!({
        "openapi": "3.0.3",
        "info": { "title": "Items", "version": "1.0.0" },
        "servers": [{ "url": base_url }],
        "paths": {
            "/items": {
                "get": {
                    "operationId": "listItems",
                    "parameters": [
                        { "name": "page", "in": "query", "schema": { "type": "integer" } },
                        { "name": "tag", "in": "query", "schema": { "type": "array", "items": { "type": "string" } } }
                    ]
                },
                "post": {
                    "operationId": "createItem",
                    "requestBody": {
                        "required": true,
                        "content": { "application/json": { "schema": { "$ref": "#/components/schemas/NewItem" } } }
                    }
                }
            },
            "/secure": {
                "get": {
                    "operationId": "getSecure",
                    "parameters": [
                        { "name": "X-Key", "in": "header", "required": true, "schema": { "type": "string" } }
                    ]
                }
            },
            "/browser/{id}": {
                "get": { "summary": "Get a browser session" }
            }
        },
        "components": {
            "schemas": {
                "NewItem": {
                    "type": "object",
                    "required": ["name"],
                    "properties": { "name": { "type": "string" } }
                }
            }
        }
    })
}

async fn started(upstream: &MockUpstream) -> anyhow::Result<OpenApiToolSource> {
    OpenApiToolSource::build(ApiSourceConfig::new(upstream.spec_url()))
        .await
        .context("start tool source")
}

fn text_of(result: &rmcp::model::CallToolResult) -> String {
    let v = serde_json::to_value(result).expect("CallToolResult serializes");
    v.get("content")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn post_items_sends_json_body_to_base_url() -> anyhow::Result<()> {
    let upstream = MockUpstream::start(items_api).await?;
    let source = started(&upstream).await?;

    let report = source
        .try_call_tool(
            "createItem",
            json!({ "body": { "name": "x" } }),
            &InvocationContext::default(),
        )
        .await?;
    assert_eq!(report.status, 200);
    assert_eq!(report.method, "POST");
    assert_eq!(report.url, format!("{}/items", upstream.base_url()));

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, "POST");
    assert_eq!(req.path, "/items");
    assert_eq!(req.header("content-type"), Some("application/json"));
    assert_eq!(req.body_json(), Some(json!({ "name": "x" })));
    assert_eq!(req.header("x-client-id"), Some("apibridge"));
    assert_eq!(req.header("authorization"), None);
    Ok(())
}

#[tokio::test]
async fn missing_required_header_is_rejected_without_a_request() -> anyhow::Result<()> {
    let upstream = MockUpstream::start(items_api).await?;
    let source = started(&upstream).await?;

    let result = source
        .call_tool("getSecure", json!({}), &InvocationContext::default())
        .await;
    assert_eq!(result.is_error, Some(true));
    let payload = result
        .structured_content
        .as_ref()
        .context("structured payload")?;
    assert_eq!(payload["error"], "Validation failed");
    assert_eq!(payload["details"], json!(["Missing required header: X-Key"]));
    assert!(text_of(&result).contains("Missing required header: X-Key"));
    assert_eq!(upstream.request_count(), 0);

    let report = source
        .try_call_tool(
            "getSecure",
            json!({ "headers": { "x-key": "k" } }),
            &InvocationContext::default(),
        )
        .await?;
    assert_eq!(report.status, 200);
    assert_eq!(upstream.requests()[0].header("x-key"), Some("k"));
    Ok(())
}

#[tokio::test]
async fn zero_page_is_omitted_from_the_query() -> anyhow::Result<()> {
    let upstream = MockUpstream::start(items_api).await?;
    let source = started(&upstream).await?;
    let ctx = InvocationContext::default();

    let one = source
        .try_call_tool("listItems", json!({ "query": { "page": 1 } }), &ctx)
        .await?;
    assert!(one.url.ends_with("?page=1"), "{}", one.url);

    let zero = source
        .try_call_tool("listItems", json!({ "query": { "page": 0 } }), &ctx)
        .await?;
    assert!(!zero.url.contains("page"), "{}", zero.url);

    let tags = source
        .try_call_tool("listItems", json!({ "query": { "tag": ["a", "b"] } }), &ctx)
        .await?;
    assert!(tags.url.ends_with("?tag=a&tag=b"), "{}", tags.url);

    let queries: Vec<Option<String>> = upstream.requests().into_iter().map(|r| r.query).collect();
    assert_eq!(
        queries,
        vec![Some("page=1".to_string()), None, Some("tag=a&tag=b".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn keep_falsy_query_values_sends_zero() -> anyhow::Result<()> {
    let upstream = MockUpstream::start(items_api).await?;
    let mut cfg = ApiSourceConfig::new(upstream.spec_url());
    cfg.keep_falsy_query_values = true;
    let source = OpenApiToolSource::build(cfg).await?;

    let report = source
        .try_call_tool(
            "listItems",
            json!({ "query": { "page": 0 } }),
            &InvocationContext::default(),
        )
        .await?;
    assert!(report.url.ends_with("?page=0"), "{}", report.url);
    Ok(())
}

#[tokio::test]
async fn derived_name_round_trips_to_the_operation() -> anyhow::Result<()> {
    let upstream = MockUpstream::start(items_api).await?;
    let source = started(&upstream).await?;

    let names: Vec<String> = source.list_tools().into_iter().map(|t| t.name.to_string()).collect();
    assert!(names.contains(&"get_browser_id".to_string()), "{names:?}");

    let result = source
        .call_tool(
            "get_browser_id",
            json!({ "path": { "id": "session 1" } }),
            &InvocationContext::default(),
        )
        .await;
    assert_eq!(result.is_error, Some(false), "{}", text_of(&result));
    let text = text_of(&result);
    assert!(text.contains("Status: 200 OK"), "{text}");
    assert!(text.contains("\"path\": \"/browser/session%201\""), "{text}");
    Ok(())
}

#[tokio::test]
async fn authorization_and_status_are_reported() -> anyhow::Result<()> {
    let upstream = MockUpstream::start(items_api).await?;
    let mut cfg = ApiSourceConfig::new(upstream.spec_url());
    cfg.auth_scheme = apibridge_openapi_tools::config::AuthScheme::Bearer;
    let source = OpenApiToolSource::build(cfg).await?;

    let report = source
        .try_call_tool(
            "listItems",
            json!({ "headers": { "x-mock-status": "404" } }),
            &InvocationContext::with_authorization("secret"),
        )
        .await?;
    assert_eq!(report.status, 404);
    assert_eq!(report.status_text, "Not Found");
    assert!(!report.is_success());
    assert_eq!(report.body.to_value()["method"], "GET");

    assert_eq!(
        upstream.requests()[0].header("authorization"),
        Some("Bearer secret")
    );
    Ok(())
}

#[tokio::test]
async fn unknown_tools_and_bad_arguments_are_per_call_errors() -> anyhow::Result<()> {
    let upstream = MockUpstream::start(items_api).await?;
    let source = started(&upstream).await?;
    let ctx = InvocationContext::default();

    let err = source
        .try_call_tool("nope", json!({}), &ctx)
        .await
        .expect_err("unknown tool");
    assert!(matches!(err, OpenApiToolsError::ToolNotFound(_)));

    let err = source
        .try_call_tool("listItems", json!({ "page": 1 }), &ctx)
        .await
        .expect_err("unsectioned arguments");
    assert!(matches!(err, OpenApiToolsError::Validation(_)));

    let err = source
        .try_call_tool("createItem", json!({ "body": { "name": 1 } }), &ctx)
        .await
        .expect_err("invalid body");
    let OpenApiToolsError::Validation(details) = err else {
        panic!("expected validation error");
    };
    assert!(details[0].starts_with("Invalid request body: /name"), "{details:?}");

    assert_eq!(upstream.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_calls_share_the_catalog() -> anyhow::Result<()> {
    let upstream = MockUpstream::start(items_api).await?;
    let source = started(&upstream).await?;
    let ctx = InvocationContext::default();

    let (a, b, c) = tokio::join!(
        source.try_call_tool("listItems", json!({ "query": { "page": 1 } }), &ctx),
        source.try_call_tool("listItems", json!({ "query": { "page": 2 } }), &ctx),
        source.try_call_tool("createItem", json!({ "body": { "name": "y" } }), &ctx),
    );
    assert_eq!(a?.status, 200);
    assert_eq!(b?.status, 200);
    assert_eq!(c?.status, 200);
    assert_eq!(upstream.request_count(), 3);
    Ok(())
}

#[tokio::test]
async fn unreachable_upstream_is_a_call_error() -> anyhow::Result<()> {
    let upstream = MockUpstream::start(items_api).await?;
    let mut cfg = ApiSourceConfig::new(upstream.spec_url());
    // Port 9 (discard) on loopback: nothing listens there in test environments.
    cfg.base_url = Some("http://127.0.0.1:9".to_string());
    let source = OpenApiToolSource::build(cfg).await?;

    let result = source
        .call_tool("listItems", json!({}), &InvocationContext::default())
        .await;
    assert_eq!(result.is_error, Some(true));
    assert!(text_of(&result).starts_with("Call failed"), "{}", text_of(&result));
    Ok(())
}

use color_eyre::eyre::Result;
use http::{Method, StatusCode};
use httpecho::common::{spawn_test_server, spawn_test_server_with_config};
use httpecho::http::{ClientConfigBuilder, ClientRequest, HttpConfig, HttpEchoClient};
use httpecho::{EchoClient, MapSource};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_get_request() -> Result<()> {
    let (server_handle, addr) = spawn_test_server(MapSource::new()).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    let reply = client
        .send(&ClientRequest::get("/test").header("User-Agent", "test"))
        .await?;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.text()?,
        "Method: GET\n\nPath: /test\n\nHeaders:\nUser-Agent: test\n\n"
    );
    assert_eq!(reply.header("content-type"), Some("text/plain; charset=utf-8"));

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_post_request_with_body() -> Result<()> {
    let (server_handle, addr) = spawn_test_server(MapSource::new()).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    let reply = client
        .send(
            &ClientRequest::post("/api", r#"{"key": "value"}"#)
                .header("Content-Type", "application/json"),
        )
        .await?;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.text()?,
        "Method: POST\n\nPath: /api\n\nHeaders:\nContent-Length: 16\nContent-Type: application/json\n\nBody: {\"key\": \"value\"}\n"
    );

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_custom_status_code() -> Result<()> {
    let source = MapSource::new().with("STATUS_CODE", "404");
    let (server_handle, addr) = spawn_test_server(source).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    let reply = client.get("/").await?;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.text()?, "Method: GET\n\nPath: /\n\nHeaders:\n\n");

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_status_without_body() -> Result<()> {
    let source = MapSource::new().with("STATUS_CODE", "204");
    let (server_handle, addr) = spawn_test_server(source).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    let reply = client.get("/empty").await?;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(reply.body.is_empty());

    // The connection stays usable after a bodiless response.
    let reply = client.get("/again").await?;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_response_size_padding() -> Result<()> {
    let natural = "Method: GET\n\nPath: /\n\nHeaders:\n\n";
    let source = MapSource::new().with("RESPONSE_SIZE", "100");
    let (server_handle, addr) = spawn_test_server(source).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    let reply = client.get("/").await?;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text()?, format!("{natural}{}", "x".repeat(100 - natural.len())));
    assert_eq!(reply.header("content-length"), Some("100"));

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_response_size_never_truncates() -> Result<()> {
    let source = MapSource::new().with("RESPONSE_SIZE", "10");
    let (server_handle, addr) = spawn_test_server(source).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    let reply = client.get("/longer-than-ten-bytes").await?;

    assert_eq!(
        reply.text()?,
        "Method: GET\n\nPath: /longer-than-ten-bytes\n\nHeaders:\n\n"
    );

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_delay() -> Result<()> {
    let source = MapSource::new().with("DELAY", "10");
    let (server_handle, addr) = spawn_test_server(source).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    let start = Instant::now();
    let reply = client.get("/").await?;
    let elapsed = start.elapsed();

    assert_eq!(reply.status, StatusCode::OK);
    assert!(elapsed >= Duration::from_millis(10), "expected delay of at least 10ms, got {elapsed:?}");

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_delays_do_not_serialize_requests() -> Result<()> {
    let source = MapSource::new().with("DELAY", "300");
    let (server_handle, addr) = spawn_test_server(source).await?;

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..8 {
        handles.push(tokio::spawn(async move {
            let mut client = HttpEchoClient::connect(addr).await?;
            let reply = client.get(&format!("/client/{i}")).await?;
            assert!(reply.text()?.contains(&format!("Path: /client/{i}\n")));
            Ok::<(), color_eyre::eyre::Error>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(300));
    // Eight serialized requests would take at least 2.4s.
    assert!(elapsed < Duration::from_millis(2000), "requests were serialized: {elapsed:?}");

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_malformed_overrides_behave_as_unset() -> Result<()> {
    let source = MapSource::new()
        .with("STATUS_CODE", "abc")
        .with("DELAY", "1s")
        .with("RESPONSE_SIZE", "-20");
    let (server_handle, addr) = spawn_test_server(source).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    let reply = client.get("/x").await?;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text()?, "Method: GET\n\nPath: /x\n\nHeaders:\n\n");

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_repeated_headers_are_joined_in_order() -> Result<()> {
    let (server_handle, addr) = spawn_test_server(MapSource::new()).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    let reply = client
        .send(
            &ClientRequest::get("/h?ignored=1")
                .header("x-trace", "one")
                .header("Accept", "*/*")
                .header("X-Trace", "two")
                .header("X-TRACE", "three"),
        )
        .await?;

    assert_eq!(
        reply.text()?,
        "Method: GET\n\nPath: /h\n\nHeaders:\nAccept: */*\nX-Trace: one, two, three\n\n"
    );

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_any_method_is_echoed() -> Result<()> {
    let (server_handle, addr) = spawn_test_server(MapSource::new()).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    for method in [Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS] {
        let reply = client.send(&ClientRequest::new(method.clone(), "/any")).await?;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.text()?.starts_with(&format!("Method: {method}\n\n")));
    }

    let custom = Method::from_bytes(b"PURGE")?;
    let reply = client.send(&ClientRequest::new(custom, "/cache")).await?;
    assert!(reply.text()?.starts_with("Method: PURGE\n\nPath: /cache\n\n"));

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_keep_alive_connection_reuse() -> Result<()> {
    let (server_handle, addr) = spawn_test_server(MapSource::new()).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    for i in 0..5 {
        let reply = client.get(&format!("/{i}")).await?;
        assert_eq!(reply.header("connection"), Some("keep-alive"));
        assert!(reply.text()?.contains(&format!("Path: /{i}\n")));
    }

    let reply = client
        .send(&ClientRequest::get("/last").header("Connection", "close"))
        .await?;
    assert!(reply.closes_connection());

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_echo_client_trait() -> Result<()> {
    let (server_handle, addr) = spawn_test_server(MapSource::new()).await?;

    let mut client = HttpEchoClient::connect(addr).await?;
    let response = client.echo_string("hello world").await?;

    assert_eq!(
        response,
        "Method: POST\n\nPath: /\n\nHeaders:\nContent-Length: 11\n\nBody: hello world\n"
    );

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_large_body() -> Result<()> {
    let (server_handle, addr) = spawn_test_server(MapSource::new()).await?;

    let body = "a".repeat(256 * 1024);
    let mut client = HttpEchoClient::connect(addr).await?;
    let reply = client.send(&ClientRequest::post("/big", body.clone())).await?;

    let text = reply.text()?;
    assert!(text.ends_with(&format!("Body: {body}\n")));

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_connection_limit() -> Result<()> {
    let config = HttpConfig::default()
        .with_bind_addr("127.0.0.1:0".parse()?)
        .with_max_connections(1);
    let (server_handle, addr) = spawn_test_server_with_config(config, MapSource::new()).await?;

    let mut first = HttpEchoClient::connect(addr).await?;
    first.get("/hold").await?;

    let quick = ClientConfigBuilder::new()
        .read_timeout(Duration::from_secs(2))
        .build();
    let mut second = HttpEchoClient::connect_with_config(addr, quick).await?;
    assert!(second.get("/rejected").await.is_err());

    // The connection holding the only slot keeps working.
    let reply = first.get("/still-here").await?;
    assert!(reply.text()?.contains("Path: /still-here\n"));

    server_handle.abort();
    Ok(())
}

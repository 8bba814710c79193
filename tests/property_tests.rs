use bytes::BytesMut;
use http::Method;
use httpecho::http::{ClientRequest, EchoRequest, HttpEchoClient, pad, render};
use httpecho::common::spawn_test_server;
use httpecho::{Behavior, MapSource};
use proptest::prelude::*;

fn header_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9-]{0,15}"
}

fn header_value() -> impl Strategy<Value = String> {
    "[ -~]{0,24}".prop_map(|v| v.trim().to_string())
}

fn rendered_header_lines(rendered: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(rendered);
    let after = text.split_once("Headers:\n").map(|(_, rest)| rest).unwrap_or_default();
    after
        .split_once("\n\n")
        .map(|(block, _)| block)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: every distinct header name appears exactly once, in ascending order
    #[test]
    fn headers_listed_once_in_order(
        headers in prop::collection::vec((header_name(), header_value()), 0..12)
    ) {
        let mut request = EchoRequest::new(Method::GET, "/");
        for (name, value) in &headers {
            request = request.with_header(name, value.clone());
        }

        let lines = rendered_header_lines(&render(&request));
        let names: Vec<&str> = lines
            .iter()
            .map(|line| line.split_once(": ").map(|(name, _)| name).unwrap_or(line.as_str()))
            .collect();

        let mut expected: Vec<String> = headers
            .iter()
            .map(|(name, _)| httpecho::http::canonical_header_name(name))
            .collect();
        expected.sort();
        expected.dedup();

        prop_assert_eq!(names, expected);
    }

    /// Property: values for one name are joined with ", " in the order supplied
    #[test]
    fn header_values_joined_in_order(values in prop::collection::vec("[a-z0-9]{1,8}", 1..6)) {
        let mut request = EchoRequest::new(Method::GET, "/");
        for value in &values {
            request = request.with_header("X-Value", value.clone());
        }

        let lines = rendered_header_lines(&render(&request));
        prop_assert_eq!(lines, vec![format!("X-Value: {}", values.join(", "))]);
    }

    /// Property: a non-empty body appears exactly once, verbatim, at the end
    #[test]
    fn body_is_verbatim(body in prop::collection::vec(any::<u8>(), 0..512)) {
        let request = EchoRequest::new(Method::POST, "/").with_body(body.clone());
        let rendered = render(&request);

        if body.is_empty() {
            prop_assert!(!rendered.windows(5).any(|w| w == b"Body:"));
        } else {
            let mut tail = b"\n\nBody: ".to_vec();
            tail.extend_from_slice(&body);
            tail.push(b'\n');
            prop_assert!(rendered.ends_with(&tail));
        }
    }

    /// Property: padding reaches exactly the target and never truncates
    #[test]
    fn padding_is_exact(natural in "[ -~]{0,200}", target in 0usize..400) {
        let mut body = BytesMut::from(natural.as_str());
        pad(&mut body, Some(target));

        prop_assert_eq!(body.len(), target.max(natural.len()));
        prop_assert!(body.starts_with(natural.as_bytes()));
        prop_assert!(body[natural.len()..].iter().all(|&b| b == b'x'));
    }

    /// Property: any non-numeric override resolves the same as no override
    #[test]
    fn malformed_overrides_are_ignored(raw in "[^0-9]{1,8}") {
        let source = MapSource::new()
            .with("DELAY", raw.clone())
            .with("STATUS_CODE", raw.clone())
            .with("RESPONSE_SIZE", raw);
        prop_assert_eq!(Behavior::resolve(&source), Behavior::default());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Property: bodies survive the trip through a real server unchanged
    #[test]
    fn server_echoes_body(body in "[ -~]{1,256}") {
        tokio_test::block_on(async {
            let (server_handle, addr) = spawn_test_server(MapSource::new()).await
                .map_err(|e| TestCaseError::fail(format!("Server setup failed: {e}")))?;

            let mut client = HttpEchoClient::connect(addr).await
                .map_err(|e| TestCaseError::fail(format!("Client connection failed: {e}")))?;
            let reply = client.send(&ClientRequest::post("/p", body.clone())).await
                .map_err(|e| TestCaseError::fail(format!("Request failed: {e}")))?;

            server_handle.abort();

            let text = reply.text()
                .map_err(|e| TestCaseError::fail(format!("Non UTF-8 reply: {e}")))?;
            let expected_suffix = format!("\n\nBody: {body}\n");
            prop_assert!(text.ends_with(&expected_suffix));
            Ok(())
        })?;
    }
}

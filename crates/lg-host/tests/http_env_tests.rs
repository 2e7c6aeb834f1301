// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP readiness checks with proxy variables in the environment.
//!
//! Kept in its own test binary: it sets process-wide variables.

use lg_host::{HttpCheck, ProbeOutcome, ReadinessCheck};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn http_check_ignores_proxy_variables() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let mut buf = vec![0u8; 4096];
            let _ = sock.read(&mut buf).await;
            let _ = sock
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
            let _ = sock.shutdown().await;
        }
    });

    // Nothing listens on port 1; a proxied request could never succeed.
    // SAFETY: this binary holds a single test, so no other thread reads the
    // environment concurrently.
    unsafe {
        std::env::set_var("http_proxy", "http://127.0.0.1:1");
        std::env::set_var("HTTP_PROXY", "http://127.0.0.1:1");
        std::env::set_var("ALL_PROXY", "http://127.0.0.1:1");
        std::env::remove_var("NO_PROXY");
        std::env::remove_var("no_proxy");
    }

    let url = format!("http://127.0.0.1:{port}/health");
    let check = HttpCheck::new(url, Duration::from_secs(2)).unwrap();
    assert_eq!(check.check().await, ProbeOutcome::Reachable);
}

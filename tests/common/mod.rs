// Shared helpers for integration tests: in-process fake backends on loopback
#![allow(dead_code)]

use std::net::SocketAddr;

use axum::Router;
use printfleet_rs::fleet_shared::{BackendKind, PrinterRecord};

/// Serve `router` on an ephemeral loopback port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A loopback port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

pub fn printer(id: i64, backend: BackendKind, port: u16) -> PrinterRecord {
    PrinterRecord::new(id, &format!("printer-{}", id), backend, "127.0.0.1", port)
}

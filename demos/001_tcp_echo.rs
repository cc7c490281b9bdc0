//! Request/response over a TCP socket.
//!
//! Demonstrates:
//! - Binding a server-side session to an accepted socket
//! - Serving requests with a `RequestHandler`
//! - Issuing concurrent requests from a client session
//!
//! Usage:
//!   cargo run --example 001_tcp_echo
//!   cargo run --example 001_tcp_echo -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use common::Args;
use duplex_transport::{Packet, RequestHandler, Result, SessionOptions, TransportSessionFactory};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};

// ============================================================================
// Handler
// ============================================================================

struct Echo;

#[async_trait]
impl RequestHandler for Echo {
    async fn handle(&self, request: Packet) -> Result<Option<Packet>> {
        let body = json!({
            "url": request.url,
            "echo": request.body.as_json(),
        });
        Ok(Some(Packet::response_to(&request).with_body(body)))
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== 001: TCP Echo ===\n");

    let factory = TransportSessionFactory::new();
    let listener = TcpListener::bind(&args.addr).await?;
    let addr = listener.local_addr()?;
    println!("[Setup] Listening on {addr}");

    // ========================================================================
    // Server
    // ========================================================================

    let server_factory = factory.clone();
    let server = tokio::spawn(async move {
        let (socket, peer) = listener.accept().await?;
        println!("[Server] Accepted {peer}");
        let session = server_factory.create(socket, "tcp", SessionOptions::server())?;
        session.set_request_handler(Arc::new(Echo));
        Ok::<_, duplex_transport::Error>(session)
    });

    // ========================================================================
    // Client
    // ========================================================================

    let socket = TcpStream::connect(addr).await?;
    let client = factory.create(socket, "tcp", SessionOptions::new())?;
    let server = server
        .await
        .map_err(|e| duplex_transport::Error::protocol(format!("server task failed: {e}")))??;

    let requests = (1..=3).map(|n| {
        client.request(
            Packet::request(format!("/item/{n}"))
                .with_method("GET")
                .with_body(json!({"n": n})),
        )
    });
    for response in futures_util::future::join_all(requests).await {
        let response = response?;
        println!(
            "[Client] id={:?} status={:?} body={:?}",
            response.id,
            response.status,
            response.body.as_json()
        );
    }

    client.close().await?;
    server.destroy().await;
    println!("\n[Done] Sessions closed");
    Ok(())
}

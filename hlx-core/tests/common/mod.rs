//! Shared test helpers: a tiny fixed-response HTTP server standing in for
//! the signer adapter / exchange, using the same hyper/http1/TokioIo stack
//! as `monitoring::server`.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Bind an ephemeral port and serve `body` with `status` for every request,
/// forever, in a background task the test process tears down on exit.
pub async fn spawn_json_server(status: StatusCode, body: serde_json::Value) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { continue };
            let body = body.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |_req: Request<hyper::body::Incoming>| {
                    let payload = serde_json::to_vec(&body).unwrap_or_default();
                    async move {
                        Ok::<_, hyper::Error>(
                            Response::builder()
                                .status(status)
                                .header("content-type", "application/json")
                                .body(Full::new(Bytes::from(payload)))
                                .unwrap(),
                        )
                    }
                });
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    addr
}

pub fn url(addr: SocketAddr) -> String {
    format!("http://{}", addr)
}

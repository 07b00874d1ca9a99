#![allow(dead_code)]

use pnet::util::MacAddr;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::head;
use axum::{Json, Router};
use tokio::net::TcpListener;

pub const H1: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const H2: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const H3: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);

pub fn mac(last: u8) -> MacAddr {
    MacAddr(0x00, 0x00, 0x00, 0x00, 0x00, last)
}

fn ethernet(dst: MacAddr, src: MacAddr, ethertype: u16) -> Vec<u8> {
    let mut frame = vec![dst.0, dst.1, dst.2, dst.3, dst.4, dst.5];
    frame.extend_from_slice(&[src.0, src.1, src.2, src.3, src.4, src.5]);
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame
}

fn ipv4(dst_mac: MacAddr, src_mac: MacAddr, src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, ttl: u8, transport: &[u8]) -> Vec<u8> {
    let mut frame = ethernet(dst_mac, src_mac, 0x0800);
    let total_len = (20 + transport.len()) as u16;
    frame.extend_from_slice(&[0x45, 0x00]);
    frame.extend_from_slice(&total_len.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x01, 0x40, 0x00, ttl, protocol, 0x00, 0x00]);
    frame.extend_from_slice(&src.octets());
    frame.extend_from_slice(&dst.octets());
    frame.extend_from_slice(transport);
    frame
}

pub fn echo_request(dst_mac: MacAddr, src_mac: MacAddr, src: Ipv4Addr, dst: Ipv4Addr, ttl: u8) -> Vec<u8> {
    ipv4(dst_mac, src_mac, src, dst, 1, ttl, &[8, 0, 0, 0, 0x12, 0x34, 0x00, 0x01])
}

pub fn udp(dst_mac: MacAddr, src_mac: MacAddr, src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    ipv4(dst_mac, src_mac, src, dst, 17, 64, &[0x13, 0x88, 0x00, 0x35, 0x00, 0x08, 0x00, 0x00])
}

/// What the fake collector has seen so far.
#[derive(Debug, Default)]
pub struct CollectorLog {
    pub heads: usize,
    pub posts: usize,
    /// Bodies of the POSTs that were answered with 200.
    pub accepted: Vec<serde_json::Value>,
}

struct CollectorState {
    log: Mutex<CollectorLog>,
    head_failures: usize,
    post_failures: usize,
}

/// Path-data endpoint that answers 503 to the first `head_failures` HEADs
/// and the first `post_failures` POSTs.
pub struct FakeCollector {
    pub url: String,
    state: Arc<CollectorState>,
}

impl FakeCollector {
    pub async fn start(post_failures: usize) -> Self {
        Self::start_with(0, post_failures).await
    }

    pub async fn start_with(head_failures: usize, post_failures: usize) -> Self {
        let state = Arc::new(CollectorState {
            log: Mutex::new(CollectorLog::default()),
            head_failures,
            post_failures,
        });

        let app = Router::new()
            .route("/path-data", head(liveness).post(path_data))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { url: format!("http://{}/path-data", addr), state }
    }

    pub fn heads(&self) -> usize {
        self.state.log.lock().unwrap().heads
    }

    pub fn posts(&self) -> usize {
        self.state.log.lock().unwrap().posts
    }

    pub fn accepted(&self) -> Vec<serde_json::Value> {
        self.state.log.lock().unwrap().accepted.clone()
    }
}

async fn liveness(State(state): State<Arc<CollectorState>>) -> StatusCode {
    let mut log = state.log.lock().unwrap();
    log.heads += 1;
    if log.heads <= state.head_failures {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn path_data(
    State(state): State<Arc<CollectorState>>,
    Json(record): Json<serde_json::Value>,
) -> StatusCode {
    let mut log = state.log.lock().unwrap();
    log.posts += 1;
    if log.posts <= state.post_failures {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        log.accepted.push(record);
        StatusCode::OK
    }
}

/// URL of a local port nothing listens on.
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/path-data", addr)
}

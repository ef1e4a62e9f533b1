use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode as HttpStatus;
use axum::routing::get;
use tokio::net::TcpListener;
use trupp_core::{ConfigField, ConnectionConfig, StatusCode};
use trupp_sync::{HttpStatusReporter, ReportError, StatusReporter};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Hit {
    token: String,
    params: HashMap<String, String>,
}

#[derive(Clone)]
struct Stub {
    answer: HttpStatus,
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl Stub {
    fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }
}

async fn setstatus(
    State(stub): State<Stub>,
    Path(token): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> HttpStatus {
    stub.hits.lock().unwrap().push(Hit { token, params });
    stub.answer
}

/// Dispatch server stand-in on an ephemeral port.
async fn start_stub(answer: HttpStatus) -> (SocketAddr, Stub) {
    let stub = Stub {
        answer,
        hits: Arc::default(),
    };
    let app = Router::new()
        .route("/{token}/setstatus", get(setstatus))
        .with_state(stub.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, stub)
}

fn config_for(addr: SocketAddr) -> ConnectionConfig {
    ConnectionConfig {
        protocol: Some("http".into()),
        server: Some(addr.to_string()),
        token: Some("unit-token".into()),
        issi: Some("6543210".into()),
    }
}

fn code(n: i64) -> StatusCode {
    StatusCode::new(n).unwrap()
}

#[tokio::test]
async fn reports_status_with_issi_and_code() {
    let (addr, stub) = start_stub(HttpStatus::OK).await;
    let reporter = HttpStatusReporter::new();

    reporter.report(code(3), &config_for(addr)).await.unwrap();

    let hits = stub.hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].token, "unit-token");
    assert_eq!(hits[0].params.get("issi").map(String::as_str), Some("6543210"));
    assert_eq!(hits[0].params.get("status").map(String::as_str), Some("3"));
}

#[tokio::test]
async fn any_2xx_is_success() {
    let (addr, _stub) = start_stub(HttpStatus::NO_CONTENT).await;

    HttpStatusReporter::new()
        .report(code(0), &config_for(addr))
        .await
        .unwrap();
}

#[tokio::test]
async fn non_2xx_is_rejected() {
    let (addr, stub) = start_stub(HttpStatus::INTERNAL_SERVER_ERROR).await;

    let err = HttpStatusReporter::new()
        .report(code(6), &config_for(addr))
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::ServerRejected(s) if s.as_u16() == 500));
    // one attempt, no retry
    assert_eq!(stub.hits().len(), 1);
}

#[tokio::test]
async fn incomplete_config_makes_no_request() {
    let (addr, stub) = start_stub(HttpStatus::OK).await;
    let config = ConnectionConfig {
        issi: None,
        ..config_for(addr)
    };

    let err = HttpStatusReporter::new()
        .report(code(2), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::ConfigurationMissing(ConfigField::Issi)));
    assert!(stub.hits().is_empty());
}

#[tokio::test]
async fn unreachable_server_is_network_failure() {
    // grab a free port and release it again
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let err = HttpStatusReporter::new()
        .report(code(1), &config_for(addr))
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::NetworkFailure(_)));
}

#[tokio::test]
async fn token_is_decoded_back_by_server() {
    let (addr, stub) = start_stub(HttpStatus::OK).await;
    let config = ConnectionConfig {
        token: Some("team 7/alpha".into()),
        ..config_for(addr)
    };

    HttpStatusReporter::new()
        .report(code(4), &config)
        .await
        .unwrap();

    assert_eq!(stub.hits()[0].token, "team 7/alpha");
}

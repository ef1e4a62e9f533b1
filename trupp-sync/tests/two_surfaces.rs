use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trupp_channel::{EventChannel, LocalBus, StreamChannel};
use trupp_core::{Catalog, ConnectionConfig, StatusCode, Surface};
use trupp_sync::{MemoryStore, MockReporter, StatusController, StatusStore, StatusSurface};

fn code(n: i64) -> StatusCode {
    StatusCode::new(n).unwrap()
}

async fn configured_store() -> MemoryStore {
    let store = MemoryStore::default();
    store
        .save_connection_config(&ConnectionConfig {
            protocol: Some("http".into()),
            server: Some("10.0.0.5:8080".into()),
            token: Some("abc".into()),
            issi: Some("42".into()),
        })
        .await
        .unwrap();
    store
}

async fn surface<C: EventChannel>(
    kind: Surface,
    store: MemoryStore,
    reporter: MockReporter,
    channel: C,
    cancel: &CancellationToken,
) -> (StatusSurface, JoinHandle<()>) {
    let controller = StatusController::new(kind, store, reporter, channel, StatusCode::FALLBACK).await;
    let catalog = match kind {
        Surface::Car => Catalog::driving_only(),
        Surface::Mobile => Catalog::all(),
    };
    let view = StatusSurface::new(controller.handle(), catalog);
    (view, controller.spawn(cancel.clone()))
}

#[tokio::test]
async fn surfaces_follow_each_other_in_one_process() {
    let store = configured_store().await;
    let bus = LocalBus::new();
    let cancel = CancellationToken::new();
    let mobile_reporter = MockReporter::accepting();
    let car_reporter = MockReporter::accepting();

    let (mobile, mobile_task) = surface(Surface::Mobile, store.clone(), mobile_reporter.clone(), bus.clone(), &cancel).await;
    let (car, car_task) = surface(Surface::Car, store.clone(), car_reporter.clone(), bus.clone(), &cancel).await;

    assert!(mobile.tap(code(3)).await.unwrap().outcome().await.unwrap().is_confirmed());
    car.handle()
        .wait_until(|s| s.current.code == code(3))
        .await
        .unwrap();
    assert_eq!(car.view().active_tile().map(|t| t.code), Some(code(3)));

    assert!(car.tap(code(7)).await.unwrap().outcome().await.unwrap().is_confirmed());
    mobile
        .handle()
        .wait_until(|s| s.current.code == code(7))
        .await
        .unwrap();

    // each surface reported only its own selection, nothing was echoed
    assert_eq!(mobile_reporter.calls(), vec![code(3)]);
    assert_eq!(car_reporter.calls(), vec![code(7)]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mobile.view().header.code, code(7));
    assert_eq!(car.view().header.code, code(7));

    cancel.cancel();
    mobile_task.await.unwrap();
    car_task.await.unwrap();
}

#[tokio::test]
async fn surfaces_follow_each_other_over_a_stream() {
    let cancel = CancellationToken::new();
    let (car_end, mobile_end) = tokio::io::duplex(1024);

    let car_channel = StreamChannel::new();
    let mobile_channel = StreamChannel::new();
    let car_link = car_channel.attach(car_end, cancel.clone());
    let mobile_link = mobile_channel.attach(mobile_end, cancel.clone());

    // separate processes, separate stores
    let car_store = configured_store().await;
    let mobile_store = configured_store().await;
    let car_reporter = MockReporter::accepting();

    let (mobile, mobile_task) = surface(Surface::Mobile, mobile_store, MockReporter::accepting(), mobile_channel, &cancel).await;
    let (car, car_task) = surface(Surface::Car, car_store.clone(), car_reporter.clone(), car_channel, &cancel).await;

    assert!(mobile.tap(code(4)).await.unwrap().outcome().await.unwrap().is_confirmed());
    car.handle()
        .wait_until(|s| s.current.code == code(4))
        .await
        .unwrap();

    assert!(car_reporter.calls().is_empty());
    // the receiving side refreshes its own cache
    assert_eq!(car_store.load_last_status().await.unwrap().unwrap().code, code(4));

    cancel.cancel();
    for task in [mobile_task, car_task, car_link, mobile_link] {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn failed_selection_is_not_propagated() {
    let store = configured_store().await;
    let bus = LocalBus::new();
    let cancel = CancellationToken::new();

    let (mobile, mobile_task) = surface(Surface::Mobile, store.clone(), MockReporter::rejecting(502), bus.clone(), &cancel).await;
    let (car, car_task) = surface(Surface::Car, store, MockReporter::accepting(), bus, &cancel).await;

    let outcome = mobile.tap(code(6)).await.unwrap().outcome().await.unwrap();
    assert!(!outcome.is_confirmed());
    assert_eq!(mobile.view().banner.as_deref(), Some("Failed to send status 6"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(car.view().header.code, StatusCode::FALLBACK);

    cancel.cancel();
    mobile_task.await.unwrap();
    car_task.await.unwrap();
}

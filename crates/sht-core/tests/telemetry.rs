//! Runs in its own process: the global dispatcher can be set only once.

use sht_core::telemetry::{self, TraceSession, TracingStatus};
use tracing::subscriber::NoSubscriber;

#[test]
fn foreign_global_subscriber_is_kept_without_panicking() {
    tracing::subscriber::set_global_default(NoSubscriber::default()).unwrap();

    let err = sht_config::tracing::init_tracing().unwrap_err();
    assert!(matches!(err, sht_config::tracing::InitError::Subscriber(_)));

    assert_eq!(telemetry::init_tracing(), TracingStatus::External);
    assert_eq!(telemetry::tracing_status(), Some(TracingStatus::External));

    let session = TraceSession::start();
    assert_eq!(session.status(), TracingStatus::External);
    drop(session);
}

#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

//! The process-wide manager lives in its own test binary so no other test can
//! initialize it first.

use std::ptr;

use er_waitlist_client::error::Kind;
use er_waitlist_client::ws::ConnectionManager;

// Nothing listens on the discard port, so the manager just keeps retrying.
const FIRST: &str = "ws://127.0.0.1:9/ws/admin";
const SECOND: &str = "ws://127.0.0.1:9/ws/patient/ABC";

#[tokio::test]
async fn first_endpoint_wins_for_the_process() {
    let err = ConnectionManager::shared("http://127.0.0.1:9/ws/admin").unwrap_err();
    assert_eq!(err.kind(), Kind::Validation);

    let first = ConnectionManager::shared(FIRST).unwrap();
    let second = ConnectionManager::shared(SECOND).unwrap();
    let ignored = ConnectionManager::shared("not even a url").unwrap();

    assert!(ptr::eq(first, second), "shared() must return one instance");
    assert!(ptr::eq(first, ignored), "shared() must return one instance");
    assert_eq!(second.endpoint().as_str(), FIRST);
}

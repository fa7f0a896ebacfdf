//! Shared helpers for the service integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use chrono::Utc;

use courier_gateway::{InboundMessage, SessionEvent};
use courier_types::{CorrespondentId, CourierConfig};

pub const ALICE: &str = "255712345678@s.whatsapp.net";
pub const BOB: &str = "255787654321@s.whatsapp.net";

pub fn id(raw: &str) -> CorrespondentId {
    CorrespondentId::normalize(raw)
}

/// Config rooted at a temp auth dir, with the stock intervals.
pub fn test_config(auth_dir: &Path) -> CourierConfig {
    CourierConfig::default_for(auth_dir)
}

/// An inbound text message event.
pub fn message(sender: &str, text: &str, push_name: Option<&str>) -> SessionEvent {
    SessionEvent::Message(InboundMessage {
        sender: id(sender),
        text: text.to_string(),
        push_name: push_name.map(str::to_string),
        timestamp: Utc::now(),
    })
}

/// Poll until `condition` holds, failing after `deadline_secs` (tokio time,
/// so paused-clock tests burn virtual seconds only).
pub async fn eventually<F: FnMut() -> bool>(deadline_secs: u64, mut condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(deadline_secs);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within {deadline_secs}s");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// The published status token, if any.
pub fn read_status(auth_dir: &Path) -> Option<String> {
    std::fs::read_to_string(auth_dir.join("status.txt")).ok()
}

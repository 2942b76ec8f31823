//! Record/replay of provider exchanges
//!
//! Captures are keyed by a hash of the canonical request and replayed
//! through the same decoder path as live traffic.

pub mod canonical;
pub mod error;
pub mod exchange;
pub mod store;
pub mod tap;

pub use canonical::{request_hash, CanonicalMessage, CanonicalOptions, CanonicalRequest};
pub use error::{RecorderError, RecorderResult};
pub use exchange::{RecordedExchange, ResponseData};
pub use store::{sanitize_component, LoadedExchange, MatchKind, RecordedCapture, ReplayStore};
pub use tap::CaptureTap;

use serde::{Deserialize, Serialize};

/// How a pipeline uses its replay store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderMode {
    /// Always go live, never write captures
    #[default]
    Disabled,
    /// Go live and capture every successful exchange
    Record,
    /// Serve from captures only; a miss is an error
    Replay,
    /// Serve from captures, go live and capture on a miss
    ReplayOrRecord,
}

impl RecorderMode {
    pub fn replays(&self) -> bool {
        matches!(self, RecorderMode::Replay | RecorderMode::ReplayOrRecord)
    }

    pub fn records(&self) -> bool {
        matches!(self, RecorderMode::Record | RecorderMode::ReplayOrRecord)
    }
}

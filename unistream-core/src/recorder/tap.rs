//! Capture of a live provider stream

use super::exchange::ResponseData;
use crate::decode::ProviderEventStream;
use futures::StreamExt;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Records every native event that passes through a wrapped stream
#[derive(Debug, Clone, Default)]
pub struct CaptureTap {
    events: Arc<Mutex<Vec<Value>>>,
}

impl CaptureTap {
    /// Wrap a stream; the returned tap sees each successful event as it is
    /// pulled by the decoder
    pub fn wrap(stream: ProviderEventStream) -> (ProviderEventStream, CaptureTap) {
        let tap = CaptureTap::default();
        let events = Arc::clone(&tap.events);
        let tapped = stream
            .inspect(move |item| {
                if let Ok(event) = item {
                    events
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push(event.clone());
                }
            })
            .boxed();
        (tapped, tap)
    }

    /// Events captured so far
    pub fn captured(&self) -> Vec<Value> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_response_data(self) -> ResponseData {
        ResponseData::Stream(self.captured())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::TransportError;
    use serde_json::json;

    #[tokio::test]
    async fn test_tap_records_only_successful_events() {
        let source = futures::stream::iter(vec![
            Ok(json!({"n": 1})),
            Err(TransportError::Network("reset".into())),
            Ok(json!({"n": 2})),
        ])
        .boxed();
        let (stream, tap) = CaptureTap::wrap(source);
        let pulled: Vec<_> = stream.collect().await;

        assert_eq!(pulled.len(), 3);
        assert_eq!(tap.captured(), vec![json!({"n": 1}), json!({"n": 2})]);
        assert_eq!(tap.into_response_data().chunk_count(), 2);
    }
}

//! Stream event decoding
//!
//! Consumes a provider-native event stream through a [`StreamAdapter`],
//! drives the shared block state machine and delivers unified
//! [`StreamEvent`](crate::protocol::StreamEvent)s to an [`EventSink`].

pub mod error;
pub mod input;
pub mod machine;
pub mod sink;

pub use error::{DecodeResult, DecodeSkew, StreamError, TransportError};
pub use input::{
    BlockDelta, BlockKind, DecoderInput, DecoderPolicy, Fragment, FragmentMode, IdentityTiming,
    ProvenanceScope, SlotKey, StopArguments, ToolCompletion,
};
pub use machine::{BlockState, StreamDecoder};
pub use sink::EventSink;

use crate::protocol::UnifiedResponse;
use crate::providers::{StreamAdapter, TranslateError};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;

/// Provider-native events as parsed from the transport
pub type ProviderEventStream = BoxStream<'static, Result<Value, TransportError>>;

/// Decode a provider stream using the adapter's own policy
pub async fn decode(
    adapter: &mut dyn StreamAdapter,
    events: ProviderEventStream,
    sink: &EventSink,
    model: &str,
) -> DecodeResult<UnifiedResponse> {
    let policy = adapter.policy();
    decode_with_policy(adapter, events, sink, model, policy).await
}

/// Decode a provider stream to exhaustion.
///
/// Cancellation is checked before every event and during every send. A
/// transport error or an in-band provider error ends the decode; malformed
/// events are skipped and counted.
pub async fn decode_with_policy(
    adapter: &mut dyn StreamAdapter,
    mut events: ProviderEventStream,
    sink: &EventSink,
    model: &str,
    policy: DecoderPolicy,
) -> DecodeResult<UnifiedResponse> {
    let cancel = sink.cancellation().clone();
    let mut decoder = StreamDecoder::new(adapter.provider(), policy, model);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            next = events.next() => next,
        };
        let Some(item) = next else {
            break;
        };
        let event = item?;

        match adapter.translate(event) {
            Ok(inputs) => {
                for input in inputs {
                    for output in decoder.apply(input) {
                        sink.send(output).await?;
                    }
                }
            }
            Err(TranslateError::Skew(skew)) => decoder.record_skew(&skew),
            Err(TranslateError::Provider(err)) => return Err(StreamError::Transport(err)),
        }
    }

    for output in decoder.finish() {
        sink.send(output).await?;
    }

    let response = decoder.into_response();
    debug!(
        provider = %response.provider,
        model = %response.model,
        text_len = response.text.len(),
        tool_calls = response.tool_calls.len(),
        skipped = response.diagnostics.skipped_events,
        "decode complete"
    );
    Ok(response)
}

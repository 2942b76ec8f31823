//! Tool call assembly across arbitrary fragment boundaries

use proptest::prelude::*;
use serde_json::{json, Value};
use unistream_core::assembler::{merge_json, ToolCallAssembler};
use unistream_core::decode::{
    DecoderPolicy, FragmentMode, Fragment, IdentityTiming, ProvenanceScope, SlotKey,
    StopArguments, ToolCompletion,
};
use unistream_core::protocol::ProviderKind;

fn arguments_document() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i32>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-zA-Z0-9 ,.:{}\"\\\\é]{0,12}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
    .prop_map(|value| json!({"payload": value}))
}

/// Split `text` at the given char positions
fn split_at_chars(text: &str, mut cuts: Vec<usize>) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    cuts.iter_mut().for_each(|cut| *cut %= chars.len() + 1);
    cuts.sort_unstable();
    cuts.dedup();

    let mut pieces = Vec::new();
    let mut last = 0;
    for cut in cuts.into_iter().chain(std::iter::once(chars.len())) {
        pieces.push(chars[last..cut].iter().collect());
        last = cut;
    }
    pieces
}

proptest! {
    #[test]
    fn fragment_boundaries_never_change_the_result(
        document in arguments_document(),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let raw = serde_json::to_string_pretty(&document).unwrap();
        let key = SlotKey::Index(0);
        let mut assembler = ToolCallAssembler::new(ProviderKind::Anthropic, DecoderPolicy::incremental_json());
        assembler
            .start(key.clone(), Some("toolu_1".into()), Some("lookup".into()), None)
            .unwrap();
        for piece in split_at_chars(&raw, cuts) {
            assembler.on_fragment(key.clone(), Fragment::Raw(piece)).unwrap();
        }

        let assembled = assembler.on_complete(&key, None).unwrap();
        prop_assert!(assembled.newly_completed);
        prop_assert_eq!(assembled.call.arguments, document.to_string());
        prop_assert_eq!(assembler.repaired_count(), 0);
    }

    #[test]
    fn completing_twice_returns_the_first_result(
        document in arguments_document(),
    ) {
        let key = SlotKey::Id("fc_1".into());
        let mut assembler = ToolCallAssembler::new(ProviderKind::OpenAiResponses, DecoderPolicy::incremental_json());
        assembler.start(key.clone(), Some("call_1".into()), Some("lookup".into()), None).unwrap();
        assembler.on_fragment(key.clone(), Fragment::Raw(document.to_string())).unwrap();

        let first = assembler.on_complete(&key, None).unwrap();
        let second = assembler
            .on_complete(&key, Some(ToolCompletion { arguments: Some("{}".into()), ..Default::default() }))
            .unwrap();
        prop_assert!(!second.newly_completed);
        prop_assert_eq!(first.call, second.call);
    }
}

fn whole_call_policy() -> DecoderPolicy {
    DecoderPolicy {
        identity: IdentityTiming::AtBlockStop,
        fragments: FragmentMode::StructuralMerge,
        stop_arguments: StopArguments::SignalOnly,
        provenance: ProvenanceScope::SharedAcrossTurn,
    }
}

#[test]
fn test_structural_fragments_merge_recursively() {
    let key = SlotKey::Index(0);
    let mut assembler = ToolCallAssembler::new(ProviderKind::Gemini, whole_call_policy());
    assembler
        .on_fragment(key.clone(), Fragment::Object(json!({"location": {"city": "Paris"}, "units": "c"})))
        .unwrap();
    assembler
        .on_fragment(key.clone(), Fragment::Object(json!({"location": {"country": "FR"}, "units": "f"})))
        .unwrap();

    let assembled = assembler
        .on_complete(
            &key,
            Some(ToolCompletion {
                name: Some("get_weather".into()),
                ..Default::default()
            }),
        )
        .unwrap();

    assert_eq!(assembled.call.id, "call_0");
    assert_eq!(
        assembled.call.arguments_value().unwrap(),
        json!({"location": {"city": "Paris", "country": "FR"}, "units": "f"})
    );
}

#[test]
fn test_interleaved_slots_complete_in_creation_order() {
    let mut assembler = ToolCallAssembler::new(ProviderKind::OpenAi, DecoderPolicy::incremental_json());
    for index in [1u32, 0] {
        assembler
            .start(SlotKey::Index(index), Some(format!("call_{}", index)), Some("f".into()), None)
            .unwrap();
    }
    assembler.on_fragment(SlotKey::Index(0), Fragment::Raw("{\"a\":".into())).unwrap();
    assembler.on_fragment(SlotKey::Index(1), Fragment::Raw("{\"b\":2}".into())).unwrap();
    assembler.on_fragment(SlotKey::Index(0), Fragment::Raw("1}".into())).unwrap();
    assert_eq!(assembler.pending_count(), 2);

    let drained = assembler.drain_pending();
    let ids: Vec<_> = drained.iter().map(|call| call.id.as_str()).collect();
    assert_eq!(ids, vec!["call_1", "call_0"]);
    assert_eq!(drained[1].arguments, r#"{"a":1}"#);
    assert_eq!(assembler.pending_count(), 0);
}

#[test]
fn test_fragment_after_completion_is_skew() {
    let key = SlotKey::Index(3);
    let mut assembler = ToolCallAssembler::new(ProviderKind::Bedrock, DecoderPolicy::incremental_json());
    assembler.start(key.clone(), Some("t".into()), Some("f".into()), None).unwrap();
    assembler.on_complete(&key, None).unwrap();

    assert!(assembler.on_fragment(key.clone(), Fragment::Raw("{}".into())).is_err());
    assert!(assembler.start(key, None, None, None).is_err());
}

#[test]
fn test_merge_json_replaces_non_objects() {
    let mut target = json!({"list": [1, 2], "n": 1});
    merge_json(&mut target, json!({"list": [3], "n": {"nested": true}}));
    assert_eq!(target, json!({"list": [3], "n": {"nested": true}}));
}

#[test]
fn test_pending_call_exposes_partial_arguments() {
    let key = SlotKey::Index(0);
    let mut assembler = ToolCallAssembler::new(ProviderKind::OpenAi, DecoderPolicy::incremental_json());
    assembler.start(key.clone(), Some("call_a".into()), Some("get_weather".into()), None).unwrap();
    assembler.on_fragment(key.clone(), Fragment::Raw("{\"loc".into())).unwrap();

    let pending = assembler.pending(&key).unwrap();
    assert_eq!(pending.id.as_deref(), Some("call_a"));
    assert_eq!(pending.arguments_buffer(), "{\"loc");

    assembler.on_fragment(key.clone(), Fragment::Raw("ation\":\"NYC\"}".into())).unwrap();
    assert_eq!(assembler.pending(&key).unwrap().arguments_buffer(), r#"{"location":"NYC"}"#);

    let assembled = assembler.on_complete(&key, None).unwrap();
    assert_eq!(assembled.call.arguments, r#"{"location":"NYC"}"#);
    assert!(assembler.pending(&key).is_none());
}

#[test]
fn test_structured_pending_buffer_renders_merged_object() {
    let key = SlotKey::Index(0);
    let mut assembler = ToolCallAssembler::new(ProviderKind::Gemini, whole_call_policy());
    assembler.on_fragment(key.clone(), Fragment::Object(json!({"city": "Paris"}))).unwrap();

    assert_eq!(assembler.pending(&key).unwrap().arguments_buffer(), r#"{"city":"Paris"}"#);
}

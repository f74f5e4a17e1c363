//! Integration test: span codec round trips over generated records.
//!
//! Validates that:
//! - Every combination of optional call-event fields survives encode/decode
//! - Chosen strategies are legal and reproduce the original integers
//! - Varint and prefix boundaries behave as documented
//! - Null and empty strings stay distinct
//! - A span split into a head and a chunk reassembles exactly

use proptest::prelude::*;
use trace_store::span::{Annotation, AnnotationValue, EncodingStrategy, ExceptionInfo};
use trace_store::{
    ByteCursor, CallEvent, PrefixWidth, SpanChunk, SpanCodec, SpanRecord, TraceError,
    TransactionId,
};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn short_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9:/._ -]{0,24}"
}

fn annotation_value() -> impl Strategy<Value = AnnotationValue> {
    prop_oneof![
        Just(AnnotationValue::Null),
        short_text().prop_map(AnnotationValue::String),
        any::<bool>().prop_map(AnnotationValue::Bool),
        any::<i32>().prop_map(AnnotationValue::Int),
        any::<i64>().prop_map(AnnotationValue::Long),
        (-1.0e12f64..1.0e12).prop_map(AnnotationValue::Double),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(AnnotationValue::Bytes),
        (any::<i32>(), prop::option::of(short_text())).prop_map(|(int_value, string_value)| {
            AnnotationValue::IntString {
                int_value,
                string_value,
            }
        }),
        (prop::option::of(short_text()), prop::option::of(short_text()))
            .prop_map(|(first, second)| AnnotationValue::StringString { first, second }),
    ]
}

fn annotation() -> impl Strategy<Value = Annotation> {
    (any::<i32>(), annotation_value()).prop_map(|(key, value)| Annotation { key, value })
}

/// Small ranges make equal/increment/delta strategies likely between events.
fn small_or_any_i32() -> impl Strategy<Value = i32> {
    prop_oneof![0i32..4, -1i32..=1, any::<i32>()]
}

fn call_event() -> impl Strategy<Value = CallEvent> {
    let numbers = (
        0u16..8,
        small_or_any_i32(),
        any::<i32>(),
        small_or_any_i32(),
        any::<i32>(),
        small_or_any_i32(),
    );
    let optionals = (
        prop::option::of(short_text()),
        prop::option::of(short_text()),
        prop::collection::vec(annotation(), 0..3),
        prop::option::of(any::<i64>()),
        prop::option::of(any::<i32>()),
        prop::option::of((any::<i32>(), prop::option::of(short_text()))),
    );
    (numbers, optionals).prop_map(
        |(
            (sequence, start_elapsed, end_elapsed, service_type, api_id, depth),
            (destination_id, end_point, annotations, next_span_id, next_async_id, exception),
        )| CallEvent {
            sequence,
            start_elapsed,
            end_elapsed,
            service_type,
            destination_id,
            end_point,
            api_id,
            annotations,
            depth,
            next_span_id,
            next_async_id,
            exception_info: exception.map(|(id, message)| ExceptionInfo { id, message }),
        },
    )
}

fn span_record() -> impl Strategy<Value = SpanRecord> {
    (
        "[a-z0-9-]{1,24}",
        "[a-z0-9-]{1,24}",
        any::<i64>(),
        any::<i64>(),
        any::<i64>(),
        any::<i64>(),
        any::<i32>(),
        any::<i64>(),
        prop::collection::vec(call_event(), 0..8),
    )
        .prop_map(
            |(agent_id, application_name, tx_seq, span_id, parent, start, elapsed, accept, events)| {
                SpanRecord {
                    transaction_id: TransactionId::new(agent_id.clone(), start, tx_seq),
                    agent_id,
                    application_name,
                    span_id,
                    parent_span_id: parent,
                    start_time: start,
                    elapsed,
                    collector_accept_time: accept,
                    events,
                }
            },
        )
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_span_roundtrip(span in span_record()) {
        let bytes = SpanCodec::encode(&span).unwrap();
        let decoded = SpanCodec::decode_detailed(&bytes).unwrap();
        prop_assert_eq!(&decoded.record, &span);
        prop_assert_eq!(decoded.bit_fields.len(), span.events.len());

        if let Some(first) = decoded.bit_fields.first() {
            prop_assert_eq!(first.sequence_strategy(), EncodingStrategy::Raw);
            prop_assert_eq!(first.depth_strategy(), EncodingStrategy::Raw);
        }
        for (i, bits) in decoded.bit_fields.iter().enumerate().skip(1) {
            let (prev, cur) = (&span.events[i - 1], &span.events[i]);
            if bits.sequence_strategy() == EncodingStrategy::IncrementFromPrevious {
                prop_assert_eq!(cur.sequence, prev.sequence + 1);
            }
            if bits.start_elapsed_strategy() == EncodingStrategy::EqualsPrevious {
                prop_assert_eq!(cur.start_elapsed, prev.start_elapsed);
            }
        }
    }

    #[test]
    fn prop_truncated_span_never_decodes(span in span_record(), cut in any::<prop::sample::Index>()) {
        let bytes = SpanCodec::encode(&span).unwrap();
        let len = cut.index(bytes.len());
        let err = SpanCodec::decode(&bytes[..len]).unwrap_err();
        prop_assert!(matches!(err, TraceError::CorruptRecord(_)), "{:?}", err);
    }

    #[test]
    fn prop_chunked_span_reassembles(
        span in span_record(),
        split in any::<prop::sample::Index>(),
        key_offset in 0i64..1_000_000,
    ) {
        let at = split.index(span.events.len() + 1);
        let mut head = span.clone();
        let late = head.events.split_off(at);
        let key_time = span.start_time.wrapping_add(key_offset);
        let chunk = SpanChunk::for_span(&head, key_time, key_time.wrapping_add(5), late);

        let bytes = SpanCodec::encode_chunk(&chunk, head.events.last()).unwrap();
        let decoded = SpanCodec::decode_chunk(&bytes, head.events.last()).unwrap();
        prop_assert_eq!(&decoded, &chunk);

        let mut stored = SpanCodec::decode(&SpanCodec::encode(&head).unwrap()).unwrap();
        stored.append_chunk(decoded).unwrap();
        prop_assert_eq!(stored, span);
    }

    #[test]
    fn prop_svar_roundtrip(value in any::<i64>()) {
        let mut cursor = ByteCursor::growable();
        cursor.put_svar_long(value).unwrap();
        let bytes = cursor.into_vec();
        let mut reader = ByteCursor::wrap(&bytes);
        prop_assert_eq!(reader.get_svar_long().unwrap(), value);
        prop_assert!(!reader.has_remaining());
    }
}

// ---------------------------------------------------------------------------
// Fixed cases
// ---------------------------------------------------------------------------

#[test]
fn test_varint_byte_lengths() {
    let cases: [(u32, usize); 6] = [
        (0, 1),
        (127, 1),
        (128, 2),
        (16_383, 2),
        (16_384, 3),
        (i32::MAX as u32, 5),
    ];
    for (value, len) in cases {
        let mut cursor = ByteCursor::growable();
        cursor.put_var_int(value).unwrap();
        let bytes = cursor.into_vec();
        assert_eq!(bytes.len(), len, "value {}", value);
        assert_eq!(ByteCursor::wrap(&bytes).get_var_int().unwrap(), value);
    }

    for value in [-1i32, -64, -65, i32::MIN] {
        let mut cursor = ByteCursor::growable();
        cursor.put_svar_int(value).unwrap();
        let bytes = cursor.into_vec();
        assert_eq!(ByteCursor::wrap(&bytes).get_svar_int().unwrap(), value);
    }
}

#[test]
fn test_prefix_capacity_overflow() {
    let mut cursor = ByteCursor::growable();
    let err = cursor
        .put_prefixed_bytes(Some(&[0u8; 128]), PrefixWidth::One)
        .unwrap_err();
    assert!(matches!(err, TraceError::EncodingTooLarge { len: 128, max: 127 }));
    assert!(cursor.as_bytes().is_empty());

    let err = cursor.put_padded(b"abcde", 4).unwrap_err();
    assert!(matches!(err, TraceError::EncodingTooLarge { len: 5, max: 4 }));

    let mut fixed = ByteCursor::fixed(4);
    let err = fixed
        .put_prefixed_bytes(Some(b"abcd"), PrefixWidth::Two)
        .unwrap_err();
    assert!(matches!(err, TraceError::BufferOverflow { .. }));
}

#[test]
fn test_null_and_empty_strings_stay_distinct() {
    let null_message = CallEvent {
        exception_info: Some(ExceptionInfo::new(1, None)),
        ..CallEvent::default()
    };
    let empty_message = CallEvent {
        sequence: 1,
        exception_info: Some(ExceptionInfo::new(1, Some(String::new()))),
        destination_id: Some(String::new()),
        ..CallEvent::default()
    };
    let span = SpanRecord {
        transaction_id: TransactionId::new("a", 0, 0),
        agent_id: "a".into(),
        application_name: "".into(),
        span_id: 0,
        parent_span_id: -1,
        start_time: 0,
        elapsed: 0,
        collector_accept_time: 0,
        events: vec![null_message, empty_message],
    };
    let decoded = SpanCodec::decode(&SpanCodec::encode(&span).unwrap()).unwrap();
    assert_eq!(decoded.events[0].exception_info.as_ref().unwrap().message, None);
    assert_eq!(
        decoded.events[1].exception_info.as_ref().unwrap().message.as_deref(),
        Some("")
    );
    assert_eq!(decoded.events[0].destination_id, None);
    assert_eq!(decoded.events[1].destination_id.as_deref(), Some(""));
    assert_eq!(decoded.application_name, "");
}

#[test]
fn test_three_event_scenario_reports_strategies() {
    let first = CallEvent::builder()
        .sequence(10)
        .start_elapsed(250)
        .end_elapsed(40)
        .service_type(1010)
        .depth(1)
        .build();
    let second = CallEvent::builder()
        .sequence(11)
        .start_elapsed(250)
        .end_elapsed(12)
        .service_type(2100)
        .depth(2)
        .build();
    let third = CallEvent::builder()
        .sequence(12)
        .start_elapsed(251)
        .end_elapsed(3)
        .service_type(2100)
        .depth(2)
        .build();
    let span = SpanRecord {
        transaction_id: TransactionId::new("agent", 1, 2),
        agent_id: "agent".into(),
        application_name: "app".into(),
        span_id: 3,
        parent_span_id: -1,
        start_time: 1_000,
        elapsed: 300,
        collector_accept_time: 1_400,
        events: vec![first, second, third],
    };
    let decoded = SpanCodec::decode_detailed(&SpanCodec::encode(&span).unwrap()).unwrap();
    let bits = decoded.bit_fields[1];
    assert_eq!(bits.sequence_strategy(), EncodingStrategy::IncrementFromPrevious);
    assert_eq!(bits.start_elapsed_strategy(), EncodingStrategy::EqualsPrevious);
    assert_eq!(decoded.record.events[1].sequence, 11);
    assert_eq!(decoded.record.events[1].start_elapsed, 250);
    assert_eq!(decoded.record, span);
}

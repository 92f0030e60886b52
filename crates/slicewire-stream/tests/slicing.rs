mod common;

use std::rc::Rc;
use std::sync::{Arc, Mutex};

use common::*;
use slicewire_stream::{
    AnySlot, BaseObject, ObjectPtr, SliceKind, Stream, StreamConfig, StreamContext, StreamError,
};

fn derived_bytes() -> Vec<u8> {
    let v = Rc::new(Derived::default());
    v.a.set(1);
    v.b.set(2);
    v.c.set(3);
    let root: ObjectPtr = v;
    encode_graph(&Arc::new(StreamContext::new()), Some(&root))
}

fn base_only_context(config: StreamConfig) -> StreamContext {
    let ctx = StreamContext::with_config(config);
    ctx.registry()
        .register_object_type(BASE_ID, || Rc::new(Base::default()) as ObjectPtr);
    ctx
}

#[test]
fn unknown_derived_slices_are_skipped() {
    let ctx = Arc::new(base_only_context(StreamConfig::default()));
    let bytes = derived_bytes();

    let mut is = Stream::from_bytes(Arc::clone(&ctx), &bytes).unwrap();
    let root = AnySlot::new();
    is.start_read_encaps().unwrap();
    is.read_object(root.patcher()).unwrap();
    is.read_pending_objects().unwrap();
    is.check_read_encaps().unwrap();
    is.end_read_encaps().unwrap();
    assert_eq!(is.pos(), bytes.len());

    let root = root.get().unwrap();
    let base = root.downcast_ref::<Base>().unwrap();
    assert_eq!(base.a.get(), 1);
}

#[test]
fn known_derived_type_reads_every_slice() {
    let ctx = Arc::new(base_only_context(StreamConfig::default()));
    ctx.registry()
        .register_object_type(DERIVED_ID, || Rc::new(Derived::default()) as ObjectPtr);

    let root = decode_graph(&ctx, &derived_bytes()).unwrap().unwrap();
    let derived = root.downcast_ref::<Derived>().unwrap();
    assert_eq!(
        (derived.a.get(), derived.b.get(), derived.c.get()),
        (1, 2, 3)
    );
    assert!(root.is_a(BASE_ID));
}

#[test]
fn slicing_disabled_fails_on_first_unknown_type() {
    let ctx = Arc::new(base_only_context(StreamConfig::default()));
    let bytes = derived_bytes();

    let mut is = Stream::from_bytes(Arc::clone(&ctx), &bytes).unwrap();
    is.slice_objects(false);
    is.start_read_encaps().unwrap();
    is.read_object(AnySlot::new().patcher()).unwrap();
    let err = is.read_pending_objects().unwrap_err();
    assert!(matches!(
        err,
        StreamError::NoObjectFactory { type_id } if type_id == DERIVED_ID
    ));
}

#[test]
fn slicing_disabled_by_config() {
    let ctx = Arc::new(base_only_context(StreamConfig {
        slice_objects: false,
        ..StreamConfig::default()
    }));
    assert!(matches!(
        decode_graph(&ctx, &derived_bytes()),
        Err(StreamError::NoObjectFactory { .. })
    ));
}

#[test]
fn fully_unknown_instance_becomes_base_object() {
    let ctx = Arc::new(StreamContext::new());
    let root = decode_graph(&ctx, &derived_bytes()).unwrap().unwrap();
    assert!(root.downcast_ref::<BaseObject>().is_some());
}

#[test]
fn observer_sees_each_skipped_slice() {
    let skipped = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&skipped);
    let ctx = base_only_context(StreamConfig {
        trace_slicing: true,
        slicing_category: "Wire".to_string(),
        ..StreamConfig::default()
    })
    .with_slicing_observer(Arc::new(
        move |kind: SliceKind, type_id: &str, category: &str| {
            sink.lock()
                .unwrap()
                .push(format!("{kind} {type_id} {category}"));
        },
    ));

    decode_graph(&Arc::new(ctx), &derived_bytes()).unwrap();
    assert_eq!(
        *skipped.lock().unwrap(),
        vec![
            format!("class {DERIVED_ID} Wire"),
            format!("class {MIDDLE_ID} Wire"),
        ]
    );
}

#[test]
fn newer_sender_trailing_fields_are_ignored() {
    // A Base slice with an extra trailing field the receiver does not know.
    let mut os = Stream::new(Arc::new(StreamContext::new()));
    os.start_write_encaps().unwrap();
    os.write_int(-1).unwrap();
    os.write_size(1).unwrap();
    os.write_int(1).unwrap();
    os.write_type_id(BASE_ID).unwrap();
    os.start_write_slice().unwrap();
    os.write_int(10).unwrap();
    os.write_string("added later").unwrap();
    os.end_write_slice().unwrap();
    slicewire_stream::write_base_slice(&mut os).unwrap();
    os.write_size(0).unwrap();
    os.end_write_encaps().unwrap();

    let ctx = Arc::new(base_only_context(StreamConfig::default()));
    let root = decode_graph(&ctx, os.as_bytes()).unwrap().unwrap();
    assert_eq!(root.downcast_ref::<Base>().unwrap().a.get(), 10);
}

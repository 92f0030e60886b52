mod common;

use std::sync::Arc;

use common::*;
use slicewire_stream::{Stream, StreamContext, StreamError, UserException};

fn encode(ex: &dyn UserException) -> Vec<u8> {
    let mut os = Stream::new(Arc::new(StreamContext::new()));
    os.start_write_encaps().unwrap();
    os.write_user_exception(ex).unwrap();
    os.end_write_encaps().unwrap();
    os.as_bytes().to_vec()
}

fn decode(ctx: StreamContext, bytes: &[u8]) -> (StreamError, Stream) {
    let mut is = Stream::from_bytes(Arc::new(ctx), bytes).unwrap();
    is.start_read_encaps().unwrap();
    let err = is.throw_exception().unwrap_err();
    (err, is)
}

fn derived_error() -> DerivedError {
    DerivedError {
        base: BaseError { code: 404 },
        detail: "no such row".to_string(),
    }
}

#[test]
fn most_derived_known_exception_is_raised() {
    let ctx = StreamContext::new();
    ctx.registry().register_exception_type(DERIVED_ERROR_ID, || {
        Box::new(DerivedError::default()) as Box<dyn UserException>
    });
    ctx.registry().register_exception_type(BASE_ERROR_ID, || {
        Box::new(BaseError::default()) as Box<dyn UserException>
    });

    let (err, is) = decode(ctx, &encode(&derived_error()));
    let StreamError::User(ex) = err else {
        panic!("expected a user exception");
    };
    let ex = ex.downcast_ref::<DerivedError>().unwrap();
    assert_eq!(ex.base.code, 404);
    assert_eq!(ex.detail, "no such row");
    is.check_read_encaps().unwrap();
}

#[test]
fn unknown_derived_exception_is_sliced_to_base() {
    let ctx = StreamContext::new();
    ctx.registry()
        .register_exception_factory(
            BASE_ERROR_ID,
            Arc::new(|| Box::new(BaseError::default()) as Box<dyn UserException>),
        )
        .unwrap();

    let (err, is) = decode(ctx, &encode(&derived_error()));
    let StreamError::User(ex) = err else {
        panic!("expected a user exception");
    };
    assert_eq!(ex.exception_id(), BASE_ERROR_ID);
    assert_eq!(ex.downcast_ref::<BaseError>().unwrap().code, 404);
    assert_eq!(ex.to_string(), "base error 404");
    is.check_read_encaps().unwrap();
}

/// Knows the derived exception but only reads its own slice.
#[derive(Debug, Default)]
struct ShallowError {
    detail: String,
}

impl std::fmt::Display for ShallowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.detail)
    }
}

impl UserException for ShallowError {
    fn exception_id(&self) -> &str {
        DERIVED_ERROR_ID
    }

    fn write(&self, _os: &mut Stream) -> slicewire_stream::Result<()> {
        unreachable!("only read in these tests")
    }

    fn read(&mut self, is: &mut Stream, _read_id: bool) -> slicewire_stream::Result<()> {
        is.start_read_slice()?;
        self.detail = is.read_string()?;
        is.end_read_slice()
    }
}

#[test]
fn unread_base_slices_are_skipped() {
    let ctx = StreamContext::new();
    ctx.registry()
        .register_exception_type(DERIVED_ERROR_ID, || {
            Box::new(ShallowError::default()) as Box<dyn UserException>
        });

    let bytes = encode(&derived_error());
    let (err, is) = decode(ctx, &bytes);
    let StreamError::User(ex) = err else {
        panic!("expected a user exception");
    };
    assert_eq!(ex.to_string(), "no such row");
    assert_eq!(is.pos(), bytes.len());
}

#[test]
fn unknown_exception_chain() {
    let (err, is) = decode(StreamContext::new(), &encode(&derived_error()));
    assert!(matches!(err, StreamError::UnknownUserException(_)));
    is.check_read_encaps().unwrap();
}

#[test]
fn exception_with_class_members() {
    let node = Node::new("culprit");
    node.next.set(Some(Node::new("accomplice")));
    let ex = NodeError::default();
    ex.node.set(Some(node));

    let ctx = StreamContext::new();
    ctx.registry().register_exception_type(NODE_ERROR_ID, || {
        Box::new(NodeError::default()) as Box<dyn UserException>
    });
    ctx.registry()
        .register_object_type(NODE_ID, || Node::new("") as slicewire_stream::ObjectPtr);

    let (err, is) = decode(ctx, &encode(&ex));
    let StreamError::User(decoded) = err else {
        panic!("expected a user exception");
    };
    let decoded = decoded.downcast_ref::<NodeError>().unwrap();
    let culprit = decoded.node.get().unwrap();
    assert_eq!(culprit.name(), "culprit");
    assert_eq!(culprit.next.get().unwrap().name(), "accomplice");
    is.check_read_encaps().unwrap();
}

#[test]
fn error_message_names_exception() {
    let ctx = StreamContext::new();
    ctx.registry().register_exception_type(BASE_ERROR_ID, || {
        Box::new(BaseError::default()) as Box<dyn UserException>
    });
    let (err, _) = decode(ctx, &encode(&BaseError { code: 1 }));
    assert_eq!(err.to_string(), format!("user exception {BASE_ERROR_ID}"));
}

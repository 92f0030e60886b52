#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use slicewire_stream::{
    read_base_slice, write_base_slice, AnySlot, Object, ObjectPtr, ObjectSlot, Result, Stream,
    StreamContext, UserException,
};

pub const NODE_ID: &str = "::Test::Node";
pub const LEAF_ID: &str = "::Test::Leaf";
pub const BASE_ID: &str = "::Test::Base";
pub const MIDDLE_ID: &str = "::Test::Middle";
pub const DERIVED_ID: &str = "::Test::Derived";
pub const BASE_ERROR_ID: &str = "::Test::BaseError";
pub const DERIVED_ERROR_ID: &str = "::Test::DerivedError";
pub const NODE_ERROR_ID: &str = "::Test::NodeError";

thread_local! {
    /// Names of nodes whose post_unmarshal hook ran, in call order.
    pub static POST_UNMARSHALED: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

pub fn take_post_unmarshaled() -> Vec<String> {
    POST_UNMARSHALED.with(|log| std::mem::take(&mut *log.borrow_mut()))
}

/// A named list node. A node named "fail" fails its post_unmarshal hook.
#[derive(Debug, Default)]
pub struct Node {
    pub name: RefCell<String>,
    pub next: ObjectSlot<Node>,
}

impl Node {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: RefCell::new(name.to_string()),
            next: ObjectSlot::new(),
        })
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }
}

impl Object for Node {
    fn object_id(&self) -> &str {
        NODE_ID
    }

    fn write(&self, os: &mut Stream) -> Result<()> {
        os.write_type_id(NODE_ID)?;
        os.start_write_slice()?;
        os.write_string(&self.name.borrow())?;
        os.write_object(self.next.get_object().as_ref())?;
        os.end_write_slice()?;
        write_base_slice(os)
    }

    fn read(&self, is: &mut Stream, read_id: bool) -> Result<()> {
        if read_id {
            is.read_type_id()?;
        }
        is.start_read_slice()?;
        let name = is.read_string()?;
        *self.name.borrow_mut() = name;
        is.read_object(self.next.patcher(NODE_ID))?;
        is.end_read_slice()?;
        read_base_slice(is, true)
    }

    fn post_unmarshal(&self) -> std::result::Result<(), slicewire_stream::HookError> {
        let name = self.name();
        POST_UNMARSHALED.with(|log| log.borrow_mut().push(name.clone()));
        if name == "fail" {
            return Err("post_unmarshal refused".into());
        }
        Ok(())
    }
}

/// Claims to be a node on the wire but links to an arbitrary instance.
#[derive(Debug, Default)]
pub struct Impostor {
    pub next: AnySlot,
}

impl Object for Impostor {
    fn object_id(&self) -> &str {
        NODE_ID
    }

    fn write(&self, os: &mut Stream) -> Result<()> {
        os.write_type_id(NODE_ID)?;
        os.start_write_slice()?;
        os.write_string("impostor")?;
        os.write_object(self.next.get().as_ref())?;
        os.end_write_slice()?;
        write_base_slice(os)
    }

    fn read(&self, _is: &mut Stream, _read_id: bool) -> Result<()> {
        unreachable!("impostors are only written")
    }
}

#[derive(Debug, Default)]
pub struct Leaf;

impl Object for Leaf {
    fn object_id(&self) -> &str {
        LEAF_ID
    }

    fn write(&self, os: &mut Stream) -> Result<()> {
        os.write_type_id(LEAF_ID)?;
        os.start_write_slice()?;
        os.end_write_slice()?;
        write_base_slice(os)
    }

    fn read(&self, is: &mut Stream, read_id: bool) -> Result<()> {
        if read_id {
            is.read_type_id()?;
        }
        is.start_read_slice()?;
        is.end_read_slice()?;
        read_base_slice(is, true)
    }
}

/// Three-level hierarchy, as a sender with the full schema writes it.
#[derive(Debug, Default)]
pub struct Derived {
    pub a: Cell<i32>,
    pub b: Cell<i32>,
    pub c: Cell<i32>,
}

impl Object for Derived {
    fn object_id(&self) -> &str {
        DERIVED_ID
    }

    fn is_a(&self, type_id: &str) -> bool {
        [DERIVED_ID, MIDDLE_ID, BASE_ID, slicewire_stream::BASE_OBJECT_TYPE_ID].contains(&type_id)
    }

    fn write(&self, os: &mut Stream) -> Result<()> {
        os.write_type_id(DERIVED_ID)?;
        os.start_write_slice()?;
        os.write_int(self.c.get())?;
        os.end_write_slice()?;

        os.write_type_id(MIDDLE_ID)?;
        os.start_write_slice()?;
        os.write_int(self.b.get())?;
        os.end_write_slice()?;

        os.write_type_id(BASE_ID)?;
        os.start_write_slice()?;
        os.write_int(self.a.get())?;
        os.end_write_slice()?;

        write_base_slice(os)
    }

    fn read(&self, is: &mut Stream, read_id: bool) -> Result<()> {
        if read_id {
            is.read_type_id()?;
        }
        is.start_read_slice()?;
        self.c.set(is.read_int()?);
        is.end_read_slice()?;

        is.read_type_id()?;
        is.start_read_slice()?;
        self.b.set(is.read_int()?);
        is.end_read_slice()?;

        is.read_type_id()?;
        is.start_read_slice()?;
        self.a.set(is.read_int()?);
        is.end_read_slice()?;

        read_base_slice(is, true)
    }
}

/// Root of the hierarchy, all an old receiver knows about.
#[derive(Debug, Default)]
pub struct Base {
    pub a: Cell<i32>,
}

impl Object for Base {
    fn object_id(&self) -> &str {
        BASE_ID
    }

    fn write(&self, os: &mut Stream) -> Result<()> {
        os.write_type_id(BASE_ID)?;
        os.start_write_slice()?;
        os.write_int(self.a.get())?;
        os.end_write_slice()?;
        write_base_slice(os)
    }

    fn read(&self, is: &mut Stream, read_id: bool) -> Result<()> {
        if read_id {
            is.read_type_id()?;
        }
        is.start_read_slice()?;
        self.a.set(is.read_int()?);
        is.end_read_slice()?;
        read_base_slice(is, true)
    }
}

#[derive(Debug, Default)]
pub struct BaseError {
    pub code: i32,
}

impl fmt::Display for BaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "base error {}", self.code)
    }
}

impl BaseError {
    fn write_slice(&self, os: &mut Stream) -> Result<()> {
        os.write_string(BASE_ERROR_ID)?;
        os.start_write_slice()?;
        os.write_int(self.code)?;
        os.end_write_slice()
    }

    fn read_slice(&mut self, is: &mut Stream) -> Result<()> {
        is.start_read_slice()?;
        self.code = is.read_int()?;
        is.end_read_slice()
    }
}

impl UserException for BaseError {
    fn exception_id(&self) -> &str {
        BASE_ERROR_ID
    }

    fn write(&self, os: &mut Stream) -> Result<()> {
        self.write_slice(os)
    }

    fn read(&mut self, is: &mut Stream, read_id: bool) -> Result<()> {
        if read_id {
            is.read_string()?;
        }
        self.read_slice(is)
    }
}

#[derive(Debug, Default)]
pub struct DerivedError {
    pub base: BaseError,
    pub detail: String,
}

impl fmt::Display for DerivedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "derived error {}: {}", self.base.code, self.detail)
    }
}

impl UserException for DerivedError {
    fn exception_id(&self) -> &str {
        DERIVED_ERROR_ID
    }

    fn write(&self, os: &mut Stream) -> Result<()> {
        os.write_string(DERIVED_ERROR_ID)?;
        os.start_write_slice()?;
        os.write_string(&self.detail)?;
        os.end_write_slice()?;
        self.base.write_slice(os)
    }

    fn read(&mut self, is: &mut Stream, read_id: bool) -> Result<()> {
        if read_id {
            is.read_string()?;
        }
        is.start_read_slice()?;
        self.detail = is.read_string()?;
        is.end_read_slice()?;
        is.read_string()?;
        self.base.read_slice(is)
    }
}

/// Exception carrying a class instance.
#[derive(Debug, Default)]
pub struct NodeError {
    pub node: ObjectSlot<Node>,
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node error")
    }
}

impl UserException for NodeError {
    fn exception_id(&self) -> &str {
        NODE_ERROR_ID
    }

    fn uses_classes(&self) -> bool {
        true
    }

    fn write(&self, os: &mut Stream) -> Result<()> {
        os.write_string(NODE_ERROR_ID)?;
        os.start_write_slice()?;
        os.write_object(self.node.get_object().as_ref())?;
        os.end_write_slice()
    }

    fn read(&mut self, is: &mut Stream, read_id: bool) -> Result<()> {
        if read_id {
            is.read_string()?;
        }
        is.start_read_slice()?;
        is.read_object(self.node.patcher(NODE_ID))?;
        is.end_read_slice()
    }
}

/// A context whose registry knows nodes and leaves.
pub fn node_context() -> Arc<StreamContext> {
    let ctx = StreamContext::new();
    let registry = ctx.registry();
    registry.register_object_type(NODE_ID, || Node::new("") as ObjectPtr);
    registry.register_object_type(LEAF_ID, || Rc::new(Leaf) as ObjectPtr);
    Arc::new(ctx)
}

/// Write `root` and its graph inside one encapsulation.
pub fn encode_graph(ctx: &Arc<StreamContext>, root: Option<&ObjectPtr>) -> Vec<u8> {
    let mut os = Stream::new(Arc::clone(ctx));
    os.start_write_encaps().unwrap();
    os.write_object(root).unwrap();
    os.write_pending_objects().unwrap();
    os.end_write_encaps().unwrap();
    os.as_bytes().to_vec()
}

/// Read a graph written by [`encode_graph`].
pub fn decode_graph(ctx: &Arc<StreamContext>, bytes: &[u8]) -> Result<Option<ObjectPtr>> {
    let mut is = Stream::from_bytes(Arc::clone(ctx), bytes)?;
    let root = AnySlot::new();
    is.start_read_encaps()?;
    is.read_object(root.patcher())?;
    is.read_pending_objects()?;
    is.check_read_encaps()?;
    is.end_read_encaps()?;
    Ok(root.get())
}

//! Class instances and deferred reference patching.
//!
//! Instances travel by reference: the body of each instance is written once
//! per encapsulation and every reference to it is an index. Because a
//! reference can be read before the instance it names, readers hand the
//! stream a [`Patcher`] that is invoked once the instance exists.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::protocol::BASE_OBJECT_TYPE_ID;
use crate::stream::Stream;

/// Shared handle to a class instance.
pub type ObjectPtr = Rc<dyn Object>;

/// Error type returned by marshal hooks. Hook errors are logged, never
/// propagated.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Upcasts to `Any` for downcasting trait objects back to concrete types.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// A class instance that can be marshaled by reference.
///
/// Implementations write and read one slice per level of their type
/// hierarchy, most-derived first, each slice preceded by its type ID. The
/// root level is written with [`write_base_slice`] and read with
/// [`read_base_slice`].
///
/// `read` takes `&self`: instances may be referenced (and thus reachable)
/// before their own state has been read, so state lives behind interior
/// mutability.
pub trait Object: AsAny + fmt::Debug {
    /// Type ID of the most-derived type.
    fn object_id(&self) -> &str;

    /// Whether this instance is of (or derives from) `type_id`.
    fn is_a(&self, type_id: &str) -> bool {
        type_id == self.object_id() || type_id == BASE_OBJECT_TYPE_ID
    }

    /// Write every slice of this instance.
    fn write(&self, os: &mut Stream) -> Result<()>;

    /// Read every slice of this instance. When `read_id` is false the
    /// most-derived type ID has already been consumed by the stream.
    fn read(&self, is: &mut Stream, read_id: bool) -> Result<()>;

    /// Called before the instance body is written.
    fn pre_marshal(&self) -> std::result::Result<(), HookError> {
        Ok(())
    }

    /// Called once after the whole graph containing the instance is read.
    fn post_unmarshal(&self) -> std::result::Result<(), HookError> {
        Ok(())
    }
}

impl dyn Object {
    /// Downcast a shared instance to its concrete type.
    pub fn downcast<T: Object>(self: Rc<Self>) -> std::result::Result<Rc<T>, Rc<dyn Object>> {
        match Rc::clone(&self).as_any_rc().downcast::<T>() {
            Ok(concrete) => Ok(concrete),
            Err(_) => Err(self),
        }
    }

    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Write the root slice shared by every class hierarchy.
pub fn write_base_slice(os: &mut Stream) -> Result<()> {
    os.write_type_id(BASE_OBJECT_TYPE_ID)?;
    os.start_write_slice()?;
    os.end_write_slice()
}

/// Read the root slice shared by every class hierarchy.
pub fn read_base_slice(is: &mut Stream, read_id: bool) -> Result<()> {
    if read_id {
        is.read_type_id()?;
    }
    is.start_read_slice()?;
    is.end_read_slice()
}

/// An instance of the root type with no state of its own.
///
/// Unmarshaling yields one of these when every more-derived slice of an
/// instance was unknown and sliced off.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BaseObject;

impl Object for BaseObject {
    fn object_id(&self) -> &str {
        BASE_OBJECT_TYPE_ID
    }

    fn write(&self, os: &mut Stream) -> Result<()> {
        write_base_slice(os)
    }

    fn read(&self, is: &mut Stream, read_id: bool) -> Result<()> {
        read_base_slice(is, read_id)
    }
}

/// A received instance did not have the type its reference requires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("expected instance of {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

/// Deferred receiver of an unmarshaled instance.
pub trait Patcher {
    /// Deliver the instance, or `None` for a null reference.
    fn patch(&mut self, v: Option<ObjectPtr>) -> std::result::Result<(), PatchError>;

    /// Type ID the receiver expects, reported when patching fails.
    fn expected_type(&self) -> &str;
}

/// A typed, shareable cell holding an optional instance reference.
///
/// Generated types keep their class-typed members in slots so that the
/// stream can fill them in whenever the referenced instance arrives.
pub struct ObjectSlot<T> {
    cell: Rc<RefCell<Option<Rc<T>>>>,
}

impl<T: Object> ObjectSlot<T> {
    pub fn new() -> Self {
        Self {
            cell: Rc::new(RefCell::new(None)),
        }
    }

    pub fn with_value(v: Rc<T>) -> Self {
        Self {
            cell: Rc::new(RefCell::new(Some(v))),
        }
    }

    pub fn get(&self) -> Option<Rc<T>> {
        self.cell.borrow().clone()
    }

    pub fn set(&self, v: Option<Rc<T>>) {
        *self.cell.borrow_mut() = v;
    }

    pub fn is_none(&self) -> bool {
        self.cell.borrow().is_none()
    }

    /// The slot's content as an untyped handle, for writing.
    pub fn get_object(&self) -> Option<ObjectPtr> {
        self.get().map(|v| v as ObjectPtr)
    }

    /// A patcher that stores the delivered instance into this slot.
    pub fn patcher(&self, expected_type: &str) -> Box<dyn Patcher> {
        Box::new(SlotPatcher {
            cell: Rc::clone(&self.cell),
            expected_type: expected_type.to_string(),
        })
    }
}

impl<T: Object> Default for ObjectSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ObjectSlot<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

// Instance graphs may be cyclic, so only the referenced type ID is printed.
impl<T: Object> fmt::Debug for ObjectSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.try_borrow() {
            Ok(v) => match v.as_ref() {
                Some(v) => write!(f, "ObjectSlot({})", v.object_id()),
                None => f.write_str("ObjectSlot(None)"),
            },
            Err(_) => f.write_str("ObjectSlot(<borrowed>)"),
        }
    }
}

struct SlotPatcher<T> {
    cell: Rc<RefCell<Option<Rc<T>>>>,
    expected_type: String,
}

impl<T: Object> Patcher for SlotPatcher<T> {
    fn patch(&mut self, v: Option<ObjectPtr>) -> std::result::Result<(), PatchError> {
        let value = match v {
            None => None,
            Some(obj) => {
                let actual = obj.object_id().to_string();
                match obj.downcast::<T>() {
                    Ok(concrete) => Some(concrete),
                    Err(_) => {
                        return Err(PatchError::TypeMismatch {
                            expected: self.expected_type.clone(),
                            actual,
                        })
                    }
                }
            }
        };
        *self.cell.borrow_mut() = value;
        Ok(())
    }

    fn expected_type(&self) -> &str {
        &self.expected_type
    }
}

/// An untyped slot accepting an instance of any class.
#[derive(Clone, Default)]
pub struct AnySlot {
    cell: Rc<RefCell<Option<ObjectPtr>>>,
}

impl AnySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<ObjectPtr> {
        self.cell.borrow().clone()
    }

    pub fn set(&self, v: Option<ObjectPtr>) {
        *self.cell.borrow_mut() = v;
    }

    pub fn patcher(&self) -> Box<dyn Patcher> {
        Box::new(AnyPatcher {
            cell: Rc::clone(&self.cell),
        })
    }
}

impl fmt::Debug for AnySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.try_borrow() {
            Ok(v) => match v.as_ref() {
                Some(v) => write!(f, "AnySlot({})", v.object_id()),
                None => f.write_str("AnySlot(None)"),
            },
            Err(_) => f.write_str("AnySlot(<borrowed>)"),
        }
    }
}

struct AnyPatcher {
    cell: Rc<RefCell<Option<ObjectPtr>>>,
}

impl Patcher for AnyPatcher {
    fn patch(&mut self, v: Option<ObjectPtr>) -> std::result::Result<(), PatchError> {
        *self.cell.borrow_mut() = v;
        Ok(())
    }

    fn expected_type(&self) -> &str {
        BASE_OBJECT_TYPE_ID
    }
}

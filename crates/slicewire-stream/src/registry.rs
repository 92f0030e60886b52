use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{Result, StreamError};
use crate::exception::UserException;
use crate::object::ObjectPtr;

/// Constructs class instances for unmarshaling.
pub trait ObjectFactory: Send + Sync {
    /// Create an uninitialized instance of `type_id`, or `None` if this
    /// factory does not handle it.
    fn create(&self, type_id: &str) -> Option<ObjectPtr>;

    /// Called when the factory is removed from a registry.
    fn destroy(&self) {}
}

impl<F> ObjectFactory for F
where
    F: Fn(&str) -> Option<ObjectPtr> + Send + Sync,
{
    fn create(&self, type_id: &str) -> Option<ObjectPtr> {
        self(type_id)
    }
}

/// Constructs user exceptions for unmarshaling.
pub trait UserExceptionFactory: Send + Sync {
    fn create(&self) -> Box<dyn UserException>;
}

impl<F> UserExceptionFactory for F
where
    F: Fn() -> Box<dyn UserException> + Send + Sync,
{
    fn create(&self) -> Box<dyn UserException> {
        self()
    }
}

/// Constructor entry of the static catalogue for a class type.
pub type ObjectConstructor = fn() -> ObjectPtr;

/// Constructor entry of the static catalogue for an exception type.
pub type ExceptionConstructor = fn() -> Box<dyn UserException>;

struct CatalogueObjectFactory(ObjectConstructor);

impl ObjectFactory for CatalogueObjectFactory {
    fn create(&self, _type_id: &str) -> Option<ObjectPtr> {
        Some((self.0)())
    }
}

struct CatalogueExceptionFactory(ExceptionConstructor);

impl UserExceptionFactory for CatalogueExceptionFactory {
    fn create(&self) -> Box<dyn UserException> {
        (self.0)()
    }
}

/// Type-ID keyed factories for class instances and user exceptions.
///
/// Two layers are kept per kind. Factories registered explicitly are looked
/// up first. Generated types add their constructors to the static catalogue
/// at start-up; a catalogue entry is installed as a factory the first time
/// its type is received.
///
/// All methods take `&self`; the registry is shared between streams on any
/// number of threads.
pub struct FactoryRegistry {
    object_factories: RwLock<HashMap<String, Arc<dyn ObjectFactory>>>,
    exception_factories: RwLock<HashMap<String, Arc<dyn UserExceptionFactory>>>,
    object_catalogue: RwLock<HashMap<String, ObjectConstructor>>,
    exception_catalogue: RwLock<HashMap<String, ExceptionConstructor>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self {
            object_factories: RwLock::new(HashMap::new()),
            exception_factories: RwLock::new(HashMap::new()),
            object_catalogue: RwLock::new(HashMap::new()),
            exception_catalogue: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory for `type_id`. The empty type ID registers the
    /// default factory, consulted for every type without its own factory.
    pub fn register_object_factory(
        &self,
        type_id: &str,
        factory: Arc<dyn ObjectFactory>,
    ) -> Result<()> {
        let mut factories = self
            .object_factories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(type_id) {
            return Err(StreamError::AlreadyRegistered {
                kind: "object",
                type_id: type_id.to_string(),
            });
        }
        factories.insert(type_id.to_string(), factory);
        Ok(())
    }

    pub fn find_object_factory(&self, type_id: &str) -> Option<Arc<dyn ObjectFactory>> {
        self.object_factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_id)
            .cloned()
    }

    /// Remove and destroy the factory for `type_id`.
    pub fn remove_object_factory(&self, type_id: &str) -> Result<()> {
        let removed = self
            .object_factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(type_id);
        match removed {
            Some(factory) => {
                factory.destroy();
                Ok(())
            }
            None => Err(StreamError::NotRegistered {
                kind: "object",
                type_id: type_id.to_string(),
            }),
        }
    }

    pub fn register_exception_factory(
        &self,
        type_id: &str,
        factory: Arc<dyn UserExceptionFactory>,
    ) -> Result<()> {
        let mut factories = self
            .exception_factories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(type_id) {
            return Err(StreamError::AlreadyRegistered {
                kind: "exception",
                type_id: type_id.to_string(),
            });
        }
        factories.insert(type_id.to_string(), factory);
        Ok(())
    }

    pub fn find_exception_factory(&self, type_id: &str) -> Option<Arc<dyn UserExceptionFactory>> {
        self.exception_factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_id)
            .cloned()
    }

    pub fn remove_exception_factory(&self, type_id: &str) -> Result<()> {
        let removed = self
            .exception_factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(type_id);
        match removed {
            Some(_) => Ok(()),
            None => Err(StreamError::NotRegistered {
                kind: "exception",
                type_id: type_id.to_string(),
            }),
        }
    }

    /// Add a class constructor to the static catalogue.
    pub fn register_object_type(&self, type_id: &str, ctor: ObjectConstructor) {
        self.object_catalogue
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_id.to_string(), ctor);
    }

    /// Add an exception constructor to the static catalogue.
    pub fn register_exception_type(&self, type_id: &str, ctor: ExceptionConstructor) {
        self.exception_catalogue
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_id.to_string(), ctor);
    }

    /// Install the catalogue constructor for `type_id` as its factory.
    ///
    /// If another caller installed a factory first, that factory is returned
    /// instead, so every caller ends up with the same one.
    pub fn load_object_factory(&self, type_id: &str) -> Option<Arc<dyn ObjectFactory>> {
        let ctor = *self
            .object_catalogue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_id)?;
        let mut factories = self
            .object_factories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let factory = factories.entry(type_id.to_string()).or_insert_with(|| {
            debug!(type_id, "installing object factory from catalogue");
            Arc::new(CatalogueObjectFactory(ctor))
        });
        Some(Arc::clone(factory))
    }

    pub fn load_exception_factory(&self, type_id: &str) -> Option<Arc<dyn UserExceptionFactory>> {
        let ctor = *self
            .exception_catalogue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_id)?;
        let mut factories = self
            .exception_factories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let factory = factories.entry(type_id.to_string()).or_insert_with(|| {
            debug!(type_id, "installing exception factory from catalogue");
            Arc::new(CatalogueExceptionFactory(ctor))
        });
        Some(Arc::clone(factory))
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let objects = self
            .object_factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let exceptions = self
            .exception_factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("FactoryRegistry")
            .field("object_factories", &objects)
            .field("exception_factories", &exceptions)
            .finish_non_exhaustive()
    }
}

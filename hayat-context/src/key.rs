//! Unit identification keys.
//!
//! [`UnitKey`] uniquely identifies a unit within a context.
//! It combines a [`TypeId`] with an optional qualifier name, so the same
//! type can be registered several times under different names.
//! [`UnitRequest`] is what callers hand to `get_unit`.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use hayat_support::rendering::shorten_type_name;

/// Uniquely identifies a unit in a context.
///
/// # Examples
/// ```
/// use hayat_context::key::UnitKey;
///
/// let key = UnitKey::of::<String>();
/// assert_eq!(key.type_name(), "alloc::string::String");
/// assert_eq!(key.name(), None);
///
/// let key = UnitKey::named::<String>("greeting");
/// assert_eq!(key.name(), Some("greeting"));
/// ```
#[derive(Clone, Copy)]
pub struct UnitKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<&'static str>,
}

impl UnitKey {
    /// Creates a key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name: None,
        }
    }

    /// Creates a qualified key for type `T`.
    ///
    /// ```
    /// use hayat_context::key::UnitKey;
    ///
    /// let primary = UnitKey::named::<String>("primary");
    /// let replica = UnitKey::named::<String>("replica");
    /// assert_ne!(primary, replica);
    /// ```
    #[inline]
    pub fn named<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name: Some(name),
        }
    }

    /// Returns a copy of this key carrying `name` as its qualifier.
    #[inline]
    pub fn with_name(self, name: &'static str) -> Self {
        Self { name: Some(name), ..self }
    }

    /// Returns the [`TypeId`] of the unit type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the type name without its module path.
    pub fn short_name(&self) -> String {
        shorten_type_name(self.type_name)
    }

    /// Returns the optional qualifier.
    #[inline]
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Returns `true` if this key identifies values of type `T`.
    #[inline]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for UnitKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl Eq for UnitKey {}

impl Hash for UnitKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "UnitKey({}, name={:?})", self.type_name, name),
            None => write!(f, "UnitKey({})", self.type_name),
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "{} (name={:?})", self.type_name, name),
            None => write!(f, "{}", self.type_name),
        }
    }
}

/// A request for a unit: a bare type or a type qualified by name.
///
/// ```
/// use hayat_context::key::{UnitKey, UnitRequest};
///
/// let request = UnitRequest::named::<u32>("port");
/// assert_eq!(request.key(), UnitKey::named::<u32>("port"));
///
/// let request: UnitRequest = UnitKey::of::<u32>().into();
/// assert_eq!(request.key().name(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitRequest {
    key: UnitKey,
}

impl UnitRequest {
    /// Requests the unnamed unit of type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self { key: UnitKey::of::<T>() }
    }

    /// Requests the unit of type `T` registered under `name`.
    #[inline]
    pub fn named<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self { key: UnitKey::named::<T>(name) }
    }

    /// The key this request resolves.
    #[inline]
    pub fn key(&self) -> UnitKey {
        self.key
    }
}

impl From<UnitKey> for UnitRequest {
    fn from(key: UnitKey) -> Self {
        Self { key }
    }
}

impl From<&UnitKey> for UnitRequest {
    fn from(key: &UnitKey) -> Self {
        Self { key: *key }
    }
}

impl fmt::Display for UnitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key, f)
    }
}

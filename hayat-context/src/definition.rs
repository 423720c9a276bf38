//! Unit definitions: how to build and manage one kind of unit.

use std::fmt;

use crate::key::UnitKey;
use crate::scope::Scope;
use crate::unit::{Constructor, HookPhase, LifecycleHook, LifecycleHooks};

/// Declarative description of a unit.
///
/// A definition always carries the type's own constructor. A factory,
/// when set, takes precedence over it; both receive the resolved
/// [`dependencies`](UnitDefinition::dependencies) positionally.
///
/// # Examples
/// ```
/// use hayat_context::definition::UnitDefinition;
/// use hayat_context::unit::Constructor;
///
/// #[derive(Default)]
/// struct Clock;
///
/// let definition = UnitDefinition::of::<Clock>(Constructor::from_default::<Clock>()).singleton();
/// assert!(definition.is_singleton());
/// assert!(definition.dependencies().is_empty());
/// ```
#[derive(Clone)]
pub struct UnitDefinition {
    key: UnitKey,
    scope: Scope,
    lazy: bool,
    constructor: Constructor,
    factory: Option<Constructor>,
    dependencies: Vec<UnitKey>,
    hooks: LifecycleHooks,
}

impl UnitDefinition {
    /// Creates a prototype-scoped definition for `key`.
    pub fn new(key: UnitKey, constructor: Constructor) -> Self {
        Self {
            key,
            scope: Scope::Prototype,
            lazy: false,
            constructor,
            factory: None,
            dependencies: Vec::new(),
            hooks: LifecycleHooks::default(),
        }
    }

    /// Creates a prototype-scoped definition for type `T`.
    pub fn of<T: Send + Sync + 'static>(constructor: Constructor) -> Self {
        Self::new(UnitKey::of::<T>(), constructor)
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn singleton(self) -> Self {
        self.with_scope(Scope::Singleton)
    }

    /// Lazy singletons are skipped by `start()` and built on first request.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Overrides the type's constructor.
    pub fn with_factory(mut self, factory: Constructor) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Appends a constructor dependency on the unit of type `D`.
    pub fn depends_on<D: ?Sized + 'static>(self) -> Self {
        self.dependency(UnitKey::of::<D>())
    }

    pub fn dependency(mut self, key: UnitKey) -> Self {
        self.dependencies.push(key);
        self
    }

    pub fn with_hook(mut self, phase: HookPhase, hook: LifecycleHook) -> Self {
        self.hooks.set(phase, hook);
        self
    }

    pub fn with_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    #[inline]
    pub fn key(&self) -> UnitKey {
        self.key
    }

    #[inline]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.scope.is_singleton()
    }

    #[inline]
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn dependencies(&self) -> &[UnitKey] {
        &self.dependencies
    }

    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    pub fn constructor(&self) -> &Constructor {
        &self.constructor
    }

    pub fn factory(&self) -> Option<&Constructor> {
        self.factory.as_ref()
    }

    /// The factory if one is set, the type's constructor otherwise.
    pub(crate) fn instantiator(&self) -> &Constructor {
        self.factory.as_ref().unwrap_or(&self.constructor)
    }
}

impl fmt::Debug for UnitDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitDefinition")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("lazy", &self.lazy)
            .field("has_factory", &self.factory.is_some())
            .field("dependencies", &self.dependencies)
            .field("hooks", &self.hooks)
            .finish()
    }
}

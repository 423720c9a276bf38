//! Type metadata: what a type declares about itself.
//!
//! Rust has no runtime decorators, so a type describes itself by
//! implementing [`Scannable`] and returning a [`TypeMetadata`] built with
//! the typed builder below. Definition readers turn that metadata into
//! unit definitions when the type is scanned.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use hayat_context::metadata::{Scannable, TypeMetadata};
//! use hayat_context::unit::{Arguments, Constructor, LifecycleHook};
//!
//! #[derive(Default)]
//! struct Clock;
//!
//! struct Scheduler {
//!     clock: Arc<Clock>,
//! }
//!
//! impl Scannable for Scheduler {
//!     fn metadata() -> TypeMetadata {
//!         TypeMetadata::new::<Scheduler>(Constructor::new(|args: Arguments| async move {
//!             Ok(Scheduler { clock: args.get(0)? })
//!         }))
//!         .service()
//!         .depends_on::<Clock>()
//!         .init(LifecycleHook::new("start_ticking", |_: Arc<Scheduler>, _| async { Ok(()) }))
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

use crate::definition::UnitDefinition;
use crate::error::{HayatError, Result};
use crate::key::UnitKey;
use crate::postprocess::PostProcessorRole;
use crate::scope::Scope;
use crate::unit::{
    Arguments, ConstructFn, Constructor, HookPhase, LifecycleHook, LifecycleHooks, Unit,
    downcast_unit,
};

/// A type that can describe itself to a context.
pub trait Scannable: Send + Sync + 'static {
    fn metadata() -> TypeMetadata;
}

/// Role markers a type can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stereotype {
    /// Managed, new instance per request.
    Injectable,
    /// Managed singleton.
    Component,
    /// Singleton holding business logic.
    Service,
    /// Explicit singleton.
    Singleton,
    /// Singleton whose unit methods define further units.
    Configuration,
}

impl Stereotype {
    /// The scope a unit carrying this stereotype gets.
    pub fn scope(&self) -> Scope {
        match self {
            Stereotype::Injectable => Scope::Prototype,
            Stereotype::Component
            | Stereotype::Service
            | Stereotype::Singleton
            | Stereotype::Configuration => Scope::Singleton,
        }
    }

    /// `true` for the stereotypes read by the component reader.
    pub fn is_component(&self) -> bool {
        !matches!(self, Stereotype::Configuration)
    }
}

type UnitMethodFn = Arc<dyn Fn(Unit, Arguments) -> BoxFuture<'static, Result<Unit>> + Send + Sync>;

/// A method on a configuration type that produces another unit.
///
/// The configuration instance is resolved first; the method's own
/// parameters follow in declaration order.
#[derive(Clone)]
pub struct UnitMethod {
    name: String,
    key: UnitKey,
    scope: Scope,
    lazy: bool,
    parameters: Vec<UnitKey>,
    hooks: LifecycleHooks,
    func: UnitMethodFn,
}

impl UnitMethod {
    /// Declares method `name` on configuration `C` producing a `T`.
    pub fn new<C, T, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        C: Send + Sync + 'static,
        T: Send + Sync + 'static,
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let func: UnitMethodFn = Arc::new(move |configuration: Unit, args: Arguments| {
            match downcast_unit::<C>(UnitKey::of::<C>(), configuration) {
                Ok(configuration) => {
                    let fut = f(configuration, args);
                    async move { Ok::<_, HayatError>(Arc::new(fut.await?) as Unit) }.boxed()
                }
                Err(err) => future::ready(Err(err)).boxed(),
            }
        });

        Self {
            name: name.into(),
            key: UnitKey::of::<T>(),
            scope: Scope::Prototype,
            lazy: false,
            parameters: Vec::new(),
            hooks: LifecycleHooks::default(),
            func,
        }
    }

    /// Qualifies the produced unit with `name`.
    pub fn named(mut self, name: &'static str) -> Self {
        self.key = self.key.with_name(name);
        self
    }

    pub fn singleton(mut self) -> Self {
        self.scope = Scope::Singleton;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn param<D: ?Sized + 'static>(mut self) -> Self {
        self.parameters.push(UnitKey::of::<D>());
        self
    }

    pub fn parameter(mut self, key: UnitKey) -> Self {
        self.parameters.push(key);
        self
    }

    pub fn with_hook(mut self, phase: HookPhase, hook: LifecycleHook) -> Self {
        self.hooks.set(phase, hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> UnitKey {
        self.key
    }

    /// Definition for the produced unit, resolved through `configuration`.
    pub fn to_definition(&self, configuration: UnitKey) -> UnitDefinition {
        let func = self.func.clone();
        let product = self.key;
        let construct: ConstructFn = Arc::new(move |args: Arguments| match args.split_first() {
            Some((configuration, rest)) => func(configuration, rest),
            None => future::ready(Err(HayatError::construction_failed(
                product,
                "configuration instance was not resolved",
            )))
            .boxed(),
        });

        let mut definition = UnitDefinition::new(self.key, Constructor::from_fn(construct))
            .with_scope(self.scope)
            .lazy(self.lazy)
            .with_hooks(self.hooks.clone())
            .dependency(configuration);
        for parameter in &self.parameters {
            definition = definition.dependency(*parameter);
        }
        definition
    }
}

impl fmt::Debug for UnitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitMethod")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Everything a type declares about itself.
#[derive(Debug, Clone)]
pub struct TypeMetadata {
    key: UnitKey,
    stereotypes: Vec<Stereotype>,
    constructor: Constructor,
    dependencies: Vec<UnitKey>,
    hooks: LifecycleHooks,
    lazy: bool,
    unit_methods: Vec<UnitMethod>,
    post_processor_roles: Vec<PostProcessorRole>,
}

impl TypeMetadata {
    /// Metadata for `T` built by `constructor`.
    pub fn new<T: Send + Sync + 'static>(constructor: Constructor) -> Self {
        Self {
            key: UnitKey::of::<T>(),
            stereotypes: Vec::new(),
            constructor,
            dependencies: Vec::new(),
            hooks: LifecycleHooks::default(),
            lazy: false,
            unit_methods: Vec::new(),
            post_processor_roles: Vec::new(),
        }
    }

    /// Metadata for `T` built through [`Default`].
    pub fn default_constructed<T: Default + Send + Sync + 'static>() -> Self {
        Self::new::<T>(Constructor::from_default::<T>())
    }

    /// Registers the type under a qualifier name.
    pub fn named(mut self, name: &'static str) -> Self {
        self.key = self.key.with_name(name);
        self
    }

    pub fn stereotype(mut self, stereotype: Stereotype) -> Self {
        if !self.stereotypes.contains(&stereotype) {
            self.stereotypes.push(stereotype);
        }
        self
    }

    pub fn injectable(self) -> Self {
        self.stereotype(Stereotype::Injectable)
    }

    pub fn component(self) -> Self {
        self.stereotype(Stereotype::Component)
    }

    pub fn service(self) -> Self {
        self.stereotype(Stereotype::Service)
    }

    pub fn singleton(self) -> Self {
        self.stereotype(Stereotype::Singleton)
    }

    pub fn configuration(self) -> Self {
        self.stereotype(Stereotype::Configuration)
    }

    /// Excludes the unit from eager pre-instantiation.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn depends_on<D: ?Sized + 'static>(mut self) -> Self {
        self.dependencies.push(UnitKey::of::<D>());
        self
    }

    pub fn dependency(mut self, key: UnitKey) -> Self {
        self.dependencies.push(key);
        self
    }

    pub fn post_construct(mut self, hook: LifecycleHook) -> Self {
        self.hooks.set(HookPhase::PostConstruct, hook);
        self
    }

    pub fn init(mut self, hook: LifecycleHook) -> Self {
        self.hooks.set(HookPhase::Init, hook);
        self
    }

    pub fn pre_destroy(mut self, hook: LifecycleHook) -> Self {
        self.hooks.set(HookPhase::PreDestroy, hook);
        self
    }

    pub fn destroy(mut self, hook: LifecycleHook) -> Self {
        self.hooks.set(HookPhase::Destroy, hook);
        self
    }

    /// Declares a unit method (configuration types only).
    pub fn provides(mut self, method: UnitMethod) -> Self {
        self.unit_methods.push(method);
        self
    }

    /// Declares a post-processor role.
    pub fn post_processor(mut self, role: PostProcessorRole) -> Self {
        self.post_processor_roles.push(role);
        self
    }

    pub fn key(&self) -> UnitKey {
        self.key
    }

    pub fn stereotypes(&self) -> &[Stereotype] {
        &self.stereotypes
    }

    pub fn has_stereotype(&self, stereotype: Stereotype) -> bool {
        self.stereotypes.contains(&stereotype)
    }

    pub fn dependencies(&self) -> &[UnitKey] {
        &self.dependencies
    }

    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn unit_methods(&self) -> &[UnitMethod] {
        &self.unit_methods
    }

    pub fn post_processor_roles(&self) -> &[PostProcessorRole] {
        &self.post_processor_roles
    }

    pub fn is_component(&self) -> bool {
        self.stereotypes.iter().any(Stereotype::is_component)
    }

    pub fn is_configuration(&self) -> bool {
        self.has_stereotype(Stereotype::Configuration)
    }

    pub fn is_post_processor(&self) -> bool {
        !self.post_processor_roles.is_empty()
    }

    /// Singleton if any stereotype is singleton-scoped.
    pub fn scope(&self) -> Scope {
        let singleton = self.stereotypes.iter().any(|s| s.scope().is_singleton());
        Scope::from(singleton)
    }

    /// Definition for the type itself with the given scope.
    pub fn to_definition(&self, scope: Scope) -> UnitDefinition {
        let mut definition = UnitDefinition::new(self.key, self.constructor.clone())
            .with_scope(scope)
            .lazy(self.lazy)
            .with_hooks(self.hooks.clone());
        for dependency in &self.dependencies {
            definition = definition.dependency(*dependency);
        }
        definition
    }
}

//! # The Context: heart of Hayat
//!
//! Owns a definition registry and a unit factory, and drives them through
//! the lifecycle.
//!
//! # Architecture
//! ```text
//! scan::<T>()  ──readers──>  UnitDefinitionRegistry
//!                                    │
//! initialize()   post processors ────┤
//!                                    ▼
//! start()        UnitFactory ──pre-instantiate singletons──> SingletonRegistry
//!                                    │
//! get_unit()  <──────────────────────┘      (falls back to the parent context)
//!                                    │
//! stop()         destroy constructed singletons, clear the cache
//! ```
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use hayat_context::prelude::*;
//!
//! #[derive(Default)]
//! struct Clock;
//!
//! impl Scannable for Clock {
//!     fn metadata() -> TypeMetadata {
//!         TypeMetadata::default_constructed::<Clock>().service()
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let context = Context::new();
//! context.scan::<Clock>()?;
//! context.initialize().await?;
//! context.start().await?;
//!
//! let a: Arc<Clock> = context.get().await?;
//! let b: Arc<Clock> = context.get().await?;
//! assert!(Arc::ptr_eq(&a, &b));
//!
//! context.stop().await?;
//! # Ok::<(), HayatError>(())
//! # }).unwrap();
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, trace};

use crate::definition::UnitDefinition;
use crate::error::{HayatError, Result};
use crate::factory::{UnitFactory, UnitResolver};
use crate::graph::destruction_order;
use crate::key::{UnitKey, UnitRequest};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::metadata::{Scannable, TypeMetadata};
use crate::postprocess::{
    PostProcessorTypes, UnitDefinitionRegistryPostProcessor, UnitFactoryPostProcessor,
    UnitPostProcessor,
};
use crate::reader::{ScanResult, UnitDefinitionReader, default_readers};
use crate::registry::UnitDefinitionRegistry;
use crate::settings::ContextSettings;
use crate::unit::{LifecycleHook, Unit, downcast_unit};

// ============================================================
// ContextBuilder
// ============================================================

/// Builds a [`Context`] in the `Pending` state.
///
/// # Examples
/// ```rust,ignore
/// let context = Context::builder()
///     .settings(ContextSettings::named("app"))
///     .parent(shared.clone())
///     .scan::<Database>()
///     .scan::<UserService>()
///     .build()?;
/// ```
#[derive(Default)]
pub struct ContextBuilder {
    settings: ContextSettings,
    parent: Option<Arc<Context>>,
    readers: Vec<Box<dyn UnitDefinitionReader>>,
    metadata: Vec<TypeMetadata>,
    post_processors: Vec<Arc<dyn UnitPostProcessor>>,
}

impl ContextBuilder {
    pub fn settings(mut self, settings: ContextSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Falls back to `parent` for units without a local definition.
    pub fn parent(mut self, parent: Arc<Context>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Adds a reader after the default ones.
    pub fn reader(mut self, reader: impl UnitDefinitionReader + 'static) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    pub fn scan<T: Scannable>(self) -> Self {
        self.scan_metadata(T::metadata())
    }

    pub fn scan_metadata(mut self, metadata: TypeMetadata) -> Self {
        self.metadata.push(metadata);
        self
    }

    /// Adds a unit post processor ahead of any scanned one.
    pub fn unit_post_processor(mut self, processor: Arc<dyn UnitPostProcessor>) -> Self {
        self.post_processors.push(processor);
        self
    }

    /// Builds the context and applies every registration in order.
    pub fn build(self) -> Result<Context> {
        let context = Context::create(self.settings, self.parent);
        Self::register(&context, self.readers, self.post_processors, self.metadata)?;
        Ok(context)
    }

    /// Like [`build`](Self::build), but the context is created shared and
    /// carries a [`ContextHandle`] singleton.
    pub fn build_shared(self) -> Result<Arc<Context>> {
        let context = Context::create_shared(self.settings, self.parent);
        Self::register(&context, self.readers, self.post_processors, self.metadata)?;
        Ok(context)
    }

    fn register(
        context: &Context,
        readers: Vec<Box<dyn UnitDefinitionReader>>,
        post_processors: Vec<Arc<dyn UnitPostProcessor>>,
        metadata: Vec<TypeMetadata>,
    ) -> Result<()> {
        context.readers.write().extend(readers);
        for processor in post_processors {
            context.add_unit_post_processor(processor)?;
        }
        context.scan_all(metadata)
    }
}

// ============================================================
// ContextHandle
// ============================================================

/// A non-owning reference to the context a unit was resolved from.
///
/// Shared contexts register one as a singleton under
/// `UnitKey::of::<ContextHandle>()`, so any unit can take it as a
/// dependency. Children shadow their parent's handle with their own.
#[derive(Clone)]
pub struct ContextHandle(Weak<Context>);

impl ContextHandle {
    /// `None` once the context has been dropped.
    pub fn upgrade(&self) -> Option<Arc<Context>> {
        self.0.upgrade()
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

// ============================================================
// Context
// ============================================================

/// A dependency injection context.
///
/// Share it as `Arc<Context>` when it serves as the parent of other
/// contexts.
pub struct Context {
    settings: ContextSettings,
    lifecycle: Lifecycle,
    registry: Arc<UnitDefinitionRegistry>,
    factory: UnitFactory,
    readers: RwLock<Vec<Box<dyn UnitDefinitionReader>>>,
    post_processor_types: Mutex<PostProcessorTypes>,
    parent: Option<Arc<Context>>,
}

impl Context {
    /// Creates a root context with default settings.
    pub fn new() -> Self {
        Self::create(ContextSettings::default(), None)
    }

    pub fn with_settings(settings: ContextSettings) -> Self {
        Self::create(settings, None)
    }

    /// Creates a child context of `parent`.
    ///
    /// The parent is only read from, through its public `get_unit`, so it
    /// must be started before the child resolves anything from it.
    pub fn with_parent(parent: Arc<Context>) -> Self {
        Self::create(ContextSettings::default(), Some(parent))
    }

    /// Creates a shared root context that can hand itself to its units
    /// through [`ContextHandle`].
    pub fn shared() -> Arc<Self> {
        Self::create_shared(ContextSettings::default(), None)
    }

    pub fn shared_with_settings(settings: ContextSettings) -> Arc<Self> {
        Self::create_shared(settings, None)
    }

    /// Shared form of [`with_parent`](Self::with_parent).
    pub fn shared_child(parent: Arc<Context>) -> Arc<Self> {
        Self::create_shared(ContextSettings::default(), Some(parent))
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    fn create_shared(settings: ContextSettings, parent: Option<Arc<Context>>) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let context = Self::create(settings, parent);
            context
                .factory
                .register_singleton(UnitKey::of::<ContextHandle>(), Arc::new(ContextHandle(weak.clone())));
            context
        })
    }

    fn create(settings: ContextSettings, parent: Option<Arc<Context>>) -> Self {
        let registry = Arc::new(UnitDefinitionRegistry::new());
        let factory = match &parent {
            Some(parent) => {
                let resolver: Arc<dyn UnitResolver> = parent.clone();
                UnitFactory::with_parent(registry.clone(), resolver)
            }
            None => UnitFactory::new(registry.clone()),
        };

        debug!(
            context = settings.name.as_deref().unwrap_or("context"),
            has_parent = parent.is_some(),
            "Created context"
        );

        Self {
            settings,
            lifecycle: Lifecycle::new(),
            registry,
            factory,
            readers: RwLock::new(default_readers()),
            post_processor_types: Mutex::new(PostProcessorTypes::default()),
            parent,
        }
    }

    fn display_name(&self) -> &str {
        self.settings.name.as_deref().unwrap_or("context")
    }

    // ── Accessors ──

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    pub fn registry(&self) -> &UnitDefinitionRegistry {
        &self.registry
    }

    pub fn factory(&self) -> &UnitFactory {
        &self.factory
    }

    // ── Registration (Pending only) ──

    /// Adds a reader consulted after the existing ones.
    pub fn add_unit_definition_reader(&self, reader: impl UnitDefinitionReader + 'static) -> Result<()> {
        self.lifecycle.require("add_unit_definition_reader", LifecycleState::Pending)?;
        self.readers.write().push(Box::new(reader));
        Ok(())
    }

    /// Registers a unit post processor directly.
    ///
    /// Runs before any post processor discovered by scanning.
    pub fn add_unit_post_processor(&self, processor: Arc<dyn UnitPostProcessor>) -> Result<()> {
        self.lifecycle.require("add_unit_post_processor", LifecycleState::Pending)?;
        self.factory.add_unit_post_processor(processor);
        Ok(())
    }

    /// Registers a definition without going through the readers.
    pub fn register_unit_definition(&self, definition: UnitDefinition) -> Result<()> {
        self.lifecycle.require("register_unit_definition", LifecycleState::Pending)?;
        self.registry.register_unit_definition(definition);
        Ok(())
    }

    /// Registers the definitions `T` declares.
    pub fn scan<T: Scannable>(&self) -> Result<()> {
        self.scan_metadata(T::metadata())
    }

    /// Runs every reader over `metadata` and applies what they produced.
    pub fn scan_metadata(&self, metadata: TypeMetadata) -> Result<()> {
        self.lifecycle.require("scan", LifecycleState::Pending)?;

        let mut result = ScanResult::new();
        for reader in self.readers.read().iter() {
            reader.read(&metadata, &mut result);
        }

        if result.is_empty() {
            debug!(key = %metadata.key(), "Scanned type declares no units");
            return Ok(());
        }

        let (definitions, post_processors) = result.into_parts();
        for definition in definitions {
            self.registry.register_unit_definition(definition);
        }

        let mut types = self.post_processor_types.lock();
        for (key, role) in &post_processors {
            types.add(*key, role);
        }

        Ok(())
    }

    pub fn scan_all(&self, types: impl IntoIterator<Item = TypeMetadata>) -> Result<()> {
        for metadata in types {
            self.scan_metadata(metadata)?;
        }
        Ok(())
    }

    // ── Lifecycle ──

    /// Instantiates the post processors and runs the registry and factory
    /// pipelines.
    ///
    /// `Pending → Initializing → Initialized`
    #[instrument(skip(self), fields(context = %self.display_name()))]
    pub async fn initialize(&self) -> Result<()> {
        self.lifecycle.advance("initialize", LifecycleState::Initializing)?;

        let types = self.post_processor_types.lock().clone();
        info!(post_processors = types.len(), "Initializing context");

        let mut registry_processors: Vec<Arc<dyn UnitDefinitionRegistryPostProcessor>> =
            Vec::with_capacity(types.definition_registry.len());
        for (key, cast) in &types.definition_registry {
            let unit = self.factory.get_unit(*key).await?;
            registry_processors.push(cast(unit).ok_or(HayatError::TypeMismatch {
                key: *key,
                expected: "UnitDefinitionRegistryPostProcessor",
            })?);
        }

        let mut factory_processors: Vec<Arc<dyn UnitFactoryPostProcessor>> =
            Vec::with_capacity(types.factory.len());
        for (key, cast) in &types.factory {
            let unit = self.factory.get_unit(*key).await?;
            factory_processors.push(cast(unit).ok_or(HayatError::TypeMismatch {
                key: *key,
                expected: "UnitFactoryPostProcessor",
            })?);
        }

        let mut unit_processors: Vec<Arc<dyn UnitPostProcessor>> = Vec::with_capacity(types.unit.len());
        for (key, cast) in &types.unit {
            let unit = self.factory.get_unit(*key).await?;
            unit_processors.push(cast(unit).ok_or(HayatError::TypeMismatch {
                key: *key,
                expected: "UnitPostProcessor",
            })?);
        }
        for processor in unit_processors {
            self.factory.add_unit_post_processor(processor);
        }

        for processor in &registry_processors {
            processor.post_process_unit_definition_registry(&self.registry).await?;
        }
        for processor in &factory_processors {
            processor.post_process_unit_factory(&self.factory).await?;
        }

        self.lifecycle.advance("initialize", LifecycleState::Initialized)
    }

    /// Pre-instantiates every eager singleton.
    ///
    /// `Initialized → Starting → Started`
    #[instrument(skip(self), fields(context = %self.display_name()))]
    pub async fn start(&self) -> Result<()> {
        self.lifecycle.advance("start", LifecycleState::Starting)?;
        self.factory.pre_instantiate_singletons().await?;
        self.lifecycle.advance("start", LifecycleState::Started)
    }

    /// Destroys every singleton that was constructed, then empties the
    /// singleton cache.
    ///
    /// Singletons first built by a destroy hook's parameters are destroyed
    /// in a later round, so each constructed singleton is destroyed once.
    ///
    /// `Started → Stopping → Stopped`
    #[instrument(skip(self), fields(context = %self.display_name()))]
    pub async fn stop(&self) -> Result<()> {
        self.lifecycle.advance("stop", LifecycleState::Stopping)?;

        let mut destroyed: HashSet<UnitKey> = HashSet::new();
        loop {
            let pending: HashSet<UnitKey> = self
                .factory
                .singletons()
                .registered_singletons()
                .into_iter()
                .map(|(key, _)| key)
                .filter(|key| !destroyed.contains(key))
                .collect();
            let order = destruction_order(
                &self.registry.unit_definitions(),
                &pending,
                self.settings.destruction_order,
            );
            if order.is_empty() {
                break;
            }

            info!(count = order.len(), order = ?self.settings.destruction_order, "Destroying singletons");
            for key in order {
                destroyed.insert(key);
                if let Some(unit) = self.factory.singletons().get_singleton(&key) {
                    self.factory.destroy_unit(key, unit).await?;
                }
            }
        }
        self.factory.singletons().clear();

        self.lifecycle.advance("stop", LifecycleState::Stopped)
    }

    // ── Resolution (Started only) ──

    /// Resolves one unit, locally or from the parent.
    pub async fn get_unit(&self, request: impl Into<UnitRequest>) -> Result<Unit> {
        self.lifecycle.require("get_unit", LifecycleState::Started)?;
        self.factory.get_unit(request).await
    }

    /// Typed form of [`get_unit`](Self::get_unit).
    pub async fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = UnitKey::of::<T>();
        downcast_unit(key, self.get_unit(key).await?)
    }

    /// Resolves the `T` registered under `name`.
    pub async fn get_named<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        let key = UnitKey::named::<T>(name);
        downcast_unit(key, self.get_unit(key).await?)
    }

    /// `true` if `key` resolves here or in an ancestor.
    pub fn contains_unit(&self, key: &UnitKey) -> bool {
        self.factory.contains_unit(key)
    }

    /// Runs the `pre_destroy` and `destroy` hooks of `unit`.
    ///
    /// The unit stays cached if it is a singleton.
    pub async fn destroy_unit(&self, key: UnitKey, unit: Unit) -> Result<()> {
        self.lifecycle.require("destroy_unit", LifecycleState::Started)?;
        self.factory.destroy_unit(key, unit).await
    }

    /// Typed form of [`destroy_unit`](Self::destroy_unit).
    pub async fn destroy<T: Send + Sync + 'static>(&self, unit: Arc<T>) -> Result<()> {
        self.destroy_unit(UnitKey::of::<T>(), unit).await
    }

    /// Calls `hook` on `instance` with its parameters resolved from this
    /// context.
    pub async fn invoke<T: Send + Sync + 'static>(&self, instance: Arc<T>, hook: &LifecycleHook) -> Result<()> {
        self.lifecycle.require("invoke", LifecycleState::Started)?;
        self.factory.invoke(UnitKey::of::<T>(), instance, hook).await
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnitResolver for Context {
    async fn resolve_unit(&self, request: UnitRequest) -> Result<Unit> {
        trace!(context = %self.display_name(), key = %request.key(), "Resolving for child context");
        self.get_unit(request).await
    }

    fn contains_unit(&self, key: &UnitKey) -> bool {
        Context::contains_unit(self, key)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.display_name())
            .field("state", &self.state())
            .field("definitions", &self.registry.len())
            .field("singletons", &self.factory.singletons().singleton_count())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// Everything needed to declare and run units.
pub mod prelude {
    pub use super::{Context, ContextBuilder, ContextHandle};
    pub use crate::definition::UnitDefinition;
    pub use crate::error::{HayatError, Result};
    pub use crate::factory::UnitFactory;
    pub use crate::key::{UnitKey, UnitRequest};
    pub use crate::lifecycle::LifecycleState;
    pub use crate::metadata::{Scannable, Stereotype, TypeMetadata, UnitMethod};
    pub use crate::postprocess::{
        PostProcessorRole, UnitDefinitionRegistryPostProcessor, UnitFactoryPostProcessor,
        UnitPostProcessor,
    };
    pub use crate::registry::UnitDefinitionRegistry;
    pub use crate::scope::Scope;
    pub use crate::settings::{ContextSettings, DestructionOrder};
    pub use crate::unit::{Arguments, Constructor, HookParameter, HookPhase, LifecycleHook, Unit};
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::metadata::UnitMethod;
    use crate::postprocess::PostProcessorRole;
    use crate::settings::DestructionOrder;
    use crate::unit::{Arguments, Constructor, HookParameter, HookPhase};

    // ── Fixtures ──

    struct Unregistered;

    #[derive(Debug, Default)]
    struct Arg;

    impl Scannable for Arg {
        fn metadata() -> TypeMetadata {
            TypeMetadata::default_constructed::<Arg>().singleton()
        }
    }

    #[derive(Default)]
    struct Calls {
        post_construct: AtomicU32,
        init: AtomicU32,
        pre_destroy: AtomicU32,
        destroy: AtomicU32,
        journal: Mutex<Vec<&'static str>>,
        args: Mutex<Vec<Arc<Arg>>>,
    }

    impl Calls {
        fn record(&self, counter: &AtomicU32, event: &'static str, arg: Arc<Arg>) {
            counter.fetch_add(1, Ordering::SeqCst);
            self.journal.lock().push(event);
            self.args.lock().push(arg);
        }
    }

    trait Tracked: Default + Send + Sync + 'static {
        fn calls(&self) -> &Calls;
    }

    macro_rules! tracked {
        ($($name:ident => $stereotype:ident),* $(,)?) => {$(
            #[derive(Default)]
            struct $name(Calls);

            impl Tracked for $name {
                fn calls(&self) -> &Calls {
                    &self.0
                }
            }

            impl Scannable for $name {
                fn metadata() -> TypeMetadata {
                    with_hooks::<$name>(TypeMetadata::default_constructed::<$name>().$stereotype())
                }
            }
        )*};
    }

    tracked! {
        Example => injectable,
        SingletonExample => singleton,
        ComponentExample => component,
        ServiceExample => service,
    }

    fn with_hooks<T: Tracked>(metadata: TypeMetadata) -> TypeMetadata {
        metadata
            .post_construct(
                LifecycleHook::new("post_construct", |unit: Arc<T>, args: Arguments| async move {
                    let arg = args.get::<Arg>(0)?;
                    unit.calls().record(&unit.calls().post_construct, "post_construct", arg);
                    Ok(())
                })
                .param::<Arg>(),
            )
            .init(
                LifecycleHook::new("init", |unit: Arc<T>, args: Arguments| async move {
                    let arg = args.get::<Arg>(0)?;
                    unit.calls().record(&unit.calls().init, "init", arg);
                    Ok(())
                })
                .param::<Arg>(),
            )
            .pre_destroy(
                LifecycleHook::new("pre_destroy", |unit: Arc<T>, args: Arguments| async move {
                    let arg = args.get::<Arg>(0)?;
                    unit.calls().record(&unit.calls().pre_destroy, "pre_destroy", arg);
                    Ok(())
                })
                .param::<Arg>(),
            )
            .destroy(
                LifecycleHook::new("destroy", |unit: Arc<T>, args: Arguments| async move {
                    let arg = args.get::<Arg>(0)?;
                    unit.calls().record(&unit.calls().destroy, "destroy", arg);
                    Ok(())
                })
                .param::<Arg>(),
            )
    }

    async fn started(context: Context) -> Context {
        context.initialize().await.unwrap();
        context.start().await.unwrap();
        context
    }

    /// A started parent holding `Arg` and a started child holding the examples.
    async fn parent_and_child() -> (Arc<Context>, Context) {
        let parent = Context::new();
        parent.scan::<Arg>().unwrap();
        let parent = Arc::new(started(parent).await);

        let child = Context::with_parent(parent.clone());
        child.scan::<Example>().unwrap();
        child.scan::<SingletonExample>().unwrap();
        child.scan::<ComponentExample>().unwrap();
        child.scan::<ServiceExample>().unwrap();

        (parent.clone(), started(child).await)
    }

    // ── Resolution ──

    #[tokio::test]
    async fn unregistered_units_are_not_found() {
        let (parent, child) = parent_and_child().await;

        let err = child.get_unit(UnitKey::of::<Unregistered>()).await.unwrap_err();
        assert!(err.is_no_such_unit_definition());

        for key in [
            UnitKey::of::<SingletonExample>(),
            UnitKey::of::<ComponentExample>(),
            UnitKey::of::<ServiceExample>(),
        ] {
            let err = parent.get_unit(key).await.unwrap_err();
            assert!(err.is_no_such_unit_definition(), "{key} should be unknown to the parent");
        }
    }

    #[tokio::test]
    async fn simple_units_are_new_each_time() {
        let (_parent, child) = parent_and_child().await;

        let a = child.get::<Example>().await.unwrap();
        let b = child.get::<Example>().await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        for example in [&a, &b] {
            assert_eq!(example.0.post_construct.load(Ordering::SeqCst), 1);
            assert_eq!(example.0.init.load(Ordering::SeqCst), 1);
            assert_eq!(*example.0.journal.lock(), vec!["post_construct", "init"]);
        }
    }

    #[tokio::test]
    async fn singleton_like_units_are_shared() {
        let (_parent, child) = parent_and_child().await;

        let a = child.get::<SingletonExample>().await.unwrap();
        let b = child.get::<SingletonExample>().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.0.init.load(Ordering::SeqCst), 1);

        let a = child.get::<ComponentExample>().await.unwrap();
        let b = child.get::<ComponentExample>().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let a = child.get::<ServiceExample>().await.unwrap();
        let b = child.get::<ServiceExample>().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn child_resolves_parent_singleton() {
        let (parent, child) = parent_and_child().await;

        let from_child = child.get::<Arg>().await.unwrap();
        let from_parent = parent.get::<Arg>().await.unwrap();

        assert!(Arc::ptr_eq(&from_child, &from_parent));
        assert!(child.contains_unit(&UnitKey::of::<Arg>()));
        assert!(!parent.contains_unit(&UnitKey::of::<Example>()));
        assert!(!child.factory().singletons().contains_singleton(&UnitKey::of::<Arg>()));

        // Hooks of child units receive the parent's instance too.
        let example = child.get::<Example>().await.unwrap();
        let received = example.0.args.lock().clone();
        assert_eq!(received.len(), 2);
        for arg in &received {
            assert!(Arc::ptr_eq(arg, &from_parent));
        }
    }

    #[tokio::test]
    async fn units_reach_their_shared_context_through_its_handle() {
        struct Reporter(Arc<ContextHandle>);

        let reporter = || {
            UnitDefinition::of::<Reporter>(Constructor::new(|args: Arguments| async move {
                Ok(Reporter(args.get::<ContextHandle>(0)?))
            }))
            .singleton()
            .depends_on::<ContextHandle>()
        };

        let parent = Context::shared();
        parent.register_unit_definition(reporter()).unwrap();
        parent.initialize().await.unwrap();
        parent.start().await.unwrap();

        let from_parent = parent.get::<Reporter>().await.unwrap();
        let upgraded = from_parent.0.upgrade().unwrap();
        assert!(Arc::ptr_eq(&upgraded, &parent));

        let child = Context::shared_child(parent.clone());
        child.register_unit_definition(reporter()).unwrap();
        child.initialize().await.unwrap();
        child.start().await.unwrap();

        let from_child = child.get::<Reporter>().await.unwrap();
        assert!(Arc::ptr_eq(&from_child.0.upgrade().unwrap(), &child));

        // Plain contexts carry no handle.
        assert!(!Context::new().contains_unit(&UnitKey::of::<ContextHandle>()));

        drop(upgraded);
        drop(from_child);
        let handle = child.get::<ContextHandle>().await.unwrap();
        drop(child);
        assert!(handle.upgrade().is_none());
    }

    #[tokio::test]
    async fn build_shared_registers_the_handle() {
        let context = Context::builder()
            .settings(ContextSettings::named("shared"))
            .scan::<Arg>()
            .build_shared()
            .unwrap();
        context.initialize().await.unwrap();
        context.start().await.unwrap();

        let handle = context.get::<ContextHandle>().await.unwrap();
        let upgraded = handle.upgrade().unwrap();
        assert!(Arc::ptr_eq(&upgraded, &context));
        assert_eq!(upgraded.settings().name.as_deref(), Some("shared"));
    }

    #[tokio::test]
    async fn destroy_unit_runs_hooks_on_that_instance_only() {
        let (_parent, child) = parent_and_child().await;

        let a = child.get::<Example>().await.unwrap();
        let b = child.get::<Example>().await.unwrap();
        child.destroy(a.clone()).await.unwrap();

        assert_eq!(a.0.pre_destroy.load(Ordering::SeqCst), 1);
        assert_eq!(a.0.destroy.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.pre_destroy.load(Ordering::SeqCst), 0);
        assert_eq!(b.0.destroy.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn named_units_resolve_by_qualifier() {
        let context = Context::new();
        context
            .register_unit_definition(
                UnitDefinition::of::<String>(Constructor::new(|_| async { Ok(String::from("primary")) }))
                    .singleton(),
            )
            .unwrap();
        context
            .register_unit_definition(
                UnitDefinition::new(
                    UnitKey::named::<String>("replica"),
                    Constructor::new(|_| async { Ok(String::from("replica")) }),
                )
                .singleton(),
            )
            .unwrap();
        let context = started(context).await;

        assert_eq!(context.get::<String>().await.unwrap().as_str(), "primary");
        assert_eq!(context.get_named::<String>("replica").await.unwrap().as_str(), "replica");
    }

    // ── Lifecycle states ──

    #[tokio::test]
    async fn get_unit_before_start_is_invalid() {
        let context = Context::new();
        context.scan::<Arg>().unwrap();

        let err = context.get::<Arg>().await.unwrap_err();
        assert!(err.is_invalid_state());

        context.initialize().await.unwrap();
        let err = context.get::<Arg>().await.unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(context.state(), LifecycleState::Initialized);
    }

    #[tokio::test]
    async fn scan_after_pending_is_invalid() {
        let context = Context::new();
        context.initialize().await.unwrap();

        let err = context.scan::<Arg>().unwrap_err();
        assert!(err.is_invalid_state());
        assert!(!context.contains_unit(&UnitKey::of::<Arg>()));
    }

    #[tokio::test]
    async fn phases_cannot_be_skipped_or_repeated() {
        let context = Context::new();
        assert!(context.start().await.unwrap_err().is_invalid_state());
        assert!(context.stop().await.unwrap_err().is_invalid_state());

        let context = started(context).await;
        assert!(context.initialize().await.unwrap_err().is_invalid_state());
        assert!(context.start().await.unwrap_err().is_invalid_state());

        context.stop().await.unwrap();
        assert_eq!(context.state(), LifecycleState::Stopped);
        assert!(context.get::<Arg>().await.unwrap_err().is_invalid_state());
    }

    #[tokio::test]
    async fn scanning_twice_keeps_one_definition_and_one_instance() {
        let context = Context::new();
        context.scan::<Arg>().unwrap();
        context.scan::<Arg>().unwrap();
        assert_eq!(context.registry().len(), 1);

        let context = started(context).await;
        assert_eq!(context.factory().singletons().singleton_count(), 1);
    }

    #[tokio::test]
    async fn start_skips_lazy_singletons() {
        #[derive(Default)]
        struct Pool;

        let context = Context::new();
        context
            .scan_metadata(TypeMetadata::default_constructed::<Pool>().service().lazy())
            .unwrap();
        let context = started(context).await;

        assert_eq!(context.factory().singletons().singleton_count(), 0);
        context.get::<Pool>().await.unwrap();
        assert_eq!(context.factory().singletons().singleton_count(), 1);
    }

    // ── Stop ──

    #[tokio::test]
    async fn stop_destroys_each_constructed_singleton_once() {
        let context = Context::new();
        context.scan::<Arg>().unwrap();
        context.scan::<SingletonExample>().unwrap();
        context.scan::<Example>().unwrap();
        let context = started(context).await;

        let singleton = context.get::<SingletonExample>().await.unwrap();
        let prototype = context.get::<Example>().await.unwrap();
        context.stop().await.unwrap();

        assert_eq!(singleton.0.pre_destroy.load(Ordering::SeqCst), 1);
        assert_eq!(singleton.0.destroy.load(Ordering::SeqCst), 1);
        assert_eq!(
            *singleton.0.journal.lock(),
            vec!["post_construct", "init", "pre_destroy", "destroy"]
        );
        assert_eq!(prototype.0.destroy.load(Ordering::SeqCst), 0);
        assert_eq!(context.factory().singletons().singleton_count(), 0);
    }

    #[tokio::test]
    async fn stop_destroys_singletons_first_built_by_destroy_hooks() {
        struct Owner;
        struct Cleaner;

        let built = Arc::new(AtomicU32::new(0));
        let destroyed = Arc::new(AtomicU32::new(0));
        let context = Context::new();

        let counter = built.clone();
        let closed = destroyed.clone();
        context
            .register_unit_definition(
                UnitDefinition::of::<Cleaner>(Constructor::new(move |_| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Cleaner)
                    }
                }))
                .singleton()
                .lazy(true)
                .with_hook(
                    HookPhase::Destroy,
                    LifecycleHook::new("close", move |_: Arc<Cleaner>, _| {
                        let closed = closed.clone();
                        async move {
                            closed.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    }),
                ),
            )
            .unwrap();
        context
            .register_unit_definition(
                UnitDefinition::of::<Owner>(Constructor::new(|_| async { Ok(Owner) }))
                    .singleton()
                    .with_hook(
                        HookPhase::Destroy,
                        LifecycleHook::new("release", |_: Arc<Owner>, _| async { Ok(()) })
                            .param::<Cleaner>(),
                    ),
            )
            .unwrap();

        let context = started(context).await;
        assert_eq!(built.load(Ordering::SeqCst), 0);

        context.stop().await.unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(context.factory().singletons().singleton_count(), 0);
    }

    #[tokio::test]
    async fn failed_start_keeps_singletons_built_so_far() {
        struct First;
        struct Second;

        let context = Context::new();
        context
            .register_unit_definition(
                UnitDefinition::of::<First>(Constructor::new(|_| async { Ok(First) })).singleton(),
            )
            .unwrap();
        context
            .register_unit_definition(
                UnitDefinition::of::<Second>(Constructor::new(|_| async {
                    Err::<Second, _>(HayatError::construction_failed(
                        UnitKey::of::<Second>(),
                        "connection refused",
                    ))
                }))
                .singleton(),
            )
            .unwrap();

        context.initialize().await.unwrap();
        let err = context.start().await.unwrap_err();

        assert!(matches!(err, HayatError::ConstructionFailed { .. }));
        assert!(err.to_string().contains("connection refused"));
        assert!(context.factory().singletons().contains_singleton(&UnitKey::of::<First>()));
        assert!(!context.factory().singletons().contains_singleton(&UnitKey::of::<Second>()));
        assert_eq!(context.state(), LifecycleState::Starting);
    }

    type Order = Arc<Mutex<Vec<&'static str>>>;

    struct Repository;
    struct Service;

    fn ordered_context(order: DestructionOrder, destroyed: Order) -> Context {
        let context = Context::with_settings(ContextSettings::named("ordered").with_destruction_order(order));

        let log = destroyed.clone();
        context
            .register_unit_definition(
                UnitDefinition::of::<Repository>(Constructor::new(|_| async { Ok(Repository) }))
                    .singleton()
                    .with_hook(
                        HookPhase::Destroy,
                        LifecycleHook::new("close", move |_: Arc<Repository>, _| {
                            let log = log.clone();
                            async move {
                                log.lock().push("repository");
                                Ok(())
                            }
                        }),
                    ),
            )
            .unwrap();

        let log = destroyed;
        context
            .register_unit_definition(
                UnitDefinition::of::<Service>(Constructor::new(|_| async { Ok(Service) }))
                    .singleton()
                    .depends_on::<Repository>()
                    .with_hook(
                        HookPhase::Destroy,
                        LifecycleHook::new("close", move |_: Arc<Service>, _| {
                            let log = log.clone();
                            async move {
                                log.lock().push("service");
                                Ok(())
                            }
                        }),
                    ),
            )
            .unwrap();

        context
    }

    #[tokio::test]
    async fn stop_follows_registration_order_by_default() {
        let destroyed = Order::default();
        let context = started(ordered_context(DestructionOrder::Registration, destroyed.clone())).await;
        context.stop().await.unwrap();

        assert_eq!(*destroyed.lock(), vec!["repository", "service"]);
    }

    #[tokio::test]
    async fn stop_can_destroy_dependents_first() {
        let destroyed = Order::default();
        let context = started(ordered_context(DestructionOrder::ReverseDependency, destroyed.clone())).await;
        context.stop().await.unwrap();

        assert_eq!(*destroyed.lock(), vec!["service", "repository"]);
    }

    // ── Post processors ──

    #[derive(Default)]
    struct Greeting(String);

    impl Scannable for Greeting {
        fn metadata() -> TypeMetadata {
            TypeMetadata::new::<Greeting>(Constructor::new(|_| async { Ok(Greeting("hello".into())) }))
                .component()
        }
    }

    #[derive(Default)]
    struct Shout;

    #[async_trait]
    impl UnitPostProcessor for Shout {
        async fn post_process_unit(&self, _key: &UnitKey, unit: Unit) -> Result<Unit> {
            match unit.downcast::<Greeting>() {
                Ok(greeting) => Ok(Arc::new(Greeting(greeting.0.to_uppercase())) as Unit),
                Err(unit) => Ok(unit),
            }
        }
    }

    impl Scannable for Shout {
        fn metadata() -> TypeMetadata {
            TypeMetadata::default_constructed::<Shout>()
                .component()
                .post_processor(PostProcessorRole::unit::<Shout>())
        }
    }

    /// Registers a `Greeting` override before anything is built.
    #[derive(Default)]
    struct Rewriter;

    #[async_trait]
    impl UnitDefinitionRegistryPostProcessor for Rewriter {
        async fn post_process_unit_definition_registry(&self, registry: &UnitDefinitionRegistry) -> Result<()> {
            registry.register_unit_definition(
                UnitDefinition::of::<Greeting>(Constructor::new(|_| async { Ok(Greeting("rewritten".into())) }))
                    .singleton(),
            );
            Ok(())
        }
    }

    /// Pre-registers a `u32` singleton on the factory.
    #[derive(Default)]
    struct Seeder;

    #[async_trait]
    impl UnitFactoryPostProcessor for Seeder {
        async fn post_process_unit_factory(&self, factory: &UnitFactory) -> Result<()> {
            factory.register_singleton(UnitKey::of::<u32>(), Arc::new(42u32));
            Ok(())
        }
    }

    #[tokio::test]
    async fn unit_post_processor_replaces_instances() {
        let context = Context::new();
        context.scan::<Greeting>().unwrap();
        context.scan::<Shout>().unwrap();
        let context = started(context).await;

        assert_eq!(context.get::<Greeting>().await.unwrap().0, "HELLO");
        assert_eq!(context.factory().unit_post_processor_count(), 1);
    }

    #[tokio::test]
    async fn registry_and_factory_processors_run_during_initialize() {
        let context = Context::new();
        context.scan::<Greeting>().unwrap();
        context
            .scan_metadata(
                TypeMetadata::default_constructed::<Rewriter>()
                    .post_processor(PostProcessorRole::definition_registry::<Rewriter>()),
            )
            .unwrap();
        context
            .scan_metadata(
                TypeMetadata::default_constructed::<Seeder>()
                    .post_processor(PostProcessorRole::factory::<Seeder>()),
            )
            .unwrap();

        context.initialize().await.unwrap();
        assert!(context.factory().singletons().contains_singleton(&UnitKey::of::<Rewriter>()));
        assert!(context.factory().singletons().contains_singleton(&UnitKey::of::<u32>()));
        assert!(!context.factory().singletons().contains_singleton(&UnitKey::of::<Greeting>()));

        context.start().await.unwrap();
        assert_eq!(context.get::<Greeting>().await.unwrap().0, "rewritten");
        assert_eq!(*context.get::<u32>().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn post_processor_with_wrong_role_fails_initialize() {
        let context = Context::new();
        context
            .scan_metadata(
                TypeMetadata::default_constructed::<Seeder>().post_processor(PostProcessorRole::unit::<Shout>()),
            )
            .unwrap();

        let err = context.initialize().await.unwrap_err();
        assert!(matches!(err, HayatError::TypeMismatch { expected: "UnitPostProcessor", .. }));
        assert_eq!(context.state(), LifecycleState::Initializing);
    }

    // ── Configuration units ──

    #[derive(Default)]
    struct Settings {
        port: u16,
    }

    struct Listener {
        port: u16,
    }

    struct AppConfiguration;

    impl Scannable for AppConfiguration {
        fn metadata() -> TypeMetadata {
            TypeMetadata::new::<AppConfiguration>(Constructor::new(|_| async { Ok(AppConfiguration) }))
                .configuration()
                .provides(
                    UnitMethod::new("settings", |_: Arc<AppConfiguration>, _: Arguments| async {
                        Ok(Settings { port: 8080 })
                    })
                    .singleton(),
                )
                .provides(
                    UnitMethod::new("listener", |_: Arc<AppConfiguration>, args: Arguments| async move {
                        let settings: Arc<Settings> = args.get(0)?;
                        Ok(Listener { port: settings.port })
                    })
                    .param::<Settings>(),
                )
        }
    }

    #[tokio::test]
    async fn configuration_units_are_built_from_unit_methods() {
        let context = Context::new();
        context.scan::<AppConfiguration>().unwrap();
        let context = started(context).await;

        let a = context.get::<Listener>().await.unwrap();
        let b = context.get::<Listener>().await.unwrap();
        assert_eq!(a.port, 8080);
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(
            &context.get::<Settings>().await.unwrap(),
            &context.get::<Settings>().await.unwrap()
        ));
    }

    // ── Invocation ──

    #[tokio::test]
    async fn invoke_resolves_method_parameters() {
        let context = Context::new();
        context.scan::<Arg>().unwrap();
        let context = started(context).await;

        let seen = Arc::new(AtomicU32::new(0));
        let counter = seen.clone();
        let hook = LifecycleHook::new("report", move |_: Arc<Example>, args: Arguments| {
            let counter = counter.clone();
            async move {
                args.get::<Arg>(0)?;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .param::<Arg>();

        context.invoke(Arc::new(Example::default()), &hook).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        let untyped = LifecycleHook::new("broken", |_: Arc<Example>, _| async { Ok(()) })
            .parameter(HookParameter::untyped("arg"));
        let err = context.invoke(Arc::new(Example::default()), &untyped).await.unwrap_err();
        assert!(matches!(err, HayatError::UnitResolution(_)));
    }

    // ── Builder ──

    #[tokio::test]
    async fn builder_applies_registrations() {
        let context = Context::builder()
            .settings(ContextSettings::named("built"))
            .scan::<Arg>()
            .scan::<Greeting>()
            .unit_post_processor(Arc::new(Shout))
            .build()
            .unwrap();

        assert_eq!(context.settings().name.as_deref(), Some("built"));
        assert_eq!(context.registry().len(), 2);

        let context = started(context).await;
        assert_eq!(context.get::<Greeting>().await.unwrap().0, "HELLO");
        assert!(format!("{context:?}").contains("built"));
    }
}

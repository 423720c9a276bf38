//! # The unit factory
//!
//! Resolves units: definition lookup, singleton cache, dependency
//! resolution, construction, post processing, lifecycle hooks, caching.
//!
//! ```text
//! resolve(key)
//!   ├─ cached singleton?            → return it
//!   ├─ no local definition?         → parent.resolve_unit(key)   (no local caching)
//!   ├─ key already in flight?       → CircularDependency
//!   ├─ resolve dependencies         → resolve(dep) for each, in order
//!   ├─ factory / constructor
//!   ├─ unit post processors         (each may replace the instance)
//!   ├─ post_construct, then init    (each with its own resolved parameters)
//!   └─ singleton?                   → cache
//! ```
//!
//! The factory does not know about lifecycle states; the owning
//! `Context` checks them before delegating here.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::definition::UnitDefinition;
use crate::error::{HayatError, NoSuchUnitDefinitionError, Result, UnitResolutionError};
use crate::graph::{ResolutionChain, WaitGraph};
use crate::key::{UnitKey, UnitRequest};
use crate::postprocess::UnitPostProcessor;
use crate::registry::UnitDefinitionRegistry;
use crate::singleton::SingletonRegistry;
use crate::unit::{Arguments, HookPhase, LifecycleHook, Unit};

/// Something units can be resolved from.
///
/// A factory delegates to its parent through this trait, which keeps the
/// factory independent of the `Context` type.
#[async_trait]
pub trait UnitResolver: Send + Sync {
    async fn resolve_unit(&self, request: UnitRequest) -> Result<Unit>;

    fn contains_unit(&self, key: &UnitKey) -> bool;
}

/// Builds, caches and destroys units for one context.
pub struct UnitFactory {
    registry: Arc<UnitDefinitionRegistry>,
    singletons: SingletonRegistry,
    /// One cell per singleton under construction. Concurrent first-time
    /// resolvers await the same cell instead of building twice.
    in_flight: DashMap<UnitKey, Arc<OnceCell<Unit>>>,
    /// Which chains are blocked on another chain's in-flight singleton.
    waits: WaitGraph,
    post_processors: RwLock<Vec<Arc<dyn UnitPostProcessor>>>,
    parent: Option<Arc<dyn UnitResolver>>,
}

impl UnitFactory {
    pub fn new(registry: Arc<UnitDefinitionRegistry>) -> Self {
        Self {
            registry,
            singletons: SingletonRegistry::new(),
            in_flight: DashMap::new(),
            waits: WaitGraph::default(),
            post_processors: RwLock::new(Vec::new()),
            parent: None,
        }
    }

    /// Creates a factory that falls back to `parent` for unknown keys.
    pub fn with_parent(registry: Arc<UnitDefinitionRegistry>, parent: Arc<dyn UnitResolver>) -> Self {
        Self { parent: Some(parent), ..Self::new(registry) }
    }

    pub fn registry(&self) -> &UnitDefinitionRegistry {
        &self.registry
    }

    pub fn singletons(&self) -> &SingletonRegistry {
        &self.singletons
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Appends a unit post processor. Runs after every processor added before it.
    pub fn add_unit_post_processor(&self, processor: Arc<dyn UnitPostProcessor>) {
        let mut processors = self.post_processors.write();
        processors.push(processor);
        debug!(count = processors.len(), "Added unit post processor");
    }

    pub fn unit_post_processor_count(&self) -> usize {
        self.post_processors.read().len()
    }

    /// Caches `unit` as the singleton for `key` without constructing anything.
    ///
    /// A pre-registered singleton is returned as-is: no post processing,
    /// no hooks.
    pub fn register_singleton(&self, key: UnitKey, unit: Unit) {
        self.singletons.register_singleton(key, unit);
    }

    /// `true` if `key` can be resolved here or in an ancestor.
    pub fn contains_unit(&self, key: &UnitKey) -> bool {
        self.registry.contains(key)
            || self.singletons.contains_singleton(key)
            || self.parent.as_ref().is_some_and(|p| p.contains_unit(key))
    }

    /// Resolves one unit with a fresh resolution chain.
    pub async fn get_unit(&self, request: impl Into<UnitRequest>) -> Result<Unit> {
        let chain = ResolutionChain::new();
        self.resolve(request.into().key(), &chain).await
    }

    /// Resolves `key` as part of `chain`.
    pub fn resolve<'a>(&'a self, key: UnitKey, chain: &'a ResolutionChain) -> BoxFuture<'a, Result<Unit>> {
        async move {
            if let Some(unit) = self.singletons.get_singleton(&key) {
                trace!(key = %key, "Singleton cache hit");
                return Ok(unit);
            }

            let Some(definition) = self.registry.find(&key) else {
                return match &self.parent {
                    Some(parent) => {
                        trace!(key = %key, "Delegating to parent context");
                        parent.resolve_unit(key.into()).await
                    }
                    None => Err(HayatError::NoSuchUnitDefinition(NoSuchUnitDefinitionError {
                        requested: key,
                        required_by: chain.current(),
                        suggestions: self.registry.suggestions(&key),
                    })),
                };
            };

            let chain = chain.enter(key)?;

            if definition.is_singleton() {
                self.resolve_singleton(&definition, &chain).await
            } else {
                self.create_unit(&definition, &chain).await
            }
        }
        .boxed()
    }

    async fn resolve_singleton(&self, definition: &UnitDefinition, chain: &ResolutionChain) -> Result<Unit> {
        let key = definition.key();

        let (cell, owned) = match self.in_flight.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                // A resolver that finished between our cache check and here
                // has already cached the instance and dropped its cell.
                if let Some(unit) = self.singletons.get_singleton(&key) {
                    return Ok(unit);
                }
                let cell = Arc::new(OnceCell::new());
                entry.insert(cell.clone());
                (cell, true)
            }
        };

        let _wait = if owned {
            None
        } else {
            trace!(key = %key, "Awaiting in-flight singleton");
            let path = chain.path();
            Some(self.waits.enter(&path[..path.len().saturating_sub(1)], key)?)
        };

        let result = cell
            .get_or_try_init(|| self.create_unit(definition, chain))
            .await
            .cloned();

        if let Ok(unit) = &result {
            if !self.singletons.contains_singleton(&key) {
                self.singletons.register_singleton(key, unit.clone());
            }
        }
        self.in_flight.remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));

        result
    }

    async fn create_unit(&self, definition: &UnitDefinition, chain: &ResolutionChain) -> Result<Unit> {
        let key = definition.key();
        let args = self.resolve_dependencies(definition.dependencies(), chain).await?;

        debug!(
            key = %key,
            scope = %definition.scope(),
            factory = definition.factory().is_some(),
            "Constructing unit"
        );
        let mut unit = definition.instantiator().call(args).await?;

        let processors: Vec<Arc<dyn UnitPostProcessor>> = self.post_processors.read().clone();
        for processor in processors {
            unit = processor.post_process_unit(&key, unit).await?;
        }

        for phase in [HookPhase::PostConstruct, HookPhase::Init] {
            if let Some(hook) = definition.hooks().get(phase) {
                trace!(key = %key, phase = %phase, hook = hook.name(), "Running lifecycle hook");
                self.invoke_hook(key, hook, unit.clone(), chain).await?;
            }
        }

        Ok(unit)
    }

    async fn resolve_dependencies(&self, keys: &[UnitKey], chain: &ResolutionChain) -> Result<Arguments> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push((*key, self.resolve(*key, chain).await?));
        }
        Ok(Arguments::new(values))
    }

    async fn invoke_hook(
        &self,
        key: UnitKey,
        hook: &LifecycleHook,
        unit: Unit,
        chain: &ResolutionChain,
    ) -> Result<()> {
        let mut values = Vec::with_capacity(hook.parameters().len());
        for (index, parameter) in hook.parameters().iter().enumerate() {
            let dependency = parameter.key().ok_or_else(|| {
                HayatError::UnitResolution(UnitResolutionError {
                    unit: key,
                    hook: hook.name().to_string(),
                    index,
                    parameter: parameter.name(),
                })
            })?;
            values.push((dependency, self.resolve(dependency, chain).await?));
        }

        hook.call(unit, Arguments::new(values)).await
    }

    /// Calls `hook` on `unit` with its parameters resolved from this factory.
    pub async fn invoke(&self, key: UnitKey, unit: Unit, hook: &LifecycleHook) -> Result<()> {
        trace!(key = %key, hook = hook.name(), "Invoking method");
        self.invoke_hook(key, hook, unit, &ResolutionChain::new()).await
    }

    /// Runs the `pre_destroy` then `destroy` hooks of `unit`.
    ///
    /// Does not evict the unit from the singleton cache.
    pub async fn destroy_unit(&self, key: UnitKey, unit: Unit) -> Result<()> {
        let definition = self.registry.get_unit_definition(&key)?;
        let chain = ResolutionChain::new();

        debug!(key = %key, "Destroying unit");
        for phase in [HookPhase::PreDestroy, HookPhase::Destroy] {
            if let Some(hook) = definition.hooks().get(phase) {
                trace!(key = %key, phase = %phase, hook = hook.name(), "Running lifecycle hook");
                self.invoke_hook(key, hook, unit.clone(), &chain).await?;
            }
        }
        Ok(())
    }

    /// Resolves every non-lazy singleton definition, in registration order.
    pub async fn pre_instantiate_singletons(&self) -> Result<()> {
        let definitions = self.registry.unit_definitions();
        let eager = definitions
            .iter()
            .filter(|(_, d)| d.is_singleton() && !d.is_lazy());

        for (key, _) in eager {
            self.get_unit(*key).await?;
        }

        debug!(count = self.singletons.singleton_count(), "Pre-instantiated singletons");
        Ok(())
    }
}

impl fmt::Debug for UnitFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitFactory")
            .field("definitions", &self.registry.len())
            .field("singletons", &self.singletons.singleton_count())
            .field("post_processors", &self.unit_post_processor_count())
            .field("has_parent", &self.has_parent())
            .finish()
    }
}

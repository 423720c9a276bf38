//! Type-erased units and the callables that build and manage them.
//!
//! A [`Unit`] is an `Arc<dyn Any + Send + Sync>`: singletons are shared
//! by cloning the `Arc`, and identity is `Arc::ptr_eq`. Constructors and
//! hooks are async closures that receive their dependencies already
//! resolved, in declaration order, as [`Arguments`].

use std::any::{Any, type_name};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

use crate::error::{HayatError, Result};
use crate::key::UnitKey;

/// A managed instance, type-erased.
pub type Unit = Arc<dyn Any + Send + Sync>;

/// Type-erased construction function.
///
/// # Why `Arc` and not `Box`?
/// Definitions are cloned out of the registry before every construction
/// so no lock is held while the constructor runs.
pub type ConstructFn = Arc<dyn Fn(Arguments) -> BoxFuture<'static, Result<Unit>> + Send + Sync>;

/// Type-erased lifecycle hook.
pub type HookFn = Arc<dyn Fn(Unit, Arguments) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Downcasts a unit to `Arc<T>`.
///
/// # Errors
/// [`HayatError::TypeMismatch`] if the unit is not a `T`.
pub fn downcast_unit<T: Send + Sync + 'static>(key: UnitKey, unit: Unit) -> Result<Arc<T>> {
    unit.downcast::<T>().map_err(|_| HayatError::TypeMismatch {
        key,
        expected: type_name::<T>(),
    })
}

/// Resolved dependencies handed to a constructor or hook, in declaration order.
#[derive(Clone, Default)]
pub struct Arguments {
    values: Vec<(UnitKey, Unit)>,
}

impl Arguments {
    pub fn new(values: Vec<(UnitKey, Unit)>) -> Self {
        Self { values }
    }

    /// Returns the argument at `index` as `Arc<T>`.
    ///
    /// ```rust,ignore
    /// Constructor::new(|args: Arguments| async move {
    ///     let clock: Arc<Clock> = args.get(0)?;
    ///     Ok(Scheduler { clock })
    /// })
    /// ```
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
        let (key, unit) = self.values.get(index).ok_or_else(|| {
            HayatError::construction_failed(
                UnitKey::of::<T>(),
                format!("no argument at position {index} ({} declared)", self.values.len()),
            )
        })?;
        downcast_unit(*key, unit.clone())
    }

    /// Returns the raw unit at `index`.
    pub fn unit(&self, index: usize) -> Option<&Unit> {
        self.values.get(index).map(|(_, unit)| unit)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Splits off the first argument.
    pub(crate) fn split_first(mut self) -> Option<(Unit, Arguments)> {
        if self.values.is_empty() {
            return None;
        }
        let (_, first) = self.values.remove(0);
        Some((first, self))
    }

    /// Keys of the arguments, in order.
    pub fn keys(&self) -> impl Iterator<Item = &UnitKey> {
        self.values.iter().map(|(key, _)| key)
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

/// How to build an instance from its resolved dependencies.
#[derive(Clone)]
pub struct Constructor {
    func: ConstructFn,
}

impl Constructor {
    /// Wraps an async closure producing a `T`.
    pub fn new<T, F, Fut>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let func: ConstructFn = Arc::new(move |args: Arguments| {
            let fut = f(args);
            async move { Ok::<_, HayatError>(Arc::new(fut.await?) as Unit) }.boxed()
        });
        Self { func }
    }

    /// Wraps an async closure that already returns a shared `Arc<T>`.
    pub fn shared<T, F, Fut>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>>> + Send + 'static,
    {
        let func: ConstructFn = Arc::new(move |args: Arguments| {
            let fut = f(args);
            async move { Ok::<_, HayatError>(fut.await? as Unit) }.boxed()
        });
        Self { func }
    }

    /// Builds `T` through its [`Default`] impl.
    pub fn from_default<T: Default + Send + Sync + 'static>() -> Self {
        Self::new(|_| future::ready(Ok(T::default())))
    }

    /// Wraps an already type-erased function.
    pub fn from_fn(func: ConstructFn) -> Self {
        Self { func }
    }

    pub(crate) fn call(&self, args: Arguments) -> BoxFuture<'static, Result<Unit>> {
        (self.func)(args)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Constructor(..)")
    }
}

/// One parameter of a lifecycle hook.
///
/// The key is optional: a metadata source that could not determine a
/// parameter's type produces an untyped parameter, and invoking the hook
/// fails with [`HayatError::UnitResolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookParameter {
    key: Option<UnitKey>,
    name: Option<&'static str>,
}

impl HookParameter {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self { key: Some(UnitKey::of::<T>()), name: None }
    }

    /// A parameter resolved from the unit registered as `T` under `qualifier`.
    pub fn qualified<T: ?Sized + 'static>(qualifier: &'static str) -> Self {
        Self { key: Some(UnitKey::named::<T>(qualifier)), name: None }
    }

    pub fn untyped(name: &'static str) -> Self {
        Self { key: None, name: Some(name) }
    }

    pub fn from_key(key: UnitKey) -> Self {
        Self { key: Some(key), name: None }
    }

    /// Attaches a parameter name used in diagnostics.
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn key(&self) -> Option<UnitKey> {
        self.key
    }

    pub fn name(&self) -> Option<&'static str> {
        self.name
    }
}

/// A method invoked on an instance with its own resolved parameters.
#[derive(Clone)]
pub struct LifecycleHook {
    name: String,
    parameters: Vec<HookParameter>,
    func: HookFn,
}

impl LifecycleHook {
    /// Creates a hook calling `f` on instances of `T`.
    ///
    /// ```rust,ignore
    /// LifecycleHook::new("warm_up", |cache: Arc<Cache>, args: Arguments| async move {
    ///     let clock: Arc<Clock> = args.get(0)?;
    ///     cache.warm_up(&clock);
    ///     Ok(())
    /// })
    /// .param::<Clock>()
    /// ```
    pub fn new<T, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let func: HookFn = Arc::new(move |unit: Unit, args: Arguments| match unit.downcast::<T>() {
            Ok(this) => f(this, args).boxed(),
            Err(_) => future::ready(Err(HayatError::TypeMismatch {
                key: UnitKey::of::<T>(),
                expected: type_name::<T>(),
            }))
            .boxed(),
        });

        Self { name: name.into(), parameters: Vec::new(), func }
    }

    /// Appends a parameter resolved as the unit of type `D`.
    pub fn param<D: ?Sized + 'static>(self) -> Self {
        self.parameter(HookParameter::of::<D>())
    }

    pub fn parameter(mut self, parameter: HookParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[HookParameter] {
        &self.parameters
    }

    pub(crate) fn call(&self, unit: Unit, args: Arguments) -> BoxFuture<'static, Result<()>> {
        (self.func)(unit, args)
    }
}

impl fmt::Debug for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHook")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// The four phases a unit can hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    PostConstruct,
    Init,
    PreDestroy,
    Destroy,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookPhase::PostConstruct => "post_construct",
            HookPhase::Init => "init",
            HookPhase::PreDestroy => "pre_destroy",
            HookPhase::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Declared lifecycle hooks of a unit.
#[derive(Debug, Clone, Default)]
pub struct LifecycleHooks {
    pub post_construct: Option<LifecycleHook>,
    pub init: Option<LifecycleHook>,
    pub pre_destroy: Option<LifecycleHook>,
    pub destroy: Option<LifecycleHook>,
}

impl LifecycleHooks {
    pub fn get(&self, phase: HookPhase) -> Option<&LifecycleHook> {
        match phase {
            HookPhase::PostConstruct => self.post_construct.as_ref(),
            HookPhase::Init => self.init.as_ref(),
            HookPhase::PreDestroy => self.pre_destroy.as_ref(),
            HookPhase::Destroy => self.destroy.as_ref(),
        }
    }

    pub fn set(&mut self, phase: HookPhase, hook: LifecycleHook) {
        let slot = match phase {
            HookPhase::PostConstruct => &mut self.post_construct,
            HookPhase::Init => &mut self.init,
            HookPhase::PreDestroy => &mut self.pre_destroy,
            HookPhase::Destroy => &mut self.destroy,
        };
        *slot = Some(hook);
    }

    /// Every declared hook with its phase.
    pub fn iter(&self) -> impl Iterator<Item = (HookPhase, &LifecycleHook)> {
        [
            HookPhase::PostConstruct,
            HookPhase::Init,
            HookPhase::PreDestroy,
            HookPhase::Destroy,
        ]
        .into_iter()
        .filter_map(|phase| self.get(phase).map(|hook| (phase, hook)))
    }
}

//! Post-processor pipeline.
//!
//! Three independent, ordered hook sequences:
//! - [`UnitDefinitionRegistryPostProcessor`]: runs once against the
//!   registry before any ordinary unit exists
//! - [`UnitFactoryPostProcessor`]: runs once against the factory
//! - [`UnitPostProcessor`]: runs on every freshly built instance
//!
//! Post processors are units themselves. A type declares its role with a
//! [`PostProcessorRole`], which knows how to view the type-erased unit
//! through the matching trait object.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::factory::UnitFactory;
use crate::key::UnitKey;
use crate::registry::UnitDefinitionRegistry;
use crate::unit::Unit;

/// May add, remove or rewrite definitions before instantiation starts.
#[async_trait]
pub trait UnitDefinitionRegistryPostProcessor: Send + Sync {
    async fn post_process_unit_definition_registry(
        &self,
        registry: &UnitDefinitionRegistry,
    ) -> Result<()>;
}

/// May add unit post processors or pre-register singletons.
#[async_trait]
pub trait UnitFactoryPostProcessor: Send + Sync {
    async fn post_process_unit_factory(&self, factory: &UnitFactory) -> Result<()>;
}

/// Sees every new instance right after construction.
///
/// The returned unit replaces the one passed in; return `unit` unchanged
/// to leave it alone.
#[async_trait]
pub trait UnitPostProcessor: Send + Sync {
    async fn post_process_unit(&self, key: &UnitKey, unit: Unit) -> Result<Unit>;
}

/// Views a type-erased unit as a registry post processor.
pub type RegistryProcessorCast =
    Arc<dyn Fn(Unit) -> Option<Arc<dyn UnitDefinitionRegistryPostProcessor>> + Send + Sync>;

/// Views a type-erased unit as a factory post processor.
pub type FactoryProcessorCast =
    Arc<dyn Fn(Unit) -> Option<Arc<dyn UnitFactoryPostProcessor>> + Send + Sync>;

/// Views a type-erased unit as a unit post processor.
pub type UnitProcessorCast = Arc<dyn Fn(Unit) -> Option<Arc<dyn UnitPostProcessor>> + Send + Sync>;

/// The pipeline a post-processor type participates in.
#[derive(Clone)]
pub enum PostProcessorRole {
    DefinitionRegistry(RegistryProcessorCast),
    Factory(FactoryProcessorCast),
    Unit(UnitProcessorCast),
}

impl PostProcessorRole {
    pub fn definition_registry<T: UnitDefinitionRegistryPostProcessor + 'static>() -> Self {
        Self::DefinitionRegistry(Arc::new(|unit: Unit| {
            unit.downcast::<T>()
                .ok()
                .map(|p| p as Arc<dyn UnitDefinitionRegistryPostProcessor>)
        }))
    }

    pub fn factory<T: UnitFactoryPostProcessor + 'static>() -> Self {
        Self::Factory(Arc::new(|unit: Unit| {
            unit.downcast::<T>().ok().map(|p| p as Arc<dyn UnitFactoryPostProcessor>)
        }))
    }

    pub fn unit<T: UnitPostProcessor + 'static>() -> Self {
        Self::Unit(Arc::new(|unit: Unit| {
            unit.downcast::<T>().ok().map(|p| p as Arc<dyn UnitPostProcessor>)
        }))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::DefinitionRegistry(_) => "definition-registry",
            Self::Factory(_) => "factory",
            Self::Unit(_) => "unit",
        }
    }
}

impl fmt::Debug for PostProcessorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PostProcessorRole({})", self.kind())
    }
}

/// Keys of scanned post-processor units, per pipeline, in scan order.
#[derive(Clone, Default)]
pub struct PostProcessorTypes {
    pub definition_registry: Vec<(UnitKey, RegistryProcessorCast)>,
    pub factory: Vec<(UnitKey, FactoryProcessorCast)>,
    pub unit: Vec<(UnitKey, UnitProcessorCast)>,
}

impl PostProcessorTypes {
    /// Records `key` in the pipeline named by `role`.
    ///
    /// Scanning the same type again keeps its original position.
    pub fn add(&mut self, key: UnitKey, role: &PostProcessorRole) {
        match role {
            PostProcessorRole::DefinitionRegistry(cast) => {
                upsert(&mut self.definition_registry, key, cast.clone())
            }
            PostProcessorRole::Factory(cast) => upsert(&mut self.factory, key, cast.clone()),
            PostProcessorRole::Unit(cast) => upsert(&mut self.unit, key, cast.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.definition_registry.len() + self.factory.len() + self.unit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn upsert<C>(entries: &mut Vec<(UnitKey, C)>, key: UnitKey, cast: C) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = cast,
        None => entries.push((key, cast)),
    }
}

impl fmt::Debug for PostProcessorTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn keys<C>(v: &[(UnitKey, C)]) -> Vec<UnitKey> {
            v.iter().map(|(k, _)| *k).collect()
        }

        f.debug_struct("PostProcessorTypes")
            .field("definition_registry", &keys(&self.definition_registry))
            .field("factory", &keys(&self.factory))
            .field("unit", &keys(&self.unit))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uppercase;

    #[async_trait]
    impl UnitPostProcessor for Uppercase {
        async fn post_process_unit(&self, _key: &UnitKey, unit: Unit) -> Result<Unit> {
            match unit.downcast::<String>() {
                Ok(s) => Ok(Arc::new(s.to_uppercase()) as Unit),
                Err(unit) => Ok(unit),
            }
        }
    }

    struct Noop;

    #[async_trait]
    impl UnitFactoryPostProcessor for Noop {
        async fn post_process_unit_factory(&self, _factory: &UnitFactory) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn role_casts_matching_unit() {
        let role = PostProcessorRole::unit::<Uppercase>();
        let PostProcessorRole::Unit(cast) = role else {
            panic!("wrong role");
        };

        let processor = cast(Arc::new(Uppercase)).expect("cast");
        let out = processor
            .post_process_unit(&UnitKey::of::<String>(), Arc::new(String::from("hi")))
            .await
            .unwrap();
        assert_eq!(out.downcast::<String>().ok().unwrap().as_str(), "HI");
    }

    #[test]
    fn role_rejects_other_types() {
        let PostProcessorRole::Factory(cast) = PostProcessorRole::factory::<Noop>() else {
            panic!("wrong role");
        };
        assert!(cast(Arc::new(Uppercase)).is_none());
    }

    #[test]
    fn types_are_deduplicated_in_order() {
        let mut types = PostProcessorTypes::default();
        types.add(UnitKey::of::<Uppercase>(), &PostProcessorRole::unit::<Uppercase>());
        types.add(UnitKey::of::<Noop>(), &PostProcessorRole::factory::<Noop>());
        types.add(UnitKey::of::<Uppercase>(), &PostProcessorRole::unit::<Uppercase>());

        assert_eq!(types.len(), 2);
        assert_eq!(types.unit.len(), 1);
        assert_eq!(types.factory[0].0, UnitKey::of::<Noop>());
    }
}

//! Definition readers: strategies that turn [`TypeMetadata`] into
//! unit definitions.
//!
//! A context consults every reader on each scan, in registration order.
//! The default set is:
//! 1. [`PostProcessorDefinitionReader`]
//! 2. [`ComponentDefinitionReader`]
//! 3. [`ConfigurationDefinitionReader`]
//!
//! Readers only describe; they write into a [`ScanResult`] which the
//! context then applies to its registry.

use tracing::trace;

use crate::definition::UnitDefinition;
use crate::key::UnitKey;
use crate::metadata::TypeMetadata;
use crate::postprocess::PostProcessorRole;
use crate::scope::Scope;

/// Produces definitions from a type's metadata.
pub trait UnitDefinitionReader: Send + Sync {
    fn read(&self, metadata: &TypeMetadata, sink: &mut ScanResult);

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// What one scan produced.
#[derive(Debug, Default)]
pub struct ScanResult {
    definitions: Vec<UnitDefinition>,
    post_processors: Vec<(UnitKey, PostProcessorRole)>,
}

impl ScanResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_unit_definition(&mut self, definition: UnitDefinition) {
        self.definitions.push(definition);
    }

    pub fn register_post_processor(&mut self, key: UnitKey, role: PostProcessorRole) {
        self.post_processors.push((key, role));
    }

    pub fn definitions(&self) -> &[UnitDefinition] {
        &self.definitions
    }

    pub fn post_processors(&self) -> &[(UnitKey, PostProcessorRole)] {
        &self.post_processors
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty() && self.post_processors.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<UnitDefinition>, Vec<(UnitKey, PostProcessorRole)>) {
        (self.definitions, self.post_processors)
    }
}

/// Registers post-processor types as singletons and records their roles.
#[derive(Debug, Default)]
pub struct PostProcessorDefinitionReader;

impl UnitDefinitionReader for PostProcessorDefinitionReader {
    fn read(&self, metadata: &TypeMetadata, sink: &mut ScanResult) {
        if !metadata.is_post_processor() {
            return;
        }

        sink.register_unit_definition(metadata.to_definition(Scope::Singleton));
        for role in metadata.post_processor_roles() {
            trace!(key = %metadata.key(), role = role.kind(), "Found post processor");
            sink.register_post_processor(metadata.key(), role.clone());
        }
    }

    fn name(&self) -> &str {
        "post-processor"
    }
}

/// One definition per component-like type.
///
/// Post processors are left to [`PostProcessorDefinitionReader`].
#[derive(Debug, Default)]
pub struct ComponentDefinitionReader;

impl UnitDefinitionReader for ComponentDefinitionReader {
    fn read(&self, metadata: &TypeMetadata, sink: &mut ScanResult) {
        if metadata.is_component() && !metadata.is_post_processor() {
            sink.register_unit_definition(metadata.to_definition(metadata.scope()));
        }
    }

    fn name(&self) -> &str {
        "component"
    }
}

/// The configuration singleton plus one definition per unit method.
#[derive(Debug, Default)]
pub struct ConfigurationDefinitionReader;

impl UnitDefinitionReader for ConfigurationDefinitionReader {
    fn read(&self, metadata: &TypeMetadata, sink: &mut ScanResult) {
        if !metadata.is_configuration() {
            return;
        }

        let configuration = metadata.key();
        sink.register_unit_definition(metadata.to_definition(Scope::Singleton));
        for method in metadata.unit_methods() {
            trace!(configuration = %configuration, method = method.name(), "Found unit method");
            sink.register_unit_definition(method.to_definition(configuration));
        }
    }

    fn name(&self) -> &str {
        "configuration"
    }
}

/// The readers every context starts with, in consultation order.
pub fn default_readers() -> Vec<Box<dyn UnitDefinitionReader>> {
    vec![
        Box::new(PostProcessorDefinitionReader),
        Box::new(ComponentDefinitionReader),
        Box::new(ConfigurationDefinitionReader),
    ]
}

//! Configuration for kiln builds, loaded from TOML.
//!
//! ```toml
//! [panache]
//! flavor = "reactive"          # "orm" | "reactive"
//! query_annotations = ["org.hibernate.annotations.processing.Find"]
//!
//! [storage]
//! class_name_prefix = "com.acme.StorageImpl__"
//!
//! [index]
//! missing_supertypes = "fail"  # "skip" | "fail"
//!
//! [logging]
//! level = "kiln.enhance=debug,info"
//! json = false
//! ```

#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::Once;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // Keep the message without the source snippet.
        ConfigError::Toml(err.message().to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KilnConfig {
    #[serde(default)]
    pub panache: PanacheConfig,

    #[serde(default)]
    pub templates: TemplateConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KilnConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::load_from_str(&text)?;
        tracing::debug!(target = "kiln.config", path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: KilnConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(accessor) = &self.panache.accessor {
            if accessor.name.is_empty() {
                return Err(ConfigError::Invalid("panache.accessor.name is empty".into()));
            }
            if !is_reference_descriptor(&accessor.descriptor) {
                return Err(ConfigError::Invalid(format!(
                    "panache.accessor.descriptor must be a reference descriptor, got {:?}",
                    accessor.descriptor
                )));
            }
        }
        if self.storage.class_name_prefix.is_empty() {
            return Err(ConfigError::Invalid("storage.class_name_prefix is empty".into()));
        }
        Ok(())
    }
}

fn is_reference_descriptor(desc: &str) -> bool {
    (desc.starts_with('L') && desc.ends_with(';') && desc.len() > 2)
        || (desc.starts_with('[') && desc.len() > 1)
}

/// Which persistence runtime the synthesized bodies talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    #[default]
    Orm,
    Reactive,
}

/// The accessor producing the session handle passed as leading argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Accessor {
    pub name: String,
    /// Return descriptor, e.g. `Ljakarta/persistence/EntityManager;`.
    pub descriptor: String,
}

impl Accessor {
    pub fn method_descriptor(&self) -> String {
        format!("(){}", self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanacheConfig {
    #[serde(default)]
    pub flavor: Flavor,

    /// Overrides the accessor implied by `flavor`.
    #[serde(default)]
    pub accessor: Option<Accessor>,

    /// Annotations marking native methods that get a delegating body.
    #[serde(default = "PanacheConfig::default_query_annotations")]
    pub query_annotations: Vec<String>,

    #[serde(default = "PanacheConfig::default_entity_base")]
    pub entity_base: String,

    #[serde(default = "PanacheConfig::default_repository_contract")]
    pub repository_contract: String,

    #[serde(default = "PanacheConfig::default_generate_bridge_annotation")]
    pub generate_bridge_annotation: String,

    /// Class holding the static operations bridges delegate to.
    #[serde(default = "PanacheConfig::default_operations_class")]
    pub operations_class: String,

    /// Suffix of the generated metamodel class holding query implementations.
    #[serde(default = "PanacheConfig::default_metamodel_suffix")]
    pub metamodel_suffix: String,
}

impl PanacheConfig {
    fn default_query_annotations() -> Vec<String> {
        ["Find", "HQL", "SQL"]
            .iter()
            .map(|a| format!("org.hibernate.annotations.processing.{a}"))
            .collect()
    }

    fn default_entity_base() -> String {
        "io.quarkus.hibernate.orm.panache.PanacheEntityBase".to_owned()
    }

    fn default_repository_contract() -> String {
        "io.quarkus.hibernate.orm.panache.PanacheRepositoryBase".to_owned()
    }

    fn default_generate_bridge_annotation() -> String {
        "io.quarkus.panache.common.impl.GenerateBridge".to_owned()
    }

    fn default_operations_class() -> String {
        "io.quarkus.hibernate.orm.panache.runtime.JpaOperations".to_owned()
    }

    fn default_metamodel_suffix() -> String {
        "_".to_owned()
    }

    /// The configured accessor, or the one implied by the flavor.
    pub fn accessor(&self) -> Accessor {
        if let Some(accessor) = &self.accessor {
            return accessor.clone();
        }
        match self.flavor {
            Flavor::Orm => Accessor {
                name: "getEntityManager".to_owned(),
                descriptor: "Ljakarta/persistence/EntityManager;".to_owned(),
            },
            Flavor::Reactive => Accessor {
                name: "getSession".to_owned(),
                descriptor: "Lorg/hibernate/reactive/mutiny/Mutiny$Session;".to_owned(),
            },
        }
    }

    pub fn is_query_annotation(&self, annotation: &str) -> bool {
        self.query_annotations.iter().any(|a| a == annotation)
    }
}

impl Default for PanacheConfig {
    fn default() -> Self {
        Self {
            flavor: Flavor::default(),
            accessor: None,
            query_annotations: Self::default_query_annotations(),
            entity_base: Self::default_entity_base(),
            repository_contract: Self::default_repository_contract(),
            generate_bridge_annotation: Self::default_generate_bridge_annotation(),
            operations_class: Self::default_operations_class(),
            metamodel_suffix: Self::default_metamodel_suffix(),
        }
    }
}

/// Converts template instances into a specialised instance type, for
/// templates declared to return `instance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateAdapter {
    pub instance: String,
    /// Class with a `(Lio/quarkus/qute/TemplateInstance;)V` constructor.
    pub wrapper: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    #[serde(default = "TemplateConfig::default_checked_template_annotation")]
    pub checked_template_annotation: String,

    #[serde(default = "TemplateConfig::default_template_instance")]
    pub template_instance: String,

    #[serde(default)]
    pub adapters: Vec<TemplateAdapter>,
}

impl TemplateConfig {
    fn default_checked_template_annotation() -> String {
        "io.quarkus.qute.CheckedTemplate".to_owned()
    }

    fn default_template_instance() -> String {
        "io.quarkus.qute.TemplateInstance".to_owned()
    }

    pub fn adapter_for(&self, instance: &str) -> Option<&TemplateAdapter> {
        self.adapters.iter().find(|a| a.instance == instance)
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            checked_template_annotation: Self::default_checked_template_annotation(),
            template_instance: Self::default_template_instance(),
            adapters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_declaration")]
    pub declaration: String,

    /// Interface implemented by threads carrying a context array.
    #[serde(default = "StorageConfig::default_thread_class")]
    pub thread_class: String,

    #[serde(default = "StorageConfig::default_context_method")]
    pub context_method: String,

    #[serde(default = "StorageConfig::default_class_name_prefix")]
    pub class_name_prefix: String,
}

impl StorageConfig {
    fn default_declaration() -> String {
        "io.smallrye.context.storage.spi.StorageDeclaration".to_owned()
    }

    fn default_thread_class() -> String {
        "io.quarkus.runtime.storage.QuarkusThread".to_owned()
    }

    fn default_context_method() -> String {
        "getQuarkusThreadContext".to_owned()
    }

    fn default_class_name_prefix() -> String {
        "io.quarkus.deployment.storage.QuarkusStorageImpl__".to_owned()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            declaration: Self::default_declaration(),
            thread_class: Self::default_thread_class(),
            context_method: Self::default_context_method(),
            class_name_prefix: Self::default_class_name_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingSupertypes {
    #[default]
    Skip,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Whether resolution fails when a supertype is not indexed.
    #[serde(default)]
    pub missing_supertypes: MissingSupertypes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter; `RUST_LOG`, when set, is merged after the
    /// configured directives.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs the global `fmt` subscriber writing to stderr. Later calls are
/// no-ops.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false);
        // Another global subscriber (e.g. installed by a test harness) wins.
        if config.json {
            let _ = builder.json().try_init();
        } else {
            let _ = builder.try_init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_directives_are_normalized() {
        assert_eq!(LoggingConfig::normalize_level_directives(" WARNING "), "warn");
        assert_eq!(LoggingConfig::normalize_level_directives(""), "info");
        assert_eq!(
            LoggingConfig::normalize_level_directives("kiln.enhance=debug"),
            "kiln.enhance=debug"
        );
    }

    #[test]
    fn accessor_follows_flavor_unless_overridden() {
        let mut panache = PanacheConfig::default();
        assert_eq!(panache.accessor().name, "getEntityManager");
        assert_eq!(
            panache.accessor().method_descriptor(),
            "()Ljakarta/persistence/EntityManager;"
        );

        panache.flavor = Flavor::Reactive;
        assert_eq!(panache.accessor().name, "getSession");

        panache.accessor = Some(Accessor {
            name: "session".into(),
            descriptor: "Lcom/acme/Session;".into(),
        });
        assert_eq!(panache.accessor().method_descriptor(), "()Lcom/acme/Session;");
    }

    #[test]
    fn reference_descriptors() {
        assert!(is_reference_descriptor("Ljava/lang/Object;"));
        assert!(is_reference_descriptor("[I"));
        assert!(!is_reference_descriptor("I"));
        assert!(!is_reference_descriptor("L;"));
    }
}

//! One enhancement build: which enhancers run on which class, and the
//! all-or-nothing hand-off to a [`ClassOutput`].

use std::collections::BTreeMap;
use std::sync::Arc;

use kiln_classfile::ClassFile;
use kiln_config::KilnConfig;
use kiln_index::IndexView;
use kiln_types::ClassName;

use crate::dispatch::{ClassEnhancer, EnhanceContext};
use crate::error::{BuildError, EnhanceError};
use crate::output::ClassOutput;
use crate::panache::{EntityEnhancer, RepositoryEnhancer};
use crate::storage::StorageRegistry;
use crate::template::discover_templates;

/// A class ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enhanced {
    pub name: ClassName,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub enhanced: usize,
    pub generated: usize,
}

pub struct Build<'a> {
    cx: EnhanceContext<'a>,
    enhancers: BTreeMap<ClassName, Vec<Arc<dyn ClassEnhancer>>>,
    storage: StorageRegistry,
}

impl<'a> Build<'a> {
    /// Selects enhancers for every class of `index` and assigns storage
    /// slots.
    pub fn new(index: &'a (dyn IndexView + Sync), config: &'a KilnConfig) -> Result<Self, BuildError> {
        let cx = EnhanceContext::new(index, config);
        let mut build = Self {
            cx,
            enhancers: BTreeMap::new(),
            storage: StorageRegistry::default(),
        };

        let entity: Arc<dyn ClassEnhancer> = Arc::new(EntityEnhancer);
        for class in index.all_known_subclasses(&config.panache.entity_base) {
            build.register(class.name.clone(), Arc::clone(&entity));
        }
        let repository: Arc<dyn ClassEnhancer> = Arc::new(RepositoryEnhancer);
        for class in index.all_known_implementors(&config.panache.repository_contract) {
            build.register(class.name.clone(), Arc::clone(&repository));
        }

        let templates = discover_templates(index, &config.templates).map_err(|err| {
            BuildError::new(
                ClassName::new(config.templates.checked_template_annotation.as_str()),
                "checked-template",
                err,
            )
        })?;
        for (class, enhancer) in templates.native {
            build.register(class, Arc::new(enhancer));
        }
        for (class, enhancer) in templates.records {
            build.register(class, Arc::new(enhancer));
        }

        build.storage = StorageRegistry::build(&cx).map_err(|err| {
            let class = match &err {
                EnhanceError::StorageValidation { class } => class.clone(),
                _ => ClassName::new(config.storage.declaration.as_str()),
            };
            BuildError::new(class, "storage", err)
        })?;

        tracing::info!(
            target = "kiln.enhance",
            classes = build.enhancers.len(),
            storage_slots = build.storage.slot_count(),
            "planned build"
        );
        Ok(build)
    }

    pub fn context(&self) -> &EnhanceContext<'a> {
        &self.cx
    }

    pub fn register(&mut self, class: ClassName, enhancer: Arc<dyn ClassEnhancer>) {
        self.enhancers.entry(class).or_default().push(enhancer);
    }

    /// Names of the enhancers that run on `class`, in order.
    pub fn enhancers_for(&self, class: &str) -> Vec<&str> {
        self.enhancers
            .get(class)
            .map(|list| list.iter().map(|e| e.name()).collect())
            .unwrap_or_default()
    }

    pub fn selected(&self) -> impl Iterator<Item = &ClassName> {
        self.enhancers.keys()
    }

    pub fn storage(&self) -> &StorageRegistry {
        &self.storage
    }

    /// Runs every enhancer registered for the class in `bytes`; `None` when
    /// the class is not selected.
    pub fn enhance_class(&self, bytes: &[u8]) -> Result<Option<Enhanced>, BuildError> {
        let mut class = ClassFile::parse(bytes)
            .map_err(|err| BuildError::new(ClassName::new("<unknown>"), "reader", err.into()))?;
        let name = ClassName::new(class.this_class.as_str());
        let Some(enhancers) = self.enhancers.get(&name) else {
            return Ok(None);
        };
        for enhancer in enhancers {
            enhancer
                .enhance(&self.cx, &mut class)
                .map_err(|err| BuildError::new(name.clone(), enhancer.name(), err))?;
        }
        let bytes = class
            .to_bytes()
            .map_err(|err| BuildError::new(name.clone(), "writer", err.into()))?;
        tracing::debug!(target = "kiln.enhance", class = %name, "enhanced class");
        Ok(Some(Enhanced { name, bytes }))
    }

    /// The storage shims of this build.
    pub fn generated_classes(&self) -> Result<Vec<Enhanced>, BuildError> {
        let shims = self.storage.generate_shims().map_err(|err| {
            BuildError::new(
                ClassName::new(self.cx.config.storage.declaration.as_str()),
                "storage",
                err,
            )
        })?;
        shims
            .into_iter()
            .map(|(name, class)| {
                let bytes = class
                    .to_bytes()
                    .map_err(|err| BuildError::new(name.clone(), "writer", err.into()))?;
                Ok(Enhanced { name, bytes })
            })
            .collect()
    }

    /// Adds the generated classes to `enhanced` and writes everything.
    pub fn finish(
        &self,
        enhanced: Vec<Enhanced>,
        output: &dyn ClassOutput,
    ) -> Result<BuildSummary, BuildError> {
        let generated = self.generated_classes()?;
        let summary = BuildSummary {
            enhanced: enhanced.len(),
            generated: generated.len(),
        };
        for class in enhanced.iter().chain(&generated) {
            output
                .write(&class.name, &class.bytes)
                .map_err(|err| BuildError::new(class.name.clone(), "output", err))?;
        }
        tracing::info!(
            target = "kiln.enhance",
            enhanced = summary.enhanced,
            generated = summary.generated,
            "build finished"
        );
        Ok(summary)
    }

    /// Enhances `classes` one after another; nothing is written unless every
    /// class succeeds.
    pub fn run(&self, classes: &[Vec<u8>], output: &dyn ClassOutput) -> Result<BuildSummary, BuildError> {
        let enhanced = classes
            .iter()
            .filter_map(|bytes| self.enhance_class(bytes).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        self.finish(enhanced, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_index::{ClassInfo, Indexer};
    use kiln_types::{TypeRef, TypeVariable};

    #[test]
    fn selection_follows_configured_roots() {
        let config = KilnConfig::default();
        let mut indexer = Indexer::new();
        indexer.add(ClassInfo::new(config.panache.entity_base.as_str()));
        indexer.add(ClassInfo::new("app.Book").extends(TypeRef::class(config.panache.entity_base.as_str())));
        indexer.add(
            ClassInfo::interface(config.panache.repository_contract.as_str()).with_type_parameters(vec![
                TypeVariable::unbounded("Entity"),
                TypeVariable::unbounded("Id"),
            ]),
        );
        indexer.add(ClassInfo::new("app.BookRepository").implements(TypeRef::parameterized(
            config.panache.repository_contract.as_str(),
            vec![TypeRef::class("app.Book"), TypeRef::class("java.lang.Long")],
        )));
        indexer.add(ClassInfo::new("app.Unrelated"));
        let index = indexer.complete();

        let build = Build::new(&index, &config).unwrap();
        assert_eq!(build.enhancers_for("app.Book"), vec!["panache-entity"]);
        assert_eq!(build.enhancers_for("app.BookRepository"), vec!["panache-repository"]);
        assert!(build.enhancers_for("app.Unrelated").is_empty());
        assert_eq!(build.storage().slot_count(), 0);
    }

    #[test]
    fn unselected_classes_pass_through() {
        let config = KilnConfig::default();
        let index = Indexer::new().complete();
        let build = Build::new(&index, &config).unwrap();

        let class = ClassFile::new(0x21, "app/Plain", Some("java/lang/Object"));
        let bytes = class.to_bytes().unwrap();
        assert_eq!(build.enhance_class(&bytes).unwrap(), None);

        let err = build.enhance_class(&[0xCA, 0xFE]).unwrap_err();
        assert_eq!(err.enhancer, "reader");
    }
}

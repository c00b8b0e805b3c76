use std::collections::{BTreeSet, HashMap, VecDeque};

use kiln_classfile::ClassFile;
use kiln_types::{ClassName, TypeRef};

use crate::error::IndexError;
use crate::info::{ClassInfo, MethodInfo};

/// Read-only queries over a whole-program class index.
pub trait IndexView {
    fn class_by_name(&self, name: &str) -> Option<&ClassInfo>;

    /// Classes and interfaces naming `name` as direct superclass or
    /// interface, sorted by name.
    fn direct_subtypes(&self, name: &str) -> Vec<&ClassInfo>;

    /// Every indexed class, sorted by name.
    fn classes(&self) -> Vec<&ClassInfo>;

    fn interfaces_of(&self, name: &str) -> Option<&[TypeRef]> {
        self.class_by_name(name).map(|c| c.interfaces.as_slice())
    }

    fn superclass_of(&self, name: &str) -> Option<&TypeRef> {
        self.class_by_name(name).and_then(|c| c.super_class.as_ref())
    }

    fn type_parameters_of(&self, name: &str) -> Option<&[kiln_types::TypeVariable]> {
        self.class_by_name(name).map(|c| c.type_parameters.as_slice())
    }

    fn find_method(&self, class: &str, method: &str, parameters: &[TypeRef]) -> Option<&MethodInfo> {
        self.class_by_name(class)?.method(method, parameters)
    }

    fn is_interface(&self, name: &str) -> bool {
        self.class_by_name(name).is_some_and(ClassInfo::is_interface)
    }

    /// Non-interface classes implementing `interface` directly or through
    /// subinterfaces and subclasses.
    fn all_known_implementors(&self, interface: &str) -> Vec<&ClassInfo> {
        let mut seen = BTreeSet::new();
        let mut found: Vec<&ClassInfo> = Vec::new();
        let mut queue = VecDeque::from([interface.to_string()]);
        while let Some(current) = queue.pop_front() {
            for sub in self.direct_subtypes(&current) {
                if !seen.insert(sub.name.clone()) {
                    continue;
                }
                if !sub.is_interface() {
                    found.push(sub);
                }
                queue.push_back(sub.name.to_string());
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    fn all_known_subclasses(&self, class: &str) -> Vec<&ClassInfo> {
        let mut seen = BTreeSet::new();
        let mut found: Vec<&ClassInfo> = Vec::new();
        let mut queue = VecDeque::from([class.to_string()]);
        while let Some(current) = queue.pop_front() {
            for sub in self.direct_subtypes(&current) {
                if sub.is_interface() || sub.super_name().map(ClassName::as_str) != Some(current.as_str()) {
                    continue;
                }
                if !seen.insert(sub.name.clone()) {
                    continue;
                }
                found.push(sub);
                queue.push_back(sub.name.to_string());
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }
}

/// A frozen index snapshot. Built once by an [`Indexer`]; never mutated.
#[derive(Debug, Clone, Default)]
pub struct Index {
    classes: HashMap<ClassName, ClassInfo>,
    subtypes: HashMap<ClassName, Vec<ClassName>>,
}

impl Index {
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl IndexView for Index {
    fn class_by_name(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    fn direct_subtypes(&self, name: &str) -> Vec<&ClassInfo> {
        self.subtypes
            .get(name)
            .map(|names| names.iter().filter_map(|n| self.classes.get(n)).collect())
            .unwrap_or_default()
    }

    fn classes(&self) -> Vec<&ClassInfo> {
        let mut all: Vec<&ClassInfo> = self.classes.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

impl<T: IndexView + ?Sized> IndexView for &T {
    fn class_by_name(&self, name: &str) -> Option<&ClassInfo> {
        (**self).class_by_name(name)
    }

    fn direct_subtypes(&self, name: &str) -> Vec<&ClassInfo> {
        (**self).direct_subtypes(name)
    }

    fn classes(&self) -> Vec<&ClassInfo> {
        (**self).classes()
    }
}

#[derive(Debug, Default)]
pub struct Indexer {
    classes: HashMap<ClassName, ClassInfo>,
}

impl Indexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and indexes one class file, returning its name.
    pub fn index_class(&mut self, bytes: &[u8]) -> Result<ClassName, IndexError> {
        let class = ClassFile::parse(bytes)?;
        self.index_class_file(&class)
    }

    pub fn index_class_file(&mut self, class: &ClassFile) -> Result<ClassName, IndexError> {
        let info = ClassInfo::from_class_file(class)?;
        let name = info.name.clone();
        self.add(info);
        Ok(name)
    }

    /// Adds a class; a later definition of the same name replaces the
    /// earlier one.
    pub fn add(&mut self, info: ClassInfo) {
        if let Some(previous) = self.classes.insert(info.name.clone(), info) {
            tracing::warn!(
                target = "kiln.index",
                class = %previous.name,
                "class indexed twice; keeping the later definition"
            );
        }
    }

    pub fn complete(self) -> Index {
        let mut subtypes: HashMap<ClassName, Vec<ClassName>> = HashMap::new();
        for info in self.classes.values() {
            for parent in info.super_name().into_iter().chain(info.interface_names()) {
                subtypes.entry(parent.clone()).or_default().push(info.name.clone());
            }
        }
        for children in subtypes.values_mut() {
            children.sort();
            children.dedup();
        }
        tracing::debug!(
            target = "kiln.index",
            classes = self.classes.len(),
            "index complete"
        );
        Index {
            classes: self.classes,
            subtypes,
        }
    }
}

impl FromIterator<ClassInfo> for Index {
    fn from_iter<T: IntoIterator<Item = ClassInfo>>(iter: T) -> Self {
        let mut indexer = Indexer::new();
        for info in iter {
            indexer.add(info);
        }
        indexer.complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(classes: Vec<&ClassInfo>) -> Vec<&str> {
        classes.into_iter().map(|c| c.name.as_str()).collect()
    }

    fn sample() -> Index {
        [
            ClassInfo::interface("a.Storage"),
            ClassInfo::interface("a.SubStorage").implements(TypeRef::class("a.Storage")),
            ClassInfo::new("a.Direct").implements(TypeRef::class("a.Storage")),
            ClassInfo::new("a.ViaInterface").implements(TypeRef::class("a.SubStorage")),
            ClassInfo::new("a.ViaSuper").extends(TypeRef::class("a.Direct")),
            ClassInfo::new("a.Unrelated"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn implementors_are_transitive_and_sorted() {
        let index = sample();
        assert_eq!(
            names(index.all_known_implementors("a.Storage")),
            vec!["a.Direct", "a.ViaInterface", "a.ViaSuper"]
        );
        assert_eq!(names(index.all_known_subclasses("a.Direct")), vec!["a.ViaSuper"]);
        assert!(index.all_known_implementors("a.Missing").is_empty());
    }

    /// A view over two overlapping class sets that reports shared
    /// subtypes once per set.
    struct Overlapping(Index);

    impl IndexView for Overlapping {
        fn class_by_name(&self, name: &str) -> Option<&ClassInfo> {
            self.0.class_by_name(name)
        }

        fn direct_subtypes(&self, name: &str) -> Vec<&ClassInfo> {
            let once = self.0.direct_subtypes(name);
            once.iter().chain(once.iter()).copied().collect()
        }

        fn classes(&self) -> Vec<&ClassInfo> {
            self.0.classes()
        }
    }

    #[test]
    fn repeated_subtypes_are_reported_once() {
        let view = Overlapping(sample());
        assert_eq!(names(view.all_known_subclasses("a.Direct")), vec!["a.ViaSuper"]);
        assert_eq!(
            names(view.all_known_implementors("a.Storage")),
            vec!["a.Direct", "a.ViaInterface", "a.ViaSuper"]
        );
    }

    #[test]
    fn queries_by_name() {
        let index = sample();
        assert_eq!(index.len(), 6);
        assert!(index.is_interface("a.SubStorage"));
        assert!(!index.is_interface("a.Direct"));
        assert_eq!(
            index.interfaces_of("a.SubStorage"),
            Some(&[TypeRef::class("a.Storage")][..])
        );
        assert_eq!(index.superclass_of("a.ViaSuper"), Some(&TypeRef::class("a.Direct")));
        assert!(index.class_by_name("java.lang.Object").is_none());
        assert_eq!(names(index.classes()).first(), Some(&"a.Direct"));
    }
}

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A binary class name in dotted form (`java.util.Map$Entry`).
///
/// Internal names (`java/util/Map$Entry`) are accepted on construction and
/// normalized, so both spellings compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassName(String);

impl ClassName {
    pub const OBJECT: &'static str = "java.lang.Object";

    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.contains('/') {
            Self(name.replace('/', "."))
        } else {
            Self(name)
        }
    }

    pub fn object() -> Self {
        Self(Self::OBJECT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_object(&self) -> bool {
        self.0 == Self::OBJECT
    }

    /// `java/lang/String`
    pub fn internal_name(&self) -> String {
        self.0.replace('.', "/")
    }

    /// `Ljava/lang/String;`
    pub fn descriptor(&self) -> String {
        format!("L{};", self.internal_name())
    }

    pub fn package(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(pkg, _)| pkg)
    }

    /// Name without the package, inner-class separators kept.
    pub fn simple_name(&self) -> &str {
        self.0.rsplit_once('.').map_or(self.0.as_str(), |(_, simple)| simple)
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClassName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Borrow<str> for ClassName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ClassName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

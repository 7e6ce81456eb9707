//! Document paths
//!
//! A path names an attribute of the record shape, possibly nested. Each
//! segment compiles to its own name placeholder, joined with `.` in the
//! emitted expression.

/// An attribute path: one segment for a top-level field, more for nested
/// map access.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// A top-level field.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Descend into a nested map attribute.
    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.segments.push(name.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Dotted display form, used in error messages.
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self {
            segments: s.split('.').map(str::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_and_child() {
        let p = Path::field("meta").child("owner");
        assert_eq!(p.segments(), &["meta".to_string(), "owner".to_string()]);
        assert_eq!(p.dotted(), "meta.owner");
    }

    #[test]
    fn test_from_dotted_str() {
        let p = Path::from("a.b.c");
        assert_eq!(p.segments().len(), 3);
        assert_eq!(p, Path::field("a").child("b").child("c"));
    }
}

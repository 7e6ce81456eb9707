//! Per-request placeholder namespace
//!
//! One `Namespace` is created per compiled request and discarded after
//! compilation. Every fragment compiled for that request (key condition,
//! filter, update) draws its tokens from the same namespace, so fragments
//! merged into a single payload can never collide on placeholder names.
//! The namespace is never process-global.

/// Allocates unique name (`#n0, #n1, …`) and value (`:v0, :v1, …`)
/// placeholder tokens.
#[derive(Debug, Default)]
pub struct Namespace {
    names: u32,
    values: u32,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused name placeholder.
    pub fn next_name(&mut self) -> String {
        let token = format!("#n{}", self.names);
        self.names += 1;
        token
    }

    /// Next unused value placeholder.
    pub fn next_value(&mut self) -> String {
        let token = format!(":v{}", self.values);
        self.values += 1;
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_sequential_and_unique() {
        let mut ns = Namespace::new();
        assert_eq!(ns.next_name(), "#n0");
        assert_eq!(ns.next_name(), "#n1");
        assert_eq!(ns.next_value(), ":v0");
        assert_eq!(ns.next_value(), ":v1");
        assert_eq!(ns.next_name(), "#n2");
    }
}

//! Ordered filter and handler sequences.

use std::fmt;

use axum::http::Method;
use regex::Regex;

use super::{MethodMask, Target};
use crate::error::MuxError;
use crate::Result;

/// Which sequence an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Filter,
    Handler,
}

impl Phase {
    /// Short prefix used in span names.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Filter => "F",
            Phase::Handler => "H",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Filter => write!(f, "filter"),
            Phase::Handler => write!(f, "handler"),
        }
    }
}

/// One registered (pattern, methods, target) tuple.
pub struct RouteEntry {
    pattern: Regex,
    methods: MethodMask,
    target: Target,
}

impl RouteEntry {
    /// The pattern source as registered.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn methods(&self) -> &MethodMask {
        &self.methods
    }

    /// Pattern search over the whole normalized path.
    pub fn matches_path(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    /// Check if a request with this path and method reaches the target.
    pub fn applies_to(&self, path: &str, method: &Method) -> bool {
        self.matches_path(path) && self.methods.allows(method)
    }

    pub(crate) fn target(&self) -> &Target {
        &self.target
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("pattern", &self.pattern.as_str())
            .field("methods", &self.methods)
            .field("target", &self.target.describe())
            .finish()
    }
}

/// Filters and handlers in registration order.
///
/// Built during setup and read-only afterwards. Registering the same
/// pattern twice adds a second entry; lookups always walk the sequence from
/// the start.
#[derive(Debug, Default)]
pub struct RouteTable {
    filters: Vec<RouteEntry>,
    handlers: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `pattern` and append an entry to the phase's sequence.
    pub(crate) fn register(
        &mut self,
        phase: Phase,
        pattern: &str,
        methods: MethodMask,
        target: Target,
    ) -> Result<()> {
        let pattern = Regex::new(pattern).map_err(|source| MuxError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let entry = RouteEntry {
            pattern,
            methods,
            target,
        };
        match phase {
            Phase::Filter => self.filters.push(entry),
            Phase::Handler => self.handlers.push(entry),
        }
        Ok(())
    }

    /// Entries of one phase, in evaluation order.
    pub fn entries(&self, phase: Phase) -> &[RouteEntry] {
        match phase {
            Phase::Filter => &self.filters,
            Phase::Handler => &self.handlers,
        }
    }

    /// Total number of entries across both phases.
    pub fn len(&self) -> usize {
        self.filters.len() + self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (title, entries) in [("Filters", &self.filters), ("Handlers", &self.handlers)] {
            if entries.is_empty() {
                continue;
            }
            writeln!(f, " >{}---->", title)?;
            for entry in entries {
                writeln!(
                    f,
                    "\t{} [{}] ({})",
                    entry.pattern(),
                    entry.methods(),
                    entry.target().describe()
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Context;
    use crate::routing::Control;

    fn noop() -> Target {
        Target::Pipeline(Box::new(|_: &mut Context| Control::Continue))
    }

    #[test]
    fn test_register_keeps_order_and_duplicates() {
        let mut table = RouteTable::new();
        table
            .register(Phase::Handler, "/a", MethodMask::Any, noop())
            .unwrap();
        table
            .register(Phase::Handler, "/b", MethodMask::Any, noop())
            .unwrap();
        table
            .register(Phase::Handler, "/a", MethodMask::Any, noop())
            .unwrap();

        let patterns: Vec<&str> = table
            .entries(Phase::Handler)
            .iter()
            .map(RouteEntry::pattern)
            .collect();
        assert_eq!(patterns, vec!["/a", "/b", "/a"]);
        assert!(table.entries(Phase::Filter).is_empty());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_invalid_pattern() {
        let mut table = RouteTable::new();
        let err = table
            .register(Phase::Filter, "/f1/(", MethodMask::Any, noop())
            .unwrap_err();
        assert!(matches!(err, MuxError::InvalidPattern { .. }));
        assert!(table.is_empty());
    }

    #[test]
    fn test_applies_to() {
        let mut table = RouteTable::new();
        table
            .register(Phase::Filter, "/f1/.*", MethodMask::from(Method::POST), noop())
            .unwrap();
        let entry = &table.entries(Phase::Filter)[0];

        assert!(entry.matches_path("/f1/h1"));
        assert!(!entry.matches_path("/f2/h1"));
        assert!(entry.applies_to("/f1/h1", &Method::POST));
        assert!(!entry.applies_to("/f1/h1", &Method::GET));
    }

    #[test]
    fn test_display_lists_both_phases() {
        let mut table = RouteTable::new();
        table
            .register(Phase::Filter, "^/.*$", MethodMask::Any, noop())
            .unwrap();
        table
            .register(Phase::Handler, "^/x$", MethodMask::from(Method::GET), noop())
            .unwrap();

        let listing = table.to_string();
        assert!(listing.contains(" >Filters---->"));
        assert!(listing.contains(" >Handlers---->"));
        assert!(listing.contains("^/x$ [GET] (handler)"));
    }
}

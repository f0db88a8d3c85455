//! Allowed-method sets for route entries.

use std::fmt;
use std::str::FromStr;

use axum::http::Method;

use crate::error::MuxError;

/// Methods a route entry accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MethodMask {
    /// Every method.
    #[default]
    Any,
    /// Only the listed methods.
    Only(Vec<Method>),
}

impl MethodMask {
    /// Mask accepting the given methods.
    pub fn only<I>(methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        Self::Only(methods.into_iter().collect())
    }

    /// Check if `method` may reach the entry.
    pub fn allows(&self, method: &Method) -> bool {
        match self {
            MethodMask::Any => true,
            MethodMask::Only(methods) => methods.contains(method),
        }
    }
}

impl From<Method> for MethodMask {
    fn from(method: Method) -> Self {
        Self::Only(vec![method])
    }
}

impl From<Vec<Method>> for MethodMask {
    fn from(methods: Vec<Method>) -> Self {
        Self::Only(methods)
    }
}

/// Parses `*` or a comma separated list such as `GET,POST`.
///
/// A `*` anywhere in the list widens the mask to every method.
impl FromStr for MethodMask {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut methods = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part == "*" {
                return Ok(MethodMask::Any);
            }
            let method = Method::from_bytes(part.to_ascii_uppercase().as_bytes())
                .map_err(|_| MuxError::InvalidMethod(part.to_string()))?;
            if !methods.contains(&method) {
                methods.push(method);
            }
        }
        if methods.is_empty() {
            return Err(MuxError::InvalidMethod(s.to_string()));
        }
        Ok(MethodMask::Only(methods))
    }
}

impl fmt::Display for MethodMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodMask::Any => write!(f, "*"),
            MethodMask::Only(methods) => {
                let names: Vec<&str> = methods.iter().map(Method::as_str).collect();
                write!(f, "{}", names.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_allows_everything() {
        let mask = MethodMask::Any;
        assert!(mask.allows(&Method::GET));
        assert!(mask.allows(&Method::DELETE));
        assert!(mask.allows(&Method::from_bytes(b"PURGE").unwrap()));
    }

    #[test]
    fn test_only_is_exact() {
        let mask = MethodMask::from(Method::POST);
        assert!(mask.allows(&Method::POST));
        assert!(!mask.allows(&Method::GET));
    }

    #[test]
    fn test_parse_list() {
        let mask: MethodMask = "get, POST".parse().unwrap();
        assert_eq!(mask, MethodMask::only([Method::GET, Method::POST]));
        assert_eq!(mask.to_string(), "GET,POST");
    }

    #[test]
    fn test_parse_wildcard() {
        assert_eq!("*".parse::<MethodMask>().unwrap(), MethodMask::Any);
        assert_eq!("GET,*".parse::<MethodMask>().unwrap(), MethodMask::Any);
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<MethodMask>().is_err());
        assert!(" , ".parse::<MethodMask>().is_err());
        assert!("GE T".parse::<MethodMask>().is_err());
    }
}

use serde::{Deserialize, Serialize};
use std::{fmt, str, sync::Arc};
use thiserror::Error;

/// The name of a node of the simulated network (`h1`, `r2`, ...).
///
/// The name is opaque: the only requirement is for it not to be empty.
/// Whether the node actually exists is for the topology to tell.
///
/// ```
/// # use ncp_core::Endpoint;
/// let h1: Endpoint = "h1".parse().unwrap();
/// assert_eq!(h1.as_str(), "h1");
/// assert!("  ".parse::<Endpoint>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(Arc<str>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("endpoint name cannot be empty")]
    Empty,
}

impl Endpoint {
    pub fn new(name: impl AsRef<str>) -> Result<Self, EndpointError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(EndpointError::Empty);
        }
        Ok(Self(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl str::FromStr for Endpoint {
    type Err = EndpointError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Endpoint> for String {
    fn from(value: Endpoint) -> Self {
        value.0.to_string()
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print() {
        assert_eq!(format!("{}", Endpoint::new("h1").unwrap()), "h1")
    }

    #[test]
    fn trimmed() {
        assert_eq!(Endpoint::new(" r1\n").unwrap().as_str(), "r1")
    }

    #[test]
    fn empty() {
        assert_eq!(Endpoint::new(""), Err(EndpointError::Empty));
        assert_eq!("\t".parse::<Endpoint>(), Err(EndpointError::Empty));
    }

    #[test]
    fn serde_as_string() {
        let h2 = Endpoint::new("h2").unwrap();
        assert_eq!(serde_json::to_string(&h2).unwrap(), "\"h2\"");
        assert_eq!(serde_json::from_str::<Endpoint>("\"h2\"").unwrap(), h2);
        assert!(serde_json::from_str::<Endpoint>("\"\"").is_err());
    }
}

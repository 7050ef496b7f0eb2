use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

/// One running service instance as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Logical service name, shared by all instances of the service.
    pub name: String,
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl InstanceDescriptor {
    pub fn new(name: impl Into<String>, id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            host: host.into(),
            port,
        }
    }

    /// The metrics endpoint of this instance. IPv6 hosts are bracketed.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}/metrics", self.host, self.port)
        } else {
            format!("http://{}:{}/metrics", self.host, self.port)
        }
    }
}

impl fmt::Display for InstanceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}@{}:{})", self.name, self.id, self.host, self.port)
    }
}

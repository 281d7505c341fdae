//! Device descriptor, property selector and the in-memory property store.

use crate::protocol::{DEFAULT_PORT, Method, Model, Notification, Property};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// What is known about a device before (or while) talking to it.
///
/// Produced by discovery or built by hand. Identity fields do not change once
/// set; the property snapshot is whatever was last reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub hostname: String,
    pub port: u16,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Model,
    #[serde(default)]
    pub properties: HashMap<Property, Value>,
    #[serde(default)]
    pub supported_methods: Vec<Method>,
}

impl DeviceDescriptor {
    pub fn new<H: Into<String>>(hostname: H, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            id: None,
            model: Model::Unknown,
            properties: HashMap::new(),
            supported_methods: Vec::new(),
        }
    }

    /// `host:port` as used to open the control connection.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// True if the device advertised `method`, or advertised nothing at all.
    pub fn supports(&self, method: Method) -> bool {
        self.supported_methods.is_empty() || self.supported_methods.contains(&method)
    }
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self::new(String::new(), DEFAULT_PORT)
    }
}

/// Ordered selection of properties to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet(BTreeSet<Property>);

impl PropertySet {
    /// Every known property.
    pub fn all() -> Self {
        Self(Property::ALL.iter().copied().collect())
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, property: Property) -> Self {
        self.0.insert(property);
        self
    }

    pub fn insert(&mut self, property: Property) -> bool {
        self.0.insert(property)
    }

    pub fn remove(&mut self, property: Property) -> bool {
        self.0.remove(&property)
    }

    pub fn contains(&self, property: Property) -> bool {
        self.0.contains(&property)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Property> + '_ {
        self.0.iter().copied()
    }
}

impl<const N: usize> From<[Property; N]> for PropertySet {
    fn from(props: [Property; N]) -> Self {
        Self(props.into_iter().collect())
    }
}

impl From<Property> for PropertySet {
    fn from(prop: Property) -> Self {
        Self::none().with(prop)
    }
}

impl FromIterator<Property> for PropertySet {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PropertySet {
    type Item = Property;
    type IntoIter = std::collections::btree_set::IntoIter<Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Last-known property values of one device.
#[derive(Debug, Default)]
pub struct PropertyStore {
    values: RwLock<HashMap<Property, Value>>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, property: Property) -> Option<Value> {
        self.values.read().get(&property).cloned()
    }

    pub fn set(&self, property: Property, value: Value) {
        self.values.write().insert(property, value);
    }

    /// Inserts or overwrites every given value.
    pub fn merge<I>(&self, values: I)
    where
        I: IntoIterator<Item = (Property, Value)>,
    {
        let mut guard = self.values.write();
        for (k, v) in values {
            guard.insert(k, v);
        }
    }

    /// Applies a `props` notification and returns the properties it touched.
    ///
    /// Keys that are not device properties are ignored.
    pub fn merge_notification(&self, notification: &Notification) -> Vec<Property> {
        let mut touched = Vec::new();
        let mut guard = self.values.write();
        for (prop, value) in notification.properties() {
            guard.insert(prop, value.clone());
            touched.push(prop);
        }
        touched
    }

    pub fn snapshot(&self) -> HashMap<Property, Value> {
        self.values.read().clone()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn clear(&self) {
        self.values.write().clear();
    }
}

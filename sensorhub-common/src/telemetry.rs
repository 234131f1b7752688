use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A 48-bit hardware address (Bluetooth or Ethernet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(u64);

impl MacAddress {
    /// Largest value representable in 48 bits.
    pub const MAX: u64 = 0xFFFF_FFFF_FFFF;

    /// Create an address from its integer form.
    pub fn new(value: u64) -> Result<Self, Error> {
        if value > Self::MAX {
            return Err(Error::InvalidId(format!(
                "MAC address {:#x} exceeds 48 bits",
                value
            )));
        }
        Ok(Self(value))
    }

    /// The address as a 48-bit integer.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    /// Accepts `AA:BB:CC:DD:EE:FF`, `AA-BB-CC-DD-EE-FF` or bare hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();

        if hex.is_empty() || hex.len() > 12 {
            return Err(Error::InvalidId(format!("Invalid MAC address: '{}'", s)));
        }

        let value = u64::from_str_radix(&hex, 16)
            .map_err(|_| Error::InvalidId(format!("Invalid MAC address: '{}'", s)))?;
        Self::new(value)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(value: MacAddress) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            (v >> 40) & 0xFF,
            (v >> 32) & 0xFF,
            (v >> 24) & 0xFF,
            (v >> 16) & 0xFF,
            (v >> 8) & 0xFF,
            v & 0xFF
        )
    }
}

/// Stable identifier of an observed entity.
///
/// The string variants are never empty; use the constructors, which validate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityId {
    /// Radio device, keyed by hardware address.
    Mac(MacAddress),
    /// Serial-attached device, keyed by port name.
    Port(String),
    /// Network target, keyed by host name or IP address.
    Address(String),
    /// Anything else (composite keys, local hardware components).
    Key(String),
}

impl EntityId {
    /// Serial port id.
    pub fn port(name: impl Into<String>) -> Result<Self, Error> {
        non_empty(name.into(), "port").map(Self::Port)
    }

    /// Network address id.
    pub fn address(addr: impl Into<String>) -> Result<Self, Error> {
        non_empty(addr.into(), "address").map(Self::Address)
    }

    /// Free-form key id.
    pub fn key(key: impl Into<String>) -> Result<Self, Error> {
        non_empty(key.into(), "key").map(Self::Key)
    }
}

fn non_empty(value: String, what: &str) -> Result<String, Error> {
    if value.trim().is_empty() {
        Err(Error::InvalidId(format!("empty {} id", what)))
    } else {
        Ok(value)
    }
}

impl From<MacAddress> for EntityId {
    fn from(value: MacAddress) -> Self {
        EntityId::Mac(value)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Mac(mac) => write!(f, "{}", mac),
            EntityId::Port(port) => write!(f, "{}", port),
            EntityId::Address(addr) => write!(f, "{}", addr),
            EntityId::Key(key) => write!(f, "{}", key),
        }
    }
}

/// Numeric readings of one entity, keyed by field name.
///
/// A field that was never read (or whose read failed) is absent, never zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, f64>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Overwrite the fields present in `other`, keep the rest.
    pub fn merge(&mut self, other: Fields) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Value of a tag: a string or a number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Text(s) => write!(f, "{}", s),
            TagValue::Int(i) => write!(f, "{}", i),
            TagValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Text(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Text(v.to_string())
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<u32> for TagValue {
    fn from(v: u32) -> Self {
        TagValue::Int(v as i64)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

/// An ordered tag set. Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tags(Vec<(String, TagValue)>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<TagValue>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Tags::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

/// One reported value with its tag set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub value: f64,
    pub tags: Tags,
}

impl Measurement {
    pub fn new(value: f64, tags: Tags) -> Self {
        Self { value, tags }
    }
}

//! `NodeResources` — a vector of named scalar resource quantities.
//!
//! The three standard resources (`cpus`, `mem` in MiB, `disk` in MiB) are
//! always present; any other scalar the cluster manager reports can be
//! carried alongside them. Quantities never go below zero: negative input
//! and over-subtraction are clamped rather than rejected, since offer data
//! from the cluster manager is noisy.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Name of the CPU resource (cores).
pub const CPUS: &str = "cpus";
/// Name of the memory resource (MiB).
pub const MEM: &str = "mem";
/// Name of the disk resource (MiB).
pub const DISK: &str = "disk";

const STANDARD: [&str; 3] = [CPUS, MEM, DISK];

/// Resource quantities keyed by resource name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct NodeResources {
    quantities: BTreeMap<String, f64>,
}

impl NodeResources {
    /// All-zero resources.
    pub fn new() -> Self {
        let quantities = STANDARD.iter().map(|name| (name.to_string(), 0.0)).collect();
        Self { quantities }
    }

    /// Build from the three standard scalars.
    pub fn from_scalars(cpus: f64, mem: f64, disk: f64) -> Self {
        Self::new().with(CPUS, cpus).with(MEM, mem).with(DISK, disk)
    }

    /// Set a named quantity (clamped at zero).
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.set(name, value);
        self
    }

    /// Set a named quantity in place (clamped at zero).
    pub fn set(&mut self, name: &str, value: f64) {
        self.quantities.insert(name.to_string(), clamp(value));
    }

    /// Quantity for a resource name; unknown names are zero.
    pub fn get(&self, name: &str) -> f64 {
        self.quantities.get(name).copied().unwrap_or(0.0)
    }

    pub fn cpus(&self) -> f64 {
        self.get(CPUS)
    }

    pub fn mem(&self) -> f64 {
        self.get(MEM)
    }

    pub fn disk(&self) -> f64 {
        self.get(DISK)
    }

    /// Names of every resource carried, standard ones included.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.quantities.keys().map(String::as_str)
    }

    /// True when every quantity is zero.
    pub fn is_zero(&self) -> bool {
        self.quantities.values().all(|v| *v == 0.0)
    }

    /// Component-wise addition.
    pub fn add(&mut self, other: &NodeResources) {
        for (name, value) in &other.quantities {
            *self.quantities.entry(name.clone()).or_insert(0.0) += value;
        }
    }

    /// Component-wise subtraction, clamped at zero.
    pub fn subtract(&mut self, other: &NodeResources) {
        for (name, value) in &other.quantities {
            let entry = self.quantities.entry(name.clone()).or_insert(0.0);
            *entry = clamp(*entry - value);
        }
    }

    /// True if every component of `self` (the request) fits within `available`.
    pub fn is_satisfied_by(&self, available: &NodeResources) -> bool {
        self.quantities
            .iter()
            .all(|(name, requested)| *requested <= available.get(name))
    }

    /// Per-component amount by which `self` (the request) exceeds `available`.
    ///
    /// Zero everywhere when the request is satisfied.
    pub fn shortfall(&self, available: &NodeResources) -> NodeResources {
        let mut deficit = self.clone();
        deficit.subtract(available);
        deficit
    }

    /// Raise each component to at least the matching component of `other`.
    pub fn increase_up_to(&mut self, other: &NodeResources) {
        for name in self.union_names(other) {
            let value = self.get(&name).max(other.get(&name));
            self.quantities.insert(name, value);
        }
    }

    /// Lower each component to at most the matching component of `other`.
    pub fn limit_to(&mut self, other: &NodeResources) {
        for name in self.union_names(other) {
            let value = self.get(&name).min(other.get(&name));
            self.quantities.insert(name, value);
        }
    }

    /// Flat resource-name → quantity map for status reports.
    pub fn to_report(&self) -> BTreeMap<String, f64> {
        self.quantities.clone()
    }

    fn union_names(&self, other: &NodeResources) -> Vec<String> {
        let mut names: Vec<String> = self.quantities.keys().cloned().collect();
        for name in other.quantities.keys() {
            if !self.quantities.contains_key(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

fn clamp(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

impl Default for NodeResources {
    fn default() -> Self {
        Self::new()
    }
}

/// Missing names compare as zero, so `{cpus: 0}` equals `{}` plus the standard keys.
impl PartialEq for NodeResources {
    fn eq(&self, other: &Self) -> bool {
        self.union_names(other)
            .iter()
            .all(|name| self.get(name) == other.get(name))
    }
}

impl From<BTreeMap<String, f64>> for NodeResources {
    fn from(map: BTreeMap<String, f64>) -> Self {
        let mut resources = NodeResources::new();
        for (name, value) in map {
            resources.set(&name, value);
        }
        resources
    }
}

impl From<NodeResources> for BTreeMap<String, f64> {
    fn from(resources: NodeResources) -> Self {
        resources.quantities
    }
}

impl AddAssign<&NodeResources> for NodeResources {
    fn add_assign(&mut self, rhs: &NodeResources) {
        NodeResources::add(self, rhs);
    }
}

impl SubAssign<&NodeResources> for NodeResources {
    fn sub_assign(&mut self, rhs: &NodeResources) {
        self.subtract(rhs);
    }
}

impl Add for NodeResources {
    type Output = NodeResources;

    fn add(mut self, rhs: NodeResources) -> NodeResources {
        self += &rhs;
        self
    }
}

impl Sub for NodeResources {
    type Output = NodeResources;

    fn sub(mut self, rhs: NodeResources) -> NodeResources {
        self -= &rhs;
        self
    }
}

impl<'a> Sum<&'a NodeResources> for NodeResources {
    fn sum<I: Iterator<Item = &'a NodeResources>>(iter: I) -> Self {
        iter.fold(NodeResources::new(), |mut acc, r| {
            acc += r;
            acc
        })
    }
}

impl fmt::Display for NodeResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .quantities
            .iter()
            .map(|(name, value)| format!("{name}: {value:.2}"))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_has_standard_zeroes() {
        let r = NodeResources::new();
        assert_eq!(r.cpus(), 0.0);
        assert_eq!(r.mem(), 0.0);
        assert_eq!(r.disk(), 0.0);
        assert!(r.is_zero());
        assert_eq!(r.names().count(), 3);
    }

    #[test]
    fn negative_input_is_clamped() {
        let r = NodeResources::from_scalars(-1.0, 512.0, f64::NAN);
        assert_eq!(r.cpus(), 0.0);
        assert_eq!(r.mem(), 512.0);
        assert_eq!(r.disk(), 0.0);
    }

    #[test]
    fn add_is_component_wise() {
        let mut a = NodeResources::from_scalars(1.0, 256.0, 10.0);
        a += &NodeResources::from_scalars(2.0, 256.0, 0.0).with("gpus", 1.0);
        assert_eq!(a, NodeResources::from_scalars(3.0, 512.0, 10.0).with("gpus", 1.0));
    }

    #[test]
    fn subtract_never_goes_negative() {
        let mut a = NodeResources::from_scalars(1.0, 256.0, 0.0);
        a.subtract(&NodeResources::from_scalars(2.0, 100.0, 50.0));
        assert_eq!(a, NodeResources::from_scalars(0.0, 156.0, 0.0));
    }

    #[test]
    fn satisfied_by_checks_every_component() {
        let available = NodeResources::from_scalars(4.0, 1024.0, 100.0);
        assert!(NodeResources::from_scalars(4.0, 1024.0, 100.0).is_satisfied_by(&available));
        assert!(NodeResources::from_scalars(1.0, 10.0, 0.0).is_satisfied_by(&available));
        assert!(!NodeResources::from_scalars(4.5, 10.0, 0.0).is_satisfied_by(&available));
        assert!(!NodeResources::new().with("gpus", 1.0).is_satisfied_by(&available));
    }

    #[test]
    fn shortfall_reports_only_missing_amounts() {
        let available = NodeResources::from_scalars(2.0, 1024.0, 0.0);
        let request = NodeResources::from_scalars(3.0, 512.0, 10.0);
        assert_eq!(
            request.shortfall(&available),
            NodeResources::from_scalars(1.0, 0.0, 10.0)
        );
    }

    #[test]
    fn increase_and_limit() {
        let mut hi = NodeResources::from_scalars(1.0, 512.0, 0.0);
        hi.increase_up_to(&NodeResources::from_scalars(2.0, 256.0, 5.0));
        assert_eq!(hi, NodeResources::from_scalars(2.0, 512.0, 5.0));

        let mut lo = NodeResources::from_scalars(1.0, 512.0, 0.0).with("gpus", 2.0);
        lo.limit_to(&NodeResources::from_scalars(2.0, 256.0, 5.0));
        assert_eq!(lo, NodeResources::from_scalars(1.0, 256.0, 0.0));
    }

    #[test]
    fn equality_treats_missing_as_zero() {
        let a = NodeResources::from_scalars(1.0, 0.0, 0.0).with("gpus", 0.0);
        let b = NodeResources::from_scalars(1.0, 0.0, 0.0);
        assert_eq!(a, b);
    }

    #[test]
    fn sum_over_iterator() {
        let parts = [
            NodeResources::from_scalars(1.0, 100.0, 0.0),
            NodeResources::from_scalars(2.0, 200.0, 1.0),
        ];
        let total: NodeResources = parts.iter().sum();
        assert_eq!(total, NodeResources::from_scalars(3.0, 300.0, 1.0));
    }

    #[test]
    fn report_is_flat_map() {
        let r = NodeResources::from_scalars(4.0, 1024.0, 0.0);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["cpus"], 4.0);
        assert_eq!(json["mem"], 1024.0);
        assert_eq!(json["disk"], 0.0);

        let back: NodeResources = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn deserialize_clamps_and_fills_standard_names() {
        let r: NodeResources = serde_json::from_str(r#"{"cpus": -2.0}"#).unwrap();
        assert_eq!(r.cpus(), 0.0);
        assert_eq!(r.to_report().len(), 3);
    }
}

//! `PropertySet` and related types for pass communication.
//!
//! This module provides the [`PropertySet`] type, which enables compilation passes
//! to share data with each other. It contains the standard properties (backend,
//! initial and final layout) and supports arbitrary custom properties.
//!
//! # Overview
//!
//! During circuit compilation, multiple passes need to share information:
//! - **Layout passes** decide which logical qubits start on which physical qubits
//! - **Routing passes** insert swaps and record where every logical qubit ends up
//! - **Unroll passes** read the backend's native gates
//!
//! A fresh `PropertySet` is created for every run of a [`PassFlow`](crate::PassFlow).
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use qtrans_compile::{BackendModel, PropertySet};
//!
//! let props = PropertySet::new().with_backend(Arc::new(BackendModel::linear(5)));
//! assert_eq!(props.backend.as_ref().unwrap().num_qubits(), 5);
//! ```
//!
//! ## Custom properties for pass communication
//!
//! ```
//! use qtrans_compile::PropertySet;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct MergeStats {
//!     merged: usize,
//! }
//!
//! let mut props = PropertySet::new();
//! props.insert(MergeStats { merged: 4 });
//! assert_eq!(props.get::<MergeStats>().unwrap().merged, 4);
//! ```

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::sync::Arc;

use qtrans_ir::QubitId;

use crate::backend::BackendModel;

/// A mapping from logical qubits to physical qubits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Map from logical qubit to physical qubit index.
    logical_to_physical: FxHashMap<QubitId, u32>,
    /// Map from physical qubit index to logical qubit.
    physical_to_logical: FxHashMap<u32, QubitId>,
}

impl Layout {
    /// Create a new empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a trivial layout (logical qubit i -> physical qubit i).
    pub fn trivial(num_qubits: u32) -> Self {
        let mut layout = Self::new();
        for i in 0..num_qubits {
            layout.add(QubitId(i), i);
        }
        layout
    }

    /// Build from a `logical[i] = physical` slice.
    pub fn from_physical(physical: &[u32]) -> Self {
        let mut layout = Self::new();
        for (logical, &p) in (0u32..).zip(physical) {
            layout.add(QubitId(logical), p);
        }
        layout
    }

    /// Add a mapping from logical to physical qubit.
    ///
    /// If either side was already mapped elsewhere, that stale entry is
    /// dropped so both directions stay consistent.
    pub fn add(&mut self, logical: QubitId, physical: u32) {
        if let Some(&old_logical) = self.physical_to_logical.get(&physical) {
            if old_logical != logical {
                self.logical_to_physical.remove(&old_logical);
            }
        }
        if let Some(&old_physical) = self.logical_to_physical.get(&logical) {
            if old_physical != physical {
                self.physical_to_logical.remove(&old_physical);
            }
        }
        self.logical_to_physical.insert(logical, physical);
        self.physical_to_logical.insert(physical, logical);
    }

    /// Get the physical qubit for a logical qubit.
    pub fn get_physical(&self, logical: QubitId) -> Option<u32> {
        self.logical_to_physical.get(&logical).copied()
    }

    /// Get the logical qubit for a physical qubit.
    pub fn get_logical(&self, physical: u32) -> Option<QubitId> {
        self.physical_to_logical.get(&physical).copied()
    }

    /// Swap two physical qubits in the layout.
    pub fn swap(&mut self, p1: u32, p2: u32) {
        let l1 = self.physical_to_logical.get(&p1).copied();
        let l2 = self.physical_to_logical.get(&p2).copied();

        if let Some(l1) = l1 {
            self.logical_to_physical.insert(l1, p2);
            self.physical_to_logical.insert(p2, l1);
        } else {
            self.physical_to_logical.remove(&p2);
        }

        if let Some(l2) = l2 {
            self.logical_to_physical.insert(l2, p1);
            self.physical_to_logical.insert(p1, l2);
        } else {
            self.physical_to_logical.remove(&p1);
        }
    }

    /// Get the number of mapped qubits.
    pub fn len(&self) -> usize {
        self.logical_to_physical.len()
    }

    /// Check if the layout is empty.
    pub fn is_empty(&self) -> bool {
        self.logical_to_physical.is_empty()
    }

    /// Iterate over (logical, physical) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (QubitId, u32)> + '_ {
        self.logical_to_physical.iter().map(|(&l, &p)| (l, p))
    }

    /// Sorted `logical index -> physical index` map.
    pub fn to_btree(&self) -> BTreeMap<u32, u32> {
        self.iter().map(|(l, p)| (l.0, p)).collect()
    }
}

/// Swap statistics written by the routing passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingStats {
    /// Swaps in the emitted circuit.
    pub swaps_inserted: usize,
    /// Forward and backward sweeps performed.
    pub sweeps: usize,
    /// Times the release valve forced progress.
    pub forced_routes: usize,
}

/// Gate counts recorded by [`CouplingVerification`](crate::passes::CouplingVerification).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCensus {
    /// Gates on one qubit.
    pub one_qubit: usize,
    /// Gates on two qubits.
    pub two_qubit: usize,
}

/// Properties shared between compilation passes.
///
/// # Standard Properties
///
/// | Field | Type | Description |
/// |-------|------|-------------|
/// | `backend` | [`BackendModel`] | Target device, shared read-only |
/// | `initial_layout` | [`Layout`] | Logical-to-physical mapping before the first gate |
/// | `final_layout` | [`Layout`] | Logical-to-physical mapping after the last gate |
///
/// # Custom Properties
///
/// Passes can store arbitrary data using the type-safe [`insert`](Self::insert)
/// and [`get`](Self::get) methods. Each type can have at most one value stored.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use qtrans_compile::{BackendModel, Layout, PropertySet};
///
/// let mut props = PropertySet::new();
/// props.backend = Some(Arc::new(BackendModel::linear(5)));
/// props.initial_layout = Some(Layout::trivial(5));
///
/// let backend = props.backend.as_ref().unwrap();
/// assert!(backend.is_adjacent(0, 1));
/// assert!(!backend.is_adjacent(0, 2));
/// ```
#[derive(Debug, Default)]
pub struct PropertySet {
    /// Target device.
    ///
    /// Required by layout, routing and unroll-to-basis passes.
    pub backend: Option<Arc<BackendModel>>,

    /// Layout before the first operation.
    ///
    /// Set by layout passes, read by routing.
    pub initial_layout: Option<Layout>,

    /// Layout after the last operation, including routing swaps.
    pub final_layout: Option<Layout>,

    /// Custom properties storage (type-erased).
    custom: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl PropertySet {
    /// Create a new empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<BackendModel>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the initial layout.
    ///
    /// # Example
    ///
    /// ```
    /// use qtrans_compile::{PropertySet, Layout};
    ///
    /// let props = PropertySet::new()
    ///     .with_layout(Layout::trivial(3));
    ///
    /// assert!(props.initial_layout.is_some());
    /// ```
    #[must_use]
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.initial_layout = Some(layout);
        self
    }

    /// Insert a custom property.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.custom.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a custom property.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.custom
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Get a mutable custom property.
    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.custom
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut())
    }

    /// Remove a custom property.
    pub fn remove<T: Any>(&mut self) -> Option<T> {
        self.custom
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|v| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_trivial() {
        let layout = Layout::trivial(3);
        assert_eq!(layout.len(), 3);
        assert_eq!(layout.get_physical(QubitId(2)), Some(2));
        assert_eq!(layout.get_logical(1), Some(QubitId(1)));
    }

    #[test]
    fn test_layout_swap() {
        let mut layout = Layout::trivial(2);
        layout.swap(0, 1);
        assert_eq!(layout.get_physical(QubitId(0)), Some(1));
        assert_eq!(layout.get_physical(QubitId(1)), Some(0));
    }

    #[test]
    fn test_layout_swap_with_free_qubit() {
        let mut layout = Layout::from_physical(&[0]);
        layout.swap(0, 3);
        assert_eq!(layout.get_physical(QubitId(0)), Some(3));
        assert_eq!(layout.get_logical(0), None);
        assert_eq!(layout.to_btree(), BTreeMap::from([(0, 3)]));
    }

    #[test]
    fn test_layout_add_replaces_stale_entries() {
        let mut layout = Layout::trivial(2);
        layout.add(QubitId(0), 1);
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.get_logical(0), None);
        assert_eq!(layout.get_logical(1), Some(QubitId(0)));
    }

    #[test]
    fn test_property_set_custom() {
        let mut props = PropertySet::new();

        #[derive(Debug, PartialEq)]
        struct CustomData(i32);

        props.insert(CustomData(42));
        assert_eq!(props.get::<CustomData>(), Some(&CustomData(42)));

        if let Some(data) = props.get_mut::<CustomData>() {
            data.0 = 7;
        }
        assert_eq!(props.remove::<CustomData>(), Some(CustomData(7)));
        assert!(props.get::<CustomData>().is_none());
    }
}

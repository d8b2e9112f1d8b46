//! Node types held in the model-graph arena.

use fxhash::{FxHashMap, FxHashSet};

use crate::dynamics::DynamicsRef;

/// An index into [`Graph`](super::Graph)'s arena.
///
/// Using an integer id rather than a pointer/`Rc` graph gives the
/// determinism and cache locality the design notes (§9) ask for: event
/// queues key on this id, not on an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub(crate) usize);

/// A node in the model graph: either atomic or coupled (§3.1).
#[derive(Debug)]
pub struct ModelNode {
    pub(crate) name: String,
    pub(crate) parent: Option<ModelId>,
    pub(crate) kind: ModelKind,
}

#[derive(Debug)]
pub enum ModelKind {
    Atomic(AtomicData),
    Coupled(CoupledData),
}

impl ModelNode {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<ModelId> {
        self.parent
    }

    #[must_use]
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, ModelKind::Atomic(_))
    }

    #[must_use]
    pub fn is_coupled(&self) -> bool {
        matches!(self.kind, ModelKind::Coupled(_))
    }

    #[must_use]
    pub fn as_atomic(&self) -> Option<&AtomicData> {
        match &self.kind {
            ModelKind::Atomic(a) => Some(a),
            ModelKind::Coupled(_) => None,
        }
    }

    #[must_use]
    pub fn as_atomic_mut(&mut self) -> Option<&mut AtomicData> {
        match &mut self.kind {
            ModelKind::Atomic(a) => Some(a),
            ModelKind::Coupled(_) => None,
        }
    }

    #[must_use]
    pub fn as_coupled(&self) -> Option<&CoupledData> {
        match &self.kind {
            ModelKind::Coupled(c) => Some(c),
            ModelKind::Atomic(_) => None,
        }
    }

    #[must_use]
    pub fn as_coupled_mut(&mut self) -> Option<&mut CoupledData> {
        match &mut self.kind {
            ModelKind::Coupled(c) => Some(c),
            ModelKind::Atomic(_) => None,
        }
    }

    pub(crate) fn ports(&self, output: bool) -> &FxHashSet<String> {
        match &self.kind {
            ModelKind::Atomic(a) => {
                if output {
                    &a.output_ports
                } else {
                    &a.input_ports
                }
            }
            ModelKind::Coupled(c) => {
                if output {
                    &c.output_ports
                } else {
                    &c.input_ports
                }
            }
        }
    }

    pub(crate) fn ports_mut(&mut self, output: bool) -> &mut FxHashSet<String> {
        match &mut self.kind {
            ModelKind::Atomic(a) => {
                if output {
                    &mut a.output_ports
                } else {
                    &mut a.input_ports
                }
            }
            ModelKind::Coupled(c) => {
                if output {
                    &mut c.output_ports
                } else {
                    &mut c.input_ports
                }
            }
        }
    }
}

/// An atomic model (§3.1): bound to one dynamics reference, optionally one
/// observable and a set of initialization conditions.
#[derive(Debug, Default)]
pub struct AtomicData {
    pub(crate) input_ports: FxHashSet<String>,
    pub(crate) output_ports: FxHashSet<String>,
    pub(crate) dynamics: Option<DynamicsRef>,
    pub(crate) observable: Option<String>,
    pub(crate) conditions: Vec<String>,
}

impl AtomicData {
    #[must_use]
    pub fn dynamics(&self) -> Option<&DynamicsRef> {
        self.dynamics.as_ref()
    }

    pub fn set_dynamics(&mut self, dynamics_ref: DynamicsRef) {
        self.dynamics = Some(dynamics_ref);
    }

    #[must_use]
    pub fn observable(&self) -> Option<&str> {
        self.observable.as_deref()
    }

    pub fn set_observable(&mut self, observable: impl Into<String>) {
        self.observable = Some(observable.into());
    }

    #[must_use]
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    pub fn add_condition(&mut self, condition: impl Into<String>) {
        self.conditions.push(condition.into());
    }
}

/// A coupled model: a `name -> child` map plus the three connection sets
/// from §3.1.
#[derive(Debug, Default)]
pub struct CoupledData {
    pub(crate) input_ports: FxHashSet<String>,
    pub(crate) output_ports: FxHashSet<String>,
    pub(crate) children: FxHashMap<String, ModelId>,

    /// `(parent input port) -> {(child, child input port)}`
    pub(crate) input_connections: FxHashMap<String, Vec<(ModelId, String)>>,
    /// `(child, child output port) -> {parent output port}`
    pub(crate) output_connections: FxHashMap<(ModelId, String), Vec<String>>,
    /// `(child A, output port) -> {(child B, input port)}`
    pub(crate) internal_connections: FxHashMap<(ModelId, String), Vec<(ModelId, String)>>,
}

impl CoupledData {
    #[must_use]
    pub fn children(&self) -> impl Iterator<Item = (&str, ModelId)> {
        self.children.iter().map(|(n, id)| (n.as_str(), *id))
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Option<ModelId> {
        self.children.get(name).copied()
    }

    #[must_use]
    pub fn input_connections(&self, parent_port: &str) -> &[(ModelId, String)] {
        self.input_connections
            .get(parent_port)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn output_connections(&self, child: ModelId, child_port: &str) -> &[String] {
        self.output_connections
            .get(&(child, child_port.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn internal_connections(&self, child: ModelId, child_port: &str) -> &[(ModelId, String)] {
        self.internal_connections
            .get(&(child, child_port.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

//! The model graph (§4.1): atomic/coupled models, ports and connections.
//!
//! Modeled as an arena of integer ids rather than `Rc`/`RefCell` pointers
//! (§9): determinism and cache locality for the event queues, which key
//! directly on these ids.

mod model;

pub use model::{AtomicData, CoupledData, ModelId, ModelKind, ModelNode};

use fxhash::FxHashSet;

use crate::error::GraphError;

/// The model graph: an arena of [`ModelNode`]s rooted at [`Graph::root`].
#[derive(Debug)]
pub struct Graph {
    arena: Vec<Option<ModelNode>>,
    root: ModelId,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates a graph with a single, empty coupled root model.
    #[must_use]
    pub fn new() -> Self {
        let root = ModelNode {
            name: "root".to_string(),
            parent: None,
            kind: ModelKind::Coupled(CoupledData::default()),
        };
        Self {
            arena: vec![Some(root)],
            root: ModelId(0),
        }
    }

    #[must_use]
    pub fn root(&self) -> ModelId {
        self.root
    }

    #[must_use]
    pub fn get(&self, id: ModelId) -> Option<&ModelNode> {
        self.arena.get(id.0).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: ModelId) -> Option<&mut ModelNode> {
        self.arena.get_mut(id.0).and_then(Option::as_mut)
    }

    fn coupled(&self, id: ModelId) -> Result<&CoupledData, GraphError> {
        self.get(id)
            .ok_or_else(|| GraphError::new(format!("no such model {id:?}")))?
            .as_coupled()
            .ok_or_else(|| GraphError::new(format!("{id:?} is not a coupled model")))
    }

    fn coupled_mut(&mut self, id: ModelId) -> Result<&mut CoupledData, GraphError> {
        let name_missing = self.get(id).is_none();
        if name_missing {
            return Err(GraphError::new(format!("no such model {id:?}")));
        }
        self.get_mut(id)
            .unwrap()
            .as_coupled_mut()
            .ok_or_else(|| GraphError::new(format!("{id:?} is not a coupled model")))
    }

    fn is_child_of(&self, parent: ModelId, child: ModelId) -> bool {
        self.get(parent)
            .and_then(ModelNode::as_coupled)
            .is_some_and(|c| c.children.values().any(|v| *v == child))
    }

    // ---------------------------------------------------------------
    // Model creation
    // ---------------------------------------------------------------

    /// Adds a new atomic model named `name` under `parent`. Fails if `name`
    /// already exists in `parent`.
    pub fn add_atomic_model(&mut self, parent: ModelId, name: &str) -> Result<ModelId, GraphError> {
        self.ensure_name_free(parent, name)?;
        let id = self.push(ModelNode {
            name: name.to_string(),
            parent: Some(parent),
            kind: ModelKind::Atomic(AtomicData::default()),
        });
        self.coupled_mut(parent)?.children.insert(name.to_string(), id);
        Ok(id)
    }

    /// Adds a new coupled model named `name` under `parent`. Fails if
    /// `name` already exists in `parent`.
    pub fn add_coupled_model(&mut self, parent: ModelId, name: &str) -> Result<ModelId, GraphError> {
        self.ensure_name_free(parent, name)?;
        let id = self.push(ModelNode {
            name: name.to_string(),
            parent: Some(parent),
            kind: ModelKind::Coupled(CoupledData::default()),
        });
        self.coupled_mut(parent)?.children.insert(name.to_string(), id);
        Ok(id)
    }

    fn ensure_name_free(&self, parent: ModelId, name: &str) -> Result<(), GraphError> {
        let parent_data = self.coupled(parent)?;
        if parent_data.children.contains_key(name) {
            return Err(GraphError::new(format!(
                "'{name}' already exists in parent {parent:?}"
            )));
        }
        Ok(())
    }

    fn push(&mut self, node: ModelNode) -> ModelId {
        self.arena.push(Some(node));
        ModelId(self.arena.len() - 1)
    }

    // ---------------------------------------------------------------
    // Ports
    // ---------------------------------------------------------------

    pub fn add_input_port(&mut self, model: ModelId, name: &str) -> Result<(), GraphError> {
        self.node_mut(model)?.ports_mut(false).insert(name.to_string());
        Ok(())
    }

    pub fn add_output_port(&mut self, model: ModelId, name: &str) -> Result<(), GraphError> {
        self.node_mut(model)?.ports_mut(true).insert(name.to_string());
        Ok(())
    }

    /// Removes `name` from `model`'s input ports, transitively removing
    /// every connection that touched it.
    pub fn del_input_port(&mut self, model: ModelId, name: &str) -> Result<(), GraphError> {
        self.node_mut(model)?.ports_mut(false).remove(name);
        self.cascade_port_removal(model, name, false);
        Ok(())
    }

    pub fn del_output_port(&mut self, model: ModelId, name: &str) -> Result<(), GraphError> {
        self.node_mut(model)?.ports_mut(true).remove(name);
        self.cascade_port_removal(model, name, true);
        Ok(())
    }

    fn node_mut(&mut self, model: ModelId) -> Result<&mut ModelNode, GraphError> {
        self.arena
            .get_mut(model.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| GraphError::new(format!("no such model {model:?}")))
    }

    /// Removes every connection touching `(model, port)`, both as seen from
    /// within `model` (if it is itself coupled) and from `model`'s parent.
    fn cascade_port_removal(&mut self, model: ModelId, port: &str, is_output: bool) {
        // Connections that live inside `model`, if it is coupled, and name
        // `port` as one of its own (parent-facing) ports.
        if let Some(coupled) = self.get_mut(model).and_then(ModelNode::as_coupled_mut) {
            if is_output {
                for values in coupled.output_connections.values_mut() {
                    values.retain(|p| p != port);
                }
                coupled.output_connections.retain(|_, v| !v.is_empty());
            } else {
                coupled.input_connections.remove(port);
            }
        }

        // Connections that live in `model`'s parent and reference
        // `(model, port)` as a child endpoint.
        if let Some(parent) = self.get(model).and_then(ModelNode::parent) {
            if let Some(parent_data) = self.get_mut(parent).and_then(ModelNode::as_coupled_mut) {
                if is_output {
                    parent_data.output_connections.remove(&(model, port.to_string()));
                    parent_data
                        .internal_connections
                        .remove(&(model, port.to_string()));
                } else {
                    for values in parent_data.input_connections.values_mut() {
                        values.retain(|(m, p)| !(*m == model && p == port));
                    }
                    parent_data.input_connections.retain(|_, v| !v.is_empty());
                    for values in parent_data.internal_connections.values_mut() {
                        values.retain(|(m, p)| !(*m == model && p == port));
                    }
                    parent_data.internal_connections.retain(|_, v| !v.is_empty());
                }
            }
        }
    }

    // ---------------------------------------------------------------
    // Connections
    // ---------------------------------------------------------------

    /// `(coupled input port) -> (child, child input port)`.
    pub fn add_input_connection(
        &mut self,
        coupled: ModelId,
        src_port: &str,
        child: ModelId,
        child_port: &str,
    ) -> Result<(), GraphError> {
        self.check_port(coupled, src_port, false)?;
        self.check_is_child(coupled, child)?;
        self.check_port(child, child_port, false)?;

        let data = self.coupled_mut(coupled)?;
        let entry = data.input_connections.entry(src_port.to_string()).or_default();
        let pair = (child, child_port.to_string());
        if entry.contains(&pair) {
            return Err(GraphError::new("input connection already exists"));
        }
        entry.push(pair);
        Ok(())
    }

    pub fn del_input_connection(
        &mut self,
        coupled: ModelId,
        src_port: &str,
        child: ModelId,
        child_port: &str,
    ) -> Result<(), GraphError> {
        let data = self.coupled_mut(coupled)?;
        let pair = (child, child_port.to_string());
        let entry = data
            .input_connections
            .get_mut(src_port)
            .ok_or_else(|| GraphError::new("no such input connection"))?;
        let before = entry.len();
        entry.retain(|p| *p != pair);
        if entry.len() == before {
            return Err(GraphError::new("no such input connection"));
        }
        if entry.is_empty() {
            data.input_connections.remove(src_port);
        }
        Ok(())
    }

    /// `(child, child output port) -> (coupled output port)`.
    pub fn add_output_connection(
        &mut self,
        coupled: ModelId,
        child: ModelId,
        child_port: &str,
        dst_port: &str,
    ) -> Result<(), GraphError> {
        self.check_is_child(coupled, child)?;
        self.check_port(child, child_port, true)?;
        self.check_port(coupled, dst_port, true)?;

        let data = self.coupled_mut(coupled)?;
        let entry = data
            .output_connections
            .entry((child, child_port.to_string()))
            .or_default();
        if entry.iter().any(|p| p == dst_port) {
            return Err(GraphError::new("output connection already exists"));
        }
        entry.push(dst_port.to_string());
        Ok(())
    }

    pub fn del_output_connection(
        &mut self,
        coupled: ModelId,
        child: ModelId,
        child_port: &str,
        dst_port: &str,
    ) -> Result<(), GraphError> {
        let data = self.coupled_mut(coupled)?;
        let key = (child, child_port.to_string());
        let entry = data
            .output_connections
            .get_mut(&key)
            .ok_or_else(|| GraphError::new("no such output connection"))?;
        let before = entry.len();
        entry.retain(|p| p != dst_port);
        if entry.len() == before {
            return Err(GraphError::new("no such output connection"));
        }
        if entry.is_empty() {
            data.output_connections.remove(&key);
        }
        Ok(())
    }

    /// `(model A, output port) -> (model B, input port)`, both children of
    /// `coupled`.
    pub fn add_internal_connection(
        &mut self,
        coupled: ModelId,
        model_a: ModelId,
        port_a: &str,
        model_b: ModelId,
        port_b: &str,
    ) -> Result<(), GraphError> {
        if model_a == coupled || model_b == coupled {
            return Err(GraphError::new("internal connection cannot reference the coupled model itself"));
        }
        self.check_is_child(coupled, model_a)?;
        self.check_is_child(coupled, model_b)?;
        self.check_port(model_a, port_a, true)?;
        self.check_port(model_b, port_b, false)?;

        let data = self.coupled_mut(coupled)?;
        let entry = data
            .internal_connections
            .entry((model_a, port_a.to_string()))
            .or_default();
        let pair = (model_b, port_b.to_string());
        if entry.contains(&pair) {
            return Err(GraphError::new("internal connection already exists"));
        }
        entry.push(pair);
        Ok(())
    }

    pub fn del_internal_connection(
        &mut self,
        coupled: ModelId,
        model_a: ModelId,
        port_a: &str,
        model_b: ModelId,
        port_b: &str,
    ) -> Result<(), GraphError> {
        let data = self.coupled_mut(coupled)?;
        let key = (model_a, port_a.to_string());
        let pair = (model_b, port_b.to_string());
        let entry = data
            .internal_connections
            .get_mut(&key)
            .ok_or_else(|| GraphError::new("no such internal connection"))?;
        let before = entry.len();
        entry.retain(|p| *p != pair);
        if entry.len() == before {
            return Err(GraphError::new("no such internal connection"));
        }
        if entry.is_empty() {
            data.internal_connections.remove(&key);
        }
        Ok(())
    }

    fn check_port(&self, model: ModelId, port: &str, output: bool) -> Result<(), GraphError> {
        let node = self
            .get(model)
            .ok_or_else(|| GraphError::new(format!("no such model {model:?}")))?;
        if node.ports(output).contains(port) {
            Ok(())
        } else {
            Err(GraphError::new(format!(
                "model '{}' has no {} port '{port}'",
                node.name(),
                if output { "output" } else { "input" }
            )))
        }
    }

    fn check_is_child(&self, coupled: ModelId, child: ModelId) -> Result<(), GraphError> {
        if child == coupled {
            return Err(GraphError::new("a model cannot connect to itself as its own child"));
        }
        if self.is_child_of(coupled, child) {
            Ok(())
        } else {
            Err(GraphError::new(format!("{child:?} is not a child of {coupled:?}")))
        }
    }

    // ---------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------

    #[must_use]
    pub fn find_model(&self, parent: ModelId, name: &str) -> Option<ModelId> {
        self.get(parent)?.as_coupled()?.child(name)
    }

    /// Navigates a comma-separated path from `root`, e.g. `"net,node0,cpu"`.
    #[must_use]
    pub fn find_model_from_path(&self, root: ModelId, path: &str) -> Option<ModelId> {
        let mut current = root;
        for segment in path.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            current = self.find_model(current, segment)?;
        }
        Some(current)
    }

    // ---------------------------------------------------------------
    // Structural edits
    // ---------------------------------------------------------------

    /// Renames `model` within its parent. A no-op if `new_name` equals the
    /// current name.
    ///
    /// Connection endpoints reference models by [`ModelId`], not by name,
    /// so unlike a name-keyed graph there is nothing else to fix up: this
    /// is exactly the payoff of the arena+index representation from §9.
    pub fn rename(&mut self, model: ModelId, new_name: &str) -> Result<(), GraphError> {
        let old_name = self
            .get(model)
            .ok_or_else(|| GraphError::new(format!("no such model {model:?}")))?
            .name
            .clone();
        if old_name == new_name {
            return Ok(());
        }
        let parent = self
            .get(model)
            .and_then(ModelNode::parent)
            .ok_or_else(|| GraphError::new("cannot rename the root model"))?;

        self.ensure_name_free(parent, new_name)?;

        let parent_data = self.coupled_mut(parent)?;
        parent_data.children.remove(&old_name);
        parent_data.children.insert(new_name.to_string(), model);

        self.node_mut(model)?.name = new_name.to_string();
        Ok(())
    }

    /// Collects `model` and, if coupled, every descendant (including
    /// transitively nested coupled models), in parent-before-child order.
    #[must_use]
    pub fn descendants(&self, model: ModelId) -> Vec<ModelId> {
        let mut out = vec![model];
        let mut frontier = vec![model];
        while let Some(id) = frontier.pop() {
            if let Some(coupled) = self.get(id).and_then(ModelNode::as_coupled) {
                for child in coupled.children.values() {
                    out.push(*child);
                    frontier.push(*child);
                }
            }
        }
        out
    }

    /// Deletes `model` and every descendant, removing any connection in its
    /// parent that referenced it. Returns the set of deleted ids
    /// (parent-before-child order) so callers (e.g. the coordinator) can
    /// retire the corresponding simulators.
    pub fn delete_model(&mut self, model: ModelId) -> Result<Vec<ModelId>, GraphError> {
        let parent = self
            .get(model)
            .ok_or_else(|| GraphError::new(format!("no such model {model:?}")))?
            .parent
            .ok_or_else(|| GraphError::new("cannot delete the root model"))?;

        let name = self.get(model).unwrap().name.clone();
        let parent_data = self.coupled_mut(parent)?;
        if parent_data.children.remove(&name).is_none() {
            return Err(GraphError::new("delete of a non-child"));
        }
        parent_data.input_connections.retain(|_, v| {
            v.retain(|(m, _)| *m != model);
            !v.is_empty()
        });
        parent_data.output_connections.retain(|(m, _), _| *m != model);
        parent_data.internal_connections.retain(|(m, _), v| {
            v.retain(|(m2, _)| *m2 != model);
            *m != model && !v.is_empty()
        });

        let doomed = self.descendants(model);
        for id in &doomed {
            self.arena[id.0] = None;
        }
        Ok(doomed)
    }

    /// Moves `models` (all children of the same coupled parent) to
    /// `new_parent`. Internal connections entirely within the displaced set
    /// are preserved verbatim; any connection that crosses the boundary —
    /// including an internal connection with only one endpoint in the
    /// displaced set — is rebuilt as a new port on `new_parent`, synthesized
    /// from `(model, port)` and deduplicated with a numeric suffix on
    /// collision.
    pub fn displace(&mut self, models: &[ModelId], new_parent: ModelId) -> Result<(), GraphError> {
        if models.is_empty() {
            return Ok(());
        }
        let old_parent = self
            .get(models[0])
            .and_then(ModelNode::parent)
            .ok_or_else(|| GraphError::new("cannot displace the root model"))?;
        for m in models {
            if self.get(*m).and_then(ModelNode::parent) != Some(old_parent) {
                return Err(GraphError::new("displace requires a set of siblings"));
            }
        }
        if old_parent == new_parent {
            return Ok(());
        }
        self.coupled(new_parent)?;
        let moved: FxHashSet<ModelId> = models.iter().copied().collect();

        // 1. Move the children themselves.
        for m in models {
            let name = self.get(*m).unwrap().name.clone();
            self.coupled_mut(old_parent)?.children.remove(&name);
            self.coupled_mut(new_parent)?.children.insert(name, *m);
            self.node_mut(*m)?.parent = Some(new_parent);
        }

        // 2. Internal connections: an entry whose source moved no longer
        // belongs under old_parent regardless of where its targets ended up,
        // so it is always dropped from there. Targets still split three
        // ways: both endpoints moved (relocated verbatim), source moved but
        // a target didn't (a boundary-crossing output, folded into step 3's
        // synthesis below), or source stayed but a target moved (a
        // boundary-crossing input, folded into step 4's).
        let old = self.coupled_mut(old_parent)?;
        let mut to_move_internal = Vec::new();
        let mut crossing_out_internal = Vec::new();
        let mut crossing_in_internal = Vec::new();
        old.internal_connections.retain(|(a, pa), targets| {
            if moved.contains(a) {
                let (moving, crossing): (Vec<_>, Vec<_>) = targets.drain(..).partition(|(b, _)| moved.contains(b));
                if !moving.is_empty() {
                    to_move_internal.push(((*a, pa.clone()), moving));
                }
                if !crossing.is_empty() {
                    crossing_out_internal.push((*a, pa.clone()));
                }
                false
            } else {
                let (keep, crossing): (Vec<_>, Vec<_>) = targets.drain(..).partition(|(b, _)| !moved.contains(b));
                *targets = keep;
                crossing_in_internal.extend(crossing);
                !targets.is_empty()
            }
        });
        for (key, targets) in to_move_internal {
            self.coupled_mut(new_parent)?
                .internal_connections
                .entry(key)
                .or_default()
                .extend(targets);
        }

        // 3. Output connections crossing the boundary: moved child's output
        // used to reach an old_parent output port, or (from step 2) a moved
        // child's output that used to reach a sibling left behind.
        // Synthesize a port on new_parent instead.
        let old = self.coupled_mut(old_parent)?;
        let mut crossing_out = crossing_out_internal;
        old.output_connections.retain(|(child, port), _| {
            if moved.contains(child) {
                crossing_out.push((*child, port.clone()));
                false
            } else {
                true
            }
        });
        for (child, port) in crossing_out {
            let child_name = self.get(child).unwrap().name().to_string();
            let synth = self.synthesize_port(new_parent, &child_name, &port, true);
            self.coupled_mut(new_parent)?.output_ports.insert(synth.clone());
            self.coupled_mut(new_parent)?
                .output_connections
                .entry((child, port))
                .or_default()
                .push(synth);
        }

        // 4. Input connections crossing the boundary: an old_parent input
        // port used to feed a moved child, or (from step 2) a sibling left
        // behind that used to feed a moved child internally. Synthesize a
        // port on new_parent.
        let old = self.coupled_mut(old_parent)?;
        let mut crossing_in = crossing_in_internal;
        old.input_connections.retain(|_, targets| {
            let (keep, moving): (Vec<_>, Vec<_>) = targets.drain(..).partition(|(m, _)| !moved.contains(m));
            *targets = keep;
            crossing_in.extend(moving);
            !targets.is_empty()
        });
        for (child, port) in crossing_in {
            let child_name = self.get(child).unwrap().name().to_string();
            let synth = self.synthesize_port(new_parent, &child_name, &port, false);
            self.coupled_mut(new_parent)?.input_ports.insert(synth.clone());
            self.coupled_mut(new_parent)?
                .input_connections
                .entry(synth)
                .or_default()
                .push((child, port));
        }

        Ok(())
    }

    /// Synthesizes a unique port name on `model`, derived from
    /// `(source_model, source_port)`, with a numeric suffix on collision.
    fn synthesize_port(&self, model: ModelId, source_model: &str, source_port: &str, output: bool) -> String {
        let base = format!("{source_model}_{source_port}");
        let existing = self
            .get(model)
            .map(|n| n.ports(output).clone())
            .unwrap_or_default();
        if !existing.contains(&base) {
            return base;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}_{n}");
            if !existing.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_two_atomics(g: &mut Graph) -> (ModelId, ModelId, ModelId) {
        let coupled = g.add_coupled_model(g.root(), "net").unwrap();
        let a = g.add_atomic_model(coupled, "a").unwrap();
        let b = g.add_atomic_model(coupled, "b").unwrap();
        g.add_output_port(a, "out").unwrap();
        g.add_input_port(b, "in").unwrap();
        (coupled, a, b)
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut g = Graph::new();
        g.add_atomic_model(g.root(), "a").unwrap();
        assert!(g.add_atomic_model(g.root(), "a").is_err());
    }

    #[test]
    fn connection_requires_existing_ports() {
        let mut g = Graph::new();
        let (coupled, a, b) = build_two_atomics(&mut g);
        assert!(g.add_internal_connection(coupled, a, "out", b, "in").is_ok());
        assert!(g.add_internal_connection(coupled, a, "missing", b, "in").is_err());
    }

    #[test]
    fn duplicate_connection_rejected() {
        let mut g = Graph::new();
        let (coupled, a, b) = build_two_atomics(&mut g);
        g.add_internal_connection(coupled, a, "out", b, "in").unwrap();
        assert!(g.add_internal_connection(coupled, a, "out", b, "in").is_err());
    }

    #[test]
    fn add_then_del_connection_is_identity() {
        let mut g = Graph::new();
        let (coupled, a, b) = build_two_atomics(&mut g);
        g.add_internal_connection(coupled, a, "out", b, "in").unwrap();
        g.del_internal_connection(coupled, a, "out", b, "in").unwrap();
        assert!(g.coupled(coupled).unwrap().internal_connections.is_empty());
    }

    #[test]
    fn rename_is_idempotent_and_reversible() {
        let mut g = Graph::new();
        let a = g.add_atomic_model(g.root(), "a").unwrap();
        g.rename(a, "a").unwrap();
        assert_eq!(g.get(a).unwrap().name(), "a");
        g.rename(a, "b").unwrap();
        g.rename(a, "a").unwrap();
        assert_eq!(g.get(a).unwrap().name(), "a");
    }

    #[test]
    fn delete_port_cascades_to_connections() {
        let mut g = Graph::new();
        let (coupled, a, b) = build_two_atomics(&mut g);
        g.add_internal_connection(coupled, a, "out", b, "in").unwrap();
        g.del_output_port(a, "out").unwrap();
        assert!(g.coupled(coupled).unwrap().internal_connections.is_empty());
    }

    #[test]
    fn delete_coupled_model_removes_all_descendants() {
        let mut g = Graph::new();
        let (coupled, a, b) = build_two_atomics(&mut g);
        g.add_internal_connection(coupled, a, "out", b, "in").unwrap();
        let deleted = g.delete_model(coupled).unwrap();
        assert_eq!(deleted.len(), 3); // coupled + a + b
        assert!(g.get(coupled).is_none());
        assert!(g.get(a).is_none());
        assert!(g.get(b).is_none());
        assert!(g.find_model(g.root(), "net").is_none());
    }

    #[test]
    fn find_model_from_path_navigates_hierarchy() {
        let mut g = Graph::new();
        let (_coupled, a, _b) = build_two_atomics(&mut g);
        assert_eq!(g.find_model_from_path(g.root(), "net,a"), Some(a));
        assert_eq!(g.find_model_from_path(g.root(), "net,missing"), None);
    }

    #[test]
    fn displace_preserves_internal_and_synthesizes_boundary_ports() {
        let mut g = Graph::new();
        let old_parent = g.add_coupled_model(g.root(), "old").unwrap();
        let new_parent = g.add_coupled_model(g.root(), "new").unwrap();
        let a = g.add_atomic_model(old_parent, "a").unwrap();
        let b = g.add_atomic_model(old_parent, "b").unwrap();
        let c = g.add_atomic_model(old_parent, "c").unwrap();
        g.add_output_port(a, "out").unwrap();
        g.add_input_port(b, "in").unwrap();
        g.add_input_port(c, "in").unwrap();
        // internal-to-moved-set connection
        g.add_internal_connection(old_parent, a, "out", b, "in").unwrap();
        // boundary-crossing connection: a -> c stays behind
        g.add_output_port(a, "out2").unwrap();
        g.add_internal_connection(old_parent, a, "out2", c, "in").unwrap();

        g.displace(&[a, b], new_parent).unwrap();

        assert_eq!(g.get(a).unwrap().parent(), Some(new_parent));
        assert_eq!(g.get(b).unwrap().parent(), Some(new_parent));
        // preserved verbatim
        assert_eq!(
            g.coupled(new_parent).unwrap().internal_connections(a, "out"),
            &[(b, "in".to_string())]
        );
        // boundary connection removed from old parent, synthesized as a new
        // output port on new_parent
        assert!(g.coupled(old_parent).unwrap().internal_connections(a, "out2").is_empty());
        assert!(!g.coupled(new_parent).unwrap().output_connections(a, "out2").is_empty());
    }

    #[test]
    fn displace_synthesizes_an_input_port_when_only_the_target_moves() {
        let mut g = Graph::new();
        let old_parent = g.add_coupled_model(g.root(), "old").unwrap();
        let new_parent = g.add_coupled_model(g.root(), "new").unwrap();
        let a = g.add_atomic_model(old_parent, "a").unwrap();
        let b = g.add_atomic_model(old_parent, "b").unwrap();
        g.add_output_port(a, "out").unwrap();
        g.add_input_port(b, "in").unwrap();
        // boundary-crossing connection: a -> b, but only b moves
        g.add_internal_connection(old_parent, a, "out", b, "in").unwrap();

        g.displace(&[b], new_parent).unwrap();

        assert_eq!(g.get(a).unwrap().parent(), Some(old_parent));
        assert_eq!(g.get(b).unwrap().parent(), Some(new_parent));
        // stale entry gone from old_parent
        assert!(g.coupled(old_parent).unwrap().internal_connections(a, "out").is_empty());
        // synthesized as a new input port on new_parent, wired to b
        assert_eq!(
            g.coupled(new_parent).unwrap().input_connections("b_in"),
            &[(b, "in".to_string())]
        );
    }
}

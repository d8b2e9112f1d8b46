//! Message routing (§4.5): the recursive up-then-down walk that turns an
//! `(atomic model, output port)` pair into the set of atomic
//! `(model, input port)` deliveries, with a cache keyed on the source.

use fxhash::FxHashMap;

use crate::graph::{Graph, ModelId, ModelKind};

/// Caches resolved deliveries per `(source model, source port)`. Since the
/// walk only depends on the graph's current topology, invalidation keys off
/// which coupled model's connection sets were mutated (§9 "Routing cache").
#[derive(Debug, Default)]
pub struct RoutingCache {
    routes: FxHashMap<(ModelId, String), Vec<(ModelId, String)>>,
    /// Which coupled models a cached route's walk passed through, so a
    /// structural edit at one of them invalidates exactly the routes that
    /// could have changed.
    participants: FxHashMap<ModelId, Vec<(ModelId, String)>>,
}

impl RoutingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached deliveries for `(model, port)`, computing and
    /// storing them on a miss.
    pub fn resolve(&mut self, graph: &Graph, model: ModelId, port: &str) -> Vec<(ModelId, String)> {
        let key = (model, port.to_string());
        if let Some(cached) = self.routes.get(&key) {
            return cached.clone();
        }

        let mut out = Vec::new();
        let mut visited = Vec::new();
        route_up(graph, model, port, &mut out, &mut visited);

        for coupled in &visited {
            self.participants.entry(*coupled).or_default().push(key.clone());
        }
        self.routes.insert(key.clone(), out.clone());
        out
    }

    /// Drops every cached route whose walk passed through `coupled`.
    pub fn invalidate(&mut self, coupled: ModelId) {
        if let Some(keys) = self.participants.remove(&coupled) {
            for key in keys {
                self.routes.remove(&key);
            }
        }
    }
}

/// Walks from `(model, port)` up through enclosing coupled models
/// (output-connection bubbling) and down from every sibling reached via an
/// internal connection (input-connection descent), appending atomic
/// deliveries to `out`. `visited` accumulates every coupled model whose
/// connection sets were consulted, for cache invalidation.
fn route_up(graph: &Graph, model: ModelId, port: &str, out: &mut Vec<(ModelId, String)>, visited: &mut Vec<ModelId>) {
    let Some(parent) = graph.get(model).and_then(|n| n.parent()) else {
        return;
    };
    let Some(parent_data) = graph.get(parent).and_then(|n| match &n.kind {
        ModelKind::Coupled(c) => Some(c),
        ModelKind::Atomic(_) => None,
    }) else {
        return;
    };
    visited.push(parent);

    for (sibling, sibling_port) in parent_data.internal_connections(model, port) {
        descend(graph, *sibling, sibling_port, out, visited);
    }

    for parent_port in parent_data.output_connections(model, port) {
        route_up(graph, parent, parent_port, out, visited);
    }
}

/// Walks down from `(model, port)`: if `model` is atomic, `port` is a
/// terminal delivery; if coupled, follows its input connections to its
/// children.
fn descend(graph: &Graph, model: ModelId, port: &str, out: &mut Vec<(ModelId, String)>, visited: &mut Vec<ModelId>) {
    let Some(node) = graph.get(model) else { return };
    match &node.kind {
        ModelKind::Atomic(_) => out.push((model, port.to_string())),
        ModelKind::Coupled(c) => {
            visited.push(model);
            for (child, child_port) in c.input_connections(port) {
                descend(graph, *child, child_port, out, visited);
            }
        }
    }
}

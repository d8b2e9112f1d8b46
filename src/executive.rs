//! Applying an executive's deferred graph edits (§4.6).
//!
//! Kept as free functions over [`Graph`] and [`DynamicsLoader`] rather than
//! methods on `Coordinator`, so the coordinator's own bookkeeping (simulator
//! table, queues, routing cache) stays in `coordinator` and this module only
//! ever touches topology.

use crate::dynamics::DynamicsLoader;
use crate::error::VleError;
use crate::graph::{Graph, ModelId};
use crate::simulator::GraphEdit;

/// What applying one [`GraphEdit`] did to the topology, so the coordinator
/// knows whether to instantiate or retire a [`crate::simulator::Simulator`].
pub enum EditOutcome {
    /// No model was created or destroyed (a port or connection edit).
    None,
    /// A new atomic model was created at this id; the coordinator still
    /// needs to resolve its dynamics and build + `init` a `Simulator`.
    Added(ModelId),
    /// `delModel` removed these ids (parent-before-child order, §4.1); the
    /// coordinator must retire any `Simulator` bound to each.
    Deleted(Vec<ModelId>),
}

/// Applies one edit relative to `parent`, the executive's own coupled
/// model (§4.6: edits are requested by child name, resolved against the
/// live graph at apply-time).
pub fn apply_edit(graph: &mut Graph, _loader: &mut DynamicsLoader, parent: ModelId, edit: GraphEdit) -> Result<EditOutcome, VleError> {
    match edit {
        GraphEdit::AddModel {
            name,
            dynamics,
            input_ports,
            output_ports,
        } => {
            let id = graph.add_atomic_model(parent, &name)?;
            for port in &input_ports {
                graph.add_input_port(id, port)?;
            }
            for port in &output_ports {
                graph.add_output_port(id, port)?;
            }
            graph
                .get_mut(id)
                .and_then(|n| n.as_atomic_mut())
                .expect("just created as atomic")
                .set_dynamics(dynamics);
            Ok(EditOutcome::Added(id))
        }
        GraphEdit::DelModel { name } => {
            let model = graph
                .find_model(parent, &name)
                .ok_or_else(|| crate::error::GraphError::new(format!("no such child '{name}'")))?;
            let deleted = graph.delete_model(model)?;
            Ok(EditOutcome::Deleted(deleted))
        }
        GraphEdit::AddInputPort { model, port } => {
            let id = resolve(graph, parent, &model)?;
            graph.add_input_port(id, &port)?;
            Ok(EditOutcome::None)
        }
        GraphEdit::DelInputPort { model, port } => {
            let id = resolve(graph, parent, &model)?;
            graph.del_input_port(id, &port)?;
            Ok(EditOutcome::None)
        }
        GraphEdit::AddOutputPort { model, port } => {
            let id = resolve(graph, parent, &model)?;
            graph.add_output_port(id, &port)?;
            Ok(EditOutcome::None)
        }
        GraphEdit::DelOutputPort { model, port } => {
            let id = resolve(graph, parent, &model)?;
            graph.del_output_port(id, &port)?;
            Ok(EditOutcome::None)
        }
        GraphEdit::AddInternalConnection { a, port_a, b, port_b } => {
            let model_a = resolve(graph, parent, &a)?;
            let model_b = resolve(graph, parent, &b)?;
            graph.add_internal_connection(parent, model_a, &port_a, model_b, &port_b)?;
            Ok(EditOutcome::None)
        }
        GraphEdit::RemoveInternalConnection { a, port_a, b, port_b } => {
            let model_a = resolve(graph, parent, &a)?;
            let model_b = resolve(graph, parent, &b)?;
            graph.del_internal_connection(parent, model_a, &port_a, model_b, &port_b)?;
            Ok(EditOutcome::None)
        }
    }
}

fn resolve(graph: &Graph, parent: ModelId, name: &str) -> Result<ModelId, VleError> {
    graph
        .find_model(parent, name)
        .ok_or_else(|| crate::error::GraphError::new(format!("no such child '{name}'")).into())
}

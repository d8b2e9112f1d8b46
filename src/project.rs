//! The project description (§6): a serializable definition of the model
//! graph, conditions, observables, views, output bindings and experiment
//! parameters, kept independent of any runtime object so it can be built
//! in memory (or, eventually, parsed from a file format) before
//! [`crate::root::RootCoordinator::load`] turns it into a [`Graph`] and a
//! [`crate::coordinator::Coordinator`].
//!
//! Shaped as a plain serde tree rather than a bespoke parser: the
//! recursive structural-model field (`children`) mirrors how the graph
//! itself nests coupled models.

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dynamics::DynamicsRef;
use crate::error::{ConfigError, VleError};
use crate::graph::{Graph, ModelId};
use crate::observation::ViewTrigger;
use crate::value::Value;

/// One node of the model tree (§3.1, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    Atomic {
        name: String,
        #[serde(default)]
        input_ports: Vec<String>,
        #[serde(default)]
        output_ports: Vec<String>,
        dynamics: DynamicsRef,
        #[serde(default)]
        observable: Option<String>,
        #[serde(default)]
        conditions: Vec<String>,
    },
    Coupled {
        name: String,
        #[serde(default)]
        input_ports: Vec<String>,
        #[serde(default)]
        output_ports: Vec<String>,
        #[serde(default)]
        children: Vec<ModelSpec>,
        /// `(coupled input port, child name, child input port)`
        #[serde(default)]
        input_connections: Vec<(String, String, String)>,
        /// `(child name, child output port, coupled output port)`
        #[serde(default)]
        output_connections: Vec<(String, String, String)>,
        /// `(child A name, output port, child B name, input port)`
        #[serde(default)]
        internal_connections: Vec<(String, String, String, String)>,
    },
}

impl ModelSpec {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ModelSpec::Atomic { name, .. } | ModelSpec::Coupled { name, .. } => name,
        }
    }

    /// Builds a fresh [`Graph`] whose root matches this spec, which must be
    /// [`ModelSpec::Coupled`] (the root model is always coupled, §3.1).
    pub fn into_graph(&self) -> Result<Graph, VleError> {
        if !matches!(self, ModelSpec::Coupled { .. }) {
            return Err(ConfigError::new("the project's root model must be coupled").into());
        }
        let mut graph = Graph::new();
        let root = graph.root();
        self.populate(&mut graph, root)?;
        Ok(graph)
    }

    fn populate(&self, graph: &mut Graph, target: ModelId) -> Result<(), VleError> {
        match self {
            ModelSpec::Atomic {
                input_ports,
                output_ports,
                dynamics,
                observable,
                conditions,
                ..
            } => {
                for port in input_ports {
                    graph.add_input_port(target, port)?;
                }
                for port in output_ports {
                    graph.add_output_port(target, port)?;
                }
                let atomic = graph
                    .get_mut(target)
                    .and_then(|n| n.as_atomic_mut())
                    .expect("target was just created as atomic");
                atomic.set_dynamics(dynamics.clone());
                if let Some(observable) = observable {
                    atomic.set_observable(observable.clone());
                }
                for condition in conditions {
                    atomic.add_condition(condition.clone());
                }
                Ok(())
            }
            ModelSpec::Coupled {
                input_ports,
                output_ports,
                children,
                input_connections,
                output_connections,
                internal_connections,
                ..
            } => {
                for port in input_ports {
                    graph.add_input_port(target, port)?;
                }
                for port in output_ports {
                    graph.add_output_port(target, port)?;
                }

                let mut by_name: FxHashMap<String, ModelId> = FxHashMap::default();
                for child in children {
                    let child_id = match child {
                        ModelSpec::Atomic { .. } => graph.add_atomic_model(target, child.name())?,
                        ModelSpec::Coupled { .. } => graph.add_coupled_model(target, child.name())?,
                    };
                    child.populate(graph, child_id)?;
                    by_name.insert(child.name().to_string(), child_id);
                }

                let lookup = |name: &str| -> Result<ModelId, VleError> {
                    by_name
                        .get(name)
                        .copied()
                        .ok_or_else(|| ConfigError::new(format!("connection references unknown child '{name}'")).into())
                };

                for (coupled_port, child_name, child_port) in input_connections {
                    let child_id = lookup(child_name)?;
                    graph.add_input_connection(target, coupled_port, child_id, child_port)?;
                }
                for (child_name, child_port, coupled_port) in output_connections {
                    let child_id = lookup(child_name)?;
                    graph.add_output_connection(target, child_id, child_port, coupled_port)?;
                }
                for (a_name, a_port, b_name, b_port) in internal_connections {
                    let a = lookup(a_name)?;
                    let b = lookup(b_name)?;
                    graph.add_internal_connection(target, a, a_port, b, b_port)?;
                }
                Ok(())
            }
        }
    }
}

/// A named bag of observable ports bound to views (§3.1, §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservableSpec {
    pub name: String,
    /// `port -> {view name}`.
    #[serde(default)]
    pub ports: BTreeMap<String, Vec<String>>,
}

/// A view's static configuration (§3.1, §6), before its triggers are
/// parsed and its plugin sink resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewSpec {
    pub name: String,
    /// The output binding (see [`OutputSpec`]) this view writes through.
    pub output: String,
    /// Trigger names: any of `timed`, `finish`, `internal`, `external`,
    /// `confluent`, `output`.
    pub triggers: Vec<String>,
    /// Required iff `triggers` contains `timed`.
    #[serde(default)]
    pub timestep: Option<f64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Binds an output name to an output-plugin reference; `plugin: None` uses
/// the built-in [`crate::observation::MatrixPlugin`] (§3.1, §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    #[serde(default)]
    pub plugin: Option<DynamicsRef>,
}

/// Experiment parameters: the simulated time window and RNG seed (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub begin: f64,
    pub duration: f64,
    #[serde(default)]
    pub seed: u64,
}

/// The complete project description (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub model: ModelSpec,
    #[serde(default)]
    pub conditions: BTreeMap<String, BTreeMap<String, Vec<Value>>>,
    #[serde(default)]
    pub observables: Vec<ObservableSpec>,
    #[serde(default)]
    pub views: Vec<ViewSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
    pub experiment: Experiment,
}

/// Parses one trigger name (§3.1, §4.7).
pub fn parse_trigger(name: &str) -> Result<ViewTrigger, ConfigError> {
    match name {
        "timed" => Ok(ViewTrigger::TIMED),
        "finish" => Ok(ViewTrigger::FINISH),
        "internal" => Ok(ViewTrigger::INTERNAL),
        "external" => Ok(ViewTrigger::EXTERNAL),
        "confluent" => Ok(ViewTrigger::CONFLUENT),
        "output" => Ok(ViewTrigger::OUTPUT),
        other => Err(ConfigError::new(format!("unknown view trigger '{other}'"))),
    }
}

/// Parses a view's trigger name list into the combined bit-set.
pub fn parse_triggers(names: &[String]) -> Result<ViewTrigger, ConfigError> {
    let mut triggers = ViewTrigger::empty();
    for name in names {
        triggers |= parse_trigger(name)?;
    }
    Ok(triggers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::DynamicsKind;

    fn beep_atomic(name: &str) -> ModelSpec {
        ModelSpec::Atomic {
            name: name.to_string(),
            input_ports: vec![],
            output_ports: vec!["out".to_string()],
            dynamics: DynamicsRef::new("pkg", "beep", DynamicsKind::Dynamics),
            observable: None,
            conditions: vec![],
        }
    }

    #[test]
    fn into_graph_wires_children_and_connections() {
        let spec = ModelSpec::Coupled {
            name: "root".to_string(),
            input_ports: vec![],
            output_ports: vec![],
            children: vec![
                beep_atomic("a"),
                ModelSpec::Atomic {
                    name: "b".to_string(),
                    input_ports: vec!["in".to_string()],
                    output_ports: vec![],
                    dynamics: DynamicsRef::new("pkg", "counter", DynamicsKind::Dynamics),
                    observable: None,
                    conditions: vec![],
                },
            ],
            input_connections: vec![],
            output_connections: vec![],
            internal_connections: vec![("a".to_string(), "out".to_string(), "b".to_string(), "in".to_string())],
        };

        let graph = spec.into_graph().unwrap();
        let a = graph.find_model(graph.root(), "a").unwrap();
        let b = graph.find_model(graph.root(), "b").unwrap();
        let coupled = graph.get(graph.root()).unwrap().as_coupled().unwrap();
        assert_eq!(coupled.internal_connections(a, "out"), &[(b, "in".to_string())]);
    }

    #[test]
    fn root_must_be_coupled() {
        let spec = beep_atomic("a");
        assert!(spec.into_graph().is_err());
    }

    #[test]
    fn rejects_unknown_trigger_name() {
        assert!(parse_trigger("bogus").is_err());
        assert!(parse_triggers(&["timed".to_string(), "bogus".to_string()]).is_err());
    }

    #[test]
    fn parses_combined_triggers() {
        let triggers = parse_triggers(&["internal".to_string(), "external".to_string()]).unwrap();
        assert!(triggers.contains(ViewTrigger::INTERNAL));
        assert!(triggers.contains(ViewTrigger::EXTERNAL));
        assert!(!triggers.contains(ViewTrigger::TIMED));
    }
}

//! The root coordinator facade: builds the runtime graph and tables from
//! a [`Project`], then drives the simulation through to completion via
//! the `load`/`init`/`run`/`finish` lifecycle exposed to an embedder.

use fxhash::FxHashMap;

use crate::coordinator::Coordinator;
use crate::dynamics::{DynamicsKind, DynamicsLoader};
use crate::error::{ConfigError, VleError};
use crate::observation::{MatrixPlugin, Observable, OutputPlugin, View, ViewId, ViewState, ViewTrigger};
use crate::project::{self, Project};
use crate::time::SimTime;
use crate::value::Value;

/// Owns one simulation end to end.
pub struct RootCoordinator {
    coordinator: Coordinator,
    begin: SimTime,
    end: SimTime,
}

impl RootCoordinator {
    /// Builds the graph, conditions, observables and views described by
    /// `project`, resolving every dynamics/output-plugin reference through
    /// `loader` (§4.5 "At load").
    pub fn load(project: &Project, mut loader: DynamicsLoader) -> Result<Self, VleError> {
        let graph = project.model.into_graph()?;

        let conditions: FxHashMap<String, FxHashMap<String, Vec<Value>>> = project
            .conditions
            .iter()
            .map(|(id, ports)| (id.clone(), ports.iter().map(|(p, v)| (p.clone(), v.clone())).collect()))
            .collect();

        let mut view_ids: FxHashMap<String, ViewId> = FxHashMap::default();
        let mut views: FxHashMap<ViewId, ViewState> = FxHashMap::default();

        for (idx, view_spec) in project.views.iter().enumerate() {
            let vid = ViewId(idx);
            let triggers = project::parse_triggers(&view_spec.triggers)?;
            if triggers.contains(ViewTrigger::TIMED) && view_spec.timestep.is_none() {
                return Err(ConfigError::new(format!(
                    "view '{}' triggers on TIMED but has no timestep",
                    view_spec.name
                ))
                .into());
            }

            let mut view = View::new(view_spec.name.clone(), view_spec.output.clone(), triggers);
            if let Some(step) = view_spec.timestep {
                view = view.with_timestep(step);
            }
            if !view_spec.enabled {
                view = view.disabled();
            }

            let plugin = resolve_plugin(&mut loader, project, &view_spec.output)?;
            views.insert(vid, ViewState::new(view, plugin));
            view_ids.insert(view_spec.name.clone(), vid);
        }

        let mut observables: FxHashMap<String, Observable> = FxHashMap::default();
        for obs_spec in &project.observables {
            let mut observable = Observable::new(obs_spec.name.clone());
            for (port, view_names) in &obs_spec.ports {
                for view_name in view_names {
                    let vid = *view_ids.get(view_name).ok_or_else(|| {
                        ConfigError::new(format!(
                            "observable '{}' references unknown view '{view_name}'",
                            obs_spec.name
                        ))
                    })?;
                    observable.bind(port.clone(), vid);
                }
            }
            observables.insert(obs_spec.name.clone(), observable);
        }

        let coordinator = Coordinator::load(graph, loader, conditions, observables, views, project.experiment.seed)?;
        let begin = SimTime::new(project.experiment.begin);
        let end = SimTime::new(project.experiment.begin + project.experiment.duration);

        Ok(Self { coordinator, begin, end })
    }

    /// Runs every atomic model's `init` at the experiment's begin time
    /// (§4.5 "At init").
    pub fn init(&mut self) -> Result<(), VleError> {
        self.coordinator.init(self.begin)
    }

    /// Performs one step. Returns `false` once the simulation has reached
    /// its end time and nothing remains to fire before it.
    pub fn run(&mut self) -> Result<bool, VleError> {
        self.coordinator.run(self.end)
    }

    /// Runs to completion, looping `run` until it returns `false`.
    pub fn run_to_completion(&mut self) -> Result<(), VleError> {
        while self.run()? {}
        Ok(())
    }

    /// Finishes every simulator and output plugin, returning each enabled
    /// view's matrix by view name (§4.5 "At finish").
    pub fn finish(&mut self) -> FxHashMap<String, Value> {
        self.coordinator.finish(self.current_time())
    }

    #[must_use]
    pub fn current_time(&self) -> SimTime {
        self.coordinator.current_time()
    }
}

fn resolve_plugin(loader: &mut DynamicsLoader, project: &Project, output_name: &str) -> Result<Box<dyn OutputPlugin>, VleError> {
    let Some(spec) = project.outputs.iter().find(|o| o.name == output_name) else {
        return Ok(Box::new(MatrixPlugin::default()));
    };
    let Some(dynamics_ref) = &spec.plugin else {
        return Ok(Box::new(MatrixPlugin::default()));
    };
    if dynamics_ref.kind != DynamicsKind::Oov {
        return Err(ConfigError::new(format!(
            "output '{output_name}' is bound to a non-Oov dynamics reference"
        ))
        .into());
    }
    Ok(loader.resolve_output(dynamics_ref)?)
}

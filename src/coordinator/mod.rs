//! One simulation step (§4.4), message routing (§4.5) and the glue that
//! turns an executive's deferred edits into new or retired simulators
//! (§4.6).

mod routing;

pub use routing::RoutingCache;

use fxhash::{FxHashMap, FxHashSet};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dynamics::{DynamicsKind, DynamicsLoader};
use crate::error::{ConfigError, InternalError, VleError};
use crate::executive::{self, EditOutcome};
use crate::graph::{Graph, ModelId};
use crate::observation::{Observable, ViewId, ViewState, ViewTrigger};
use crate::queues::EventQueues;
use crate::simulator::{DynamicsCtx, ExecutiveHandle, ExternalEvent, GraphEdit, Simulator, SimulatorId};
use crate::time::SimTime;
use crate::value::Value;

/// Drives the model tree flattened at [`Coordinator::load`] through one
/// simulated instant per [`Coordinator::run`] call (§4.5).
pub struct Coordinator {
    graph: Graph,
    loader: DynamicsLoader,
    sims: FxHashMap<SimulatorId, Simulator>,
    /// The observable a simulator's atomic model was bound to at creation
    /// time, cached here because a deleted model's graph node is gone by
    /// the time we need to fire `onDelObservable` for it.
    sim_observable: FxHashMap<SimulatorId, Option<String>>,
    model_sim: FxHashMap<ModelId, SimulatorId>,
    queues: EventQueues,
    rng: StdRng,
    /// `condition id -> (port -> values)`, merged per atomic model from its
    /// referenced condition ids (§6).
    conditions: FxHashMap<String, FxHashMap<String, Vec<Value>>>,
    observables: FxHashMap<String, Observable>,
    views: FxHashMap<ViewId, ViewState>,
    routing: RoutingCache,
    executive_handles: FxHashMap<SimulatorId, ExecutiveHandle>,
    next_sim: usize,
    current_time: SimTime,
}

impl Coordinator {
    /// Flattens `graph`'s atomic models into a simulator per model,
    /// resolving each one's dynamics through `loader` (§4.5 "At load").
    pub fn load(
        graph: Graph,
        mut loader: DynamicsLoader,
        conditions: FxHashMap<String, FxHashMap<String, Vec<Value>>>,
        observables: FxHashMap<String, Observable>,
        views: FxHashMap<ViewId, ViewState>,
        seed: u64,
    ) -> Result<Self, VleError> {
        let mut sims = FxHashMap::default();
        let mut sim_observable = FxHashMap::default();
        let mut model_sim = FxHashMap::default();
        let mut next_sim = 0usize;

        for model in graph.descendants(graph.root()) {
            let Some(atomic) = graph.get(model).and_then(|n| n.as_atomic()) else {
                continue;
            };
            let dynamics_ref = atomic.dynamics().cloned().ok_or_else(|| {
                ConfigError::new(format!("atomic model '{}' has no bound dynamics", graph.get(model).unwrap().name()))
            })?;
            let resolved = loader.resolve(&dynamics_ref)?;
            let dynamics = (resolved.factory)();
            let is_executive = resolved.kind == DynamicsKind::Executive;

            let sid = SimulatorId(next_sim);
            next_sim += 1;
            sims.insert(sid, Simulator::new(sid, model, dynamics, is_executive));
            sim_observable.insert(sid, atomic.observable().map(str::to_string));
            model_sim.insert(model, sid);
        }

        Ok(Self {
            graph,
            loader,
            sims,
            sim_observable,
            model_sim,
            queues: EventQueues::new(),
            rng: StdRng::seed_from_u64(seed),
            conditions,
            observables,
            views,
            routing: RoutingCache::new(),
            executive_handles: FxHashMap::default(),
            next_sim,
            current_time: SimTime::ZERO,
        })
    }

    #[must_use]
    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Whether every queue is exhausted (§4.4 step 2's `+∞` case).
    pub fn is_exhausted(&mut self) -> bool {
        self.queues.next_time().is_none()
    }

    fn conditions_for_model(&self, model: ModelId) -> FxHashMap<String, Vec<Value>> {
        let mut merged = FxHashMap::default();
        if let Some(atomic) = self.graph.get(model).and_then(|n| n.as_atomic()) {
            for condition_id in atomic.conditions() {
                if let Some(condition) = self.conditions.get(condition_id) {
                    for (port, values) in condition {
                        merged.entry(port.clone()).or_insert_with(Vec::new).extend(values.iter().cloned());
                    }
                }
            }
        }
        merged
    }

    fn executive_slot(&mut self, sid: SimulatorId, model: ModelId) -> Option<&mut ExecutiveHandle> {
        if !self.sims.get(&sid)?.is_executive {
            return None;
        }
        let parent = self.graph.get(model).and_then(|n| n.parent());
        Some(
            self.executive_handles
                .entry(sid)
                .or_insert_with(|| ExecutiveHandle { pending: Vec::new(), parent }),
        )
    }

    // -----------------------------------------------------------------
    // Init (§4.5 "At init")
    // -----------------------------------------------------------------

    pub fn init(&mut self, t0: SimTime) -> Result<(), VleError> {
        self.current_time = t0;
        let sim_ids: Vec<SimulatorId> = self.sims.keys().copied().collect();

        for sid in sim_ids {
            let model = self.sims[&sid].model;
            let model_conditions = self.conditions_for_model(model);

            let ta = {
                let executive = self.executive_slot(sid, model);
                let mut ctx = DynamicsCtx {
                    time: t0,
                    rng: &mut self.rng,
                    conditions: &model_conditions,
                    executive,
                };
                self.sims.get_mut(&sid).unwrap().dynamics.init(&mut ctx)
            };

            let sim = self.sims.get_mut(&sid).unwrap();
            sim.t_l = t0;
            sim.t_n = t0 + ta;
            let t_n = sim.t_n;
            self.queues.timed.push(sid, t_n);

            self.fire_new_observable(sid, t0);
        }

        let timed_views: Vec<ViewId> = self
            .views
            .iter()
            .filter(|(_, vs)| vs.view.triggers.contains(ViewTrigger::TIMED))
            .map(|(id, _)| *id)
            .collect();
        // Open Question resolution (DESIGN.md #1): first firing is at `t0`
        // itself.
        for vid in timed_views {
            self.queues.view.push(vid, t0);
        }

        Ok(())
    }

    fn fire_new_observable(&mut self, sid: SimulatorId, time: SimTime) {
        let Some(Some(observable_name)) = self.sim_observable.get(&sid).cloned() else {
            return;
        };
        let Some(observable) = self.observables.get(&observable_name) else {
            return;
        };
        let bindings: Vec<(String, ViewId)> = observable
            .ports
            .iter()
            .flat_map(|(port, views)| views.iter().map(move |v| (port.clone(), *v)))
            .collect();
        for (port, vid) in bindings {
            if let Some(vs) = self.views.get_mut(&vid) {
                vs.bind(sid, port, time);
            }
        }
    }

    // -----------------------------------------------------------------
    // Step (§4.4)
    // -----------------------------------------------------------------

    /// Performs one imminent-bundle step. Returns `false` when the
    /// simulation has nothing left to do at or before `end_time`.
    pub fn run(&mut self, end_time: SimTime) -> Result<bool, VleError> {
        let Some(now) = self.queues.next_time() else {
            return Ok(false);
        };
        if now > end_time {
            return Ok(false);
        }

        let imminent = self.queues.timed.pop_bundle(now);
        let imminent_set: FxHashSet<SimulatorId> = imminent.iter().copied().collect();

        // Step 4: output phase. Routed events are collected step-locally,
        // not reinserted into X, to avoid re-entry into this tick (§4.4).
        let mut step_local: FxHashMap<SimulatorId, Vec<ExternalEvent>> = FxHashMap::default();
        for &sid in &imminent {
            let model = self.sims[&sid].model;
            let model_conditions = self.conditions_for_model(model);
            let mut out = Vec::new();
            {
                let executive = self.executive_slot(sid, model);
                let mut ctx = DynamicsCtx {
                    time: now,
                    rng: &mut self.rng,
                    conditions: &model_conditions,
                    executive,
                };
                self.sims.get_mut(&sid).unwrap().dynamics.output(&mut ctx, &mut out);
            }
            self.dispatch_view_trigger(sid, now, ViewTrigger::OUTPUT)?;

            for ev in out {
                let dests = self.routing.resolve(&self.graph, model, &ev.port);
                let n = dests.len();
                let mut value_slot = Some(ev.value);
                for (i, (dest_model, dest_port)) in dests.iter().enumerate() {
                    let Some(&dest_sim) = self.model_sim.get(dest_model) else {
                        continue;
                    };
                    let value = if i + 1 == n {
                        value_slot.take().expect("last delivery takes the only remaining value")
                    } else {
                        value_slot.clone().expect("value available for fan-out clone")
                    };
                    step_local
                        .entry(dest_sim)
                        .or_default()
                        .push(ExternalEvent::new(dest_port.clone(), value));
                }
            }
        }

        // Step 5 delivery bundle: queued X events plus this tick's routed
        // output, merged by destination.
        let mut external_bundle = self.queues.external.pop_bundle(now);
        for (sid, events) in step_local {
            external_bundle.entry(sid).or_default().extend(events);
        }

        let mut external_only: Vec<SimulatorId> =
            external_bundle.keys().copied().filter(|s| !imminent_set.contains(s)).collect();
        external_only.sort();

        let mut affected: Vec<SimulatorId> = Vec::with_capacity(imminent.len() + external_only.len());

        // Imminent bundle, in insertion-epoch order (§8 property 3).
        for &sid in &imminent {
            affected.push(sid);
            let model = self.sims[&sid].model;
            let model_conditions = self.conditions_for_model(model);
            let events = external_bundle.remove(&sid);
            let confluent = events.as_ref().is_some_and(|e| !e.is_empty());
            {
                let executive = self.executive_slot(sid, model);
                let mut ctx = DynamicsCtx {
                    time: now,
                    rng: &mut self.rng,
                    conditions: &model_conditions,
                    executive,
                };
                let sim = self.sims.get_mut(&sid).unwrap();
                if confluent {
                    sim.dynamics.confluent_transitions(&mut ctx, &events.unwrap());
                } else {
                    sim.dynamics.internal_transition(&mut ctx);
                }
            }
            self.dispatch_view_trigger(sid, now, if confluent { ViewTrigger::CONFLUENT } else { ViewTrigger::INTERNAL })?;
        }

        // External-only simulators, sorted for determinism (§4.4 classifies
        // these without an epoch to break ties on).
        for sid in external_only {
            affected.push(sid);
            let model = self.sims[&sid].model;
            let model_conditions = self.conditions_for_model(model);
            let events = external_bundle.remove(&sid).unwrap_or_default();
            {
                let executive = self.executive_slot(sid, model);
                let mut ctx = DynamicsCtx {
                    time: now,
                    rng: &mut self.rng,
                    conditions: &model_conditions,
                    executive,
                };
                self.sims.get_mut(&sid).unwrap().dynamics.external_transition(&mut ctx, &events);
            }
            self.dispatch_view_trigger(sid, now, ViewTrigger::EXTERNAL)?;
        }

        // Step 6: recompute ta and reinsert with a fresh epoch.
        for &sid in &affected {
            let model = self.sims[&sid].model;
            let model_conditions = self.conditions_for_model(model);
            let ta = {
                let ctx = DynamicsCtx {
                    time: now,
                    rng: &mut self.rng,
                    conditions: &model_conditions,
                    executive: None,
                };
                self.sims.get(&sid).unwrap().dynamics.time_advance(&ctx)
            };
            let sim = self.sims.get_mut(&sid).unwrap();
            sim.t_l = now;
            sim.t_n = now + ta;
            let t_n = sim.t_n;
            self.queues.timed.push(sid, t_n);
        }

        // Step 7: timed views fire independent of which simulator, if any,
        // transitioned this tick.
        let timed_views = self.queues.view.pop_bundle(now);
        for vid in timed_views {
            self.dispatch_all_bound(vid, now);
            let step = self.views.get(&vid).and_then(|vs| vs.view.timestep);
            if let Some(step) = step {
                self.queues.view.push(vid, now + step);
            }
        }

        // Executive edits requested during this step apply now, after the
        // observation pass and before the next step (§4.6).
        self.apply_pending_executive_edits(&affected, now)?;

        self.current_time = now;
        Ok(true)
    }

    /// Forwards a non-null `observation(port)` to every view bound to
    /// `sid`'s observable whose trigger set contains `trigger`.
    fn dispatch_view_trigger(&mut self, sid: SimulatorId, time: SimTime, trigger: ViewTrigger) -> Result<(), VleError> {
        let Some(Some(observable_name)) = self.sim_observable.get(&sid).cloned() else {
            return Ok(());
        };
        let Some(observable) = self.observables.get(&observable_name) else {
            return Ok(());
        };
        let bindings: Vec<(String, ViewId)> = observable
            .ports
            .iter()
            .flat_map(|(port, views)| views.iter().map(move |v| (port.clone(), *v)))
            .collect();

        let model = self
            .sims
            .get(&sid)
            .map(|s| s.model)
            .ok_or_else(|| InternalError::new("dispatch against an unknown simulator"))?;

        for (port, vid) in bindings {
            let matches = self.views.get(&vid).is_some_and(|vs| vs.view.triggers.contains(trigger));
            if !matches {
                continue;
            }
            let model_conditions = self.conditions_for_model(model);
            let value = {
                let ctx = DynamicsCtx {
                    time,
                    rng: &mut self.rng,
                    conditions: &model_conditions,
                    executive: None,
                };
                self.sims.get(&sid).unwrap().dynamics.observation(&ctx, &port)
            };
            if let Some(value) = value {
                if let Some(vs) = self.views.get_mut(&vid) {
                    vs.push_value(sid, &port, time, value);
                }
            }
        }
        Ok(())
    }

    /// Queries every `(simulator, port)` bound to `vid`'s observable
    /// regardless of which simulator just transitioned — used for `TIMED`
    /// (§4.7) and `FINISH` firing.
    fn dispatch_all_bound(&mut self, vid: ViewId, time: SimTime) {
        let sim_ids: Vec<SimulatorId> = self.sims.keys().copied().collect();
        for sid in sim_ids {
            let Some(Some(observable_name)) = self.sim_observable.get(&sid).cloned() else {
                continue;
            };
            let Some(observable) = self.observables.get(&observable_name) else {
                continue;
            };
            let ports: Vec<String> = observable
                .ports
                .iter()
                .filter(|(_, views)| views.contains(&vid))
                .map(|(port, _)| port.clone())
                .collect();
            if ports.is_empty() {
                continue;
            }
            let model = self.sims[&sid].model;
            for port in ports {
                let model_conditions = self.conditions_for_model(model);
                let value = {
                    let ctx = DynamicsCtx {
                        time,
                        rng: &mut self.rng,
                        conditions: &model_conditions,
                        executive: None,
                    };
                    self.sims.get(&sid).unwrap().dynamics.observation(&ctx, &port)
                };
                if let Some(value) = value {
                    if let Some(vs) = self.views.get_mut(&vid) {
                        vs.push_value(sid, &port, time, value);
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Executive hook (§4.6)
    // -----------------------------------------------------------------

    fn apply_pending_executive_edits(&mut self, affected: &[SimulatorId], now: SimTime) -> Result<(), VleError> {
        let executive_sids: Vec<SimulatorId> =
            affected.iter().copied().filter(|s| self.sims.get(s).is_some_and(|s| s.is_executive)).collect();

        for sid in executive_sids {
            let edits = self
                .executive_handles
                .get_mut(&sid)
                .map(|h| std::mem::take(&mut h.pending))
                .unwrap_or_default();
            if edits.is_empty() {
                continue;
            }
            let model = self.sims[&sid].model;
            let parent = self
                .graph
                .get(model)
                .and_then(|n| n.parent())
                .ok_or_else(|| InternalError::new("executive model has no parent coupled model"))?;

            for edit in edits {
                let outcome = executive::apply_edit(&mut self.graph, &mut self.loader, parent, edit)?;
                self.routing.invalidate(parent);
                match outcome {
                    EditOutcome::None => {}
                    EditOutcome::Added(new_model) => self.instantiate_simulator(new_model, now)?,
                    EditOutcome::Deleted(deleted) => {
                        for dm in deleted {
                            self.retire_simulator_for_model(dm, now);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn instantiate_simulator(&mut self, model: ModelId, time: SimTime) -> Result<(), VleError> {
        let dynamics_ref = self
            .graph
            .get(model)
            .and_then(|n| n.as_atomic())
            .and_then(|a| a.dynamics().cloned())
            .ok_or_else(|| ConfigError::new("a newly added model has no bound dynamics"))?;
        let observable_name = self
            .graph
            .get(model)
            .and_then(|n| n.as_atomic())
            .and_then(|a| a.observable())
            .map(str::to_string);

        let resolved = self.loader.resolve(&dynamics_ref)?;
        let dynamics = (resolved.factory)();
        let is_executive = resolved.kind == DynamicsKind::Executive;

        let sid = SimulatorId(self.next_sim);
        self.next_sim += 1;
        self.sims.insert(sid, Simulator::new(sid, model, dynamics, is_executive));
        self.sim_observable.insert(sid, observable_name);
        self.model_sim.insert(model, sid);

        let model_conditions = self.conditions_for_model(model);
        let ta = {
            let executive = self.executive_slot(sid, model);
            let mut ctx = DynamicsCtx {
                time,
                rng: &mut self.rng,
                conditions: &model_conditions,
                executive,
            };
            self.sims.get_mut(&sid).unwrap().dynamics.init(&mut ctx)
        };
        let sim = self.sims.get_mut(&sid).unwrap();
        sim.t_l = time;
        sim.t_n = time + ta;
        let t_n = sim.t_n;
        self.queues.timed.push(sid, t_n);

        self.fire_new_observable(sid, time);
        Ok(())
    }

    fn retire_simulator_for_model(&mut self, model: ModelId, time: SimTime) {
        let Some(sid) = self.model_sim.remove(&model) else {
            return;
        };
        self.queues.timed.remove(sid);
        self.queues.external.drop_destination(sid);
        self.executive_handles.remove(&sid);

        if let Some(Some(observable_name)) = self.sim_observable.remove(&sid) {
            if let Some(observable) = self.observables.get(&observable_name).cloned() {
                let mut affected_views: FxHashSet<ViewId> = FxHashSet::default();
                for views in observable.ports.values() {
                    affected_views.extend(views.iter().copied());
                }
                for vid in affected_views {
                    if let Some(vs) = self.views.get_mut(&vid) {
                        vs.unbind_all_for(sid, time);
                    }
                }
            }
        }

        if let Some(mut sim) = self.sims.remove(&sid) {
            let empty_conditions = FxHashMap::default();
            let mut ctx = DynamicsCtx {
                time,
                rng: &mut self.rng,
                conditions: &empty_conditions,
                executive: None,
            };
            sim.dynamics.finish(&mut ctx);
        }
    }

    // -----------------------------------------------------------------
    // Finish (§4.5 "At finish")
    // -----------------------------------------------------------------

    /// Calls `finish` on every live simulator and output plugin, serializes
    /// every enabled view's matrix, and returns the final result map.
    pub fn finish(&mut self, time: SimTime) -> FxHashMap<String, Value> {
        let sim_ids: Vec<SimulatorId> = self.sims.keys().copied().collect();
        let empty_conditions = FxHashMap::default();
        for sid in sim_ids {
            if let Some(sim) = self.sims.get_mut(&sid) {
                let mut ctx = DynamicsCtx {
                    time,
                    rng: &mut self.rng,
                    conditions: &empty_conditions,
                    executive: None,
                };
                sim.dynamics.finish(&mut ctx);
            }
        }

        let finish_views: Vec<ViewId> = self
            .views
            .iter()
            .filter(|(_, vs)| vs.view.triggers.contains(ViewTrigger::FINISH))
            .map(|(id, _)| *id)
            .collect();
        for vid in finish_views {
            self.dispatch_all_bound(vid, time);
        }

        let mut result = FxHashMap::default();
        for (_, vs) in self.views.iter_mut() {
            if let Some(matrix) = vs.finish(time) {
                result.insert(vs.view.name.clone(), matrix);
            }
        }
        result
    }
}

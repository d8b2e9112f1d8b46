//! End-to-end scenarios exercising `RootCoordinator` against the public
//! `Dynamics` trait, mirroring the kernel's documented testable properties.

use std::collections::BTreeMap;

use vle::dynamics::{DynamicsKind, DynamicsLoader, DynamicsRef};
use vle::project::{Experiment, ModelSpec, ObservableSpec, OutputSpec, Project, ViewSpec};
use vle::root::RootCoordinator;
use vle::simulator::{Dynamics, DynamicsCtx, ExternalEvent};
use vle::value::Value;

fn int_column(row: &[Value], idx: usize) -> i64 {
    match &row[idx] {
        Value::Int(n) => *n,
        other => panic!("expected column {idx} to be an int, got {other:?}"),
    }
}

/// Emits one event on `out` every tick; exposes nothing observable itself.
#[derive(Default)]
struct Beep;

impl Dynamics for Beep {
    fn init(&mut self, _ctx: &mut DynamicsCtx<'_>) -> f64 {
        1.0
    }

    fn time_advance(&self, _ctx: &DynamicsCtx<'_>) -> f64 {
        1.0
    }

    fn output(&mut self, _ctx: &mut DynamicsCtx<'_>, out: &mut Vec<ExternalEvent>) {
        out.push(ExternalEvent::new("out", Value::Int(1)));
    }

    fn internal_transition(&mut self, _ctx: &mut DynamicsCtx<'_>) {}

    fn external_transition(&mut self, _ctx: &mut DynamicsCtx<'_>, _events: &[ExternalEvent]) {}

    fn observation(&self, _ctx: &DynamicsCtx<'_>, _port: &str) -> Option<Value> {
        None
    }
}

/// Counts events received on `in`, exposed via observable port `count`.
#[derive(Default)]
struct Counter {
    count: i64,
}

impl Dynamics for Counter {
    fn init(&mut self, _ctx: &mut DynamicsCtx<'_>) -> f64 {
        f64::INFINITY
    }

    fn time_advance(&self, _ctx: &DynamicsCtx<'_>) -> f64 {
        f64::INFINITY
    }

    fn output(&mut self, _ctx: &mut DynamicsCtx<'_>, _out: &mut Vec<ExternalEvent>) {}

    fn internal_transition(&mut self, _ctx: &mut DynamicsCtx<'_>) {}

    fn external_transition(&mut self, _ctx: &mut DynamicsCtx<'_>, events: &[ExternalEvent]) {
        self.count += events.len() as i64;
    }

    fn observation(&self, _ctx: &DynamicsCtx<'_>, port: &str) -> Option<Value> {
        (port == "count").then_some(Value::Int(self.count))
    }
}

fn beep_counter_project(view_triggers: Vec<String>, timestep: Option<f64>, enabled: bool) -> Project {
    Project {
        model: ModelSpec::Coupled {
            name: "root".to_string(),
            input_ports: vec![],
            output_ports: vec![],
            children: vec![
                ModelSpec::Atomic {
                    name: "beep".to_string(),
                    input_ports: vec![],
                    output_ports: vec!["out".to_string()],
                    dynamics: DynamicsRef::new("pkg", "beep", DynamicsKind::Dynamics),
                    observable: None,
                    conditions: vec![],
                },
                ModelSpec::Atomic {
                    name: "counter".to_string(),
                    input_ports: vec!["in".to_string()],
                    output_ports: vec![],
                    dynamics: DynamicsRef::new("pkg", "counter", DynamicsKind::Dynamics),
                    observable: Some("obs".to_string()),
                    conditions: vec![],
                },
            ],
            input_connections: vec![],
            output_connections: vec![],
            internal_connections: vec![("beep".to_string(), "out".to_string(), "counter".to_string(), "in".to_string())],
        },
        conditions: BTreeMap::new(),
        observables: vec![ObservableSpec {
            name: "obs".to_string(),
            ports: BTreeMap::from([("count".to_string(), vec!["view1".to_string()])]),
        }],
        views: vec![ViewSpec {
            name: "view1".to_string(),
            output: "out1".to_string(),
            triggers: view_triggers,
            timestep,
            enabled,
        }],
        outputs: vec![OutputSpec { name: "out1".to_string(), plugin: None }],
        experiment: Experiment { begin: 0.0, duration: 100.0, seed: 7 },
    }
}

fn wire_loader() -> DynamicsLoader {
    let mut loader = DynamicsLoader::new("/nonexistent");
    loader.register_static("beep", DynamicsKind::Dynamics, || Box::new(Beep));
    loader.register_static("counter", DynamicsKind::Dynamics, || Box::new(Counter::default()));
    loader
}

/// Scenario 1 (§8): a timed view sampling a counter every unit of time
/// over a producer firing once per tick yields 101 rows, the count
/// equal to the row index.
#[test]
fn single_producer_counter_timed_view() {
    let project = beep_counter_project(vec!["timed".to_string()], Some(1.0), true);
    let mut root = RootCoordinator::load(&project, wire_loader()).unwrap();
    root.init().unwrap();
    root.run_to_completion().unwrap();
    let result = root.finish();

    let Some(Value::Matrix(rows)) = result.get("view1") else {
        panic!("expected view1 to produce a matrix");
    };
    assert_eq!(rows.len(), 101);
    for (k, row) in rows.iter().enumerate() {
        let Value::Int(count) = &row[2] else {
            panic!("expected the sampled count column to be an int");
        };
        assert_eq!(*count, k as i64);
    }
}

/// Scenario 5 (§8): disabling a view suppresses its matrix entirely
/// while leaving the rest of the run unaffected.
#[test]
fn disabled_view_produces_no_matrix_entry() {
    let project = beep_counter_project(vec!["external".to_string()], None, false);
    let mut root = RootCoordinator::load(&project, wire_loader()).unwrap();
    root.init().unwrap();
    root.run_to_completion().unwrap();
    let result = root.finish();
    assert!(result.get("view1").is_none());
}

/// Scenario 6 (§8): deleting a coupled model frees every descendant
/// simulator exactly once, with no connection left referring to them.
#[test]
fn deleting_a_coupled_model_retires_every_descendant() {
    let project = Project {
        model: ModelSpec::Coupled {
            name: "root".to_string(),
            input_ports: vec![],
            output_ports: vec![],
            children: vec![ModelSpec::Coupled {
                name: "group".to_string(),
                input_ports: vec![],
                output_ports: vec![],
                children: vec![
                    ModelSpec::Atomic {
                        name: "beep".to_string(),
                        input_ports: vec![],
                        output_ports: vec!["out".to_string()],
                        dynamics: DynamicsRef::new("pkg", "beep", DynamicsKind::Dynamics),
                        observable: None,
                        conditions: vec![],
                    },
                    ModelSpec::Atomic {
                        name: "counter".to_string(),
                        input_ports: vec!["in".to_string()],
                        output_ports: vec![],
                        dynamics: DynamicsRef::new("pkg", "counter", DynamicsKind::Dynamics),
                        observable: None,
                        conditions: vec![],
                    },
                ],
                input_connections: vec![],
                output_connections: vec![],
                internal_connections: vec![(
                    "beep".to_string(),
                    "out".to_string(),
                    "counter".to_string(),
                    "in".to_string(),
                )],
            }],
            input_connections: vec![],
            output_connections: vec![],
            internal_connections: vec![],
        },
        conditions: BTreeMap::new(),
        observables: vec![],
        views: vec![],
        outputs: vec![],
        experiment: Experiment { begin: 0.0, duration: 10.0, seed: 0 },
    };

    let mut graph = project.model.into_graph().unwrap();
    let root_id = graph.root();
    let group_id = graph.find_model(root_id, "group").unwrap();
    let before = graph.descendants(group_id).len();
    assert_eq!(before, 3); // group itself, beep, counter

    let removed = graph.delete_model(group_id).unwrap();
    assert_eq!(removed.len(), 3);
    assert!(graph.find_model(root_id, "group").is_none());
    let root_coupled = graph.get(root_id).unwrap().as_coupled().unwrap();
    assert_eq!(root_coupled.children().count(), 0);
}

/// Scenario 2 (§8): an executive adds one child per tick from `t=1` through
/// `t=50`, then removes one per tick from `t=51` through `t=100`. A timed
/// view sampling the executive's own child-count observable every unit of
/// time should see it climb 0,1,…,50 and then fall back to 0, one sample
/// per row, 101 rows in all (the initial sample at `t=0` plus one per tick).
#[test]
fn executive_churn_drives_observable_child_count_up_then_down() {
    struct Exec {
        count: i64,
        added: Vec<String>,
    }

    impl Dynamics for Exec {
        fn init(&mut self, _ctx: &mut DynamicsCtx<'_>) -> f64 {
            1.0
        }

        fn time_advance(&self, _ctx: &DynamicsCtx<'_>) -> f64 {
            1.0
        }

        fn output(&mut self, _ctx: &mut DynamicsCtx<'_>, _out: &mut Vec<ExternalEvent>) {}

        fn internal_transition(&mut self, ctx: &mut DynamicsCtx<'_>) {
            let t = ctx.time.raw().round() as i64;
            let executive = ctx.executive.as_mut().expect("exec model should receive an executive handle");
            if t <= 50 {
                let name = format!("beep_{t}");
                executive.add_model(name.clone(), DynamicsRef::new("pkg", "child", DynamicsKind::Dynamics), vec![], vec![]);
                self.added.push(name);
                self.count += 1;
            } else {
                let name = self.added.pop().expect("a previously added child to remove");
                executive.del_model(name);
                self.count -= 1;
            }
        }

        fn external_transition(&mut self, _ctx: &mut DynamicsCtx<'_>, _events: &[ExternalEvent]) {}

        fn observation(&self, _ctx: &DynamicsCtx<'_>, port: &str) -> Option<Value> {
            (port == "nbmodel").then_some(Value::Int(self.count))
        }
    }

    struct Child;
    impl Dynamics for Child {
        fn init(&mut self, _ctx: &mut DynamicsCtx<'_>) -> f64 {
            f64::INFINITY
        }

        fn time_advance(&self, _ctx: &DynamicsCtx<'_>) -> f64 {
            f64::INFINITY
        }

        fn output(&mut self, _ctx: &mut DynamicsCtx<'_>, _out: &mut Vec<ExternalEvent>) {}

        fn internal_transition(&mut self, _ctx: &mut DynamicsCtx<'_>) {}

        fn external_transition(&mut self, _ctx: &mut DynamicsCtx<'_>, _events: &[ExternalEvent]) {}

        fn observation(&self, _ctx: &DynamicsCtx<'_>, _port: &str) -> Option<Value> {
            None
        }
    }

    let project = Project {
        model: ModelSpec::Coupled {
            name: "root".to_string(),
            input_ports: vec![],
            output_ports: vec![],
            children: vec![ModelSpec::Atomic {
                name: "exec".to_string(),
                input_ports: vec![],
                output_ports: vec![],
                dynamics: DynamicsRef::new("pkg", "exec", DynamicsKind::Executive),
                observable: Some("obs".to_string()),
                conditions: vec![],
            }],
            input_connections: vec![],
            output_connections: vec![],
            internal_connections: vec![],
        },
        conditions: BTreeMap::new(),
        observables: vec![ObservableSpec {
            name: "obs".to_string(),
            ports: BTreeMap::from([("nbmodel".to_string(), vec!["view1".to_string()])]),
        }],
        views: vec![ViewSpec {
            name: "view1".to_string(),
            output: "out1".to_string(),
            triggers: vec!["timed".to_string()],
            timestep: Some(1.0),
            enabled: true,
        }],
        outputs: vec![],
        experiment: Experiment { begin: 0.0, duration: 100.0, seed: 0 },
    };

    let mut loader = DynamicsLoader::new("/nonexistent");
    loader.register_static("exec", DynamicsKind::Executive, || Box::new(Exec { count: 0, added: Vec::new() }));
    loader.register_static("child", DynamicsKind::Dynamics, || Box::new(Child));

    let mut root = RootCoordinator::load(&project, loader).unwrap();
    root.init().unwrap();
    root.run_to_completion().unwrap();
    let result = root.finish();

    let Some(Value::Matrix(rows)) = result.get("view1") else {
        panic!("expected view1 to produce a matrix");
    };
    assert_eq!(rows.len(), 101);
    for (k, row) in rows.iter().enumerate() {
        let expected = if k <= 50 { k as i64 } else { (100 - k) as i64 };
        assert_eq!(int_column(row, 2), expected, "row {k}");
        assert!(matches!(&row[1], Value::String(_)), "row {k} should carry its port name");
    }
}

/// Scenario 4 (§8): a view flagged `OUTPUT` is sampled from inside a
/// simulator's own output phase, strictly before its internal transition
/// runs. The pulser bumps a `state` counter on both output and internal
/// transition, but snapshots the value at the start of `output` into a
/// separate field so the OUTPUT-triggered view reads `2*i` at tick `i`
/// (two increments complete per prior tick, none yet from the current one).
#[test]
fn output_triggered_view_samples_state_before_its_own_increment() {
    struct Pulser {
        state: i64,
        sample: i64,
    }

    impl Dynamics for Pulser {
        fn init(&mut self, _ctx: &mut DynamicsCtx<'_>) -> f64 {
            0.0
        }

        fn time_advance(&self, _ctx: &DynamicsCtx<'_>) -> f64 {
            1.0
        }

        fn output(&mut self, _ctx: &mut DynamicsCtx<'_>, _out: &mut Vec<ExternalEvent>) {
            self.sample = self.state;
            self.state += 1;
        }

        fn internal_transition(&mut self, _ctx: &mut DynamicsCtx<'_>) {
            self.state += 1;
        }

        fn external_transition(&mut self, _ctx: &mut DynamicsCtx<'_>, _events: &[ExternalEvent]) {}

        fn observation(&self, _ctx: &DynamicsCtx<'_>, port: &str) -> Option<Value> {
            (port == "state").then_some(Value::Int(self.sample))
        }
    }

    let project = Project {
        model: ModelSpec::Coupled {
            name: "root".to_string(),
            input_ports: vec![],
            output_ports: vec![],
            children: vec![ModelSpec::Atomic {
                name: "pulser".to_string(),
                input_ports: vec![],
                output_ports: vec![],
                dynamics: DynamicsRef::new("pkg", "pulser", DynamicsKind::Dynamics),
                observable: Some("obs".to_string()),
                conditions: vec![],
            }],
            input_connections: vec![],
            output_connections: vec![],
            internal_connections: vec![],
        },
        conditions: BTreeMap::new(),
        observables: vec![ObservableSpec {
            name: "obs".to_string(),
            ports: BTreeMap::from([("state".to_string(), vec!["view1".to_string()])]),
        }],
        views: vec![ViewSpec {
            name: "view1".to_string(),
            output: "out1".to_string(),
            triggers: vec!["output".to_string()],
            timestep: None,
            enabled: true,
        }],
        outputs: vec![],
        experiment: Experiment { begin: 0.0, duration: 100.0, seed: 0 },
    };

    let mut loader = DynamicsLoader::new("/nonexistent");
    loader.register_static("pulser", DynamicsKind::Dynamics, || Box::new(Pulser { state: 0, sample: 0 }));

    let mut root = RootCoordinator::load(&project, loader).unwrap();
    root.init().unwrap();
    root.run_to_completion().unwrap();
    let result = root.finish();

    let Some(Value::Matrix(rows)) = result.get("view1") else {
        panic!("expected view1 to produce a matrix");
    };
    assert_eq!(rows.len(), 101);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(int_column(row, 2), 2 * i as i64, "row {i}");
    }
}

/// A confluent transition (§8 scenario 3, §4.4 step 6): a model hit by an
/// external event exactly at its own internal-transition time is offered
/// `confluent_transitions`, not a separate internal-then-external pair.
#[test]
fn confluent_transition_fires_exactly_once() {
    #[derive(Default)]
    struct Recorder {
        internal_hits: i64,
        external_hits: i64,
        confluent_hits: i64,
    }

    impl Dynamics for Recorder {
        fn init(&mut self, _ctx: &mut DynamicsCtx<'_>) -> f64 {
            1.0
        }

        fn time_advance(&self, _ctx: &DynamicsCtx<'_>) -> f64 {
            f64::INFINITY
        }

        fn output(&mut self, _ctx: &mut DynamicsCtx<'_>, _out: &mut Vec<ExternalEvent>) {}

        fn internal_transition(&mut self, _ctx: &mut DynamicsCtx<'_>) {
            self.internal_hits += 1;
        }

        fn external_transition(&mut self, _ctx: &mut DynamicsCtx<'_>, _events: &[ExternalEvent]) {
            self.external_hits += 1;
        }

        fn confluent_transitions(&mut self, _ctx: &mut DynamicsCtx<'_>, _events: &[ExternalEvent]) {
            self.confluent_hits += 1;
        }

        fn observation(&self, _ctx: &DynamicsCtx<'_>, port: &str) -> Option<Value> {
            match port {
                "internal" => Some(Value::Int(self.internal_hits)),
                "external" => Some(Value::Int(self.external_hits)),
                "confluent" => Some(Value::Int(self.confluent_hits)),
                _ => None,
            }
        }

        fn finish(&mut self, _ctx: &mut DynamicsCtx<'_>) {}
    }

    let project = Project {
        model: ModelSpec::Coupled {
            name: "root".to_string(),
            input_ports: vec![],
            output_ports: vec![],
            children: vec![
                ModelSpec::Atomic {
                    name: "beep".to_string(),
                    input_ports: vec![],
                    output_ports: vec!["out".to_string()],
                    dynamics: DynamicsRef::new("pkg", "beep", DynamicsKind::Dynamics),
                    observable: None,
                    conditions: vec![],
                },
                ModelSpec::Atomic {
                    name: "recorder".to_string(),
                    input_ports: vec!["in".to_string()],
                    output_ports: vec![],
                    dynamics: DynamicsRef::new("pkg", "recorder", DynamicsKind::Dynamics),
                    observable: Some("obs".to_string()),
                    conditions: vec![],
                },
            ],
            input_connections: vec![],
            output_connections: vec![],
            internal_connections: vec![(
                "beep".to_string(),
                "out".to_string(),
                "recorder".to_string(),
                "in".to_string(),
            )],
        },
        conditions: BTreeMap::new(),
        observables: vec![ObservableSpec {
            name: "obs".to_string(),
            ports: BTreeMap::from([
                ("internal".to_string(), vec!["view1".to_string()]),
                ("external".to_string(), vec!["view1".to_string()]),
                ("confluent".to_string(), vec!["view1".to_string()]),
            ]),
        }],
        views: vec![ViewSpec {
            name: "view1".to_string(),
            output: "out1".to_string(),
            triggers: vec!["finish".to_string()],
            timestep: None,
            enabled: true,
        }],
        outputs: vec![],
        experiment: Experiment { begin: 0.0, duration: 1.0, seed: 0 },
    };

    let mut loader = DynamicsLoader::new("/nonexistent");
    loader.register_static("beep", DynamicsKind::Dynamics, || Box::new(Beep));
    loader.register_static("recorder", DynamicsKind::Dynamics, || Box::new(Recorder::default()));

    let mut root = RootCoordinator::load(&project, loader).unwrap();
    root.init().unwrap();
    root.run_to_completion().unwrap();
    let result = root.finish();

    let Some(Value::Matrix(rows)) = result.get("view1") else {
        panic!("expected view1 to produce a matrix");
    };
    let mut internal_hits = 0;
    let mut external_hits = 0;
    let mut confluent_hits = 0;
    for row in rows {
        match row[1].clone() {
            Value::String(port) if port == "internal" => {
                if let Value::Int(n) = row[2] {
                    internal_hits = n;
                }
            }
            Value::String(port) if port == "external" => {
                if let Value::Int(n) = row[2] {
                    external_hits = n;
                }
            }
            Value::String(port) if port == "confluent" => {
                if let Value::Int(n) = row[2] {
                    confluent_hits = n;
                }
            }
            _ => {}
        }
    }
    assert_eq!(confluent_hits, 1);
    assert_eq!(internal_hits, 0);
    assert_eq!(external_hits, 0);
}

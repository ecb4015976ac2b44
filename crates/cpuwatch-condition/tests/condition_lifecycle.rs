//! End-to-end condition behaviour against deterministic metrics sources.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use cpuwatch_condition::{
    ConditionConfig, CpuUsageCondition, Evaluation, StaticWatch, Times, TimesSpec,
};
use cpuwatch_core::{CpuwatchError, CpuwatchResult};
use cpuwatch_proc::{ProcessMetrics, ProcessTable, ProcessUsage};

const ROOT: u32 = 4000;

/// Replays one root-process sample per refresh; `None` means the root is gone.
#[derive(Debug, Default)]
struct ScriptedMetrics {
    script: VecDeque<Option<f64>>,
    current: Option<f64>,
}

impl ScriptedMetrics {
    fn new(samples: &[f64]) -> Self {
        Self {
            script: samples.iter().copied().map(Some).collect(),
            current: None,
        }
    }

    fn then_absent(mut self) -> Self {
        self.script.push_back(None);
        self
    }
}

impl ProcessMetrics for ScriptedMetrics {
    fn usage(&self, pid: u32) -> CpuwatchResult<ProcessUsage> {
        match self.current {
            Some(cpu_percent) if pid == ROOT => Ok(ProcessUsage {
                pid,
                cpu_percent,
                children: Vec::new(),
            }),
            _ => Err(CpuwatchError::not_found(pid)),
        }
    }

    fn refresh(&mut self) -> CpuwatchResult<()> {
        self.current = self.script.pop_front().flatten();
        Ok(())
    }
}

fn scripted(
    above: f64,
    times: TimesSpec,
    metrics: ScriptedMetrics,
) -> CpuUsageCondition<ScriptedMetrics> {
    CpuUsageCondition::builder()
        .above(above)
        .times_spec(times)
        .watch(Arc::new(StaticWatch::with_pid(ROOT)))
        .build_with(metrics)
        .expect("valid condition")
}

fn run(condition: &mut CpuUsageCondition<ScriptedMetrics>, polls: usize) -> Vec<Evaluation> {
    (0..polls).map(|_| condition.test()).collect()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("cpuwatch-it-{}-{}", std::process::id(), name))
}

#[test]
fn two_of_three_over_threshold_triggers() {
    let mut condition = scripted(
        25.0,
        TimesSpec::Window(2, 3),
        ScriptedMetrics::new(&[10.0, 30.0, 40.0]),
    );

    let evals = run(&mut condition, 3);
    assert!(!evals[0].triggered);
    assert!(!evals[1].triggered);
    assert!(evals[2].triggered);
    assert_eq!(evals[2].count_above, 2);
    assert_eq!(evals[2].message, "cpu out of bounds [10%, *30%, *40%]");
}

#[test]
fn samples_at_or_below_threshold_never_trigger() {
    let mut condition = scripted(
        25.0,
        TimesSpec::Window(2, 3),
        ScriptedMetrics::new(&[10.0, 20.0, 24.0, 25.0]),
    );

    let evals = run(&mut condition, 4);
    assert!(evals.iter().all(|e| !e.triggered));
    assert_eq!(
        evals[3].message,
        "cpu within bounds [20%, 24%, 25%]",
        "window keeps only the last three samples"
    );
}

#[test]
fn over_threshold_samples_need_not_be_consecutive() {
    let mut condition = scripted(
        50.0,
        TimesSpec::Window(2, 4),
        ScriptedMetrics::new(&[90.0, 1.0, 2.0, 95.0]),
    );

    let last = run(&mut condition, 4).pop().unwrap();
    assert!(last.triggered);
    assert_eq!(last.message, "cpu out of bounds [*90%, 1%, 2%, *95%]");
}

#[test]
fn old_spikes_age_out_of_the_window() {
    let mut condition = scripted(
        50.0,
        TimesSpec::Window(2, 3),
        ScriptedMetrics::new(&[90.0, 90.0, 1.0, 1.0]),
    );

    let evals = run(&mut condition, 4);
    assert!(evals[1].triggered);
    assert!(evals[2].triggered);
    assert!(!evals[3].triggered);
}

#[test]
fn scalar_times_matches_explicit_pair() {
    let samples = [30.0, 40.0, 10.0, 50.0, 60.0, 70.0];
    let mut scalar = scripted(25.0, TimesSpec::Last(3), ScriptedMetrics::new(&samples));
    let mut pair = scripted(25.0, TimesSpec::Window(3, 3), ScriptedMetrics::new(&samples));

    assert_eq!(scalar.policy(), pair.policy());
    assert_eq!(scalar.policy().times, Times::new(3, 3).unwrap());

    let a: Vec<bool> = run(&mut scalar, samples.len()).iter().map(|e| e.triggered).collect();
    let b: Vec<bool> = run(&mut pair, samples.len()).iter().map(|e| e.triggered).collect();
    assert_eq!(a, b);
    assert_eq!(a, vec![false, false, false, false, false, true]);
}

#[test]
fn reset_clears_history_not_policy() {
    let mut condition = scripted(
        25.0,
        TimesSpec::Window(2, 3),
        ScriptedMetrics::new(&[80.0, 90.0, 10.0]),
    );

    assert!(run(&mut condition, 2)[1].triggered);
    let policy = *condition.policy();

    condition.reset();
    assert!(condition.timeline().is_empty());
    assert!(condition.info().is_none());
    assert_eq!(*condition.policy(), policy);

    let eval = condition.test();
    assert!(!eval.triggered);
    assert_eq!(eval.history, vec![10.0]);
    assert_eq!(condition.timeline().capacity(), 3);
}

#[test]
fn absent_root_records_zero_and_keeps_polling() {
    let metrics = ScriptedMetrics::new(&[60.0]).then_absent();
    let mut condition = scripted(50.0, TimesSpec::Window(1, 2), metrics);

    let first = condition.test();
    assert!(first.triggered);

    let second = condition.test();
    assert!(!second.root_present);
    assert_eq!(second.sample, Some(0.0));
    assert_eq!(second.history, vec![60.0, 0.0]);
    // The earlier spike is still inside the window.
    assert!(second.triggered);
    assert_eq!(second.message, "cpu out of bounds [*60%, 0%]");

    let third = condition.test();
    assert_eq!(third.history, vec![0.0, 0.0]);
    assert!(!third.triggered);
}

#[test]
fn vanished_child_contributes_nothing() {
    let mut table = ProcessTable::new();
    table
        .insert(ROOT, 1, 10.0)
        .insert(ROOT + 1, ROOT, 5.0)
        .insert(ROOT + 2, ROOT, 7.0);

    let mut condition = CpuUsageCondition::builder()
        .above(20.0)
        .watch(Arc::new(StaticWatch::with_pid(ROOT)))
        .build_with(table)
        .unwrap();

    let eval = condition.test();
    assert_eq!(eval.sample, Some(22.0));
    assert!(eval.triggered);

    condition.metrics_mut().remove(ROOT + 2);
    let eval = condition.test();
    assert_eq!(eval.sample, Some(15.0));
    assert_eq!(eval.descendants, 1);
    assert!(!eval.triggered);
}

#[test]
fn unusable_pid_file_skips_the_sample() {
    let path = temp_path("garbage.pid");
    fs::write(&path, "not a pid\n").unwrap();

    let mut condition = CpuUsageCondition::builder()
        .above(10.0)
        .pid_file(&path)
        .build_with(ScriptedMetrics::new(&[99.0]))
        .unwrap();

    let eval = condition.test();
    assert!(!eval.triggered);
    assert!(eval.sample.is_none());
    assert!(eval.error.is_some());
    assert!(condition.timeline().is_empty());
    assert!(eval.message.starts_with("cpu sample unavailable: "));
    assert!(eval.message.ends_with("[]"));
    assert_eq!(condition.info(), Some(eval.message.as_str()));

    // Fixing the file recovers on the next poll.
    fs::write(&path, format!("{}\n", ROOT)).unwrap();
    let eval = condition.test();
    assert_eq!(eval.pid, Some(ROOT));
    assert!(eval.triggered);

    fs::remove_file(path).ok();
}

#[test]
fn validation_requires_above_and_a_pid_source() {
    let missing_above = CpuUsageCondition::builder()
        .watch(Arc::new(StaticWatch::with_pid(ROOT)))
        .build_with(ProcessTable::new());
    assert!(matches!(
        missing_above,
        Err(CpuwatchError::Configuration { .. })
    ));

    let missing_source = CpuUsageCondition::builder()
        .above(10.0)
        .build_with(ProcessTable::new());
    assert!(matches!(
        missing_source,
        Err(CpuwatchError::Configuration { .. })
    ));

    assert!(CpuUsageCondition::builder()
        .above(10.0)
        .pid_file("/run/service.pid")
        .validate()
        .is_ok());
    assert!(CpuUsageCondition::builder()
        .above(10.0)
        .watch(Arc::new(StaticWatch::with_pid_file("/run/service.pid")))
        .validate()
        .is_ok());
}

#[test]
fn config_file_builds_condition() {
    let path = temp_path("condition.json");
    fs::write(
        &path,
        r#"{ "above": 30, "times": 2, "interval": "250ms" }"#,
    )
    .unwrap();

    let config = ConditionConfig::from_path(&path).unwrap();
    let mut condition = config
        .into_builder()
        .unwrap()
        .watch(Arc::new(StaticWatch::with_pid(ROOT)))
        .build_with(ScriptedMetrics::new(&[40.0, 50.0]))
        .unwrap();

    assert_eq!(condition.interval().as_millis(), 250);
    assert!(!condition.test().triggered);
    assert!(condition.test().triggered);

    fs::remove_file(path).ok();
}

#[test]
fn missing_config_file_is_configuration_error() {
    let result = ConditionConfig::from_path(&temp_path("nope.json"));
    assert!(matches!(result, Err(CpuwatchError::Configuration { .. })));
}

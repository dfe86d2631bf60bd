mod common;

use std::fs;
use common::{blob, recording_parameters, recording_registry, EventLog};
use regkit_registration::{Configuration, Orchestrator, RegistrationEvent, RunState};

const SCRIPT: [RegistrationEvent; 12] = [
    RegistrationEvent::ResolutionStart { level: 0 },
    RegistrationEvent::Iteration,
    RegistrationEvent::Iteration,
    RegistrationEvent::ResolutionEnd,
    RegistrationEvent::ResolutionStart { level: 1 },
    RegistrationEvent::Iteration,
    RegistrationEvent::ResolutionEnd,
    RegistrationEvent::ResolutionStart { level: 2 },
    RegistrationEvent::Iteration,
    RegistrationEvent::Iteration,
    RegistrationEvent::Iteration,
    RegistrationEvent::ResolutionEnd,
];

fn entries_for<'a>(log: &'a [String], hook: &str) -> Vec<&'a str> {
    log.iter()
        .filter_map(|entry| entry.strip_prefix(hook))
        .map(str::trim)
        .collect()
}

fn run_recorders(out: Option<&std::path::Path>) -> (Vec<String>, i32, Vec<RunState>) {
    run_with_metrics(&["RecorderMetric", "RecorderMetric"], out)
}

fn run_with_metrics(metrics: &[&str], out: Option<&std::path::Path>) -> (Vec<String>, i32, Vec<RunState>) {
    let log = EventLog::default();
    let (registry, _) = recording_registry(&log, &SCRIPT);
    let mut parameters = recording_parameters();
    parameters.set("Metric", metrics.iter().copied());
    let mut configuration = Configuration::new(parameters);
    if let Some(out) = out {
        configuration.set_argument("-out", out.to_string_lossy());
    }
    let mut orchestrator = Orchestrator::with_registry(&registry, configuration);
    orchestrator.add_fixed_image(blob([8, 8], [4.0, 4.0], 2.0));
    orchestrator.add_moving_image(blob([8, 8], [4.0, 4.0], 2.0));
    let code = orchestrator.run();
    let history = orchestrator.history().to_vec();
    let entries = log.lock().unwrap().clone();
    (entries, code, history)
}

#[test]
fn test_events_reach_categories_in_fan_out_order() {
    let (log, code, _) = run_recorders(None);
    assert_eq!(code, 0);
    let expected = [
        "Registration0",
        "Transform0",
        "ImageSampler0",
        "Metric0",
        "Metric1",
        "Interpolator0",
        "Optimizer0",
        "FixedImagePyramid0",
        "MovingImagePyramid0",
        "ResampleInterpolator0",
        "Resampler0",
    ];
    for hook in ["BeforeAll", "BeforeRegistration", "AfterRegistration"] {
        assert_eq!(entries_for(&log, hook), expected, "order of {hook}");
    }
    assert_eq!(entries_for(&log, "AfterEachIteration(it=0)").len(), 3 * expected.len());
    assert_eq!(entries_for(&log, "AfterEachResolution").len(), 3 * expected.len());
}

#[test]
fn test_hooks_follow_the_event_sequence() {
    let (log, _, _) = run_recorders(None);
    let hooks: Vec<&str> = log
        .iter()
        .filter(|entry| entry.ends_with(" Registration0"))
        .map(|entry| entry.trim_end_matches(" Registration0"))
        .collect();
    assert_eq!(
        hooks,
        [
            "BeforeAll",
            "BeforeRegistration",
            "BeforeEachResolution(it=0)",
            "AfterEachIteration(it=0)",
            "AfterEachIteration(it=1)",
            "AfterEachResolution",
            "BeforeEachResolution(it=0)",
            "AfterEachIteration(it=0)",
            "AfterEachResolution",
            "BeforeEachResolution(it=0)",
            "AfterEachIteration(it=0)",
            "AfterEachIteration(it=1)",
            "AfterEachIteration(it=2)",
            "AfterEachResolution",
            "AfterRegistration",
        ]
    );
}

#[test]
fn test_state_history_of_a_successful_run() {
    let (_, code, history) = run_recorders(None);
    assert_eq!(code, 0);
    assert_eq!(
        history,
        [
            RunState::Uninitialized,
            RunState::SignatureResolved,
            RunState::Assembled,
            RunState::Bound,
            RunState::Running { level: 0, iteration: 0 },
            RunState::Running { level: 1, iteration: 0 },
            RunState::Running { level: 2, iteration: 0 },
            RunState::Finalizing,
            RunState::Done,
        ]
    );
}

#[test]
fn test_iteration_info_has_one_row_per_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let (_, code, _) = run_recorders(Some(dir.path()));
    assert_eq!(code, 0);

    let level0 = fs::read_to_string(dir.path().join("IterationInfo.0.R0.txt")).unwrap();
    let lines: Vec<&str> = level0.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "1:ItNr\tTime[ms]");
    assert!(lines[1].starts_with("0\t"));
    assert!(lines[2].starts_with("1\t"));

    let level1 = fs::read_to_string(dir.path().join("IterationInfo.0.R1.txt")).unwrap();
    assert_eq!(level1.lines().count(), 2);
    let level2 = fs::read_to_string(dir.path().join("IterationInfo.0.R2.txt")).unwrap();
    assert_eq!(level2.lines().count(), 4);
}

#[test]
fn test_transform_parameter_record_block_order() {
    let dir = tempfile::tempdir().unwrap();
    let (_, code, _) = run_recorders(Some(dir.path()));
    assert_eq!(code, 0);

    let text = fs::read_to_string(dir.path().join("TransformParameters.0.txt")).unwrap();
    let transform = text.find("Transform0Recorder").unwrap();
    let interpolator = text.find("ResampleInterpolator0Recorder").unwrap();
    let resampler = text.find("Resampler0Recorder").unwrap();
    assert!(transform < interpolator && interpolator < resampler);
    assert!(!dir.path().join("TransformParameters.0.txt.tmp").exists());
}

#[test]
fn test_failing_iteration_hook_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let (log, code, history) = run_with_metrics(&["RecorderMetric", "FailingRecorderMetric"], Some(dir.path()));
    assert_eq!(code, 8);
    assert_eq!(history.last(), Some(&RunState::Failed));
    assert!(history.contains(&RunState::Running { level: 1, iteration: 0 }));
    assert!(!history.contains(&RunState::Running { level: 1, iteration: 1 }));
    assert!(!history.contains(&RunState::Finalizing));

    // nothing after the failing component, not even later categories of the same hook
    assert_eq!(log.last().map(String::as_str), Some("AfterEachIteration(it=0) Metric1"));
    let failure = log.iter().position(|entry| entry == "AfterEachIteration(it=0) Metric1").unwrap();
    let level0_iterations = entries_for(&log[..failure], "AfterEachIteration").len();
    assert_eq!(level0_iterations, 2 * 11 + 4);
    assert_eq!(entries_for(&log, "AfterEachResolution").len(), 11);
    assert!(entries_for(&log, "AfterRegistration").is_empty());

    assert!(dir.path().join("IterationInfo.0.R0.txt").exists());
    assert!(!dir.path().join("TransformParameters.0.txt").exists());
}

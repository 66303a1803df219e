//! Execution engine - runs phases in order with failure isolation

use crate::context::{ErrorClassifier, Phase, ProgressCallback};
use crate::types::{Disposition, PhaseOutcome, RunOptions, RunSummary};
use std::fmt::Display;

/// A boxed phase over run state `S` failing with `E`
pub type BoxedPhase<'a, S, E> = Box<dyn Phase<S, Error = E> + 'a>;

/// Execute phases in order
///
/// Each phase runs against the shared state. A failing phase is classified:
/// [`Disposition::AbortPhase`] records the failure and continues,
/// [`Disposition::AbortRun`] records the failure and skips every later phase,
/// [`Disposition::Warn`] is logged and does not count as an error.
///
/// # Arguments
/// * `phases` - Phases in execution order
/// * `state` - Shared state passed to every phase
/// * `opts` - Run options (dry_run, verbose)
/// * `classifier` - Maps errors to a disposition
/// * `progress` - Progress callback
pub fn run_phases<S, E, C, P>(
    phases: &mut [BoxedPhase<'_, S, E>],
    state: &mut S,
    opts: &RunOptions,
    classifier: &C,
    progress: &mut P,
) -> RunSummary
where
    E: Display,
    C: ErrorClassifier<E>,
    P: ProgressCallback,
{
    let mut summary = RunSummary {
        dry_run: opts.dry_run,
        ..Default::default()
    };

    for phase in phases.iter_mut() {
        let name = phase.name();

        if summary.aborted {
            log::debug!("Skipping phase {name}: run aborted");
            summary.record(name, PhaseOutcome::NotRun);
            continue;
        }

        progress.on_phase_start(name);
        let outcome = match phase.run(state, opts) {
            Ok(changes) => {
                log::debug!("Phase {name} completed with {changes} change(s)");
                PhaseOutcome::Completed { changes }
            }
            Err(e) => {
                let disposition = classifier.classify(&e);
                match disposition {
                    Disposition::Warn => log::warn!("{name}: {e}"),
                    Disposition::AbortPhase => log::warn!("Phase {name} failed: {e}"),
                    Disposition::AbortRun => log::error!("Phase {name} aborted the run: {e}"),
                }
                PhaseOutcome::Failed {
                    error: e.to_string(),
                    disposition,
                }
            }
        };
        progress.on_phase_complete(name, &outcome);
        summary.record(name, outcome);
    }

    summary
}

/// Simple execution without progress reporting
pub fn run_phases_simple<S, E, C>(
    phases: &mut [BoxedPhase<'_, S, E>],
    state: &mut S,
    opts: &RunOptions,
    classifier: &C,
) -> RunSummary
where
    E: Display,
    C: ErrorClassifier<E>,
{
    use crate::context::NoProgress;

    run_phases(phases, state, opts, classifier, &mut NoProgress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        visited: Vec<&'static str>,
    }

    struct StepPhase {
        name: &'static str,
        result: Result<usize, String>,
    }

    impl Phase<Counter> for StepPhase {
        type Error = String;

        fn name(&self) -> &'static str {
            self.name
        }

        fn run(&mut self, state: &mut Counter, _opts: &RunOptions) -> Result<usize, String> {
            state.visited.push(self.name);
            self.result.clone()
        }
    }

    fn step(name: &'static str, result: Result<usize, String>) -> BoxedPhase<'static, Counter, String> {
        Box::new(StepPhase { name, result })
    }

    fn classify(error: &String) -> Disposition {
        match error.as_str() {
            "fatal" => Disposition::AbortRun,
            "stale" => Disposition::Warn,
            _ => Disposition::AbortPhase,
        }
    }

    #[test]
    fn test_all_phases_succeed() {
        let mut phases = vec![step("a", Ok(1)), step("b", Ok(2))];
        let mut state = Counter::default();
        let summary = run_phases_simple(&mut phases, &mut state, &RunOptions::default(), &classify);

        assert_eq!(summary.changes, 3);
        assert!(summary.is_success());
        assert_eq!(state.visited, vec!["a", "b"]);
    }

    #[test]
    fn test_phase_failure_is_isolated() {
        let mut phases = vec![step("a", Err("boom".into())), step("b", Ok(2))];
        let mut state = Counter::default();
        let summary = run_phases_simple(&mut phases, &mut state, &RunOptions::default(), &classify);

        assert_eq!(state.visited, vec!["a", "b"]);
        assert!(summary.had_errors);
        assert!(!summary.should_commit());
        assert_eq!(summary.changes, 2);
        assert_eq!(summary.failures().count(), 1);
    }

    #[test]
    fn test_abort_run_skips_later_phases() {
        let mut phases = vec![step("a", Err("fatal".into())), step("b", Ok(2))];
        let mut state = Counter::default();
        let summary = run_phases_simple(&mut phases, &mut state, &RunOptions::default(), &classify);

        assert_eq!(state.visited, vec!["a"]);
        assert!(summary.aborted);
        assert_eq!(summary.phases[1].outcome, PhaseOutcome::NotRun);
    }

    #[test]
    fn test_warning_keeps_run_clean() {
        let mut phases = vec![step("a", Err("stale".into())), step("b", Ok(1))];
        let mut state = Counter::default();
        let summary = run_phases_simple(&mut phases, &mut state, &RunOptions::default(), &classify);

        assert!(summary.is_success());
        assert!(summary.should_commit());
    }

    #[test]
    fn test_dry_run_summary_never_commits() {
        let mut phases = vec![step("a", Ok(4))];
        let mut state = Counter::default();
        let summary = run_phases_simple(&mut phases, &mut state, &RunOptions::preview(), &classify);

        assert_eq!(summary.changes, 4);
        assert!(!summary.should_commit());
    }
}

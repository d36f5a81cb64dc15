//! Executor ordering: nothing runs after a halting stage, everything runs
//! under best effort.

use async_trait::async_trait;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use shielded_ops::workflow::{
    RunStatus, Stage, StageContext, StageError, StageResult, StageState, WorkflowExecutor,
};
use shielded_ops::WalletId;

const NAMES: [&str; 6] = ["s0", "s1", "s2", "s3", "s4", "s5"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Fatal,
}

fn outcome(n: u8) -> Outcome {
    match n {
        0 => Outcome::Success,
        1 => Outcome::Failure,
        _ => Outcome::Fatal,
    }
}

#[derive(Default)]
struct Seen {
    merged: Vec<usize>,
}

impl StageContext for Seen {
    type Output = usize;

    fn merge(&mut self, output: usize) {
        self.merged.push(output);
    }
}

struct Scripted {
    index: usize,
    outcome: Outcome,
    invoked: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl Stage<Seen> for Scripted {
    fn name(&self) -> &'static str {
        NAMES[self.index]
    }

    async fn execute(&self, _ctx: &Seen, _cancel: &CancellationToken) -> StageResult<usize> {
        self.invoked.lock().unwrap().push(self.index);
        tokio::task::yield_now().await;
        match self.outcome {
            Outcome::Success => StageResult::Success(self.index),
            Outcome::Failure => StageResult::Failure(StageError::rejected("scripted")),
            Outcome::Fatal => StageResult::Fatal(StageError::engine("scripted")),
        }
    }
}

fn run_script(
    executor: WorkflowExecutor,
    outcomes: &[Outcome],
) -> (shielded_ops::WorkflowRun, Seen, Vec<usize>) {
    let invoked = Arc::new(Mutex::new(Vec::new()));
    let stages: Vec<Arc<dyn Stage<Seen>>> = outcomes
        .iter()
        .enumerate()
        .map(|(index, outcome)| {
            Arc::new(Scripted {
                index,
                outcome: *outcome,
                invoked: invoked.clone(),
            }) as Arc<dyn Stage<Seen>>
        })
        .collect();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let (run, ctx) = runtime.block_on(executor.run(
        "prop",
        &WalletId::from("w1"),
        &stages,
        Seen::default(),
        &CancellationToken::new(),
    ));
    let invoked = invoked.lock().unwrap().clone();
    (run, ctx, invoked)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn strict_never_runs_past_a_failure(
        script in proptest::collection::vec(0u8..3, 1..=6)
    ) {
        let outcomes: Vec<Outcome> = script.into_iter().map(outcome).collect();
        let (run, ctx, invoked) = run_script(WorkflowExecutor::strict(), &outcomes);

        let halt = outcomes.iter().position(|o| *o != Outcome::Success);
        let last = halt.unwrap_or(outcomes.len() - 1);

        // Strictly in order, stopping at the first non-success
        prop_assert_eq!(invoked, (0..=last).collect::<Vec<_>>());
        prop_assert_eq!(ctx.merged.len(), halt.unwrap_or(outcomes.len()));

        for record in &run.stages[last + 1..] {
            prop_assert_eq!(record.state, StageState::Pending);
        }

        let expected = match halt.map(|i| outcomes[i]) {
            None => RunStatus::Completed,
            Some(Outcome::Fatal) => RunStatus::Fatal,
            Some(_) => RunStatus::Failed,
        };
        prop_assert_eq!(run.status, expected);
        prop_assert!(run.warnings.is_empty());
    }

    #[test]
    fn best_effort_attempts_every_stage(
        script in proptest::collection::vec(0u8..3, 1..=6)
    ) {
        let outcomes: Vec<Outcome> = script.into_iter().map(outcome).collect();
        let (run, ctx, invoked) = run_script(WorkflowExecutor::best_effort(), &outcomes);

        let failures = outcomes.iter().filter(|o| **o != Outcome::Success).count();

        prop_assert_eq!(invoked, (0..outcomes.len()).collect::<Vec<_>>());
        prop_assert_eq!(ctx.merged.len(), outcomes.len() - failures);
        prop_assert_eq!(run.warnings.len(), failures);

        let expected = if failures == 0 {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithWarnings
        };
        prop_assert_eq!(run.status, expected);
    }
}

#[test]
fn cancelled_before_start_runs_nothing() {
    let invoked = Arc::new(Mutex::new(Vec::new()));
    let stages: Vec<Arc<dyn Stage<Seen>>> = vec![Arc::new(Scripted {
        index: 0,
        outcome: Outcome::Success,
        invoked: invoked.clone(),
    })];
    let cancel = CancellationToken::new();
    cancel.cancel();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let (run, _) = runtime.block_on(WorkflowExecutor::strict().run(
        "prop",
        &WalletId::from("w1"),
        &stages,
        Seen::default(),
        &cancel,
    ));

    assert!(invoked.lock().unwrap().is_empty());
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error().map(|e| e.code()), Some("CANCELLED"));
}

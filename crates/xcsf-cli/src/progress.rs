use xcsf_core::{
    learner::{LearnerObserver, LearnerState},
    performance::PerformanceRecord,
};

/// Prints a table row to stderr whenever a performance window closes.
#[derive(Debug, Default)]
pub(crate) struct ProgressTable {
    printed: usize,
}

impl LearnerObserver for ProgressTable {
    fn next_experiment(&mut self, experiment: usize, function_name: &str) {
        self.printed = 0;
        eprintln!();
        eprintln!("Experiment #{experiment} ({function_name}):");
        eprintln!("{}", PerformanceRecord::TABLE_HEADER);
    }

    fn state_changed(&mut self, state: &LearnerState<'_>) {
        for record in &state.performance[self.printed..] {
            eprintln!("{record}");
        }
        self.printed = state.performance.len();
    }
}

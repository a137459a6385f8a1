//! In-memory reading source.

use std::collections::VecDeque;

use smokewatch_types::TimeStep;

use super::{ReadingSource, SourceError};

/// A reading source over a prepared list of steps.
#[derive(Debug)]
pub struct StepSource {
    steps: VecDeque<Result<TimeStep, SourceError>>,
    description: String,
}

impl StepSource {
    /// Yield `steps` in order.
    pub fn new(steps: Vec<TimeStep>) -> Self {
        Self::from_results(steps.into_iter().map(Ok).collect())
    }

    /// Yield the given results in order, errors included.
    pub fn from_results(steps: Vec<Result<TimeStep, SourceError>>) -> Self {
        let description = format!("memory: {} steps", steps.len());
        Self {
            steps: steps.into(),
            description,
        }
    }

    /// Steps not yet yielded.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl ReadingSource for StepSource {
    fn next_step(&mut self) -> Option<Result<TimeStep, SourceError>> {
        self.steps.pop_front()
    }

    fn description(&self) -> &str {
        &self.description
    }
}

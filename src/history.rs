//! Recent-step tracking for provider context.
//!
//! This module remembers the last few commands the assistant ran in this
//! terminal session and their exit statuses, so follow-up requests can be
//! planned against what already happened. The window lives in memory only.

use crate::plan::Plan;
use crate::providers::PriorStep;
use std::collections::VecDeque;

/// Default number of steps kept.
pub const DEFAULT_WINDOW: usize = 10;

/// Bounded window of executed steps, oldest first.
#[derive(Debug, Clone)]
pub struct RecentSteps {
    steps: VecDeque<PriorStep>,
    capacity: usize,
}

impl RecentSteps {
    /// Creates an empty window holding at most `capacity` steps.
    pub fn new(capacity: usize) -> Self {
        Self {
            steps: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records an executed command, evicting the oldest entry when full.
    pub fn push(&mut self, command: &str, status: i32) {
        if self.capacity == 0 {
            return;
        }
        if self.steps.len() == self.capacity {
            self.steps.pop_front();
        }
        self.steps.push_back(PriorStep {
            command: command.to_string(),
            status,
        });
    }

    /// Records every step of `plan` that has an outcome, in plan order.
    pub fn record_plan(&mut self, plan: &Plan) {
        for step in plan.steps() {
            if let Some(outcome) = step.outcome() {
                self.push(step.command(), outcome.status);
            }
        }
    }

    /// Snapshot handed to a provider request.
    pub fn snapshot(&self) -> Vec<PriorStep> {
        self.steps.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for RecentSteps {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

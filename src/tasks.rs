use std::time::Instant;
use serde::{Serialize, Deserialize};




/**
 * A task, or side-effect, such as reporting or data output
 */
#[derive(Clone, Serialize, Deserialize)]
pub struct RecurringTask {

    /// The number of times this task has been performed
    pub count: usize,

    /// The next simulation time at which this task is set to be performed
    pub next_time: f64,

    /// The last clock time when this task was performed
    #[serde(skip, default = "Instant::now")]
    pub last_performed: Instant,
}




/**
 * All the tasks that are used in this application
 */
#[derive(Clone, Serialize, Deserialize)]
pub struct Tasks {

    /// Append a record of the radial profiles and the global time series
    pub write_radial: RecurringTask,

    /// Append a record of the stellar population profiles
    pub write_stars: RecurringTask,

    /// Print the loop message
    pub iteration_message: RecurringTask,
}




// ============================================================================
impl RecurringTask
{

    /**
     * Create a fresh recurring task which is first due at t = 0.0.
     */
    pub fn new() -> Self {
        Self {
            count: 0,
            next_time: 0.0,
            last_performed: Instant::now(),
        }
    }

    /**
     * Mark the task as having just been performed, and schedule it to happen
     * again after the given time interval. Return the length of WALL time that
     * elapsed since the task was last performed.
     */
    pub fn advance(&mut self, interval: f64) -> f64 {
        let seconds = self.last_performed.elapsed().as_secs_f64();
        self.count += 1;
        self.next_time += interval;
        self.last_performed = Instant::now();
        seconds
    }
}

impl Default for RecurringTask {
    fn default() -> Self {
        Self::new()
    }
}




// ============================================================================
impl Tasks
{
    pub fn new() -> Self {
        Self {
            write_radial: RecurringTask::new(),
            write_stars: RecurringTask::new(),
            iteration_message: RecurringTask::new(),
        }
    }
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}




// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_moves_the_next_due_time() {
        let mut task = RecurringTask::new();
        assert_eq!(task.next_time, 0.0);
        task.advance(0.5);
        task.advance(0.5);
        assert_eq!(task.count, 2);
        assert!((task.next_time - 1.0).abs() < 1e-14);
    }
}

/// Which phase of the run a worker is reporting from. The front end uses
/// this to style its progress bars.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Processing,
    Finished,
}

/// A progress message sent from a worker thread to the front end.
///
/// `progress` is the fraction of the worker's chunk completed, in 0.0..=1.0.
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub current_file: String,
    pub worker_id: usize,
    pub phase: Phase,
}

impl WorkerStatus {
    pub fn new(progress: f32, current_file: String, worker_id: usize, phase: Phase) -> Self {
        Self {
            progress,
            current_file,
            worker_id,
            phase,
        }
    }
}

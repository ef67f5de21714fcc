use anyhow::Result;

/// Step bookkeeping shared by logging, sample export and checkpointing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepCounters {
    pub total_steps: usize,
    pub epoch_iter: usize,
    start_epoch: usize,
    batch_size: usize,
    dataset_size: usize,
}

impl StepCounters {
    /// Counters for a run of epochs `start_epoch..=niter`.
    ///
    /// `total_steps` starts at `(niter - start_epoch) * dataset_size + epoch_iter`.
    pub fn new(
        start_epoch: usize,
        niter: usize,
        epoch_iter: usize,
        batch_size: usize,
        dataset_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(anyhow::anyhow!("batch_size must be positive"));
        }
        if dataset_size == 0 {
            return Err(anyhow::anyhow!("dataset is empty"));
        }
        Ok(Self {
            total_steps: niter.saturating_sub(start_epoch) * dataset_size + epoch_iter,
            epoch_iter,
            start_epoch,
            batch_size,
            dataset_size,
        })
    }

    pub fn dataset_size(&self) -> usize {
        self.dataset_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Wrap `epoch_iter` at every epoch boundary after the first.
    pub fn begin_epoch(&mut self, epoch: usize) {
        if epoch != self.start_epoch {
            self.epoch_iter %= self.dataset_size;
        }
    }

    pub fn advance(&mut self) {
        self.total_steps += self.batch_size;
        self.epoch_iter += self.batch_size;
    }
}

/// Fires when `total_steps % freq` returns to the phase it had at start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodicTrigger {
    freq: usize,
    delta: usize,
}

impl PeriodicTrigger {
    pub fn phased(freq: usize, initial_total_steps: usize) -> Result<Self> {
        if freq == 0 {
            return Err(anyhow::anyhow!("trigger frequency must be positive"));
        }
        Ok(Self {
            freq,
            delta: initial_total_steps % freq,
        })
    }

    pub fn delta(&self) -> usize {
        self.delta
    }

    pub fn fires(&self, total_steps: usize) -> bool {
        total_steps % self.freq == self.delta
    }
}

/// Epoch loop states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    EpochStart { epoch: usize },
    IterationRunning { epoch: usize, iteration: usize },
    EpochEnd { epoch: usize },
    TrainingComplete,
}

impl LoopState {
    pub fn initial(start_epoch: usize, niter: usize) -> Self {
        if start_epoch > niter {
            LoopState::TrainingComplete
        } else {
            LoopState::EpochStart { epoch: start_epoch }
        }
    }

    /// The state following `EpochEnd { epoch }`.
    pub fn after_epoch(epoch: usize, niter: usize) -> Self {
        if epoch < niter {
            LoopState::EpochStart { epoch: epoch + 1 }
        } else {
            LoopState::TrainingComplete
        }
    }
}

/// Checkpoints land on epochs divisible by `interval`.
pub fn is_checkpoint_epoch(epoch: usize, interval: usize) -> bool {
    interval > 0 && epoch % interval == 0
}

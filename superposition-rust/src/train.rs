// ============================================================================
// TRAINING LOOP
// A session advances in slices; the host regains control between slices.
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TrainConfig;
use crate::error::{Error, Result};
use crate::model::{Model, Objective};

/// Shared "is training" flag. Clones observe the same flag, so a handle can be
/// moved into a progress callback or another thread and used to stop a run.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests the run to end before its next iteration. Always safe to call.
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raises the flag unless it is already raised.
    fn begin(&self) -> bool {
        self.0.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub step: usize,
    pub loss: f64,
    pub learning_rate: f64,
    pub converged: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    /// Loss of the last completed iteration; `+inf` if none ran.
    pub final_loss: f64,
    pub steps: usize,
    pub converged: bool,
    /// The run ended on a stop request rather than budget or convergence.
    pub stopped: bool,
}

impl TrainReport {
    pub fn idle() -> Self {
        TrainReport { final_loss: f64::INFINITY, steps: 0, converged: false, stopped: false }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Slice {
    Progress(Progress),
    Finished(TrainReport),
}

pub struct TrainingSession {
    config: TrainConfig,
    objective: Objective,
    patience: usize,
    step: usize,
    previous_loss: f64,
    convergence_count: usize,
    running: StopHandle,
    report: Option<TrainReport>,
}

impl TrainingSession {
    /// Validates `config`, clears the loss history and raises the model's
    /// training flag. Fails with [`Error::AlreadyTraining`] if a run is live.
    pub fn start(model: &mut Model, config: TrainConfig) -> Result<Self> {
        config.validate()?;
        if !model.running.begin() {
            return Err(Error::AlreadyTraining);
        }
        model.loss_history.clear();
        model.total_steps = 0;

        let objective = model.objective(&config);
        let patience = config.patience.unwrap_or_else(|| model.config().variant.patience());
        info!(
            input_dim = model.input_dim(),
            hidden_dim = model.hidden_dim(),
            steps = config.steps,
            batch_size = config.batch_size,
            learning_rate = config.learning_rate,
            "training started"
        );
        Ok(TrainingSession {
            config,
            objective,
            patience,
            step: 0,
            previous_loss: f64::INFINITY,
            convergence_count: 0,
            running: model.running.clone(),
            report: None,
        })
    }

    pub fn config(&self) -> &TrainConfig { &self.config }
    pub fn step(&self) -> usize { self.step }

    pub fn converged(&self) -> bool {
        self.convergence_count > self.patience
    }

    /// Runs at most `budget` iterations on `model`, the same model the session
    /// was started on. Returns the last iteration's progress, or the final
    /// report once no further iteration can start. Calls after the end keep
    /// returning the report.
    pub fn run_slice(&mut self, model: &mut Model, budget: usize) -> Slice {
        if let Some(report) = self.report {
            return Slice::Finished(report);
        }
        let mut last = None;
        for _ in 0..budget.max(1) {
            if self.step >= self.config.steps || !self.running.is_running() {
                break;
            }
            let progress = self.iterate(model);
            if progress.converged {
                info!(step = progress.step, loss = progress.loss, "converged");
                return Slice::Finished(self.finish(model));
            }
            last = Some(progress);
        }
        match last {
            Some(p) => Slice::Progress(p),
            None => Slice::Finished(self.finish(model)),
        }
    }

    fn iterate(&mut self, model: &mut Model) -> Progress {
        let cfg = &self.config;
        let lr = cfg.lr_schedule.rate(cfg.learning_rate, self.step, cfg.steps);
        let batch = model.generate_batch(cfg.batch_size, cfg.sparsity, cfg.importance);
        let loss = model.train_step(&batch, lr, &self.objective);
        model.loss_history.push(loss);

        if self.previous_loss.is_finite() {
            let relative = ((loss - self.previous_loss) / (self.previous_loss + 1e-8)).abs();
            if relative < self.config.convergence_threshold {
                self.convergence_count += 1;
            } else {
                self.convergence_count = 0;
            }
        }
        self.previous_loss = loss;

        let progress = Progress { step: self.step, loss, learning_rate: lr, converged: self.converged() };
        self.step += 1;
        progress
    }

    fn finish(&mut self, model: &Model) -> TrainReport {
        let stopped = !self.running.is_running() && self.step < self.config.steps && !self.converged();
        self.running.stop();
        let report = TrainReport {
            final_loss: self.previous_loss,
            steps: model.loss_history.len(),
            converged: self.converged(),
            stopped,
        };
        if stopped {
            info!(steps = report.steps, final_loss = report.final_loss, "training stopped");
        } else {
            info!(steps = report.steps, final_loss = report.final_loss, converged = report.converged, "training finished");
        }
        self.report = Some(report);
        report
    }
}

impl Drop for TrainingSession {
    fn drop(&mut self) {
        // An abandoned session must not leave the model looking busy.
        if self.report.is_none() {
            self.running.stop();
        }
    }
}

impl Model {
    pub fn train(&mut self, config: TrainConfig) -> Result<TrainReport> {
        self.train_with_progress(config, |_| {})
    }

    /// Runs a whole session, calling `callback` after each iteration whose
    /// index is a multiple of `progress_every` (0, every, 2·every, ...). A run
    /// already in progress makes this a logged no-op.
    pub fn train_with_progress<F>(&mut self, config: TrainConfig, mut callback: F) -> Result<TrainReport>
    where
        F: FnMut(&Progress),
    {
        let every = config.progress_every;
        let mut session = match TrainingSession::start(self, config) {
            Ok(s) => s,
            Err(Error::AlreadyTraining) => {
                warn!("train requested while a run is in progress; ignoring");
                return Ok(TrainReport::idle());
            }
            Err(e) => return Err(e),
        };
        loop {
            // One iteration first, then whole intervals, so slices end on 0, every, 2·every.
            let budget = if session.step() == 0 { 1 } else { every };
            match session.run_slice(self, budget) {
                Slice::Progress(p) if p.step % every == 0 => {
                    debug!(step = p.step, loss = p.loss, learning_rate = p.learning_rate, "progress");
                    callback(&p);
                }
                // Trailing partial interval.
                Slice::Progress(_) => {}
                Slice::Finished(report) => return Ok(report),
            }
        }
    }

    pub fn stop(&self) {
        self.running.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.running.clone()
    }

    pub fn is_training(&self) -> bool {
        self.running.is_running()
    }
}

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use crate::data::batch::{Batch, BatchSource};
use crate::error::{PreprocessError, TrainerError};
use crate::loss::cross_entropy::{softmax, CrossEntropyLoss};
use crate::math::tensor::Tensor;
use crate::network::network::Network;
use crate::network::probe::ActivationProbe;
use crate::network::registry::INPUT_SIDE;
use crate::optim::Optimizer;
use crate::preprocess::{scaled_to_image, to_data_url};
use crate::train::events::{EventBus, TrainingEvent};
use crate::train::snapshot::{short_layer_name, MetricSnapshot};

/// The shared model slot. `None` until the first run starts.
pub type ModelSlot = Arc<Mutex<Option<Network>>>;

/// Everything a training run owns or shares with the session.
pub struct TrainingRun {
    pub model: ModelSlot,
    pub optimizer: Box<dyn Optimizer>,
    pub source: BatchSource,
    pub epochs: usize,
    pub running: Arc<AtomicBool>,
    pub events: EventBus,
    pub probe: Arc<ActivationProbe>,
    pub snapshot_interval: usize,
}

/// Runs `f` on the installed network with the slot locked for just that
/// call. A poisoned lock is recovered rather than propagated.
pub(crate) fn with_model<T>(model: &ModelSlot, f: impl FnOnce(&mut Network) -> T) -> Result<T, TrainerError> {
    let mut slot = model.lock().unwrap_or_else(PoisonError::into_inner);
    slot.as_mut().map(f).ok_or(TrainerError::NoModel)
}

impl TrainingRun {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// `true` (after logging where) when a stop has been requested.
    fn halted(&self, epoch: usize, batch: usize, stage: &str) -> bool {
        if self.is_running() {
            return false;
        }
        self.events.log(format!(
            "Training stopped during epoch {} batch {} ({})",
            epoch, batch, stage
        ));
        true
    }

    /// Trains until every epoch is done or `running` is cleared.
    ///
    /// The model lock is held for one sub-step at a time (forward, backward,
    /// optimizer step, snapshot) and the thread yields between them so
    /// request threads can read or predict with the same model.
    pub fn run(&mut self) -> Result<(), TrainerError> {
        let total_batches = self.source.len();
        let interval = self.snapshot_interval.max(1);
        let started = Instant::now();
        self.events.log(format!(
            "Starting loop. Epochs: {}, Batches: {}",
            self.epochs, total_batches
        ));

        for epoch in 1..=self.epochs {
            if !self.is_running() {
                self.events.log(format!("Training stopped before epoch {}", epoch));
                return Ok(());
            }
            self.events.log(format!("Starting Epoch {}", epoch));

            let source = self.source.clone();
            for (batch_idx, batch) in source.epoch().enumerate() {
                if self.halted(epoch, batch_idx, "batch start") {
                    return Ok(());
                }

                let logits = with_model(&self.model, |net| {
                    net.zero_grad();
                    net.forward(&batch.inputs)
                })?;
                if self.halted(epoch, batch_idx, "forward") {
                    return Ok(());
                }
                thread::yield_now();

                let (loss, grad) = CrossEntropyLoss::forward(&logits, &batch.targets);
                if self.halted(epoch, batch_idx, "loss") {
                    return Ok(());
                }
                thread::yield_now();

                with_model(&self.model, |net| {
                    net.backward(&grad);
                })?;
                if self.halted(epoch, batch_idx, "backward") {
                    return Ok(());
                }
                thread::yield_now();

                let optimizer = &mut self.optimizer;
                with_model(&self.model, |net| optimizer.step(net))?;

                if batch_idx % interval == 0 {
                    let snapshot = self.snapshot(
                        epoch,
                        batch_idx,
                        total_batches,
                        loss,
                        &batch,
                        &logits,
                        started,
                    )?;
                    self.events.publish(TrainingEvent::TrainingUpdate(snapshot));
                }
                thread::yield_now();
            }

            self.events.log(format!("Epoch {} complete", epoch));
        }

        self.events.log(format!(
            "Training finished in {:.1}s",
            started.elapsed().as_secs_f64()
        ));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn snapshot(
        &self,
        epoch: usize,
        batch: usize,
        total_batches: usize,
        loss: f64,
        data: &Batch,
        logits: &Tensor,
        started: Instant,
    ) -> Result<MetricSnapshot, TrainerError> {
        let weights = with_model(&self.model, |net| net.weight_norms())?;
        let accuracy = CrossEntropyLoss::accuracy(logits, &data.targets);

        let (sample_input, sample_output, sample_activations) = match self.visualize(data, logits) {
            Ok((input, output, activations)) => (Some(input), Some(output), activations),
            Err(e) => {
                self.events.log(format!("Viz Error: {}", e));
                (None, None, BTreeMap::new())
            }
        };

        Ok(MetricSnapshot {
            epoch,
            batch,
            total_batches,
            loss,
            accuracy,
            weights,
            sample_input,
            sample_output,
            sample_activations,
            time_elapsed: started.elapsed().as_secs_f64(),
        })
    }

    /// Picture, prediction and layer activity for the first sample.
    fn visualize(
        &self,
        data: &Batch,
        logits: &Tensor,
    ) -> Result<(String, Vec<f64>, BTreeMap<String, f64>), PreprocessError> {
        let image = scaled_to_image(data.inputs.sample(0), INPUT_SIDE as u32)?;
        let url = to_data_url(&image)?;
        let probabilities = softmax(logits.sample(0));
        let activations = self
            .probe
            .snapshot()
            .into_iter()
            .map(|(name, value)| (short_layer_name(&name), value))
            .collect();
        Ok((url, probabilities, activations))
    }
}

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::data::batch::create_batch_source;
use crate::data::dataset::DatasetKind;
use crate::error::TrainerError;
use crate::loss::cross_entropy::softmax;
use crate::math::tensor::argmax;
use crate::network::network::WeightValues;
use crate::network::probe::ActivationProbe;
use crate::network::registry::Architecture;
use crate::preprocess::{normalize_for_model, to_data_url, to_model_input};
use crate::train::config::{effective_batch_size, SessionSettings, TrainingConfig};
use crate::train::events::{EventBus, TrainingEvent};
use crate::train::loop_fn::{ModelSlot, TrainingRun};
use crate::train::snapshot::PredictionResult;

/// What `start` actually launched after defaults and overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct StartReport {
    pub architecture: Architecture,
    pub dataset: &'static str,
    pub batch_size: usize,
    pub total_batches: usize,
    pub epochs: usize,
}

/// Owns the current model and drives at most one background training loop.
///
/// `running` is the only thing the loop consults to decide whether to keep
/// going; `active` is set while a loop thread exists and gates `start`.
pub struct TrainingSession {
    settings: SessionSettings,
    events: EventBus,
    model: ModelSlot,
    running: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Cleanup after the loop returns, however it returned.
///
/// A failure is reported as a `CRITICAL` log line followed by
/// `training_error`. In every case the probe is detached, `running` is
/// cleared and exactly one `training_complete` is pushed while `active` is
/// still held.
fn finish(run: &TrainingRun, active: &AtomicBool, outcome: thread::Result<Result<(), TrainerError>>) {
    let outcome = outcome.unwrap_or_else(|payload| Err(TrainerError::Panicked(panic_message(payload))));
    if let Err(e) = outcome {
        log::error!("Training failed: {}", e);
        run.events.log(format!("CRITICAL: {}", e));
        run.events.publish(TrainingEvent::TrainingError { error: e.to_string() });
    }

    if let Some(net) = run.model.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
        net.detach_probe();
    }
    run.running.store(false, Ordering::SeqCst);
    run.events.publish(TrainingEvent::TrainingComplete);
    active.store(false, Ordering::SeqCst);
}

impl TrainingSession {
    pub fn new(settings: SessionSettings) -> TrainingSession {
        TrainingSession {
            settings,
            events: EventBus::new(),
            model: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> Receiver<TrainingEvent> {
        self.events.subscribe()
    }

    /// `true` while a training loop thread exists.
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Builds a fresh model for `config` and starts training it on a
    /// background thread.
    ///
    /// Fails with `AlreadyRunning` (leaving the current run untouched) while
    /// a loop thread exists. Dataset errors are reported before anything is
    /// replaced.
    pub fn start(&self, config: TrainingConfig) -> Result<StartReport, TrainerError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TrainerError::AlreadyRunning);
        }
        // Raised before the dataset loads so a stop issued meanwhile is seen
        // by the loop's first check.
        self.running.store(true, Ordering::SeqCst);

        match self.launch(config.normalized()) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.active.store(false, Ordering::SeqCst);
                self.events.log(format!("Failed to start training: {}", e));
                Err(e)
            }
        }
    }

    fn launch(&self, config: TrainingConfig) -> Result<StartReport, TrainerError> {
        let architecture = config.architecture();
        let device = self.settings.device;
        self.events.log(format!("Using device: {}", device));

        let (batch_size, notice) = effective_batch_size(architecture, config.batch_size, device);
        if let Some(notice) = notice {
            self.events.log(notice);
        }

        let source = create_batch_source(&self.settings.data_dir, &config.dataset, batch_size, true)?;
        let total_batches = source.len();

        let probe = Arc::new(ActivationProbe::new());
        let mut network = architecture.build();
        network.attach_probe(probe.clone());
        *self.model.lock().unwrap_or_else(PoisonError::into_inner) = Some(network);

        let mut run = TrainingRun {
            model: self.model.clone(),
            optimizer: config.optimizer_kind().build(config.learning_rate),
            source,
            epochs: config.epochs,
            running: self.running.clone(),
            events: self.events.clone(),
            probe,
            snapshot_interval: self.settings.snapshot_interval,
        };

        let active = self.active.clone();
        thread::Builder::new()
            .name("training-loop".to_owned())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| run.run()));
                finish(&run, &active, outcome);
            })?;

        Ok(StartReport {
            architecture,
            dataset: DatasetKind::from_name(&config.dataset).display_name(),
            batch_size,
            total_batches,
            epochs: config.epochs,
        })
    }

    /// Asks the loop to stop at its next check. Returns immediately.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            log::info!("Stop requested");
        }
    }

    /// Weight tensors of the current model, optionally just the one named
    /// `layer`. Empty when there is no model or no such weight.
    pub fn get_weights(&self, layer: Option<&str>) -> BTreeMap<String, WeightValues> {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|net| net.weights(layer))
            .unwrap_or_default()
    }

    /// Classifies one uploaded image with the current model in eval mode.
    pub fn predict(&self, bytes: &[u8]) -> Result<PredictionResult, TrainerError> {
        let digit = normalize_for_model(bytes)?;
        let input = to_model_input(&digit);
        let processed_image = to_data_url(&digit)?;

        let logits = {
            let mut slot = self.model.lock().unwrap_or_else(PoisonError::into_inner);
            let net = slot.as_mut().ok_or(TrainerError::NoModel)?;
            panic::catch_unwind(AssertUnwindSafe(|| net.infer(&input)))
                .map_err(|payload| TrainerError::Panicked(panic_message(payload)))?
        };

        let probabilities = softmax(logits.sample(0));
        let prediction = argmax(&probabilities);
        Ok(PredictionResult {
            prediction: prediction as i64,
            confidence: probabilities[prediction],
            processed_image: Some(processed_image),
        })
    }

    /// Writes the current model to the export path. `None` when no model has
    /// been created yet.
    pub fn save_model(&self) -> Result<Option<PathBuf>, TrainerError> {
        let slot = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(net) => {
                net.save_json(&self.settings.export_path)?;
                Ok(Some(self.settings.export_path.clone()))
            }
            None => Ok(None),
        }
    }
}

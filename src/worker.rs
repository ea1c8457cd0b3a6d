/*!
Running a forecast off the calling thread
*/
use crate::config::ModelConfig;
use crate::data::TimeSeriesTable;
use crate::error::{ForecastError, Result};
use crate::forecast::{ForecastEngine, ForecastTable};
use crate::model::ModelFactory;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, info_span};

/// The name given to worker threads
pub const WORKER_THREAD_NAME: &str = "forecast-worker";

/// A forecast running on a background thread.
///
/// The completion handler is called exactly once, on the worker thread, with either the
/// forecast or the error that stopped it. A panic inside the pipeline is delivered as a
/// `ForecastError::Training`.
#[derive(Debug)]
pub struct ForecastWorker {
    handle: Option<JoinHandle<()>>,
    finished: Arc<AtomicBool>,
}

impl ForecastWorker {
    /// Start forecasting `series` with `config`, calling `on_done` with the outcome
    pub fn spawn<M, H>(
        engine: ForecastEngine<M>,
        series: TimeSeriesTable,
        config: ModelConfig,
        on_done: H,
    ) -> Result<ForecastWorker>
    where
        M: ModelFactory + Send + 'static,
        H: FnOnce(Result<ForecastTable>) + Send + 'static,
    {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                let span = info_span!("forecast", target = %config.target_variable);
                let _guard = span.enter();
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| engine.forecast(&series, &config)))
                        .unwrap_or_else(|payload| {
                            Err(ForecastError::Training(panic_message(payload)))
                        });
                match &outcome {
                    Ok(forecast) => info!(rows = forecast.len(), "forecast finished"),
                    Err(err) => error!(%err, "forecast failed"),
                }
                flag.store(true, Ordering::Release);
                on_done(outcome);
            })
            .map_err(|err| {
                ForecastError::Training(format!("could not start forecast worker: {}", err))
            })?;
        Ok(ForecastWorker {
            handle: Some(handle),
            finished,
        })
    }

    /// Start forecasting, delivering the outcome on the returned channel
    pub fn spawn_channel<M>(
        engine: ForecastEngine<M>,
        series: TimeSeriesTable,
        config: ModelConfig,
    ) -> Result<(ForecastWorker, Receiver<Result<ForecastTable>>)>
    where
        M: ModelFactory + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let worker = ForecastWorker::spawn(engine, series, config, move |outcome| {
            // The receiver may have hung up; the outcome is then dropped
            let _ = tx.send(outcome);
        })?;
        Ok((worker, rx))
    }

    /// Whether the pipeline has produced its outcome
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Wait for the worker thread, including its completion handler, to exit
    pub fn join(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|payload| ForecastError::Training(panic_message(payload))),
            None => Ok(()),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("forecast panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("forecast panicked: {}", msg)
    } else {
        "forecast panicked".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_messages() {
        let msg = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(msg), "forecast panicked: boom");
        let msg = panic::catch_unwind(|| panic!("{} {}", "big", "boom")).unwrap_err();
        assert_eq!(panic_message(msg), "forecast panicked: big boom");
        let msg = panic::catch_unwind(|| std::panic::panic_any(7)).unwrap_err();
        assert_eq!(panic_message(msg), "forecast panicked");
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::workflow::{ModuleEffects, WorkflowEngine};

pub(super) struct SweeperControl {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SweeperControl {
    pub(super) fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub(super) fn stop_and_join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Timer loop behind the SLA timeouts and stalled-workflow retries. One pass
/// per interval; the engine itself decides what each workflow needs.
pub(super) fn start_sweeper_thread(
    engine: Arc<WorkflowEngine<ModuleEffects>>,
    interval: Duration,
) -> SweeperControl {
    let stop = Arc::new(AtomicBool::new(false));
    let sweep_stop = stop.clone();
    let handle = thread::spawn(move || {
        while !sweep_stop.load(Ordering::Relaxed) {
            match engine.sweep(Utc::now()) {
                Ok(report) => {
                    if report.advanced > 0 || report.timed_out > 0 {
                        info!(
                            "sweep advanced {} workflow(s), timed out {}",
                            report.advanced, report.timed_out
                        );
                    }
                }
                Err(err) => error!("sweep failed: {}", err),
            }
            let mut waited = Duration::ZERO;
            let step = Duration::from_millis(200);
            while waited < interval && !sweep_stop.load(Ordering::Relaxed) {
                thread::sleep(step);
                waited += step;
            }
        }
    });
    SweeperControl {
        stop,
        handle: Some(handle),
    }
}

use crossbeam_channel::{SendTimeoutError, bounded};
use eyre::{Context, Result};
use gemini_chat_export::utils::{ExportConfig, ProcessResult, export_source};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    updated: AtomicUsize,
    skipped: AtomicUsize,
    errors: AtomicUsize,
}

impl Counters {
    fn record(&self, result: ProcessResult) {
        let counter = match result {
            ProcessResult::Created => &self.created,
            ProcessResult::Updated => &self.updated,
            ProcessResult::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn execute(config: ExportConfig) -> Result<()> {
    fs::create_dir_all(&config.target_dir).wrap_err_with(|| {
        format!(
            "Failed to create target directory: {}",
            config.target_dir.display()
        )
    })?;

    let (tx, rx) = bounded::<PathBuf>(32);
    let counters = Counters::default();
    let n_workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
        .min(config.inputs.len().max(1));

    tracing::debug!(inputs = config.inputs.len(), workers = n_workers, "starting export");

    std::thread::scope(|s| {
        for _ in 0..n_workers {
            let rx = rx.clone();
            let (config, counters) = (&config, &counters);

            s.spawn(move || {
                while let Ok(source) = rx.recv() {
                    match export_source(&source, config) {
                        Ok(result) => counters.record(result),
                        Err(e) => {
                            counters.errors.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(source = %source.display(), "{:#}", e);
                        }
                    }
                }
            });
        }

        drop(rx);

        'outer: for source in &config.inputs {
            let mut pending = source.clone();
            loop {
                match tx.send_timeout(pending, Duration::from_millis(50)) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Disconnected(_)) => break 'outer,
                    Err(SendTimeoutError::Timeout(r)) => {
                        pending = r;
                    }
                }
            }
        }

        drop(tx);
    });

    if !config.quiet {
        eprintln!(
            "Done. {} created, {} updated, {} skipped. Errors: {}",
            counters.created.load(Ordering::Relaxed),
            counters.updated.load(Ordering::Relaxed),
            counters.skipped.load(Ordering::Relaxed),
            counters.errors.load(Ordering::Relaxed),
        );
    }

    Ok(())
}

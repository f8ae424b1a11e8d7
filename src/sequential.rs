use eyre::{Context, Result};
use gemini_chat_export::utils::{ExportConfig, ProcessResult, export_source};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;

/// Export the inputs one by one behind a progress bar.
pub fn execute(config: ExportConfig) -> Result<()> {
    fs::create_dir_all(&config.target_dir).wrap_err_with(|| {
        format!(
            "Failed to create target directory: {}",
            config.target_dir.display()
        )
    })?;

    let total = config.inputs.len() as u64;
    let pb = if config.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
            )
            .wrap_err("Invalid progress template")?
            .progress_chars("=>-"),
        );
        bar.println(format!("Found {} pages.", total));
        bar
    };

    let mut count_created = 0usize;
    let mut count_updated = 0usize;
    let mut count_skipped = 0usize;
    let mut count_errors = 0usize;

    for source in &config.inputs {
        match export_source(source, &config) {
            Ok(ProcessResult::Created) => count_created += 1,
            Ok(ProcessResult::Updated) => count_updated += 1,
            Ok(ProcessResult::Skipped) => count_skipped += 1,
            Err(e) => {
                count_errors += 1;
                pb.println(format!("Error [{}]: {:#}", source.display(), e));
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    if !config.quiet {
        let mut summary = format!(
            "Done. {} created, {} updated, {} skipped.",
            count_created, count_updated, count_skipped
        );
        if count_errors > 0 {
            summary.push_str(&format!(" Completed with {} error(s).", count_errors));
        }
        eprintln!("{}", summary);
    }

    Ok(())
}

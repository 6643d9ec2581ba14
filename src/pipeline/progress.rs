// file: src/pipeline/progress.rs
// description: progress tracking and statistics reporting for index builds
// reference: uses indicatif for progress bars and tracks build metrics

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStats {
    pub documents: usize,
    pub chunks: usize,
    pub skipped_files: usize,
    pub batches: usize,
    pub duration: Duration,
}

impl BuildStats {
    pub fn chunks_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.chunks as f64 / secs
    }

    pub fn summary(&self) -> String {
        format!(
            "{} documents, {} chunks, {} skipped in {:.2}s",
            self.documents.to_string().green(),
            self.chunks.to_string().green(),
            self.skipped_files.to_string().yellow(),
            self.duration.as_secs_f64()
        )
    }
}

/// Progress of the embedding phase, one tick per batch.
pub struct ProgressTracker {
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
    batches_done: Arc<AtomicUsize>,
    chunks_embedded: Arc<AtomicUsize>,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(colored: bool) -> Self {
        let multi_progress = MultiProgress::new();
        Self::from_bars(
            create_progress_bar(&multi_progress, colored),
            create_detail_bar(&multi_progress),
        )
    }

    /// Tracker that counts but draws nothing.
    pub fn hidden() -> Self {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        Self::from_bars(
            create_progress_bar(&multi_progress, false),
            create_detail_bar(&multi_progress),
        )
    }

    fn from_bars(main_bar: ProgressBar, detail_bar: ProgressBar) -> Self {
        Self {
            main_bar,
            detail_bar,
            batches_done: Arc::new(AtomicUsize::new(0)),
            chunks_embedded: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn start(&self, total_batches: usize, total_chunks: usize) {
        self.main_bar.set_length(total_batches as u64);
        self.detail_bar
            .set_message(format!("Embedding {} chunks", total_chunks));
    }

    pub fn inc_batch(&self, chunks: usize) {
        self.batches_done.fetch_add(1, Ordering::SeqCst);
        let embedded = self.chunks_embedded.fetch_add(chunks, Ordering::SeqCst) + chunks;
        self.main_bar.inc(1);
        self.detail_bar
            .set_message(format!("Chunks embedded: {}", embedded));
    }

    pub fn set_message(&self, message: String) {
        self.detail_bar.set_message(message);
    }

    pub fn batches_done(&self) -> usize {
        self.batches_done.load(Ordering::SeqCst)
    }

    pub fn chunks_embedded(&self) -> usize {
        self.chunks_embedded.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(&self) {
        self.main_bar.finish_with_message("Index ready");
        self.detail_bar.finish_and_clear();
    }

    /// Leaves the bar where a failed or cancelled build stopped it.
    pub fn abandon(&self) {
        self.main_bar.abandon_with_message("Index build stopped");
        self.detail_bar.finish_and_clear();
    }

    pub fn is_finished(&self) -> bool {
        self.main_bar.is_finished()
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        if !self.main_bar.is_finished() {
            self.main_bar.abandon();
        }
        self.detail_bar.finish_and_clear();
    }
}

fn create_progress_bar(multi_progress: &MultiProgress, colored: bool) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(0));
    let (template, chars) = if colored {
        (
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({eta}) {msg}",
            "█▓▒░",
        )
    } else {
        (
            "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} batches ({eta}) {msg}",
            "=>-",
        )
    };
    if let Ok(style) = ProgressStyle::default_bar().template(template) {
        bar.set_style(style.progress_chars(chars));
    }
    bar
}

fn create_detail_bar(multi_progress: &MultiProgress) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(0));
    if let Ok(style) = ProgressStyle::default_bar().template("{msg}") {
        bar.set_style(style);
    }
    bar
}

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives frame completion updates from the frame loop.
pub trait Progress: Sync {
    fn update(&self, done: usize, total: usize);

    fn finish(&self) {}
}

impl Progress for () {
    fn update(&self, _done: usize, _total: usize) {}
}

/// Overwrites a `"12.50% complete"` line on stdout.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    printed: AtomicUsize,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn format_progress(done: usize, total: usize) -> String {
    let fraction = if total == 0 { 1.0 } else { done as f64 / total as f64 };
    format!("{:.2}% complete", fraction * 100.0)
}

impl Progress for ConsoleProgress {
    fn update(&self, done: usize, total: usize) {
        self.printed.fetch_add(1, Ordering::Relaxed);
        let mut stdout = io::stdout().lock();
        // progress output is best effort
        let _ = write!(stdout, "\r{}", format_progress(done, total));
        let _ = stdout.flush();
    }

    fn finish(&self) {
        if self.printed.load(Ordering::Relaxed) > 0 {
            println!();
        }
    }
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Progress bar over a batch of inference calls.
///
/// Drawn on stdout together with the rest of the run's output. Status lines
/// go through [`ProgressTracker::println`] so they print above the bar
/// instead of tearing it.
pub(crate) struct ProgressTracker {
    progress_bar: ProgressBar,
}

impl ProgressTracker {
    pub(crate) fn new(len: usize) -> Self {
        let progress_bar =
            ProgressBar::with_draw_target(Some(len as u64), ProgressDrawTarget::stdout());
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
        progress_bar.set_style(style);

        Self { progress_bar }
    }

    pub(crate) fn println(&self, message: impl AsRef<str>) {
        if self.progress_bar.is_hidden() {
            println!("{}", message.as_ref());
        } else {
            self.progress_bar.println(message);
        }
    }

    pub(crate) fn inc(&self) {
        self.progress_bar.inc(1);
    }

    pub(crate) fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }
}

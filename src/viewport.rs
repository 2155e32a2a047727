use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::ResultBundle;
use crate::report;
use crate::theme::Theme;

/// Whatever surface shows the results region once a submission lands.
pub trait ResultsViewport: Send + Sync {
    fn scroll_into_view(&self, bundle: &ResultBundle);
}

/// A delayed scroll owned by the calculator. Dropping it cancels the scroll
/// if it has not fired yet.
#[derive(Debug)]
pub struct ScheduledScroll {
    handle: JoinHandle<()>,
}

impl ScheduledScroll {
    /// Returns `None` when called outside a tokio runtime.
    pub fn schedule(
        viewport: Arc<dyn ResultsViewport>,
        bundle: ResultBundle,
        delay: Duration,
    ) -> Option<Self> {
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!("no async runtime; skipping results scroll");
            return None;
        };

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            viewport.scroll_into_view(&bundle);
        });
        Some(Self { handle })
    }
}

impl Drop for ScheduledScroll {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Points the terminal reader back at the results, in whichever theme is
/// active when the scroll fires. The results themselves are printed by the
/// caller as soon as they are computed.
pub struct TerminalViewport {
    theme: watch::Receiver<Theme>,
}

impl TerminalViewport {
    pub fn new(theme: watch::Receiver<Theme>) -> Self {
        Self { theme }
    }
}

impl ResultsViewport for TerminalViewport {
    fn scroll_into_view(&self, bundle: &ResultBundle) {
        let palette = self.theme.borrow().palette();
        let pointer = report::results_pointer(bundle, &palette);
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{pointer}");
        let _ = stdout.flush();
    }
}

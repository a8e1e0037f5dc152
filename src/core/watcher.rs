//! Keeps at most one mounted [`JobView`] and switches between jobs.

use std::sync::Arc;

use tokio::sync::watch;

use super::job_view::{JobView, WatchSettings};
use super::models::MergedView;
use super::source::JobSource;

pub struct JobWatcher {
    source: Arc<dyn JobSource>,
    settings: WatchSettings,
    active: Option<JobView>,
}

impl JobWatcher {
    pub fn new(source: Arc<dyn JobSource>, settings: WatchSettings) -> Self {
        Self {
            source,
            settings,
            active: None,
        }
    }

    /// Show `job_id`. The previous job's view is fully released before the
    /// new one acquires anything. Watching the current job again is a no-op.
    pub async fn watch(&mut self, job_id: &str) -> watch::Receiver<MergedView> {
        if let Some(view) = self.active.as_ref().filter(|view| view.job_id() == job_id) {
            return view.subscribe();
        }

        if let Some(mut previous) = self.active.take() {
            previous.switch_away().await;
        }

        let view = JobView::mount(self.source.clone(), job_id, self.settings.clone());
        let receiver = view.subscribe();
        self.active = Some(view);
        receiver
    }

    pub fn active(&self) -> Option<&JobView> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut JobView> {
        self.active.as_mut()
    }

    /// Release the current view, if any.
    pub async fn stop(&mut self) {
        if let Some(mut view) = self.active.take() {
            view.unmount().await;
        }
    }
}

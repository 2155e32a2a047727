use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::estimator;
use crate::models::{parse_score, CalculatorForm, Metric, ResultBundle};
use crate::store::{self, KeyValueStore};
use crate::viewport::{ResultsViewport, ScheduledScroll};

pub const DEFAULT_SCROLL_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Input,
    Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    SchoolName,
    StudentCount,
    Metric(Metric),
}

impl FormField {
    pub fn from_name(name: &str) -> Option<FormField> {
        match name.trim().to_ascii_lowercase().as_str() {
            "name" | "school" | "school-name" | "school_name" => Some(FormField::SchoolName),
            "count" | "students" | "student-count" | "student_count" => {
                Some(FormField::StudentCount)
            }
            other => Metric::from_key(other).map(FormField::Metric),
        }
    }
}

/// Two-step calculator: edit the form, submit to see projections, then go
/// back for another scenario.
pub struct Calculator {
    view: View,
    form: CalculatorForm,
    result: Option<ResultBundle>,
    store: Arc<dyn KeyValueStore>,
    viewport: Option<Arc<dyn ResultsViewport>>,
    scroll_delay: Duration,
    pending_scroll: Option<ScheduledScroll>,
}

impl Calculator {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            view: View::Input,
            form: CalculatorForm::default(),
            result: None,
            store,
            viewport: None,
            scroll_delay: DEFAULT_SCROLL_DELAY,
            pending_scroll: None,
        }
    }

    pub fn with_viewport(mut self, viewport: Arc<dyn ResultsViewport>, delay: Duration) -> Self {
        self.viewport = Some(viewport);
        self.scroll_delay = delay;
        self
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn form(&self) -> &CalculatorForm {
        &self.form
    }

    pub fn result(&self) -> Option<&ResultBundle> {
        self.result.as_ref()
    }

    /// Applies a form edit. Returns false when the form is not on screen.
    pub fn edit(&mut self, field: FormField, value: &str) -> bool {
        if self.view != View::Input {
            tracing::debug!(?field, "ignoring edit outside the input view");
            return false;
        }
        match field {
            FormField::SchoolName => self.form.school_name = value.to_string(),
            FormField::StudentCount => self.form.student_count = value.to_string(),
            FormField::Metric(metric) => self.form.metrics.set(metric, parse_score(value)),
        }
        true
    }

    /// The input form's own reset button.
    pub fn clear_form(&mut self) {
        if self.view == View::Input {
            self.form = CalculatorForm::default();
        }
    }

    pub async fn submit(&mut self) -> Option<&ResultBundle> {
        self.submit_at(Utc::now()).await
    }

    /// Runs the estimator on the draft, remembers the bundle, persists it
    /// best-effort and schedules the results scroll. Only honored from the
    /// input view.
    pub async fn submit_at(&mut self, now: DateTime<Utc>) -> Option<&ResultBundle> {
        if self.view != View::Input {
            tracing::debug!("submit ignored while results are showing");
            return None;
        }

        let bundle = estimator::estimate(
            &self.form.metrics,
            &self.form.school_name,
            &self.form.student_count,
            now,
        );
        tracing::info!(
            school = %bundle.profile.name,
            belonging = bundle.current.belonging,
            voice = bundle.current.voice,
            safety = bundle.current.safety,
            engagement = bundle.current.engagement,
            "projected transformation roadmap"
        );

        if let Err(err) = store::save_result(self.store.as_ref(), &bundle).await {
            tracing::warn!(error = %err, "could not remember calculator result");
        }

        if let Some(viewport) = &self.viewport {
            self.pending_scroll =
                ScheduledScroll::schedule(viewport.clone(), bundle.clone(), self.scroll_delay);
        }

        self.view = View::Results;
        self.result = Some(bundle);
        self.result.as_ref()
    }

    /// "Try Another Scenario": back to a default form. The remembered result
    /// stays in storage.
    pub fn try_another(&mut self) {
        if self.view != View::Results {
            return;
        }
        self.view = View::Input;
        self.result = None;
        self.form = CalculatorForm::default();
    }
}

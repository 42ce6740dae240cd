//! TUI application state and logic.

use crate::context::AppContext;
use crate::jobs::{JobConfig, JobId, JobSnapshot, JobTracker, SyncType, TrackedJob};

/// Editable fields of the start-sync form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    SyncType,
    Spaces,
    Tags,
}

impl FormField {
    fn next(self) -> Self {
        match self {
            Self::SyncType => Self::Spaces,
            Self::Spaces => Self::Tags,
            Self::Tags => Self::SyncType,
        }
    }

    fn prev(self) -> Self {
        match self {
            Self::SyncType => Self::Tags,
            Self::Spaces => Self::SyncType,
            Self::Tags => Self::Spaces,
        }
    }
}

/// Start-sync form contents. Spaces and tags are free text, split on commas
/// when submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartForm {
    pub sync_type: SyncType,
    pub spaces: String,
    pub tags: String,
    pub field: FormField,
}

impl StartForm {
    pub fn to_job_config(&self) -> JobConfig {
        JobConfig::from_filters(self.sync_type, &self.spaces, &self.tags)
    }

    fn focused_text(&mut self) -> Option<&mut String> {
        match self.field {
            FormField::SyncType => None,
            FormField::Spaces => Some(&mut self.spaces),
            FormField::Tags => Some(&mut self.tags),
        }
    }
}

/// Current view being displayed.
#[derive(Debug, Clone)]
pub enum View {
    /// Tracked jobs with live progress.
    Dashboard {
        /// Selected index in the job list
        selected: usize,
    },
    /// Start-sync form.
    StartSync(StartForm),
}

impl Default for View {
    fn default() -> Self {
        View::Dashboard { selected: 0 }
    }
}

/// Actions that can be triggered by user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Up,
    Down,
    NewSync,
    Submit,
    Back,
    CancelJob,
    DiscardJob,
    NextField,
    PrevField,
    Toggle,
    Input(char),
    Backspace,
}

/// Main TUI application state.
pub struct TuiApp {
    ctx: AppContext,
    tracker: JobTracker,
    pub view: View,
    /// Tracked jobs, oldest first, as of the last refresh.
    pub jobs: Vec<TrackedJob>,
    pub running: bool,
    pub starting: bool,
    pub error: Option<String>,
}

impl TuiApp {
    pub fn new(ctx: AppContext) -> Self {
        let tracker = ctx.tracker();
        Self {
            ctx,
            tracker,
            view: View::default(),
            jobs: Vec::new(),
            running: true,
            starting: false,
            error: None,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.ctx.config.api_url
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Rebuild the job list from a tracker snapshot.
    pub fn refresh(&mut self, snapshot: &JobSnapshot) {
        let mut jobs: Vec<TrackedJob> = snapshot.values().cloned().collect();
        jobs.sort_by(|a, b| {
            a.record
                .started_at
                .cmp(&b.record.started_at)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        self.jobs = jobs;

        if let View::Dashboard { selected } = &mut self.view {
            *selected = (*selected).min(self.jobs.len().saturating_sub(1));
        }
    }

    pub fn active_count(&self) -> usize {
        self.tracker.active_count()
    }

    /// Handle an action and update state accordingly.
    pub async fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.quit(),
            Action::Back => {
                self.view = View::Dashboard {
                    selected: self.jobs.len().saturating_sub(1),
                };
            }
            Action::NewSync => self.open_form(),
            Action::Submit => self.submit().await,
            Action::Up => self.navigate(-1),
            Action::Down => self.navigate(1),
            Action::CancelJob => {
                if let Some(id) = self.selected_id() {
                    self.tracker.cancel(&id);
                }
            }
            Action::DiscardJob => {
                if let Some(id) = self.selected_id() {
                    self.tracker.discard(&id);
                    self.refresh(&self.tracker.snapshot());
                }
            }
            Action::NextField => self.edit_form(|form| form.field = form.field.next()),
            Action::PrevField => self.edit_form(|form| form.field = form.field.prev()),
            Action::Toggle => self.edit_form(|form| {
                if form.field == FormField::SyncType {
                    form.sync_type = form.sync_type.toggled();
                }
            }),
            Action::Input(c) => self.edit_form(|form| match form.focused_text() {
                Some(text) => text.push(c),
                None if c == ' ' => form.sync_type = form.sync_type.toggled(),
                None => {}
            }),
            Action::Backspace => self.edit_form(|form| {
                if let Some(text) = form.focused_text() {
                    text.pop();
                }
            }),
        }
    }

    fn quit(&mut self) {
        self.tracker.teardown();
        self.running = false;
    }

    fn open_form(&mut self) {
        let defaults = self.ctx.default_job_config();
        self.error = None;
        self.view = View::StartSync(StartForm {
            sync_type: defaults.sync_type,
            spaces: defaults.spaces.join(","),
            tags: defaults.tags.join(","),
            field: FormField::SyncType,
        });
    }

    async fn submit(&mut self) {
        let View::StartSync(form) = &self.view else {
            return;
        };
        let config = form.to_job_config();

        self.starting = true;
        self.error = None;
        let result = self.tracker.start_job(config).await;
        self.starting = false;

        match result {
            Ok(_) => {
                self.refresh(&self.tracker.snapshot());
                self.view = View::Dashboard {
                    selected: self.jobs.len().saturating_sub(1),
                };
            }
            Err(e) => self.error = Some(format!("Failed to start sync: {}", e)),
        }
    }

    fn edit_form(&mut self, edit: impl FnOnce(&mut StartForm)) {
        if let View::StartSync(form) = &mut self.view {
            edit(form);
        }
    }

    fn navigate(&mut self, delta: isize) {
        if let View::Dashboard { selected } = &mut self.view {
            let last = self.jobs.len().saturating_sub(1);
            *selected = selected.saturating_add_signed(delta).min(last);
        }
    }

    fn selected_id(&self) -> Option<JobId> {
        match &self.view {
            View::Dashboard { selected } => self.jobs.get(*selected).map(|j| j.record.id.clone()),
            View::StartSync(_) => None,
        }
    }
}

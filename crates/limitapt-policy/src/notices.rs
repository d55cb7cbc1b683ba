use crate::changes::ChangeSummary;
use crate::denial::{Denial, Notice, Warning};

/// The user-facing side of a run, implemented by the presentation layer.
pub trait Notifications {
    fn notice(&mut self, notice: &Notice);
    fn denied(&mut self, denial: &Denial);
    fn warned(&mut self, warning: &Warning);
    fn show_changes(&mut self, summary: &ChangeSummary);
    /// Ask whether to go on; `false` ends the run without error.
    fn prompt_agree(&mut self) -> bool;
    fn nothing_to_do(&mut self);
}

/// Forward collected notices, warnings and denials, in that order.
pub fn report(
    notifications: &mut dyn Notifications,
    notices: &[Notice],
    warnings: &[Warning],
    denials: &[Denial],
) {
    for notice in notices {
        notifications.notice(notice);
    }
    for warning in warnings {
        notifications.warned(warning);
    }
    for denial in denials {
        notifications.denied(denial);
    }
}

/// Notifications collected in memory, with scripted answers to prompts.
#[derive(Debug, Default)]
pub struct RecordedNotifications {
    pub notices: Vec<Notice>,
    pub denials: Vec<Denial>,
    pub warnings: Vec<Warning>,
    pub summaries: Vec<ChangeSummary>,
    pub prompts: usize,
    pub nothing_to_do: usize,
    pub agree: bool,
}

impl RecordedNotifications {
    pub fn agreeing() -> Self {
        Self {
            agree: true,
            ..Self::default()
        }
    }

    pub fn declining() -> Self {
        Self::default()
    }
}

impl Notifications for RecordedNotifications {
    fn notice(&mut self, notice: &Notice) {
        self.notices.push(notice.clone());
    }

    fn denied(&mut self, denial: &Denial) {
        self.denials.push(denial.clone());
    }

    fn warned(&mut self, warning: &Warning) {
        self.warnings.push(warning.clone());
    }

    fn show_changes(&mut self, summary: &ChangeSummary) {
        self.summaries.push(summary.clone());
    }

    fn prompt_agree(&mut self) -> bool {
        self.prompts += 1;
        self.agree
    }

    fn nothing_to_do(&mut self) {
        self.nothing_to_do += 1;
    }
}

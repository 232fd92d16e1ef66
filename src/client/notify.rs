use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("notification could not be rendered: {0}")]
pub struct RenderError(pub String);

pub trait Notifier {
    /// Dismissible error notification on the page.
    fn render_error(&mut self, message: &str) -> Result<(), RenderError>;

    /// Blocking alert, used when the notification cannot be rendered.
    fn alert(&mut self, title: &str, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error { message: String, closable: bool },
    Alert { title: String, message: String },
}

/// Collects what the user would see in the page's notification area.
#[derive(Debug, Default)]
pub struct PageNotifications {
    pub notices: Vec<Notice>,
    /// Set when the notification template is unavailable.
    pub template_missing: bool,
}

impl Notifier for PageNotifications {
    fn render_error(&mut self, message: &str) -> Result<(), RenderError> {
        if self.template_missing {
            return Err(RenderError("notification_error template missing".into()));
        }
        self.notices.push(Notice::Error {
            message: message.to_string(),
            closable: true,
        });
        Ok(())
    }

    fn alert(&mut self, title: &str, message: &str) {
        self.notices.push(Notice::Alert {
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}

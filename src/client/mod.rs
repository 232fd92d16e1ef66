//! Headless controller for the series management screen.
//!
//! [`SeriesTable`] owns the rows, the hidden selection field and the modal
//! flows. Server access goes through [`RemoteCall`]; user-facing failures go
//! through [`Notifier`].

mod modal;
mod notify;
mod remote;
mod table;

pub use modal::{FormView, Modal, ModalBody, ModalKind, ModalState};
pub use notify::{Notice, Notifier, PageNotifications, RenderError};
pub use remote::{decode_payload, InProcessRemote, RemoteCall, RemoteError};
pub use table::{ClientError, HiddenField, SaveOutcome, SeriesTable, Strings};

pub const METHOD_SUBMIT_SERIES_FORM: &str = "series.submitForm";
pub const METHOD_GET_SERIES_TITLES: &str = "series.getTitles";
pub const METHOD_IMPORT_SERIES: &str = "series.import";
pub const METHOD_SERIES_FORM_CONTENT: &str = "series.formContent";
pub const METHOD_STRINGS_GET: &str = "strings.get";

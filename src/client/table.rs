use super::modal::{FormView, Modal, ModalBody, ModalKind, ModalState};
use super::notify::Notifier;
use super::remote::{decode_payload, RemoteCall, RemoteError};
use super::{
    METHOD_GET_SERIES_TITLES, METHOD_IMPORT_SERIES, METHOD_SERIES_FORM_CONTENT,
    METHOD_STRINGS_GET, METHOD_SUBMIT_SERIES_FORM,
};
use crate::bridge::CreatedSeries;
use crate::form::{self, FieldValue, FormContent};
use crate::selection::{de_flag, parse_hidden_rows, upsert_row, SelectionState, SeriesRow};
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("hidden field {name} does not hold a series selection: {source}")]
    HiddenField {
        name: String,
        source: serde_json::Error,
    },

    #[error("another dialog is already open")]
    ModalAlreadyOpen,

    #[error("no dialog is open")]
    NoModal,

    #[error("the open dialog has no {0}")]
    WrongModal(&'static str),

    #[error("no row for series {0}")]
    UnknownRow(String),
}

/// Hidden page input holding the serialized selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenField {
    pub name: String,
    pub value: String,
}

impl HiddenField {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

const STRING_KEYS: [&str; 13] = [
    "seriesname",
    "form_seriesid",
    "default",
    "noconnectedseries",
    "createseriesforcourse",
    "delete_series",
    "delete_confirm_series",
    "editseries",
    "delete",
    "loading",
    "importseries",
    "importfailed",
    "seriesnotfound",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Strings {
    pub seriesname: String,
    pub form_seriesid: String,
    pub default: String,
    pub noconnectedseries: String,
    pub createseriesforcourse: String,
    pub delete_series: String,
    pub delete_confirm_series: String,
    pub editseries: String,
    pub delete: String,
    pub loading: String,
    pub importseries: String,
    pub importfailed: String,
    pub seriesnotfound: String,
}

impl Strings {
    fn fetch<R: RemoteCall>(remote: &R) -> Result<Self, RemoteError> {
        #[derive(Deserialize)]
        struct Fetched {
            strings: Vec<String>,
        }
        let fetched: Fetched =
            decode_payload(remote.call(METHOD_STRINGS_GET, json!({ "keys": STRING_KEYS }))?)?;
        let mut it = fetched.strings.into_iter();
        let mut next = || it.next().unwrap_or_default();
        Ok(Self {
            seriesname: next(),
            form_seriesid: next(),
            default: next(),
            noconnectedseries: next(),
            createseriesforcourse: next(),
            delete_series: next(),
            delete_confirm_series: next(),
            editseries: next(),
            delete: next(),
            loading: next(),
            importseries: next(),
            importfailed: next(),
            seriesnotfound: next(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Client-side validation failed; nothing was sent.
    Invalid { focus: String },
    Completed,
    Failed { message: String },
}

#[derive(Deserialize)]
struct ImportedSeries {
    id: String,
    title: String,
    #[serde(default, deserialize_with = "de_flag")]
    isdefault: i64,
}

pub struct SeriesTable<R: RemoteCall, N: Notifier> {
    context_id: i64,
    instance_id: i64,
    hidden: HiddenField,
    strings: Strings,
    rows: Vec<SeriesRow>,
    modal: Option<Modal>,
    /// Create dialog kept between opens; its body is reset on every hide.
    parked_create: Option<Modal>,
    remote: R,
    notifier: N,
}

impl<R: RemoteCall, N: Notifier> SeriesTable<R, N> {
    /// Fetch strings, load rows from the hidden field and resolve their titles.
    pub fn initialize(
        remote: R,
        notifier: N,
        context_id: i64,
        instance_id: i64,
        hidden: HiddenField,
    ) -> Result<Self, ClientError> {
        let strings = Strings::fetch(&remote)?;
        let rows = parse_hidden_rows(&hidden.value).map_err(|source| ClientError::HiddenField {
            name: hidden.name.clone(),
            source,
        })?;
        let mut table = Self {
            context_id,
            instance_id,
            hidden,
            strings,
            rows: Vec::new(),
            modal: None,
            parked_create: None,
            remote,
            notifier,
        };
        table.load_rows(rows);
        Ok(table)
    }

    pub fn rows(&self) -> &[SeriesRow] {
        &self.rows
    }

    pub fn hidden(&self) -> &HiddenField {
        &self.hidden
    }

    pub fn strings(&self) -> &Strings {
        &self.strings
    }

    pub fn modal(&self) -> Option<&Modal> {
        self.modal.as_ref()
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn columns(&self) -> [&str; 3] {
        [
            self.strings.seriesname.as_str(),
            self.strings.form_seriesid.as_str(),
            self.strings.default.as_str(),
        ]
    }

    /// Text shown instead of an empty table.
    pub fn placeholder(&self) -> Option<&str> {
        self.rows
            .is_empty()
            .then_some(self.strings.noconnectedseries.as_str())
    }

    /// Replace all rows, then resolve missing titles.
    pub fn load_rows(&mut self, rows: Vec<SeriesRow>) {
        self.rows = rows;
        self.sync_hidden();
        self.resolve_titles();
    }

    fn sync_hidden(&mut self) {
        self.hidden.value = SelectionState::from_rows(&self.rows).to_json();
    }

    fn resolve_titles(&mut self) {
        let pending: BTreeSet<String> = self
            .rows
            .iter()
            .filter(|r| !r.series.is_empty() && r.seriesname.is_empty())
            .map(|r| r.series.clone())
            .collect();
        if pending.is_empty() {
            return;
        }
        for row in self.rows.iter_mut().filter(|r| pending.contains(&r.series)) {
            row.seriesname = self.strings.loading.clone();
        }

        let ids: Vec<&String> = pending.iter().collect();
        let args = json!({
            "contextId": self.context_id,
            "instanceId": self.instance_id,
            "seriesIdsJson": json!(ids).to_string(),
        });
        let result = self
            .remote
            .call(METHOD_GET_SERIES_TITLES, args)
            .and_then(decode_payload::<BTreeMap<String, String>>);

        match result {
            Ok(titles) => {
                for row in self.rows.iter_mut().filter(|r| pending.contains(&r.series)) {
                    row.seriesname = titles
                        .get(&row.series)
                        .cloned()
                        .unwrap_or_else(|| self.strings.seriesnotfound.clone());
                }
            }
            Err(e) => {
                tracing::warn!(code = %e.code, error = %e.message, "series titles unavailable");
                for row in self.rows.iter_mut().filter(|r| pending.contains(&r.series)) {
                    row.seriesname = e.message.clone();
                }
            }
        }
        self.sync_hidden();
    }

    /// Default checkbox click. Touches this row only.
    pub fn toggle_default(&mut self, series: &str, checked: bool) -> Result<(), ClientError> {
        let row = self
            .rows
            .iter_mut()
            .find(|r| r.series == series)
            .ok_or_else(|| ClientError::UnknownRow(series.to_string()))?;
        row.isdefault = i64::from(checked);
        self.sync_hidden();
        Ok(())
    }

    /// Append a row; an identifier already in the table is updated in place.
    fn add_row(&mut self, row: SeriesRow) {
        upsert_row(&mut self.rows, row);
        self.sync_hidden();
    }

    fn remove_row(&mut self, series: &str) -> bool {
        let Some(pos) = self.rows.iter().position(|r| r.series == series) else {
            return false;
        };
        self.rows.remove(pos);
        self.sync_hidden();
        true
    }

    fn form_body(&self, form_data: &str) -> Result<FormView, RemoteError> {
        let content: FormContent = decode_payload(self.remote.call(
            METHOD_SERIES_FORM_CONTENT,
            json!({
                "contextId": self.context_id,
                "instanceId": self.instance_id,
                "formDataEncoded": form_data,
            }),
        )?)?;
        Ok(FormView::new(content))
    }

    fn show(&mut self, mut modal: Modal) -> Result<(), ClientError> {
        if self.modal.is_some() {
            return Err(ClientError::ModalAlreadyOpen);
        }
        modal.state = ModalState::Open;
        self.modal = Some(modal);
        Ok(())
    }

    pub fn open_create(&mut self) -> Result<(), ClientError> {
        if self.modal.is_some() {
            return Err(ClientError::ModalAlreadyOpen);
        }
        let modal = match self.parked_create.take() {
            Some(m) => m,
            None => Modal::new(
                ModalKind::Create,
                &self.strings.createseriesforcourse,
                &self.strings.createseriesforcourse,
                ModalBody::Form(self.form_body("")?),
            ),
        };
        self.show(modal)
    }

    pub fn open_edit(&mut self, series: &str) -> Result<(), ClientError> {
        if self.modal.is_some() {
            return Err(ClientError::ModalAlreadyOpen);
        }
        if !self.rows.iter().any(|r| r.series == series) {
            return Err(ClientError::UnknownRow(series.to_string()));
        }
        let target = FieldValue::Single(series.to_string());
        let form_data = form::encode_form_body([(form::EDIT_SERIES_KEY, &target)]);
        let modal = Modal::new(
            ModalKind::Edit {
                series: series.to_string(),
            },
            &self.strings.editseries,
            &self.strings.editseries,
            ModalBody::Form(self.form_body(&form_data)?),
        );
        self.show(modal)
    }

    pub fn open_delete(&mut self, series: &str) -> Result<(), ClientError> {
        if !self.rows.iter().any(|r| r.series == series) {
            return Err(ClientError::UnknownRow(series.to_string()));
        }
        let modal = Modal::new(
            ModalKind::Delete {
                series: series.to_string(),
            },
            &self.strings.delete_series,
            &self.strings.delete,
            ModalBody::Confirm(self.strings.delete_confirm_series.clone()),
        );
        self.show(modal)
    }

    pub fn open_import(&mut self) -> Result<(), ClientError> {
        let modal = Modal::new(
            ModalKind::Import,
            &self.strings.importseries,
            &self.strings.importseries,
            ModalBody::ImportInput(String::new()),
        );
        self.show(modal)
    }

    pub fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), ClientError> {
        let modal = self.modal.as_mut().ok_or(ClientError::NoModal)?;
        let view = modal.form_mut().ok_or(ClientError::WrongModal("form"))?;
        view.set_value(name, value);
        Ok(())
    }

    pub fn set_import_id(&mut self, text: &str) -> Result<(), ClientError> {
        let modal = self.modal.as_mut().ok_or(ClientError::NoModal)?;
        match &mut modal.body {
            ModalBody::ImportInput(input) => {
                *input = text.to_string();
                Ok(())
            }
            _ => Err(ClientError::WrongModal("series id input")),
        }
    }

    /// Hide the open dialog. The create dialog is kept with a fresh body;
    /// every other dialog is destroyed.
    pub fn cancel(&mut self) -> Result<(), ClientError> {
        let kind = &self.modal.as_ref().ok_or(ClientError::NoModal)?.kind;
        let fresh = match kind {
            ModalKind::Create => Some(self.form_body("")),
            _ => None,
        };
        let Some(mut modal) = self.modal.take() else {
            return Err(ClientError::NoModal);
        };
        modal.state = ModalState::Closed;
        match fresh {
            Some(Ok(view)) => {
                modal.body = ModalBody::Form(view);
                self.parked_create = Some(modal);
            }
            // Parked as it was; the next open shows the stale body.
            Some(Err(e)) => {
                self.parked_create = Some(modal);
                return Err(e.into());
            }
            None => {}
        }
        Ok(())
    }

    /// Save button of the open dialog.
    pub fn save(&mut self) -> Result<SaveOutcome, ClientError> {
        let modal = self.modal.take().ok_or(ClientError::NoModal)?;
        match modal.kind.clone() {
            ModalKind::Create | ModalKind::Edit { .. } => self.submit_form(modal),
            ModalKind::Delete { series } => {
                self.remove_row(&series);
                Ok(SaveOutcome::Completed)
            }
            ModalKind::Import => self.submit_import(modal),
        }
    }

    fn submit_form(&mut self, mut modal: Modal) -> Result<SaveOutcome, ClientError> {
        modal.state = ModalState::Validating;
        let Some(view) = modal.form_mut() else {
            self.modal = Some(modal);
            return Err(ClientError::WrongModal("form"));
        };
        view.validate_all();
        if let Some(focus) = view.focus_first_invalid() {
            modal.state = ModalState::Open;
            self.modal = Some(modal);
            return Ok(SaveOutcome::Invalid { focus });
        }
        let form_data = view.serialize();

        modal.state = ModalState::Submitting;
        let response = self.remote.call(
            METHOD_SUBMIT_SERIES_FORM,
            json!({
                "contextId": self.context_id,
                "instanceId": self.instance_id,
                "formDataEncoded": form_data,
            }),
        );

        match response {
            Ok(payload) => {
                if modal.kind == ModalKind::Create {
                    match decode_payload::<CreatedSeries>(payload) {
                        Ok(created) => self.add_row(SeriesRow::new(
                            created.series,
                            created.seriestitle,
                            created.isdefault,
                        )),
                        Err(e) => {
                            self.notify_failure(&e.message);
                            return Ok(SaveOutcome::Failed { message: e.message });
                        }
                    }
                }
                Ok(SaveOutcome::Completed)
            }
            Err(e) => {
                tracing::warn!(code = %e.code, error = %e.message, "series form rejected");
                match self.form_body(&form_data) {
                    Ok(fresh) => modal.body = ModalBody::Form(fresh),
                    Err(reload) => self.notify_failure(&reload.message),
                }
                modal.state = ModalState::Open;
                self.modal = Some(modal);
                Ok(SaveOutcome::Failed { message: e.message })
            }
        }
    }

    fn submit_import(&mut self, mut modal: Modal) -> Result<SaveOutcome, ClientError> {
        let series_id = match &modal.body {
            ModalBody::ImportInput(s) => s.trim().to_string(),
            _ => {
                self.modal = Some(modal);
                return Err(ClientError::WrongModal("series id input"));
            }
        };
        modal.state = ModalState::Submitting;
        let result = self
            .remote
            .call(
                METHOD_IMPORT_SERIES,
                json!({
                    "contextId": self.context_id,
                    "instanceId": self.instance_id,
                    "seriesId": series_id,
                }),
            )
            .and_then(decode_payload::<ImportedSeries>);

        // The dialog goes away whatever the outcome.
        drop(modal);
        match result {
            Ok(s) => {
                self.add_row(SeriesRow::new(s.id, s.title, s.isdefault));
                Ok(SaveOutcome::Completed)
            }
            Err(e) => {
                tracing::warn!(code = %e.code, error = %e.message, "series import failed");
                let message = self.strings.importfailed.clone();
                self.notify_failure(&message);
                Ok(SaveOutcome::Failed { message: e.message })
            }
        }
    }

    fn notify_failure(&mut self, message: &str) {
        if let Err(e) = self.notifier.render_error(message) {
            tracing::warn!(error = %e, "falling back to alert");
            self.notifier.alert(message, message);
        }
    }
}

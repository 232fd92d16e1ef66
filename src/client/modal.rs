use crate::form::{self, FieldValue, FormContent};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalKind {
    Create,
    Edit { series: String },
    Delete { series: String },
    Import,
}

/// `Closed -> Open -> Validating -> Open` when a field is invalid,
/// `Validating -> Submitting -> Closed` on success and
/// `Submitting -> Open` with a fresh body on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalState {
    Closed,
    Open,
    Validating,
    Submitting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModalBody {
    Form(FormView),
    Confirm(String),
    ImportInput(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Modal {
    pub kind: ModalKind,
    pub state: ModalState,
    pub title: String,
    pub save_label: String,
    pub body: ModalBody,
}

impl Modal {
    pub fn new(kind: ModalKind, title: &str, save_label: &str, body: ModalBody) -> Self {
        Self {
            kind,
            state: ModalState::Closed,
            title: title.to_string(),
            save_label: save_label.to_string(),
            body,
        }
    }

    pub fn form(&self) -> Option<&FormView> {
        match &self.body {
            ModalBody::Form(view) => Some(view),
            _ => None,
        }
    }

    pub fn form_mut(&mut self) -> Option<&mut FormView> {
        match &mut self.body {
            ModalBody::Form(view) => Some(view),
            _ => None,
        }
    }
}

/// A rendered series form: the provider's content plus what the user typed.
#[derive(Debug, Clone, PartialEq)]
pub struct FormView {
    content: FormContent,
    values: BTreeMap<String, FieldValue>,
    /// Fields a change event flagged (`aria-invalid`).
    invalid: BTreeSet<String>,
    focused: Option<String>,
}

impl FormView {
    pub fn new(content: FormContent) -> Self {
        Self {
            values: content.values.clone(),
            content,
            invalid: BTreeSet::new(),
            focused: None,
        }
    }

    pub fn content(&self) -> &FormContent {
        &self.content
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Error text shown under a field, if any.
    pub fn error(&self, name: &str) -> Option<&str> {
        self.content.errors.get(name).map(String::as_str)
    }

    /// User edit; fires the field's change validation.
    pub fn set_value(&mut self, name: &str, value: FieldValue) {
        self.values.insert(name.to_string(), value);
        self.run_change(name);
    }

    fn run_change(&mut self, name: &str) {
        let Some(def) = self.content.fields.iter().find(|f| f.name == name) else {
            return;
        };
        match form::check_field(def, self.values.get(name)) {
            Ok(()) => {
                self.invalid.remove(name);
                self.content.errors.remove(name);
            }
            Err(msg) => {
                self.invalid.insert(name.to_string());
                self.content.errors.insert(name.to_string(), msg);
            }
        }
    }

    /// Fire a change event on every input.
    pub fn validate_all(&mut self) {
        let names: Vec<String> = self.content.fields.iter().map(|f| f.name.clone()).collect();
        for name in names {
            self.run_change(&name);
        }
    }

    /// Flagged fields in form order: `aria-invalid` or carrying an error.
    pub fn invalid_fields(&self) -> Vec<&str> {
        self.content
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .filter(|n| self.invalid.contains(*n) || self.content.errors.contains_key(*n))
            .collect()
    }

    pub fn focus_first_invalid(&mut self) -> Option<String> {
        self.focused = self.invalid_fields().first().map(|s| s.to_string());
        self.focused.clone()
    }

    /// URL-encoded body of every field, in form order.
    pub fn serialize(&self) -> String {
        let empty = FieldValue::Single(String::new());
        form::encode_form_body(self.content.fields.iter().filter_map(|f| {
            match self.values.get(&f.name) {
                Some(v) => Some((f.name.as_str(), v)),
                None if f.datatype == form::FieldType::Autocomplete => None,
                None => Some((f.name.as_str(), &empty)),
            }
        }))
    }
}

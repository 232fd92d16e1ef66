use crate::ipc::{self, AppState, Request};
use serde::de::DeserializeOwned;
use std::cell::{Cell, RefCell};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// One non-batched call: method name plus an argument object. No retries and
/// no de-duplication; every call is independent.
pub trait RemoteCall {
    fn call(&self, method: &str, args: serde_json::Value) -> Result<serde_json::Value, RemoteError>;
}

/// Decode a success payload. The series operations answer with a
/// JSON-encoded string; structured results are accepted as they are.
pub fn decode_payload<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T, RemoteError> {
    let decoded = match payload {
        serde_json::Value::String(s) => serde_json::from_str(&s),
        other => serde_json::from_value(other),
    };
    decoded.map_err(|e| RemoteError::new("bad_response", format!("unreadable response: {e}")))
}

/// Routes calls straight into the IPC router, sharing one [`AppState`].
pub struct InProcessRemote {
    state: RefCell<AppState>,
    next_id: Cell<u64>,
}

impl InProcessRemote {
    pub fn new(state: AppState) -> Self {
        Self {
            state: RefCell::new(state),
            next_id: Cell::new(1),
        }
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut AppState) -> T) -> T {
        f(&mut self.state.borrow_mut())
    }
}

impl RemoteCall for InProcessRemote {
    fn call(&self, method: &str, args: serde_json::Value) -> Result<serde_json::Value, RemoteError> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let req = Request {
            id: id.to_string(),
            method: method.to_string(),
            params: args,
        };
        let mut resp = ipc::handle_request(&mut self.state.borrow_mut(), req);
        if resp.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            return Ok(resp["result"].take());
        }
        let code = resp
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let message = resp
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .unwrap_or("request failed");
        Err(RemoteError::new(code, message))
    }
}

impl<R: RemoteCall + ?Sized> RemoteCall for &R {
    fn call(&self, method: &str, args: serde_json::Value) -> Result<serde_json::Value, RemoteError> {
        (**self).call(method, args)
    }
}

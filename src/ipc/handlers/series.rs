use crate::access::SqliteHost;
use crate::endpoint::{self, EndpointError, RequestContext};
use crate::ipc::error::{endpoint_err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn with_context<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&RequestContext<'_>, &Connection) -> Result<serde_json::Value, EndpointError>,
{
    let Some(conn) = state.db.as_ref() else {
        return endpoint_err(&req.id, &EndpointError::NoWorkspace);
    };
    let host = SqliteHost::new(conn);
    let ctx = RequestContext {
        principal: state.principal,
        access: &host,
        config: &host,
        bridges: &host,
    };
    match f(&ctx, conn) {
        Ok(result) => ok(&req.id, result),
        Err(e) => {
            tracing::warn!(method = %req.method, code = e.code(), error = %e, "request failed");
            endpoint_err(&req.id, &e)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let params = &req.params;
    let resp = match req.method.as_str() {
        "series.submitForm" => with_context(state, req, |ctx, _| {
            endpoint::submit_series_form(ctx, params).map(serde_json::Value::String)
        }),
        "series.getTitles" => with_context(state, req, |ctx, _| {
            endpoint::get_series_titles(ctx, params).map(serde_json::Value::String)
        }),
        "series.import" => with_context(state, req, |ctx, _| {
            endpoint::import_series(ctx, params).map(serde_json::Value::String)
        }),
        "series.formContent" => with_context(state, req, |ctx, _| {
            endpoint::series_form_content(ctx, params).map(|content| json!(content))
        }),
        "courses.listSeries" => with_context(state, req, |ctx, conn| {
            endpoint::list_course_series(ctx, conn, params)
        }),
        "courses.saveSeriesSelection" => with_context(state, req, |ctx, conn| {
            endpoint::save_series_selection(ctx, conn, params)
        }),
        _ => return None,
    };
    Some(resp)
}

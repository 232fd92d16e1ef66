//! Host-side methods: session, courses, capability grants, instance
//! configuration and strings.

use crate::access::{self, Principal, ALL_CAPABILITIES};
use crate::db;
use crate::form::FieldDef;
use crate::i18n;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn get_i64(req: &Request, key: &str) -> Option<i64> {
    req.params.get(key).and_then(|v| v.as_i64())
}

fn handle_session_begin(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(user_id) = get_i64(req, "userId") else {
        return err(&req.id, "bad_params", "missing userId", None);
    };
    state.principal = Some(Principal { user_id });
    tracing::info!(user_id, "session started");
    ok(&req.id, json!({ "userId": user_id }))
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let fullname = match req.params.get("fullname").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing fullname", None),
    };
    if fullname.is_empty() {
        return err(&req.id, "bad_params", "fullname must not be empty", None);
    }

    match db::create_course(conn, &fullname) {
        Ok((course_id, context_id)) => ok(
            &req.id,
            json!({ "courseId": course_id, "contextId": context_id, "fullname": fullname }),
        ),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "courses" })),
        ),
    }
}

fn grant_params(req: &Request) -> Result<(i64, i64, String), serde_json::Value> {
    let Some(context_id) = get_i64(req, "contextId") else {
        return Err(err(&req.id, "bad_params", "missing contextId", None));
    };
    let Some(user_id) = get_i64(req, "userId") else {
        return Err(err(&req.id, "bad_params", "missing userId", None));
    };
    let Some(capability) = req.params.get("capability").and_then(|v| v.as_str()) else {
        return Err(err(&req.id, "bad_params", "missing capability", None));
    };
    if !ALL_CAPABILITIES.contains(&capability) {
        return Err(err(
            &req.id,
            "bad_params",
            format!("unknown capability: {capability}"),
            Some(json!({ "known": ALL_CAPABILITIES })),
        ));
    }
    Ok((context_id, user_id, capability.to_string()))
}

fn handle_capabilities_grant(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (context_id, user_id, capability) = match grant_params(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match db::course_for_context(conn, context_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "context_not_found", "context not found", None),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
    match db::grant_capability(conn, context_id, user_id, &capability) {
        Ok(()) => ok(&req.id, json!({ "granted": true })),
        Err(e) => err(&req.id, "db_insert_failed", format!("{e:#}"), None),
    }
}

fn handle_capabilities_revoke(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (context_id, user_id, capability) = match grant_params(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match db::revoke_capability(conn, context_id, user_id, &capability) {
        Ok(revoked) => ok(&req.id, json!({ "revoked": revoked })),
        Err(e) => err(&req.id, "db_delete_failed", format!("{e:#}"), None),
    }
}

fn handle_set_metadata_catalog(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(instance_id) = get_i64(req, "instanceId") else {
        return err(&req.id, "bad_params", "missing instanceId", None);
    };
    let Some(catalog) = req.params.get("catalog") else {
        return err(&req.id, "bad_params", "missing catalog", None);
    };
    // Reject catalogs the series form could not be built from.
    let fields: Vec<FieldDef> = match serde_json::from_value(catalog.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid catalog: {e}"), None),
    };
    let key = access::metadata_catalog_key(instance_id);
    match db::settings_set_json(conn, &key, &json!(fields)) {
        Ok(()) => ok(&req.id, json!({ "fieldCount": fields.len() })),
        Err(e) => err(&req.id, "db_update_failed", format!("{e:#}"), None),
    }
}

fn handle_get_metadata_catalog(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(instance_id) = get_i64(req, "instanceId") else {
        return err(&req.id, "bad_params", "missing instanceId", None);
    };
    let key = access::metadata_catalog_key(instance_id);
    match db::settings_get_json(conn, &key) {
        Ok(v) => ok(&req.id, json!({ "catalog": v.unwrap_or_else(|| json!([])) })),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_strings_get(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(keys) = req.params.get("keys").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing keys", None);
    };
    let strings: Vec<String> = keys
        .iter()
        .map(|k| i18n::get_string(k.as_str().unwrap_or_default()))
        .collect();
    ok(&req.id, json!({ "strings": strings }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.begin" => Some(handle_session_begin(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "capabilities.grant" => Some(handle_capabilities_grant(state, req)),
        "capabilities.revoke" => Some(handle_capabilities_revoke(state, req)),
        "instances.setMetadataCatalog" => Some(handle_set_metadata_catalog(state, req)),
        "instances.getMetadataCatalog" => Some(handle_get_metadata_catalog(state, req)),
        "strings.get" => Some(handle_strings_get(state, req)),
        _ => None,
    }
}

mod test_support;

use serde_json::json;
use test_support::{add_course, spawn_sidecar, temp_dir};

fn open_workspace(sc: &mut test_support::Sidecar, prefix: &str) {
    let workspace = temp_dir(prefix);
    sc.request_ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
}

#[test]
fn series_calls_need_a_workspace_and_a_session() {
    let mut sc = spawn_sidecar();
    let params = json!({ "contextId": 1, "instanceId": 1, "seriesIdsJson": "[]" });
    assert_eq!(sc.request_err("series.getTitles", params.clone()), "no_workspace");

    open_workspace(&mut sc, "seriesd-perm-session");
    let ctx = add_course(&mut sc, "C", 2, &["series:defineforcourse"]);
    let params = json!({ "contextId": ctx, "instanceId": 1, "seriesIdsJson": "[]" });
    assert_eq!(sc.request_err("series.getTitles", params.clone()), "require_login");

    sc.request_ok("session.begin", json!({ "userId": 2 }));
    assert_eq!(sc.request_encoded("series.getTitles", params), json!({}));
}

#[test]
fn each_operation_checks_its_own_capability() {
    let mut sc = spawn_sidecar();
    open_workspace(&mut sc, "seriesd-perm-caps");
    let ctx = add_course(&mut sc, "C", 2, &["series:createforcourse"]);
    sc.request_ok("session.begin", json!({ "userId": 2 }));

    let created = sc.request_encoded(
        "series.submitForm",
        json!({ "contextId": ctx, "instanceId": 1, "formDataEncoded": "title=Mine" }),
    );
    let series_id = created["series"].as_str().expect("series").to_string();

    let denied = sc.request(
        "series.getTitles",
        json!({ "contextId": ctx, "instanceId": 1, "seriesIdsJson": json!([series_id]).to_string() }),
    );
    assert_eq!(denied.pointer("/error/code"), Some(&json!("nopermissions")));
    assert_eq!(
        denied.pointer("/error/details/capability"),
        Some(&json!("series:defineforcourse"))
    );
    assert!(denied.get("result").is_none());

    assert_eq!(
        sc.request_err(
            "series.import",
            json!({ "contextId": ctx, "instanceId": 1, "seriesId": series_id }),
        ),
        "nopermissions"
    );

    // A different user holds nothing in this course.
    sc.request_ok("session.begin", json!({ "userId": 3 }));
    assert_eq!(
        sc.request_err(
            "series.submitForm",
            json!({ "contextId": ctx, "instanceId": 1, "formDataEncoded": "title=Theirs" }),
        ),
        "nopermissions"
    );
}

#[test]
fn revoked_capability_stops_access() {
    let mut sc = spawn_sidecar();
    open_workspace(&mut sc, "seriesd-perm-revoke");
    let ctx = add_course(&mut sc, "C", 2, &["series:defineforcourse"]);
    sc.request_ok("session.begin", json!({ "userId": 2 }));

    let params = json!({ "contextId": ctx, "instanceId": 1, "seriesIdsJson": "[]" });
    sc.request_ok("series.getTitles", params.clone());
    sc.request_ok(
        "capabilities.revoke",
        json!({ "contextId": ctx, "userId": 2, "capability": "series:defineforcourse" }),
    );
    assert_eq!(sc.request_err("series.getTitles", params), "nopermissions");
}

#[test]
fn parameter_schema_is_checked_first() {
    let mut sc = spawn_sidecar();
    open_workspace(&mut sc, "seriesd-perm-schema");
    sc.request_ok("session.begin", json!({ "userId": 2 }));

    // Context 999 does not exist, but the bad seriesId is reported first.
    assert_eq!(
        sc.request_err(
            "series.import",
            json!({ "contextId": 999, "instanceId": 1, "seriesId": "../etc" }),
        ),
        "invalid_parameter"
    );
    assert_eq!(
        sc.request_err(
            "series.import",
            json!({ "contextId": 999, "instanceId": 1, "seriesId": "ok-id" }),
        ),
        "context_not_found"
    );
    assert_eq!(
        sc.request_err(
            "series.getTitles",
            json!({ "contextId": "abc", "instanceId": 1, "seriesIdsJson": "[]" }),
        ),
        "invalid_parameter"
    );
}

#[test]
fn unknown_method_and_bad_json_lines() {
    let mut sc = spawn_sidecar();
    assert_eq!(sc.request_err("series.delete", json!({})), "not_implemented");

    let resp = sc.write_line("{not json");
    assert_eq!(resp.pointer("/error/code"), Some(&json!("bad_json")));

    let health = sc.request_ok("health", json!({}));
    assert!(health.get("version").is_some());
}

//! Series operations exposed to the table: parameter schema, login,
//! context, capability, then delegation to the bridge. Nothing reaches the
//! bridge before all four checks pass.

mod error;
pub mod params;

pub use error::EndpointError;

use crate::access::{
    AccessControl, CourseContext, PluginConfig, Principal, CAP_CREATE_SERIES, CAP_DEFINE_SERIES,
    CAP_IMPORT_SERIES,
};
use crate::bridge::BridgeProvider;
use crate::form::{self, FieldValue, FormContent, FormSchema};
use crate::selection::SelectionState;
use params::{validate_params, ValidatedParams};
use serde_json::json;
use std::collections::BTreeMap;

/// Everything an operation may consult, passed in explicitly per call.
pub struct RequestContext<'a> {
    pub principal: Option<Principal>,
    pub access: &'a dyn AccessControl,
    pub config: &'a dyn PluginConfig,
    pub bridges: &'a dyn BridgeProvider,
}

impl RequestContext<'_> {
    fn authorize(
        &self,
        context_id: i64,
        capability: &str,
    ) -> Result<(Principal, CourseContext), EndpointError> {
        let principal = self.principal.ok_or(EndpointError::RequireLogin)?;
        let context = self
            .access
            .resolve_context(context_id)
            .map_err(EndpointError::Storage)?
            .ok_or(EndpointError::ContextNotFound(context_id))?;
        let allowed = self
            .access
            .has_capability(&principal, &context, capability)
            .map_err(EndpointError::Storage)?;
        if !allowed {
            tracing::warn!(
                user_id = principal.user_id,
                context_id,
                capability,
                "capability check failed"
            );
            return Err(EndpointError::PermissionDenied {
                capability: capability.to_string(),
            });
        }
        Ok((principal, context))
    }

    fn series_schema(&self, instance_id: i64) -> Result<FormSchema, EndpointError> {
        let catalog = self
            .config
            .metadata_catalog(instance_id)
            .map_err(EndpointError::Storage)?;
        Ok(FormSchema::series_form(&catalog))
    }
}

fn ids(p: &ValidatedParams) -> (i64, i64) {
    (p.int("contextId"), p.int("instanceId"))
}

/// Create a series for the course, or update the metadata of the series named
/// by the form's `seriesid`. Returns the JSON-encoded bridge result.
pub fn submit_series_form(
    ctx: &RequestContext<'_>,
    params: &serde_json::Value,
) -> Result<String, EndpointError> {
    let p = validate_params(params::SUBMIT_SERIES_FORM, params)?;
    let (context_id, instance_id) = ids(&p);
    let (principal, course) = ctx.authorize(context_id, CAP_CREATE_SERIES)?;

    let mut raw = form::decode_form_body(p.string("formDataEncoded"));
    raw.insert(
        form::FIELD_COURSE_ID.to_string(),
        FieldValue::Single(course.course_id.to_string()),
    );
    let schema = ctx.series_schema(instance_id)?;
    let data = form::validate(&schema, &raw).map_err(EndpointError::MissingRequiredField)?;
    let metadata = data.metadata();

    let bridge = ctx.bridges.bridge(instance_id);
    match data.series_id() {
        None => {
            let created = bridge
                .create_course_series(course.course_id, &metadata, principal.user_id)
                .map_err(EndpointError::Bridge)?;
            tracing::info!(
                course_id = course.course_id,
                instance_id,
                series = %created.series,
                "series created"
            );
            serde_json::to_string(&created).map_err(|e| EndpointError::Bridge(e.into()))
        }
        Some(series_id) => {
            let updated = bridge
                .update_series_metadata(series_id, &metadata)
                .map_err(EndpointError::Bridge)?;
            tracing::info!(instance_id, series = series_id, updated, "series metadata updated");
            Ok(json!(updated).to_string())
        }
    }
}

/// Decode the id list. Numbers are accepted and looked up by their text.
fn requested_ids(raw: &str) -> Result<Vec<String>, EndpointError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| EndpointError::invalid("seriesIdsJson", e.to_string()))?;
    values
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(EndpointError::invalid(
                "seriesIdsJson",
                format!("not a series id: {other}"),
            )),
        })
        .collect()
}

/// Identifier -> title for the requested series. Unknown identifiers are
/// absent from the mapping.
pub fn get_series_titles(
    ctx: &RequestContext<'_>,
    params: &serde_json::Value,
) -> Result<String, EndpointError> {
    let p = validate_params(params::GET_SERIES_TITLES, params)?;
    let (context_id, instance_id) = ids(&p);
    ctx.authorize(context_id, CAP_DEFINE_SERIES)?;

    let requested = requested_ids(p.string("seriesIdsJson"))?;
    let records = ctx
        .bridges
        .bridge(instance_id)
        .get_multiple_series_by_identifier(&requested)
        .map_err(EndpointError::Bridge)?;

    let titles: BTreeMap<String, String> = records
        .into_iter()
        .map(|r| (r.identifier, r.title))
        .collect();
    tracing::debug!(
        requested = requested.len(),
        found = titles.len(),
        "series titles resolved"
    );
    Ok(json!(titles).to_string())
}

/// Attach an existing series to the course and hand back `{id, title, isdefault}`.
pub fn import_series(
    ctx: &RequestContext<'_>,
    params: &serde_json::Value,
) -> Result<String, EndpointError> {
    let p = validate_params(params::IMPORT_SERIES, params)?;
    let (context_id, instance_id) = ids(&p);
    let (principal, course) = ctx.authorize(context_id, CAP_IMPORT_SERIES)?;
    let series_id = p.string("seriesId");

    let bridge = ctx.bridges.bridge(instance_id);
    let outcome = bridge
        .import_series_to_course_with_acl_change(course.course_id, series_id, principal.user_id)
        .map_err(EndpointError::Bridge)?;
    if outcome.error {
        tracing::warn!(course_id = course.course_id, series = series_id, "import rejected");
        return Err(EndpointError::ImportFailed {
            series_id: series_id.to_string(),
        });
    }
    let record = bridge
        .get_series_by_identifier(series_id)
        .map_err(EndpointError::Bridge)?
        .ok_or_else(|| EndpointError::ImportFailed {
            series_id: series_id.to_string(),
        })?;

    tracing::info!(course_id = course.course_id, series = series_id, "series imported");
    Ok(json!({
        "id": series_id,
        "title": record.title,
        "isdefault": outcome.isdefault,
    })
    .to_string())
}

/// Modal body for the series form. `series=<id>` pre-populates from the
/// bridge; any other payload is echoed back with its validation errors.
pub fn series_form_content(
    ctx: &RequestContext<'_>,
    params: &serde_json::Value,
) -> Result<FormContent, EndpointError> {
    let p = validate_params(params::SERIES_FORM_CONTENT, params)?;
    let (context_id, instance_id) = ids(&p);
    let (_, course) = ctx.authorize(context_id, CAP_CREATE_SERIES)?;
    let schema = ctx.series_schema(instance_id)?;

    let raw = form::decode_form_body(p.string("formDataEncoded"));
    let course_value = FieldValue::Single(course.course_id.to_string());

    let edit_target = raw
        .get(form::EDIT_SERIES_KEY)
        .and_then(FieldValue::as_single)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let (mut values, errors) = match edit_target {
        Some(series_id) => {
            let metadata = ctx
                .bridges
                .bridge(instance_id)
                .get_series_metadata(&series_id)
                .map_err(EndpointError::Bridge)?
                .ok_or_else(|| EndpointError::SeriesNotFound(series_id.clone()))?;
            let mut values = form::values_from_metadata(&metadata);
            values.insert(
                form::FIELD_SERIES_ID.to_string(),
                FieldValue::Single(series_id),
            );
            (values, BTreeMap::new())
        }
        None if raw.is_empty() => (BTreeMap::new(), BTreeMap::new()),
        None => {
            let mut submitted = raw.clone();
            submitted.insert(form::FIELD_COURSE_ID.to_string(), course_value.clone());
            let errors = match form::validate(&schema, &submitted) {
                Ok(_) => BTreeMap::new(),
                Err(e) => e.0,
            };
            (raw, errors)
        }
    };
    values.retain(|name, _| schema.field(name).is_some());
    values.insert(form::FIELD_COURSE_ID.to_string(), course_value);

    Ok(FormContent {
        fields: schema.fields,
        values,
        errors,
    })
}

/// Persisted selection as table rows, for the hidden field's first render.
pub fn list_course_series(
    ctx: &RequestContext<'_>,
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EndpointError> {
    let p = validate_params(params::LIST_COURSE_SERIES, params)?;
    let (context_id, instance_id) = ids(&p);
    let (_, course) = ctx.authorize(context_id, CAP_DEFINE_SERIES)?;
    let rows = crate::db::course_series_list(conn, course.course_id, instance_id)
        .map_err(EndpointError::Storage)?;
    Ok(json!(rows
        .into_iter()
        .map(|(series, isdefault)| json!({ "series": series, "isdefault": isdefault }))
        .collect::<Vec<_>>()))
}

/// Store the hidden field value submitted with the enclosing page.
pub fn save_series_selection(
    ctx: &RequestContext<'_>,
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EndpointError> {
    let p = validate_params(params::SAVE_SERIES_SELECTION, params)?;
    let (context_id, instance_id) = ids(&p);
    let (_, course) = ctx.authorize(context_id, CAP_DEFINE_SERIES)?;
    let selection = SelectionState::parse(p.string("selection"))
        .map_err(|e| EndpointError::invalid("selection", e.to_string()))?;
    let entries = selection.entries();
    crate::db::course_series_replace(conn, course.course_id, instance_id, &entries)
        .map_err(EndpointError::Storage)?;
    tracing::info!(
        course_id = course.course_id,
        instance_id,
        count = entries.len(),
        "series selection saved"
    );
    Ok(json!({ "saved": entries.len() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{CreatedSeries, ImportOutcome, SeriesBridge, SeriesRecord};
    use crate::form::{FieldDef, FieldType, MetadataEntry};
    use std::cell::RefCell;

    #[derive(Default)]
    struct Fake {
        granted: Vec<&'static str>,
        calls: RefCell<Vec<String>>,
        import_error: bool,
    }

    impl AccessControl for Fake {
        fn resolve_context(&self, context_id: i64) -> anyhow::Result<Option<CourseContext>> {
            Ok((context_id == 10).then_some(CourseContext {
                context_id,
                course_id: 2,
            }))
        }

        fn has_capability(
            &self,
            _principal: &Principal,
            _context: &CourseContext,
            capability: &str,
        ) -> anyhow::Result<bool> {
            Ok(self.granted.contains(&capability))
        }
    }

    impl PluginConfig for Fake {
        fn metadata_catalog(&self, _instance_id: i64) -> anyhow::Result<Vec<FieldDef>> {
            Ok(vec![FieldDef::new("description", FieldType::Textarea)])
        }
    }

    impl BridgeProvider for Fake {
        fn bridge(&self, _instance_id: i64) -> Box<dyn SeriesBridge + '_> {
            Box::new(FakeBridge(self))
        }
    }

    struct FakeBridge<'a>(&'a Fake);

    impl FakeBridge<'_> {
        fn record(&self, call: String) {
            self.0.calls.borrow_mut().push(call);
        }
    }

    impl SeriesBridge for FakeBridge<'_> {
        fn create_course_series(
            &self,
            course_id: i64,
            metadata: &[MetadataEntry],
            user_id: i64,
        ) -> anyhow::Result<CreatedSeries> {
            let ids: Vec<_> = metadata.iter().map(|m| m.id.as_str()).collect();
            self.record(format!("create {course_id} {user_id} {}", ids.join(",")));
            Ok(CreatedSeries {
                seriestitle: "New Series".into(),
                series: "5".into(),
                isdefault: 1,
            })
        }

        fn update_series_metadata(
            &self,
            series_id: &str,
            _metadata: &[MetadataEntry],
        ) -> anyhow::Result<bool> {
            self.record(format!("update {series_id}"));
            Ok(true)
        }

        fn get_multiple_series_by_identifier(
            &self,
            ids: &[String],
        ) -> anyhow::Result<Vec<SeriesRecord>> {
            self.record(format!("titles {}", ids.join(",")));
            Ok(ids
                .iter()
                .filter(|id| id.as_str() != "gone")
                .map(|id| SeriesRecord {
                    identifier: id.clone(),
                    title: format!("Title {id}"),
                })
                .collect())
        }

        fn get_series_by_identifier(&self, id: &str) -> anyhow::Result<Option<SeriesRecord>> {
            Ok(Some(SeriesRecord {
                identifier: id.to_string(),
                title: "Lecture 1".into(),
            }))
        }

        fn get_series_metadata(&self, id: &str) -> anyhow::Result<Option<Vec<MetadataEntry>>> {
            Ok((id == "s1").then(|| {
                vec![MetadataEntry {
                    id: "title".into(),
                    value: json!("Stored"),
                }]
            }))
        }

        fn import_series_to_course_with_acl_change(
            &self,
            course_id: i64,
            series_id: &str,
            _user_id: i64,
        ) -> anyhow::Result<ImportOutcome> {
            self.record(format!("import {course_id} {series_id}"));
            Ok(ImportOutcome {
                error: self.0.import_error,
                isdefault: 0,
            })
        }
    }

    fn ctx(fake: &Fake) -> RequestContext<'_> {
        RequestContext {
            principal: Some(Principal { user_id: 7 }),
            access: fake,
            config: fake,
            bridges: fake,
        }
    }

    fn granted(caps: &[&'static str]) -> Fake {
        Fake {
            granted: caps.to_vec(),
            ..Fake::default()
        }
    }

    #[test]
    fn create_excludes_ids_from_metadata() {
        let fake = granted(&[CAP_CREATE_SERIES]);
        let out = submit_series_form(
            &ctx(&fake),
            &json!({
                "contextId": 10,
                "instanceId": 1,
                "formDataEncoded": "courseid=999&seriesid=&title=New+Series&description=d"
            }),
        )
        .expect("created");
        let created: CreatedSeries = serde_json::from_str(&out).expect("payload");
        assert_eq!(created.series, "5");
        assert_eq!(
            fake.calls.borrow().as_slice(),
            ["create 2 7 title,description"]
        );
    }

    #[test]
    fn seriesid_routes_to_update() {
        let fake = granted(&[CAP_CREATE_SERIES]);
        let out = submit_series_form(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "formDataEncoded": "seriesid=s1&title=T" }),
        )
        .expect("updated");
        assert_eq!(out, "true");
        assert_eq!(fake.calls.borrow().as_slice(), ["update s1"]);
    }

    #[test]
    fn invalid_form_never_reaches_bridge() {
        let fake = granted(&[CAP_CREATE_SERIES]);
        let e = submit_series_form(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "formDataEncoded": "description=x" }),
        )
        .expect_err("missing title");
        assert_eq!(e.code(), "missing_required_field");
        assert!(fake.calls.borrow().is_empty());
    }

    #[test]
    fn titles_omit_unknown_identifiers() {
        let fake = granted(&[CAP_DEFINE_SERIES]);
        let out = get_series_titles(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "seriesIdsJson": r#"["a","gone"]"# }),
        )
        .expect("titles");
        assert_eq!(out, r#"{"a":"Title a"}"#);
    }

    #[test]
    fn numeric_title_ids_are_looked_up_as_text() {
        let fake = granted(&[CAP_DEFINE_SERIES]);
        let out = get_series_titles(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "seriesIdsJson": r#"[12,"b"]"# }),
        )
        .expect("titles");
        assert_eq!(out, r#"{"12":"Title 12","b":"Title b"}"#);
        assert_eq!(fake.calls.borrow().as_slice(), ["titles 12,b"]);

        let e = get_series_titles(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "seriesIdsJson": r#"[["nested"]]"# }),
        )
        .expect_err("not scalar");
        assert_eq!(e.code(), "invalid_parameter");
    }

    #[test]
    fn permission_failure_stops_before_bridge() {
        let fake = granted(&[CAP_CREATE_SERIES]);
        let e = get_series_titles(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "seriesIdsJson": r#"["a"]"# }),
        )
        .expect_err("denied");
        assert_eq!(e.code(), "nopermissions");
        assert!(fake.calls.borrow().is_empty());

        let e = import_series(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "seriesId": "series-42" }),
        )
        .expect_err("denied");
        assert_eq!(e.code(), "nopermissions");
        assert!(fake.calls.borrow().is_empty());
    }

    #[test]
    fn schema_failure_comes_before_permission_check() {
        let fake = Fake::default();
        let e = import_series(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "seriesId": "bad id" }),
        )
        .expect_err("invalid");
        assert_eq!(e.code(), "invalid_parameter");
    }

    #[test]
    fn missing_login_and_unknown_context() {
        let fake = granted(&[CAP_DEFINE_SERIES]);
        let mut anonymous = ctx(&fake);
        anonymous.principal = None;
        let params = json!({ "contextId": 10, "instanceId": 1, "seriesIdsJson": "[]" });
        assert_eq!(
            get_series_titles(&anonymous, &params).expect_err("login").code(),
            "require_login"
        );
        let params = json!({ "contextId": 11, "instanceId": 1, "seriesIdsJson": "[]" });
        assert_eq!(
            get_series_titles(&ctx(&fake), &params).expect_err("context").code(),
            "context_not_found"
        );
    }

    #[test]
    fn import_returns_title_and_default_flag() {
        let fake = granted(&[CAP_IMPORT_SERIES]);
        let out = import_series(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "seriesId": "series-42" }),
        )
        .expect("imported");
        let v: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(
            v,
            json!({ "id": "series-42", "title": "Lecture 1", "isdefault": 0 })
        );
    }

    #[test]
    fn bridge_reported_import_error_is_validation_error() {
        let fake = Fake {
            import_error: true,
            ..granted(&[CAP_IMPORT_SERIES])
        };
        let e = import_series(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "seriesId": "x" }),
        )
        .expect_err("rejected");
        assert_eq!(e.code(), "validation_error");
    }

    #[test]
    fn form_content_prefills_edit_and_echoes_failures() {
        let fake = granted(&[CAP_CREATE_SERIES]);
        let edit = series_form_content(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "formDataEncoded": "series=s1" }),
        )
        .expect("edit");
        assert_eq!(edit.values.get("title"), Some(&FieldValue::Single("Stored".into())));
        assert_eq!(edit.values.get("seriesid"), Some(&FieldValue::Single("s1".into())));
        assert_eq!(edit.values.get("courseid"), Some(&FieldValue::Single("2".into())));
        assert!(edit.errors.is_empty());

        let failed = series_form_content(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "formDataEncoded": "description=kept" }),
        )
        .expect("failed body");
        assert_eq!(
            failed.values.get("description"),
            Some(&FieldValue::Single("kept".into()))
        );
        assert!(failed.errors.contains_key("title"));

        let missing = series_form_content(
            &ctx(&fake),
            &json!({ "contextId": 10, "instanceId": 1, "formDataEncoded": "series=nope" }),
        )
        .expect_err("unknown series");
        assert_eq!(missing.code(), "series_not_found");
    }
}

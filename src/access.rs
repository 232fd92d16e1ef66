//! Principal, course contexts, capability checks and plugin configuration,
//! plus the workspace-database host that backs all of them.

use crate::bridge::{BridgeProvider, SeriesBridge, SqliteBridge};
use crate::db;
use crate::form::FieldDef;
use anyhow::Context;
use rusqlite::Connection;

pub const CAP_CREATE_SERIES: &str = "series:createforcourse";
pub const CAP_DEFINE_SERIES: &str = "series:defineforcourse";
pub const CAP_IMPORT_SERIES: &str = "series:importintocourse";

pub const ALL_CAPABILITIES: &[&str] = &[CAP_CREATE_SERIES, CAP_DEFINE_SERIES, CAP_IMPORT_SERIES];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
}

/// Permission scope of one course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseContext {
    pub context_id: i64,
    pub course_id: i64,
}

pub trait AccessControl {
    fn resolve_context(&self, context_id: i64) -> anyhow::Result<Option<CourseContext>>;

    fn has_capability(
        &self,
        principal: &Principal,
        context: &CourseContext,
        capability: &str,
    ) -> anyhow::Result<bool>;
}

pub trait PluginConfig {
    /// Metadata catalog configured for an instance; empty when unset.
    fn metadata_catalog(&self, instance_id: i64) -> anyhow::Result<Vec<FieldDef>>;
}

pub fn metadata_catalog_key(instance_id: i64) -> String {
    format!("metadataseries_{instance_id}")
}

/// Host collaborators backed by the workspace database.
pub struct SqliteHost<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteHost<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl AccessControl for SqliteHost<'_> {
    fn resolve_context(&self, context_id: i64) -> anyhow::Result<Option<CourseContext>> {
        Ok(db::course_for_context(self.conn, context_id)?.map(|course_id| CourseContext {
            context_id,
            course_id,
        }))
    }

    fn has_capability(
        &self,
        principal: &Principal,
        context: &CourseContext,
        capability: &str,
    ) -> anyhow::Result<bool> {
        db::has_capability(self.conn, context.context_id, principal.user_id, capability)
    }
}

impl PluginConfig for SqliteHost<'_> {
    fn metadata_catalog(&self, instance_id: i64) -> anyhow::Result<Vec<FieldDef>> {
        let key = metadata_catalog_key(instance_id);
        match db::settings_get_json(self.conn, &key)? {
            Some(v) => serde_json::from_value(v).with_context(|| format!("invalid {key}")),
            None => Ok(Vec::new()),
        }
    }
}

impl BridgeProvider for SqliteHost<'_> {
    fn bridge(&self, instance_id: i64) -> Box<dyn SeriesBridge + '_> {
        Box::new(SqliteBridge::new(self.conn, instance_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FieldType;
    use serde_json::json;

    #[test]
    fn unknown_context_resolves_to_none() {
        let conn = db::open_in_memory().expect("db");
        let host = SqliteHost::new(&conn);
        assert!(host.resolve_context(99).expect("resolve").is_none());

        let (course_id, context_id) = db::create_course(&conn, "C").expect("course");
        assert_eq!(
            host.resolve_context(context_id).expect("resolve"),
            Some(CourseContext {
                context_id,
                course_id
            })
        );
    }

    #[test]
    fn catalog_reads_instance_setting() {
        let conn = db::open_in_memory().expect("db");
        let host = SqliteHost::new(&conn);
        assert!(host.metadata_catalog(4).expect("catalog").is_empty());

        db::settings_set_json(
            &conn,
            &metadata_catalog_key(4),
            &json!([{ "name": "description", "datatype": "textarea" }]),
        )
        .expect("set");
        let catalog = host.metadata_catalog(4).expect("catalog");
        assert_eq!(catalog, vec![FieldDef::new("description", FieldType::Textarea)]);
        assert!(host.metadata_catalog(5).expect("catalog").is_empty());
    }
}

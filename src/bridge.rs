//! Boundary to the media service that owns series.
//!
//! Endpoints only see [`SeriesBridge`]. [`SqliteBridge`] keeps series in the
//! workspace database so the sidecar runs without a media service attached.

use crate::form::MetadataEntry;
use anyhow::Context;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub identifier: String,
    pub title: String,
}

/// Payload the table turns into a new row after a create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSeries {
    #[serde(alias = "seriesTitle")]
    pub seriestitle: String,
    pub series: String,
    pub isdefault: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub error: bool,
    pub isdefault: i64,
}

pub trait SeriesBridge {
    fn create_course_series(
        &self,
        course_id: i64,
        metadata: &[MetadataEntry],
        user_id: i64,
    ) -> anyhow::Result<CreatedSeries>;

    fn update_series_metadata(
        &self,
        series_id: &str,
        metadata: &[MetadataEntry],
    ) -> anyhow::Result<bool>;

    /// Records for the identifiers that exist; unknown ones are left out.
    fn get_multiple_series_by_identifier(&self, ids: &[String])
        -> anyhow::Result<Vec<SeriesRecord>>;

    fn get_series_by_identifier(&self, id: &str) -> anyhow::Result<Option<SeriesRecord>>;

    fn get_series_metadata(&self, id: &str) -> anyhow::Result<Option<Vec<MetadataEntry>>>;

    fn import_series_to_course_with_acl_change(
        &self,
        course_id: i64,
        series_id: &str,
        user_id: i64,
    ) -> anyhow::Result<ImportOutcome>;
}

pub trait BridgeProvider {
    fn bridge(&self, instance_id: i64) -> Box<dyn SeriesBridge + '_>;
}

/// Roles and actions a course gets on an imported series.
const COURSE_ACL: &[(&str, &str)] = &[
    ("instructor", "read"),
    ("instructor", "write"),
    ("learner", "read"),
];

pub struct SqliteBridge<'c> {
    conn: &'c Connection,
    instance_id: i64,
}

impl<'c> SqliteBridge<'c> {
    pub fn new(conn: &'c Connection, instance_id: i64) -> Self {
        Self { conn, instance_id }
    }

    fn course_has_default(&self, course_id: i64) -> anyhow::Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM course_series
                 WHERE course_id = ? AND instance_id = ? AND is_default = 1",
                (course_id, self.instance_id),
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Link the series to the course; the first link becomes the default.
    fn link_course(&self, course_id: i64, series_id: &str) -> anyhow::Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT is_default FROM course_series
                 WHERE course_id = ? AND instance_id = ? AND series_id = ?",
                (course_id, self.instance_id, series_id),
                |r| r.get(0),
            )
            .optional()?;
        if let Some(flag) = existing {
            return Ok(flag);
        }
        let is_default = i64::from(!self.course_has_default(course_id)?);
        self.conn.execute(
            "INSERT INTO course_series(course_id, instance_id, series_id, is_default)
             VALUES(?, ?, ?, ?)",
            (course_id, self.instance_id, series_id, is_default),
        )?;
        Ok(is_default)
    }

    fn write_metadata(&self, series_id: &str, metadata: &[MetadataEntry]) -> anyhow::Result<()> {
        for entry in metadata {
            self.conn.execute(
                "INSERT INTO series_metadata(instance_id, series_id, field, value_json)
                 VALUES(?, ?, ?, ?)
                 ON CONFLICT(instance_id, series_id, field)
                 DO UPDATE SET value_json = excluded.value_json",
                (self.instance_id, series_id, &entry.id, entry.value.to_string()),
            )?;
        }
        Ok(())
    }
}

fn title_from(metadata: &[MetadataEntry]) -> Option<String> {
    metadata
        .iter()
        .find(|m| m.id == crate::form::FIELD_TITLE)
        .and_then(|m| m.value.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl SeriesBridge for SqliteBridge<'_> {
    fn create_course_series(
        &self,
        course_id: i64,
        metadata: &[MetadataEntry],
        user_id: i64,
    ) -> anyhow::Result<CreatedSeries> {
        let title = title_from(metadata).context("series metadata has no title")?;
        let identifier = uuid::Uuid::new_v4().to_string();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO series(identifier, instance_id, title, created_by, created_at)
             VALUES(?, ?, ?, ?, ?)",
            (
                &identifier,
                self.instance_id,
                &title,
                user_id,
                chrono::Utc::now().to_rfc3339(),
            ),
        )?;
        self.write_metadata(&identifier, metadata)?;
        let isdefault = self.link_course(course_id, &identifier)?;
        tx.commit()?;

        Ok(CreatedSeries {
            seriestitle: title,
            series: identifier,
            isdefault,
        })
    }

    fn update_series_metadata(
        &self,
        series_id: &str,
        metadata: &[MetadataEntry],
    ) -> anyhow::Result<bool> {
        if self.get_series_by_identifier(series_id)?.is_none() {
            return Ok(false);
        }
        let tx = self.conn.unchecked_transaction()?;
        self.write_metadata(series_id, metadata)?;
        if let Some(title) = title_from(metadata) {
            tx.execute(
                "UPDATE series SET title = ? WHERE instance_id = ? AND identifier = ?",
                (&title, self.instance_id, series_id),
            )?;
        }
        tx.commit()?;
        Ok(true)
    }

    fn get_multiple_series_by_identifier(
        &self,
        ids: &[String],
    ) -> anyhow::Result<Vec<SeriesRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT identifier, title FROM series
             WHERE instance_id = ? AND identifier IN ({placeholders})
             ORDER BY identifier"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut bind: Vec<rusqlite::types::Value> = Vec::with_capacity(ids.len() + 1);
        bind.push(self.instance_id.into());
        bind.extend(ids.iter().map(|s| rusqlite::types::Value::Text(s.clone())));
        let rows = stmt
            .query_map(params_from_iter(bind), |r| {
                Ok(SeriesRecord {
                    identifier: r.get(0)?,
                    title: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_series_by_identifier(&self, id: &str) -> anyhow::Result<Option<SeriesRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT identifier, title FROM series WHERE instance_id = ? AND identifier = ?",
                (self.instance_id, id),
                |r| {
                    Ok(SeriesRecord {
                        identifier: r.get(0)?,
                        title: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn get_series_metadata(&self, id: &str) -> anyhow::Result<Option<Vec<MetadataEntry>>> {
        let Some(record) = self.get_series_by_identifier(id)? else {
            return Ok(None);
        };
        let mut stmt = self.conn.prepare(
            "SELECT field, value_json FROM series_metadata
             WHERE instance_id = ? AND series_id = ?
             ORDER BY rowid",
        )?;
        let raw = stmt
            .query_map((self.instance_id, id), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(raw.len() + 1);
        for (field, value_json) in raw {
            let value = serde_json::from_str(&value_json)
                .with_context(|| format!("corrupt metadata {field} for series {id}"))?;
            entries.push(MetadataEntry { id: field, value });
        }
        if !entries.iter().any(|e| e.id == crate::form::FIELD_TITLE) {
            entries.insert(
                0,
                MetadataEntry {
                    id: crate::form::FIELD_TITLE.to_string(),
                    value: serde_json::Value::String(record.title),
                },
            );
        }
        Ok(Some(entries))
    }

    fn import_series_to_course_with_acl_change(
        &self,
        course_id: i64,
        series_id: &str,
        user_id: i64,
    ) -> anyhow::Result<ImportOutcome> {
        if self.get_series_by_identifier(series_id)?.is_none() {
            return Ok(ImportOutcome {
                error: true,
                isdefault: 0,
            });
        }
        let tx = self.conn.unchecked_transaction()?;
        for (role, action) in COURSE_ACL {
            tx.execute(
                "INSERT OR IGNORE INTO series_acl(instance_id, series_id, course_id, role, action, granted_by)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (self.instance_id, series_id, course_id, role, action, user_id),
            )?;
        }
        let isdefault = self.link_course(course_id, series_id)?;
        tx.commit()?;
        Ok(ImportOutcome {
            error: false,
            isdefault,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    fn meta(title: &str) -> Vec<MetadataEntry> {
        vec![
            MetadataEntry {
                id: "title".into(),
                value: json!(title),
            },
            MetadataEntry {
                id: "subjects".into(),
                value: json!(["a", "b"]),
            },
        ]
    }

    #[test]
    fn first_created_series_becomes_default() {
        let conn = db::open_in_memory().expect("db");
        let (course, _) = db::create_course(&conn, "C").expect("course");
        let bridge = SqliteBridge::new(&conn, 1);

        let first = bridge.create_course_series(course, &meta("One"), 2).expect("create");
        let second = bridge.create_course_series(course, &meta("Two"), 2).expect("create");
        assert_eq!(first.isdefault, 1);
        assert_eq!(second.isdefault, 0);
        assert_eq!(second.seriestitle, "Two");
        assert_eq!(
            db::course_series_list(&conn, course, 1).expect("list"),
            vec![(first.series, 1), (second.series, 0)]
        );
    }

    #[test]
    fn create_without_title_fails() {
        let conn = db::open_in_memory().expect("db");
        let (course, _) = db::create_course(&conn, "C").expect("course");
        let bridge = SqliteBridge::new(&conn, 1);
        assert!(bridge.create_course_series(course, &[], 2).is_err());
    }

    #[test]
    fn lookups_are_scoped_to_instance() {
        let conn = db::open_in_memory().expect("db");
        let (course, _) = db::create_course(&conn, "C").expect("course");
        let created = SqliteBridge::new(&conn, 1)
            .create_course_series(course, &meta("Scoped"), 2)
            .expect("create");

        let other = SqliteBridge::new(&conn, 2);
        assert!(other
            .get_series_by_identifier(&created.series)
            .expect("lookup")
            .is_none());

        let same = SqliteBridge::new(&conn, 1);
        let found = same
            .get_multiple_series_by_identifier(&[created.series.clone(), "missing".into()])
            .expect("batch");
        assert_eq!(
            found,
            vec![SeriesRecord {
                identifier: created.series,
                title: "Scoped".into()
            }]
        );
    }

    #[test]
    fn update_rewrites_title_and_metadata() {
        let conn = db::open_in_memory().expect("db");
        let (course, _) = db::create_course(&conn, "C").expect("course");
        let bridge = SqliteBridge::new(&conn, 1);
        let created = bridge.create_course_series(course, &meta("Old"), 2).expect("create");

        assert!(bridge
            .update_series_metadata(&created.series, &meta("New"))
            .expect("update"));
        assert!(!bridge.update_series_metadata("nope", &meta("X")).expect("update"));

        let metadata = bridge
            .get_series_metadata(&created.series)
            .expect("metadata")
            .expect("exists");
        assert_eq!(metadata[0].value, json!("New"));
        assert_eq!(
            bridge
                .get_series_by_identifier(&created.series)
                .expect("lookup")
                .map(|r| r.title),
            Some("New".to_string())
        );
    }

    #[test]
    fn import_writes_acl_and_links_course() {
        let conn = db::open_in_memory().expect("db");
        let (owner, _) = db::create_course(&conn, "Owner").expect("course");
        let (target, _) = db::create_course(&conn, "Target").expect("course");
        let bridge = SqliteBridge::new(&conn, 1);
        let created = bridge.create_course_series(owner, &meta("Shared"), 2).expect("create");

        let outcome = bridge
            .import_series_to_course_with_acl_change(target, &created.series, 3)
            .expect("import");
        assert_eq!(
            outcome,
            ImportOutcome {
                error: false,
                isdefault: 1
            }
        );
        let acl_rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM series_acl WHERE course_id = ? AND series_id = ?",
                (target, &created.series),
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(acl_rows, COURSE_ACL.len() as i64);

        let missing = bridge
            .import_series_to_course_with_acl_change(target, "unknown", 3)
            .expect("import");
        assert!(missing.error);
    }
}

//! Generic JSON record storage.
//!
//! Every resource (messages, job offers, matches, ...) lives in the single
//! `records` table as a JSON body. Queries are evaluated in process with the
//! shared [`Query`] model, which keeps the local backend faithful to the
//! remote filter semantics without a per-resource schema.

use chrono::{SecondsFormat, Utc};
use rusqlite::params;
use serde_json::{Map, Value};
use uuid::Uuid;

use talento_shared::constants::{RESOURCE_FAVORITES, RESOURCE_MATCHES};
use talento_shared::{Predicate, Query, Record};

use crate::database::Database;
use crate::error::{Result, StoreError};

/// Natural key of a resource: a second insert with the same values for all
/// of these fields is a conflict.
fn unique_fields(resource: &str) -> &'static [&'static str] {
    match resource {
        RESOURCE_MATCHES => &["candidate_id", "job_offer_id"],
        RESOURCE_FAVORITES => &["recruiter_id", "candidate_id"],
        _ => &[],
    }
}

/// Timestamp format used for generated `created_at` values. Fixed precision
/// keeps lexical and chronological order identical.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    /// Insert a record, generating `id` and `created_at` when absent.
    pub fn insert_record(&self, resource: &str, record: Record) -> Result<Record> {
        let Value::Object(mut body) = record else {
            return Err(StoreError::InvalidRecord(format!(
                "{resource}: record must be a JSON object"
            )));
        };

        let id = match body.get("id") {
            None | Some(Value::Null) => {
                let id = Uuid::new_v4().to_string();
                body.insert("id".into(), Value::String(id.clone()));
                id
            }
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(other) => {
                return Err(StoreError::InvalidRecord(format!(
                    "{resource}: id must be a non-empty string, got {other}"
                )))
            }
        };

        let created_at = match body.get("created_at") {
            Some(Value::String(ts)) => ts.clone(),
            _ => {
                let ts = timestamp_now();
                body.insert("created_at".into(), Value::String(ts.clone()));
                ts
            }
        };

        let unique_key = natural_key(resource, &body);
        let json = serde_json::to_string(&body)?;

        self.conn()
            .execute(
                "INSERT INTO records (resource, id, body, created_at, unique_key)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![resource, id, json, created_at, unique_key],
            )
            .map_err(|e| StoreError::from_write(e, resource))?;

        tracing::debug!(resource, id = %id, "record inserted");

        Ok(Value::Object(body))
    }

    /// Evaluate `query` against the stored records of its resource.
    pub fn query_records(&self, query: &Query) -> Result<Vec<Record>> {
        let mut records: Vec<Record> = self
            .load_resource(&query.resource)?
            .into_iter()
            .map(|(_, body)| body)
            .filter(|body| query.matches(body))
            .collect();

        // Stable: records equal under the query order keep insertion order.
        records.sort_by(|a, b| query.compare(a, b));

        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Merge `patch` into every record of `resource` matching `predicate`.
    /// The `id` field is never overwritten.
    pub fn update_records(
        &self,
        resource: &str,
        predicate: &Predicate,
        patch: &Record,
    ) -> Result<Vec<Record>> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidRecord(format!(
                "{resource}: patch must be a JSON object"
            )));
        };

        let tx = self.conn().unchecked_transaction()?;
        let mut updated = Vec::new();

        for (id, body) in self.load_resource(resource)? {
            if !predicate.matches(&body) {
                continue;
            }
            let Value::Object(mut fields) = body else {
                continue;
            };
            merge(&mut fields, patch);

            let json = serde_json::to_string(&fields)?;
            tx.execute(
                "UPDATE records SET body = ?1, unique_key = ?2 WHERE resource = ?3 AND id = ?4",
                params![json, natural_key(resource, &fields), resource, id],
            )
            .map_err(|e| StoreError::from_write(e, resource))?;

            updated.push(Value::Object(fields));
        }

        tx.commit()?;

        tracing::debug!(resource, count = updated.len(), "records updated");
        Ok(updated)
    }

    /// Fetch a single record by id.
    pub fn get_record(&self, resource: &str, id: &str) -> Result<Record> {
        let json: String = self
            .conn()
            .query_row(
                "SELECT body FROM records WHERE resource = ?1 AND id = ?2",
                params![resource, id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn load_resource(&self, resource: &str) -> Result<Vec<(String, Record)>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, body FROM records
             WHERE resource = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![resource], |row| {
            let id: String = row.get(0)?;
            let body: String = row.get(1)?;
            Ok((id, body))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, body) = row?;
            out.push((id, serde_json::from_str(&body)?));
        }
        Ok(out)
    }
}

fn merge(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        if key != "id" {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn natural_key(resource: &str, body: &Map<String, Value>) -> Option<String> {
    let fields = unique_fields(resource);
    if fields.is_empty() {
        return None;
    }
    let parts: Option<Vec<String>> = fields
        .iter()
        .map(|f| body.get(*f).filter(|v| !v.is_null()).map(Value::to_string))
        .collect();
    parts.map(|p| p.join("\u{1f}"))
}

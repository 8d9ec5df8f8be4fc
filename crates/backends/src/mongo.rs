//! MongoDB implementation of the document contract
//!
//! Uses the driver's blocking API, matching the single-writer flush path.
//! Upserts are replace-one keyed on the decided unique field; documents
//! without a usable key are plain-inserted. Semantic scalars (datetime,
//! uuid, ip) are stored in their canonical string forms and re-detected on
//! read, so the stored documents stay plain JSON-shaped.

use crate::document::DocumentBackend;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, Credential, IndexOptions, ReplaceOptions, ServerAddress};
use mongodb::sync::{Client, Database};
use mongodb::IndexModel;
use morph_core::{DeadlineConfig, DocumentConfig, Error, FieldValue, Record, Result};
use tracing::debug;

/// Document client backed by a MongoDB database handle.
pub struct MongoBackend {
    db: Database,
}

fn doc_err(e: mongodb::error::Error) -> Error {
    Error::Document(e.to_string())
}

fn to_bson(value: &FieldValue) -> Bson {
    match value {
        FieldValue::Null => Bson::Null,
        FieldValue::Bool(b) => Bson::Boolean(*b),
        FieldValue::Int(i) => Bson::Int64(*i),
        FieldValue::Float(f) => Bson::Double(*f),
        FieldValue::Str(s) => Bson::String(s.clone()),
        FieldValue::DateTime(dt) => Bson::String(
            dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        ),
        FieldValue::Uuid(u) => Bson::String(u.to_string()),
        FieldValue::Ip(ip) => Bson::String(ip.to_string()),
        FieldValue::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
        FieldValue::Object(entries) => Bson::Document(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_bson(v)))
                .collect(),
        ),
    }
}

fn from_bson(value: Bson) -> FieldValue {
    match value {
        Bson::Null | Bson::Undefined => FieldValue::Null,
        Bson::Boolean(b) => FieldValue::Bool(b),
        Bson::Int32(i) => FieldValue::Int(i as i64),
        Bson::Int64(i) => FieldValue::Int(i),
        Bson::Double(d) => FieldValue::Float(d),
        Bson::String(s) => FieldValue::Str(s),
        Bson::Array(items) => FieldValue::Array(items.into_iter().map(from_bson).collect()),
        Bson::Document(entries) => FieldValue::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, from_bson(v)))
                .collect(),
        ),
        Bson::DateTime(dt) => chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
            .map(FieldValue::DateTime)
            .unwrap_or(FieldValue::Null),
        Bson::ObjectId(oid) => FieldValue::Str(oid.to_hex()),
        other => FieldValue::Str(other.to_string()),
    }
}

fn record_to_document(record: &Record) -> Document {
    record
        .iter()
        .map(|(k, v)| (k.clone(), to_bson(v)))
        .collect()
}

fn document_to_record(document: Document) -> Record {
    document
        .into_iter()
        .filter(|(k, _)| k != "_id")
        .map(|(k, v)| (k, from_bson(v).restore_tags()))
        .collect()
}

fn link_filter(link: &[(String, FieldValue)]) -> Document {
    link.iter()
        .map(|(name, value)| (name.clone(), to_bson(value)))
        .collect()
}

impl MongoBackend {
    /// Connect using the configured host/credentials; the document deadline
    /// bounds both connection establishment and server selection.
    pub fn connect(config: &DocumentConfig, deadlines: &DeadlineConfig) -> Result<Self> {
        let timeout = deadlines.document_timeout();
        let credential = match (&config.user, &config.password) {
            (Some(user), password) => Some(
                Credential::builder()
                    .username(user.clone())
                    .password(password.clone())
                    .build(),
            ),
            _ => None,
        };
        let mut options = ClientOptions::builder()
            .hosts(vec![ServerAddress::Tcp {
                host: config.host.clone(),
                port: Some(config.port),
            }])
            .connect_timeout(timeout)
            .server_selection_timeout(timeout)
            .build();
        options.credential = credential;

        let client = Client::with_options(options).map_err(doc_err)?;
        Ok(MongoBackend {
            db: client.database(&config.database),
        })
    }

    fn collection(&self, name: &str) -> mongodb::sync::Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

impl DocumentBackend for MongoBackend {
    fn ensure_unique_index(&mut self, collection: &str, field: &str) -> Result<()> {
        let coll = self.collection(collection);
        let index_name = format!("uniq_{field}");
        let existing = coll.list_index_names().map_err(doc_err)?;
        if existing.iter().any(|name| name == &index_name) {
            return Ok(());
        }

        let mut keys = Document::new();
        keys.insert(field, 1i32);
        let model = IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name(index_name)
                    .build(),
            )
            .build();
        coll.create_index(model, None).map_err(doc_err)?;
        Ok(())
    }

    fn batch_upsert(
        &mut self,
        collection: &str,
        docs: &[Record],
        key_field: Option<&str>,
    ) -> Result<()> {
        let coll = self.collection(collection);
        debug!(collection, docs = docs.len(), "document batch upsert");

        for record in docs {
            let document = record_to_document(record);
            let key = key_field.and_then(|k| {
                document
                    .get(k)
                    .filter(|v| !matches!(v, Bson::Null))
                    .map(|v| (k, v.clone()))
            });
            match key {
                Some((field, value)) => {
                    let mut filter = Document::new();
                    filter.insert(field, value);
                    coll.replace_one(
                        filter,
                        document,
                        ReplaceOptions::builder().upsert(true).build(),
                    )
                    .map_err(doc_err)?;
                }
                // No usable key: plain insert, may duplicate
                None => {
                    coll.insert_one(document, None).map_err(doc_err)?;
                }
            }
        }
        Ok(())
    }

    fn find_docs_with_field(&mut self, collection: &str, field: &str) -> Result<Vec<Record>> {
        let mut filter = Document::new();
        filter.insert(field, doc! { "$exists": true });
        let cursor = self
            .collection(collection)
            .find(filter, None)
            .map_err(doc_err)?;

        let mut records = Vec::new();
        for result in cursor {
            records.push(document_to_record(result.map_err(doc_err)?));
        }
        Ok(records)
    }

    fn set_field_by_link(
        &mut self,
        collection: &str,
        link: &[(String, FieldValue)],
        field: &str,
        value: &FieldValue,
    ) -> Result<()> {
        if link.is_empty() {
            return Ok(());
        }
        let mut assignments = Document::new();
        assignments.insert(field, to_bson(value));
        self.collection(collection)
            .update_many(link_filter(link), doc! { "$set": assignments }, None)
            .map_err(doc_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morph_core::value::parse_datetime;

    #[test]
    fn test_bson_round_trip_structural() {
        let mut record = Record::new();
        record.insert("name".to_string(), FieldValue::Str("alice".into()));
        record.insert("age".to_string(), FieldValue::Int(30));
        record.insert(
            "tags".to_string(),
            FieldValue::Array(vec![FieldValue::Str("a".into())]),
        );

        let document = record_to_document(&record);
        let back = document_to_record(document);
        assert_eq!(back, record);
    }

    #[test]
    fn test_datetime_stored_as_string_and_restored() {
        let dt = parse_datetime("2024-03-01T10:00:00Z").unwrap();
        let mut record = Record::new();
        record.insert("when".to_string(), FieldValue::DateTime(dt));

        let document = record_to_document(&record);
        assert!(matches!(document.get("when"), Some(Bson::String(_))));

        let back = document_to_record(document);
        assert_eq!(back.get("when"), Some(&FieldValue::DateTime(dt)));
    }

    #[test]
    fn test_object_id_dropped_from_records() {
        let mut document = Document::new();
        document.insert("_id", mongodb::bson::oid::ObjectId::new());
        document.insert("x", 1i64);

        let record = document_to_record(document);
        assert!(!record.contains_key("_id"));
        assert_eq!(record.get("x"), Some(&FieldValue::Int(1)));
    }

    #[test]
    fn test_link_filter_shape() {
        let filter = link_filter(&[
            ("username".to_string(), FieldValue::Str("alice".into())),
            (
                "sys_ingested_at".to_string(),
                FieldValue::DateTime(parse_datetime("2024-03-01T10:00:00Z").unwrap()),
            ),
        ]);
        assert_eq!(filter.get_str("username").unwrap(), "alice");
        assert_eq!(
            filter.get_str("sys_ingested_at").unwrap(),
            "2024-03-01T10:00:00.000Z"
        );
    }
}

//! MySQL implementation of the relational contract
//!
//! Owns a connection pool and renders the MySQL dialect: `CREATE TABLE`,
//! `ALTER TABLE ADD/MODIFY/DROP COLUMN`, `INFORMATION_SCHEMA.COLUMNS` for
//! schema listing, and multi-row `INSERT ... ON DUPLICATE KEY UPDATE` for
//! idempotent batch upserts. The configured operation deadlines are applied
//! as socket read/write timeouts, so a hung server fails the flush instead
//! of wedging it.
//!
//! The pool is used only from the flush path; connections are not shared
//! across producer threads.

use crate::relational::{ColumnInfo, ColumnKey, ColumnSpec, RelationalBackend, SqlRow};
use morph_core::{
    ColumnType, DeadlineConfig, Error, FieldValue, RelationalConfig, Result,
};
use mysql::prelude::Queryable;
use mysql::{Opts, OptsBuilder, Params, Pool, PooledConn};
use tracing::{debug, warn};

/// Relational client backed by a MySQL connection pool.
pub struct MySqlBackend {
    pool: Pool,
    database: String,
}

fn rel_err(e: mysql::Error) -> Error {
    Error::Relational(e.to_string())
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', ""))
}

fn column_definition(spec: &ColumnSpec) -> String {
    let mut def = format!(
        "{} {} {}",
        quote_ident(&spec.name),
        spec.column_type,
        if spec.nullable { "NULL" } else { "NOT NULL" }
    );
    if spec.unique {
        def.push_str(" UNIQUE");
    }
    def
}

fn to_sql_value(value: Option<&FieldValue>) -> mysql::Value {
    match value {
        None | Some(FieldValue::Null) => mysql::Value::NULL,
        Some(FieldValue::Bool(b)) => mysql::Value::from(*b),
        Some(FieldValue::Int(i)) => mysql::Value::from(*i),
        Some(FieldValue::Float(f)) => mysql::Value::from(*f),
        Some(FieldValue::Str(s)) => mysql::Value::from(s.as_str()),
        Some(FieldValue::DateTime(dt)) => {
            mysql::Value::from(dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        }
        Some(FieldValue::Uuid(u)) => mysql::Value::from(u.to_string()),
        Some(FieldValue::Ip(ip)) => mysql::Value::from(ip.to_string()),
        // Nested values are not decided onto the relational side, but a
        // TEXT rendering keeps the statement well-formed if one slips in
        Some(other) => mysql::Value::from(other.canonical_string()),
    }
}

fn from_sql_value(value: mysql::Value) -> FieldValue {
    match value {
        mysql::Value::NULL => FieldValue::Null,
        mysql::Value::Int(i) => FieldValue::Int(i),
        mysql::Value::UInt(u) => FieldValue::Int(u as i64),
        mysql::Value::Float(f) => FieldValue::Float(f as f64),
        mysql::Value::Double(d) => FieldValue::Float(d),
        mysql::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            // Re-detect semantic scalars (uuid, ip, datetime) from the text
            Ok(s) => FieldValue::Str(s).restore_tags(),
            Err(_) => FieldValue::Null,
        },
        mysql::Value::Date(y, mo, d, h, mi, s, us) => {
            match chrono::NaiveDate::from_ymd_opt(y as i32, mo as u32, d as u32)
                .and_then(|date| date.and_hms_micro_opt(h as u32, mi as u32, s as u32, us))
            {
                Some(naive) => {
                    FieldValue::DateTime(chrono::DateTime::from_naive_utc_and_offset(
                        naive,
                        chrono::Utc,
                    ))
                }
                None => FieldValue::Null,
            }
        }
        mysql::Value::Time(..) => FieldValue::Null,
    }
}

impl MySqlBackend {
    /// Connect a pool using the configured host/credentials and apply the
    /// operation deadlines as socket timeouts.
    pub fn connect(config: &RelationalConfig, deadlines: &DeadlineConfig) -> Result<Self> {
        let timeout = deadlines.relational_timeout();
        let opts: Opts = OptsBuilder::new()
            .ip_or_hostname(Some(config.host.clone()))
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()))
            .read_timeout(Some(timeout))
            .write_timeout(Some(timeout))
            .into();
        let pool = Pool::new(opts).map_err(rel_err)?;
        Ok(MySqlBackend {
            pool,
            database: config.database.clone(),
        })
    }

    fn conn(&self) -> Result<PooledConn> {
        self.pool.get_conn().map_err(rel_err)
    }

    fn execute(&self, ddl: &str) -> Result<()> {
        debug!(ddl, "executing DDL");
        self.conn()?.query_drop(ddl).map_err(rel_err)
    }
}

impl RelationalBackend for MySqlBackend {
    fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, String, String)> = self
            .conn()?
            .exec(
                "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_KEY \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
                (self.database.as_str(), table),
            )
            .map_err(rel_err)?;

        let mut columns = Vec::with_capacity(rows.len());
        for (name, raw_type, is_nullable, key) in rows {
            let column_type = match raw_type.parse::<ColumnType>() {
                Ok(ct) => ct,
                Err(e) => {
                    // Leave unmodeled columns alone; they are never dropped
                    warn!(column = %name, error = %e, "skipping unmodeled column type");
                    continue;
                }
            };
            columns.push(ColumnInfo {
                name,
                column_type,
                nullable: is_nullable.eq_ignore_ascii_case("yes"),
                key: match key.as_str() {
                    "PRI" => ColumnKey::Primary,
                    "UNI" => ColumnKey::Unique,
                    _ => ColumnKey::None,
                },
            });
        }
        Ok(columns)
    }

    fn create_table(
        &mut self,
        table: &str,
        columns: &[ColumnSpec],
        primary_key: Option<&str>,
    ) -> Result<()> {
        let mut parts: Vec<String> = columns.iter().map(column_definition).collect();
        if let Some(pk) = primary_key {
            parts.push(format!("PRIMARY KEY ({})", quote_ident(pk)));
        }
        self.execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            parts.join(", ")
        ))
    }

    fn add_column(&mut self, table: &str, column: &ColumnSpec) -> Result<()> {
        self.execute(&format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            column_definition(column)
        ))
    }

    fn modify_column(
        &mut self,
        table: &str,
        name: &str,
        new_type: ColumnType,
        nullable: bool,
    ) -> Result<()> {
        self.execute(&format!(
            "ALTER TABLE {} MODIFY COLUMN {} {} {}",
            quote_ident(table),
            quote_ident(name),
            new_type,
            if nullable { "NULL" } else { "NOT NULL" }
        ))
    }

    fn drop_column(&mut self, table: &str, name: &str) -> Result<()> {
        self.execute(&format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(table),
            quote_ident(name)
        ))
    }

    fn batch_upsert(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[SqlRow],
        primary_key: Option<&str>,
    ) -> Result<()> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(());
        }

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
        let values_clause = vec![row_placeholders; rows.len()].join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(table),
            column_list,
            values_clause
        );
        if let Some(pk) = primary_key {
            let updates = columns
                .iter()
                .filter(|c| c.as_str() != pk)
                .map(|c| format!("{0} = VALUES({0})", quote_ident(c)))
                .collect::<Vec<_>>();
            let updates = if updates.is_empty() {
                // Degenerate single-column table: a self-assignment keeps
                // the statement an idempotent no-op on duplicates
                format!("{0} = {0}", quote_ident(pk))
            } else {
                updates.join(", ")
            };
            sql.push_str(&format!(" ON DUPLICATE KEY UPDATE {updates}"));
        }

        let mut params = Vec::with_capacity(columns.len() * rows.len());
        for row in rows {
            for column in columns {
                params.push(to_sql_value(row.get(column)));
            }
        }

        debug!(table, rows = rows.len(), "relational batch upsert");
        self.conn()?
            .exec_drop(sql, Params::Positional(params))
            .map_err(rel_err)
    }

    fn fetch_rows(&mut self, table: &str, columns: &[String]) -> Result<Vec<SqlRow>> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let rows: Vec<mysql::Row> = self
            .conn()?
            .query(format!(
                "SELECT {} FROM {}",
                column_list,
                quote_ident(table)
            ))
            .map_err(rel_err)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        let value = row
                            .as_ref(i)
                            .cloned()
                            .unwrap_or(mysql::Value::NULL);
                        (name.clone(), from_sql_value(value))
                    })
                    .collect()
            })
            .collect())
    }

    fn update_by_link(
        &mut self,
        table: &str,
        column: &str,
        value: &FieldValue,
        link: &[(String, FieldValue)],
    ) -> Result<()> {
        if link.is_empty() {
            return Ok(());
        }
        let where_clause = link
            .iter()
            .map(|(name, _)| format!("{} = ?", quote_ident(name)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {}",
            quote_ident(table),
            quote_ident(column),
            where_clause
        );

        let mut params = vec![to_sql_value(Some(value))];
        params.extend(link.iter().map(|(_, v)| to_sql_value(Some(v))));
        self.conn()?
            .exec_drop(sql, Params::Positional(params))
            .map_err(rel_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_strips_backticks() {
        assert_eq!(quote_ident("age"), "`age`");
        assert_eq!(quote_ident("we`ird"), "`weird`");
    }

    #[test]
    fn test_column_definition_rendering() {
        let spec = ColumnSpec {
            name: "username".into(),
            column_type: ColumnType::VarChar(255),
            nullable: false,
            unique: true,
        };
        assert_eq!(
            column_definition(&spec),
            "`username` VARCHAR(255) NOT NULL UNIQUE"
        );
    }

    #[test]
    fn test_sql_value_conversions() {
        assert_eq!(to_sql_value(None), mysql::Value::NULL);
        assert_eq!(
            to_sql_value(Some(&FieldValue::Int(5))),
            mysql::Value::Int(5)
        );
        assert_eq!(
            to_sql_value(Some(&FieldValue::Null)),
            mysql::Value::NULL
        );
        match to_sql_value(Some(&FieldValue::Bool(true))) {
            mysql::Value::Int(1) => {}
            other => panic!("unexpected bool encoding: {other:?}"),
        }
    }

    #[test]
    fn test_from_sql_value_restores_tags() {
        let value = from_sql_value(mysql::Value::Bytes(b"10.0.0.1".to_vec()));
        assert!(matches!(value, FieldValue::Ip(_)));
        let value = from_sql_value(mysql::Value::Bytes(b"plain".to_vec()));
        assert_eq!(value, FieldValue::Str("plain".into()));
    }
}

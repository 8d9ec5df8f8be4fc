//! Relational column types and the widening order
//!
//! Column types are modeled as a closed enum rather than raw SQL strings so
//! the reconciler can compare live table columns against decisions without
//! string games. `Display` produces the MySQL spelling used in DDL;
//! `FromStr` accepts the forms reported by `INFORMATION_SCHEMA.COLUMNS`
//! (including display widths like `bigint(20)` and `tinyint(1)`).
//!
//! ## Widening contract
//!
//! Scalars widen along `BOOLEAN < BIGINT < DOUBLE < TEXT`; string lengths
//! widen `CHAR(n)`/`VARCHAR(n)` toward longer `VARCHAR` and finally `TEXT`.
//! Any other change is not a widening and is never attempted. A column, once
//! widened, is never narrowed.

use crate::value::DetectedType;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Relational column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// `BOOLEAN` (reported by MySQL as `tinyint(1)`)
    Boolean,
    /// `BIGINT`
    BigInt,
    /// `DOUBLE`
    Double,
    /// `VARCHAR(n)`
    VarChar(u16),
    /// `CHAR(n)`
    Char(u16),
    /// `DATETIME`
    DateTime,
    /// `TEXT`
    Text,
}

/// Error returned when an `INFORMATION_SCHEMA` type string is unrecognized.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized column type: {0}")]
pub struct ParseColumnTypeError(
    /// The unrecognized input
    pub String,
);

impl ColumnType {
    /// Map a dominant detected type to its relational column type.
    ///
    /// Nested and null dominants fall back to `TEXT`.
    pub fn for_detected(detected: DetectedType) -> ColumnType {
        match detected {
            DetectedType::Int => ColumnType::BigInt,
            DetectedType::Float => ColumnType::Double,
            DetectedType::Bool => ColumnType::Boolean,
            DetectedType::Str => ColumnType::VarChar(255),
            DetectedType::Ip => ColumnType::VarChar(45),
            DetectedType::Uuid => ColumnType::Char(36),
            DetectedType::DateTime => ColumnType::DateTime,
            DetectedType::Array | DetectedType::Object | DetectedType::Null => ColumnType::Text,
        }
    }

    /// Whether altering a column from `self` to `target` is a legal widening.
    ///
    /// Returns false for identical types and for any change outside the
    /// widening order (those are schema conflicts, not widenings).
    pub fn widens_to(&self, target: ColumnType) -> bool {
        use ColumnType::*;
        match (*self, target) {
            (a, b) if a == b => false,
            (Boolean, BigInt) | (Boolean, Double) | (Boolean, Text) => true,
            (BigInt, Double) | (BigInt, Text) => true,
            (Double, Text) => true,
            (VarChar(a), VarChar(b)) => b > a,
            (Char(a), VarChar(b)) => b > a,
            (VarChar(_), Text) | (Char(_), Text) => true,
            _ => false,
        }
    }

    /// Whether a live column of type `live` satisfies this decided type:
    /// equal, or strictly wider per the widening order.
    pub fn satisfied_by(&self, live: ColumnType) -> bool {
        *self == live || self.widens_to(live)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Boolean => write!(f, "BOOLEAN"),
            ColumnType::BigInt => write!(f, "BIGINT"),
            ColumnType::Double => write!(f, "DOUBLE"),
            ColumnType::VarChar(n) => write!(f, "VARCHAR({n})"),
            ColumnType::Char(n) => write!(f, "CHAR({n})"),
            ColumnType::DateTime => write!(f, "DATETIME"),
            ColumnType::Text => write!(f, "TEXT"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = ParseColumnTypeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lower = raw.trim().to_ascii_lowercase();
        let (base, width) = match lower.find('(') {
            Some(open) => {
                let close = lower
                    .rfind(')')
                    .ok_or_else(|| ParseColumnTypeError(raw.to_string()))?;
                let digits = &lower[open + 1..close];
                let width = digits
                    .split(',')
                    .next()
                    .and_then(|d| d.trim().parse::<u16>().ok());
                (&lower[..open], width)
            }
            None => (lower.as_str(), None),
        };

        match base {
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            // MySQL reports BOOLEAN as tinyint(1); wider tinyints are ints
            "tinyint" if width == Some(1) => Ok(ColumnType::Boolean),
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" => {
                Ok(ColumnType::BigInt)
            }
            "double" | "float" | "real" | "decimal" => Ok(ColumnType::Double),
            "varchar" => Ok(ColumnType::VarChar(
                width.ok_or_else(|| ParseColumnTypeError(raw.to_string()))?,
            )),
            "char" => Ok(ColumnType::Char(
                width.ok_or_else(|| ParseColumnTypeError(raw.to_string()))?,
            )),
            "datetime" | "timestamp" => Ok(ColumnType::DateTime),
            "text" | "tinytext" | "mediumtext" | "longtext" => Ok(ColumnType::Text),
            _ => Err(ParseColumnTypeError(raw.to_string())),
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

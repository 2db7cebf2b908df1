//! Resolves whether a model reply holds a list of plants or a single plant.

use serde_json::Value;

use crate::plant::PlantRecord;

/// Decoded shape of a model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Many(Vec<PlantRecord>),
    One(PlantRecord),
    Unrecognized(String),
}

impl ModelReply {
    /// Tries the array form first and falls back to a single flat object.
    pub fn decode(raw: &str) -> Self {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => return Self::Unrecognized(format!("invalid json: {err}")),
        };

        if value.is_array() {
            return match serde_json::from_value::<Vec<PlantRecord>>(value) {
                Ok(records) => Self::Many(records),
                Err(err) => Self::Unrecognized(format!("invalid record array: {err}")),
            };
        }
        if !value.is_object() {
            return Self::Unrecognized("reply is neither an array nor an object".to_string());
        }

        match serde_json::from_value::<PlantRecord>(value) {
            Ok(record) => Self::One(record),
            Err(err) => Self::Unrecognized(format!("invalid record object: {err}")),
        }
    }

    /// Flattens the reply. An unrecognized reply has no records.
    pub fn into_records(self) -> Vec<PlantRecord> {
        match self {
            Self::Many(records) => records,
            Self::One(record) => vec![record],
            Self::Unrecognized(_) => Vec::new(),
        }
    }
}

/// Decodes raw model text and compacts each record's category.
pub fn normalize(raw: &str) -> ModelReply {
    match ModelReply::decode(raw) {
        ModelReply::Many(mut records) => {
            records.iter_mut().for_each(PlantRecord::compact_category);
            ModelReply::Many(records)
        }
        ModelReply::One(mut record) => {
            record.compact_category();
            ModelReply::One(record)
        }
        unrecognized => unrecognized,
    }
}

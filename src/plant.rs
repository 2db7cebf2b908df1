//! Plant record model shared by acquisition, the catalog, and the HTTP API.
//!
//! Field names on the wire match the `plants.json` layout so catalog files
//! written by earlier deployments keep loading unchanged.

use serde::{Deserialize, Deserializer, Serialize};

use crate::classifier::{
    self, deserialize_lenient_class, CategoryClass, LightClass, ToxicityClass,
};

/// One species entry.
///
/// Descriptive fields are free text produced by the language model. The
/// `*_class` fields are only ever set by [`PlantRecord::classify`] when a
/// record is promoted into the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantRecord {
    #[serde(rename = "cnname", deserialize_with = "deserialize_text")]
    pub common_name: String,
    #[serde(rename = "enname", deserialize_with = "deserialize_text")]
    pub latin_name: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub genus: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub category: String,
    #[serde(
        rename = "icategory",
        deserialize_with = "deserialize_lenient_class",
        skip_serializing_if = "Option::is_none"
    )]
    pub category_class: Option<CategoryClass>,
    #[serde(deserialize_with = "deserialize_text")]
    pub habit: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub distribution: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub size: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub toxicity: String,
    #[serde(
        rename = "itoxicity",
        deserialize_with = "deserialize_lenient_class",
        skip_serializing_if = "Option::is_none"
    )]
    pub toxicity_class: Option<ToxicityClass>,
    #[serde(rename = "period", deserialize_with = "deserialize_text")]
    pub flowering_period: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub light: String,
    #[serde(
        rename = "ilight",
        deserialize_with = "deserialize_lenient_class",
        skip_serializing_if = "Option::is_none"
    )]
    pub light_class: Option<LightClass>,
    #[serde(deserialize_with = "deserialize_text")]
    pub temperature: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub watering: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub fertilization: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub notes: String,
    #[serde(rename = "link", deserialize_with = "deserialize_text")]
    pub reference_link: String,
    #[serde(rename = "image", deserialize_with = "deserialize_text")]
    pub cover_image: String,
    #[serde(rename = "images", skip_serializing_if = "Vec::is_empty")]
    pub candidate_images: Vec<String>,
}

impl PlantRecord {
    /// Returns `true` when `name` is exactly this record's common or latin
    /// name. The comparison is case-sensitive and a blank name is compared
    /// like any other.
    pub fn answers_to(&self, name: &str) -> bool {
        self.common_name == name || self.latin_name == name
    }

    /// Returns `true` when either identity field of `other` names this record.
    pub fn shares_identity_with(&self, other: &PlantRecord) -> bool {
        self.answers_to(&other.common_name) || self.answers_to(&other.latin_name)
    }

    /// Derives the classified fields from the current free text.
    pub fn classify(&mut self) {
        self.category_class = Some(classifier::classify_category(&self.category));
        self.toxicity_class = Some(classifier::classify_toxicity(&self.toxicity));
        self.light_class = Some(classifier::classify_light(&self.light));
    }

    /// Removes every whitespace character from `category`. Models tend to
    /// pad Chinese category phrases with spaces.
    pub fn compact_category(&mut self) {
        self.category = self.category.split_whitespace().collect();
    }
}

/// Accepts strings, `null`, numbers and booleans for a text field. Model
/// replies are not strict about JSON types.
fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected text, found {other}"
        ))),
    }
}

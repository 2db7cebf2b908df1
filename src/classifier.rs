//! Free-text to enum classification applied when a plant enters the catalog.
//!
//! Every rule list is checked in order and the first match wins, so the
//! keyword tables below must keep their relative order.

use serde::{Deserialize, Deserializer, Serialize};

const WOODY_KEYWORDS: &[&str] = &["木本", "藤本", "乔木", "灌木", "藤木"];

const TOXICITY_NONE_LITERAL: &str = "无";
const TOXICITY_NONE_KEYWORDS: &[&str] = &["无毒"];
const TOXICITY_LOW_KEYWORDS: &[&str] = &["微毒", "轻微"];
const TOXICITY_HIGH_KEYWORDS: &[&str] = &["剧毒", "剧烈"];

const LIGHT_FULL_KEYWORDS: &[&str] = &["喜阳", "喜光", "耐阳", "全日照"];
const LIGHT_PARTIAL_KEYWORDS: &[&str] = &["半阳", "半阴", "半日照"];
const LIGHT_NONE_KEYWORDS: &[&str] = &["喜阴", "耐阴", "无日照"];

/// Growth-form class derived from the `category` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoryClass {
    #[serde(rename = "木本")]
    Woody,
    #[serde(rename = "草本")]
    Herbaceous,
}

/// Toxicity level derived from the `toxicity` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToxicityClass {
    #[serde(rename = "无")]
    None,
    #[serde(rename = "低")]
    Low,
    #[serde(rename = "中")]
    Medium,
    #[serde(rename = "高")]
    High,
}

/// Sun exposure class derived from the `light` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightClass {
    #[serde(rename = "全日照")]
    Full,
    #[serde(rename = "半日照")]
    Partial,
    #[serde(rename = "无日照")]
    None,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

pub fn classify_category(text: &str) -> CategoryClass {
    if contains_any(text, WOODY_KEYWORDS) {
        CategoryClass::Woody
    } else {
        CategoryClass::Herbaceous
    }
}

/// Maps toxicity prose to a level. Absent or "none" statements win over
/// any stronger marker found later in the same text.
pub fn classify_toxicity(text: &str) -> ToxicityClass {
    if text.is_empty() || text == TOXICITY_NONE_LITERAL || contains_any(text, TOXICITY_NONE_KEYWORDS)
    {
        ToxicityClass::None
    } else if contains_any(text, TOXICITY_LOW_KEYWORDS) {
        ToxicityClass::Low
    } else if contains_any(text, TOXICITY_HIGH_KEYWORDS) {
        ToxicityClass::High
    } else {
        ToxicityClass::Medium
    }
}

pub fn classify_light(text: &str) -> LightClass {
    if contains_any(text, LIGHT_FULL_KEYWORDS) {
        LightClass::Full
    } else if contains_any(text, LIGHT_PARTIAL_KEYWORDS) {
        LightClass::Partial
    } else if contains_any(text, LIGHT_NONE_KEYWORDS) {
        LightClass::None
    } else {
        LightClass::Partial
    }
}

/// Reads an optional classified label, treating blank or unknown labels as
/// absent. Clients echo back `""` for fields that were never classified.
pub(crate) fn deserialize_lenient_class<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value::<T>(value).ok()))
}

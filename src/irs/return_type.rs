use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String", into = "String")]
pub enum ReturnType {
    Form990,
    Form990EZ,
    Form990PF,
    Form990T,
    Other(String),
}

impl TryFrom<String> for ReturnType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ReturnType::from_str(&s)
    }
}

impl From<ReturnType> for String {
    fn from(return_type: ReturnType) -> Self {
        return_type.to_string()
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Form990 => write!(f, "990"),
            ReturnType::Form990EZ => write!(f, "990EZ"),
            ReturnType::Form990PF => write!(f, "990PF"),
            ReturnType::Form990T => write!(f, "990T"),
            ReturnType::Other(s) => write!(f, "{}", s),
        }
    }
}

pub static RETURN_TYPES: Lazy<String> = Lazy::new(|| {
    ReturnType::iter()
        .filter(|t| !matches!(t, ReturnType::Other(_)))
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
});

impl ReturnType {
    pub fn list_types() -> &'static str {
        &RETURN_TYPES
    }
}

impl FromStr for ReturnType {
    type Err = String;

    fn from_str(s: &str) -> Result<ReturnType, String> {
        let normalized: String = s
            .trim()
            .to_uppercase()
            .chars()
            .filter(|c| !matches!(c, '-' | ' '))
            .collect();
        match normalized.as_str() {
            "" => Err("Return type cannot be empty".to_string()),
            "990" => Ok(ReturnType::Form990),
            "990EZ" => Ok(ReturnType::Form990EZ),
            "990PF" => Ok(ReturnType::Form990PF),
            "990T" => Ok(ReturnType::Form990T),
            _ => Ok(ReturnType::Other(s.trim().to_string())),
        }
    }
}

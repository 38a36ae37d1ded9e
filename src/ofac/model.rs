/// Party Data Model
///
/// Row types returned by the store. Field names serialize to the column
/// labels used by the OFAC sanctions list search screens ("Entity Name",
/// "ID / Information", ...), which is the shape REST clients consume.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Details {
    #[serde(rename = "Type")]
    pub party_type: String,
    #[serde(rename = "Entity Name")]
    pub entity_name: String,
    #[serde(rename = "List")]
    pub list: String,
    /// Program codes joined with "; ", absent when the party has none.
    #[serde(rename = "Program")]
    pub program: Option<String>,
    #[serde(rename = "Remarks")]
    pub remarks: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    #[serde(rename = "Type")]
    pub id_type: String,
    #[serde(rename = "ID / Information")]
    pub information: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    #[serde(rename = "Type")]
    pub alias_type: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Address {
    #[serde(rename = "Address")]
    pub address: Option<String>,
    #[serde(rename = "City")]
    pub city: Option<String>,
    #[serde(rename = "State / Province")]
    pub state_province: String,
    #[serde(rename = "Postal Code")]
    pub postal_code: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
}

/// Complete record of one sanctioned party.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PartyRecord {
    pub details: Details,
    pub identifications: Vec<Identification>,
    pub aliases: Vec<Alias>,
    pub addresses: Vec<Address>,
}

/// One search hit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PartySummary {
    pub party_id: i64,
    #[serde(rename = "Entity Name")]
    pub entity_name: String,
    #[serde(rename = "Type")]
    pub party_type: String,
    #[serde(rename = "List")]
    pub list: String,
    #[serde(rename = "Program")]
    pub program: Option<String>,
}

/// Which party fields a search text is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    All,
    Name,
    Alias,
    Address,
}

impl SearchScope {
    pub const ALLOWED: [&'static str; 4] = ["all", "name", "alias", "address"];

    /// Parse a scope name, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "name" => Some(Self::Name),
            "alias" => Some(Self::Alias),
            "address" => Some(Self::Address),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Name => "name",
            Self::Alias => "alias",
            Self::Address => "address",
        }
    }
}

pub const MIN_QUERY_CHARS: usize = 2;
pub const DEFAULT_SEARCH_LIMIT: usize = 100;
pub const MAX_SEARCH_LIMIT: usize = 1000;

/// Clamp a requested result limit into `1..=MAX_SEARCH_LIMIT`.
pub fn clamp_limit(limit: i64) -> usize {
    limit.clamp(1, MAX_SEARCH_LIMIT as i64) as usize
}

/// Search parameters accepted by [`crate::ofac::store::PartyStore::search`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub scope: SearchScope,
    pub country: Option<String>,
    pub city: Option<String>,
    pub limit: usize,
    /// Match every whitespace-separated token instead of the whole text.
    pub fuzzy: bool,
}

impl SearchQuery {
    /// The plain name search: primary names only, no filters.
    pub fn by_name(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            scope: SearchScope::Name,
            country: None,
            city: None,
            limit: MAX_SEARCH_LIMIT,
            fuzzy: false,
        }
    }

    /// LIKE patterns the text expands to.
    ///
    /// Case is left alone; SQL lowercases both sides with the same `LOWER()`.
    pub fn patterns(&self) -> Vec<String> {
        let text = self.text.trim();
        if self.fuzzy {
            text.split_whitespace()
                .map(|token| format!("%{}%", escape_like(token)))
                .collect()
        } else {
            vec![format!("%{}%", escape_like(text))]
        }
    }
}

/// Escape LIKE wildcards so user text matches literally (ESCAPE '\').
pub fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

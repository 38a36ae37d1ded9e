/// OFAC Party REST API
///
/// Routes:
/// - GET /ofacParty?partyId=N        full record of one party
/// - GET /ofacParty/search           search by name, alias or address
/// - GET /party/{party_id}           sheet view of one party
///
/// `/ofacParty` routes answer with a `resultCd` envelope:
/// `{"resultCd": true, "data": ...}` or `{"resultCd": false, "message": ...}`.

use actix_web::{HttpResponse, http::StatusCode, web};
use serde::{Deserialize, Serialize};

use crate::core::error::StoreError;
use crate::ofac::model::{
    DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT, MIN_QUERY_CHARS, PartyRecord, SearchQuery, SearchScope,
    clamp_limit,
};
use crate::ofac::store::PartyStore;

/// Register the REST routes on an actix app or scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ofacParty", web::get().to(get_party))
        .route("/ofacParty/search", web::get().to(search_parties))
        .route("/party/{party_id}", web::get().to(get_party_sheet));
}

fn success<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "resultCd": true,
        "data": data
    }))
}

fn failure(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "resultCd": false,
        "message": message.into()
    }))
}

/// Run a store call on the blocking pool.
async fn run_store<T, F>(store: &web::Data<PartyStore>, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&PartyStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = store.get_ref().clone();
    let result = web::block(move || f(&store))
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))
        .and_then(|inner| inner);
    if let Err(e) = &result {
        tracing::error!("Store error: {}", e);
    }
    result
}

#[derive(Deserialize, Debug)]
pub struct PartyParams {
    #[serde(rename = "partyId")]
    party_id: Option<String>,
}

/// Accept only plain ASCII digit strings that fit an i64.
fn parse_party_id(raw: Option<&str>) -> Option<i64> {
    raw.filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<i64>().ok())
}

async fn get_party(store: web::Data<PartyStore>, params: web::Query<PartyParams>) -> HttpResponse {
    let raw = params.party_id.as_deref();
    tracing::info!("OFAC party request: partyId={:?}", raw);

    let Some(party_id) = parse_party_id(raw) else {
        tracing::warn!("Invalid partyId parameter: {:?}", raw);
        return failure(StatusCode::BAD_REQUEST, "partyId must be specified as a number");
    };

    match run_store(&store, move |s| s.get_party(party_id)).await {
        Ok(Some(record)) => {
            tracing::info!("OFAC party response sent: party_id={}", party_id);
            success(record)
        }
        Ok(None) => {
            tracing::warn!("Party not found: party_id={}", party_id);
            failure(
                StatusCode::NOT_FOUND,
                format!("no data found for party_id={}", party_id),
            )
        }
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Query string of `/ofacParty/search`.
///
/// `name` is the plain form (primary names only); `q` with the optional
/// filters is the extended form used by the MCP search tool.
#[derive(Deserialize, Debug, Default)]
pub struct SearchParams {
    q: Option<String>,
    name: Option<String>,
    scope: Option<String>,
    country: Option<String>,
    city: Option<String>,
    limit: Option<String>,
    fuzzy: Option<String>,
}

impl SearchParams {
    pub fn into_query(self) -> Result<SearchQuery, String> {
        let (param, text, plain) = match self.q {
            Some(q) => ("q", q, false),
            None => ("name", self.name.unwrap_or_default(), true),
        };
        let text = text.trim().to_string();
        if text.chars().count() < MIN_QUERY_CHARS {
            return Err(format!("{} must be at least {} characters", param, MIN_QUERY_CHARS));
        }

        let scope = match self.scope.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => SearchScope::parse(raw).ok_or_else(|| {
                format!("scope must be one of {}", SearchScope::ALLOWED.join(", "))
            })?,
            None if plain => SearchScope::Name,
            None => SearchScope::All,
        };

        let limit = match self.limit.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => clamp_limit(
                raw.parse::<i64>()
                    .map_err(|_| "limit must be an integer".to_string())?,
            ),
            None if plain => MAX_SEARCH_LIMIT,
            None => DEFAULT_SEARCH_LIMIT,
        };

        let fuzzy = self
            .fuzzy
            .as_deref()
            .map(|f| matches!(f.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        Ok(SearchQuery {
            text,
            scope,
            country: self.country.filter(|c| !c.trim().is_empty()),
            city: self.city.filter(|c| !c.trim().is_empty()),
            limit,
            fuzzy,
        })
    }
}

async fn search_parties(
    store: web::Data<PartyStore>,
    params: web::Query<SearchParams>,
) -> HttpResponse {
    let params = params.into_inner();
    tracing::info!("OFAC party search request: {:?}", params);

    let query = match params.into_query() {
        Ok(query) => query,
        Err(message) => {
            tracing::warn!("Invalid search parameters: {}", message);
            return failure(StatusCode::BAD_REQUEST, message);
        }
    };

    match run_store(&store, move |s| s.search(&query)).await {
        Ok(hits) => {
            tracing::info!("OFAC party search response sent: hits={}", hits.len());
            success(hits)
        }
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Serialize, Debug)]
struct SheetDetails {
    #[serde(rename = "Type")]
    party_type: String,
    #[serde(rename = "Entity_Name")]
    entity_name: String,
    #[serde(rename = "List")]
    list: String,
    #[serde(rename = "Program")]
    program: Option<String>,
    #[serde(rename = "Remarks")]
    remarks: String,
}

#[derive(Serialize, Debug)]
struct SheetIdentification {
    #[serde(rename = "Type")]
    id_type: String,
    #[serde(rename = "ID_Information")]
    information: String,
}

#[derive(Serialize, Debug)]
struct SheetAlias {
    #[serde(rename = "Type")]
    alias_type: String,
    #[serde(rename = "Category")]
    category: String,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Serialize, Debug)]
struct SheetAddress {
    #[serde(rename = "Address")]
    address: Option<String>,
    #[serde(rename = "City")]
    city: Option<String>,
    #[serde(rename = "State_Province")]
    state_province: String,
    #[serde(rename = "Postal_Code")]
    postal_code: Option<String>,
    #[serde(rename = "Country")]
    country: Option<String>,
}

/// Spreadsheet-friendly view: identifier-safe keys, details as a one-row table.
#[derive(Serialize, Debug)]
struct PartySheet {
    details: Vec<SheetDetails>,
    identifications: Vec<SheetIdentification>,
    aliases: Vec<SheetAlias>,
    addresses: Vec<SheetAddress>,
}

impl From<PartyRecord> for PartySheet {
    fn from(record: PartyRecord) -> Self {
        let d = record.details;
        Self {
            details: vec![SheetDetails {
                party_type: d.party_type,
                entity_name: d.entity_name,
                list: d.list,
                program: d.program,
                remarks: d.remarks,
            }],
            identifications: record
                .identifications
                .into_iter()
                .map(|i| SheetIdentification {
                    id_type: i.id_type,
                    information: i.information,
                })
                .collect(),
            aliases: record
                .aliases
                .into_iter()
                .map(|a| SheetAlias {
                    alias_type: a.alias_type,
                    category: a.category,
                    name: a.name,
                })
                .collect(),
            addresses: record
                .addresses
                .into_iter()
                .map(|a| SheetAddress {
                    address: a.address,
                    city: a.city,
                    state_province: a.state_province,
                    postal_code: a.postal_code,
                    country: a.country,
                })
                .collect(),
        }
    }
}

async fn get_party_sheet(store: web::Data<PartyStore>, path: web::Path<i64>) -> HttpResponse {
    let party_id = path.into_inner();
    tracing::info!("Party sheet request: party_id={}", party_id);

    match run_store(&store, move |s| s.get_party(party_id)).await {
        Ok(Some(record)) => HttpResponse::Ok().json(PartySheet::from(record)),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "detail": format!("party_id {} not found", party_id)
        })),
        Err(e @ StoreError::DatabaseMissing(_)) => {
            HttpResponse::NotFound().json(serde_json::json!({ "detail": e.to_string() }))
        }
        Err(e) => {
            HttpResponse::InternalServerError().json(serde_json::json!({ "detail": e.to_string() }))
        }
    }
}

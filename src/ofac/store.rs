/// Sanctioned Party Store
///
/// Read-only access to the OFAC sanctions database. Every call opens its own
/// read-only connection, so the store is cheap to clone and can be shared
/// across actix workers without locking. Callers in async code should run
/// these methods on a blocking thread (`web::block`).

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params, params_from_iter};

use crate::core::error::StoreError;
use crate::ofac::model::{
    Address, Alias, Details, Identification, PartyRecord, PartySummary, SearchQuery, SearchScope,
};

/// Program codes of `p` joined with "; ". NULL when there are none.
const PROGRAM_SUBQUERY: &str = "
    (SELECT GROUP_CONCAT(cm_prog.code_value, '; ')
       FROM ofac_party_program_link pl
       JOIN ofac_code_master cm_prog ON pl.program_cd = cm_prog.code_id
      WHERE pl.party_id = p.party_id)";

/// Joins every listed party to its primary formal name and list code.
const LISTED_PARTY_FROM: &str = "
    FROM ofac_sanctioned_party p
    JOIN ofac_party_name n
          ON p.party_id = n.party_id
         AND n.is_primary_flg = 1
         AND n.name_type_cd = 'FORMAL'
    JOIN ofac_party_list_link ll
          ON p.party_id = ll.party_id
    JOIN ofac_code_master cm_list
          ON ll.list_cd = cm_list.code_id";

const IDENTIFICATIONS_SQL: &str = "
    SELECT attribute_type_cd, attribute_value
      FROM ofac_party_attribute
     WHERE party_id = ?1
       AND attribute_type_cd IN ('Website', 'Additional Sanctions Information -')
     ORDER BY attribute_type_cd, attribute_value";

const ALIASES_SQL: &str = "
    SELECT name_text
      FROM ofac_party_name
     WHERE party_id = ?1
       AND REPLACE(LOWER(name_type_cd), '.', '') = 'aka'
     ORDER BY name_text";

const ADDRESSES_SQL: &str = "
    SELECT ad.address_line, ad.city, ad.postal_code, cm.code_value
      FROM ofac_party_address ad
      LEFT JOIN ofac_code_master cm ON ad.country_cd = cm.code_id
     WHERE ad.party_id = ?1";

/// Handle to the sanctions database file.
#[derive(Debug, Clone)]
pub struct PartyStore {
    db_path: PathBuf,
}

impl PartyStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        if !self.db_path.exists() {
            return Err(StoreError::DatabaseMissing(self.db_path.clone()));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Ok(Connection::open_with_flags(&self.db_path, flags)?)
    }

    /// Fetch the full record of one party.
    ///
    /// Returns `Ok(None)` when the party does not exist or has no primary
    /// formal name / resolvable list.
    pub fn get_party(&self, party_id: i64) -> Result<Option<PartyRecord>, StoreError> {
        let conn = self.connect()?;

        let details_sql = format!(
            "SELECT p.party_type_cd,
                    MIN(n.name_text),
                    MIN(cm_list.code_value),
                    {PROGRAM_SUBQUERY},
                    COALESCE(p.remarks, '')
             {LISTED_PARTY_FROM}
             WHERE p.party_id = ?1
             GROUP BY p.party_id"
        );
        let details = conn
            .query_row(&details_sql, params![party_id], |row| {
                Ok(Details {
                    party_type: text_or_empty(row, 0)?,
                    entity_name: text_or_empty(row, 1)?,
                    list: text_or_empty(row, 2)?,
                    program: row.get(3)?,
                    remarks: text_or_empty(row, 4)?,
                })
            })
            .optional()?;

        let Some(details) = details else {
            tracing::debug!("No listed party with party_id={}", party_id);
            return Ok(None);
        };

        let identifications = conn
            .prepare(IDENTIFICATIONS_SQL)?
            .query_map(params![party_id], |row| {
                Ok(Identification {
                    id_type: text_or_empty(row, 0)?,
                    information: text_or_empty(row, 1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let aliases = conn
            .prepare(ALIASES_SQL)?
            .query_map(params![party_id], |row| {
                Ok(Alias {
                    alias_type: "a.k.a.".to_string(),
                    category: "weak".to_string(),
                    name: text_or_empty(row, 0)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let addresses = conn
            .prepare(ADDRESSES_SQL)?
            .query_map(params![party_id], |row| {
                Ok(Address {
                    address: row.get(0)?,
                    city: row.get(1)?,
                    state_province: String::new(),
                    postal_code: row.get(2)?,
                    country: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(PartyRecord {
            details,
            identifications,
            aliases,
            addresses,
        }))
    }

    /// Search listed parties by name, alias and/or address.
    ///
    /// Results hold one row per party, ordered by primary name.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<PartySummary>, StoreError> {
        let patterns = query.patterns();
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let mut args: Vec<String> = Vec::new();
        let mut conditions = vec![match_clause(query.scope, &patterns, &mut args)];
        if let Some(filter) = location_filter(query, &mut args) {
            conditions.push(filter);
        }

        let sql = format!(
            "SELECT p.party_id,
                    MIN(n.name_text) AS entity_name,
                    p.party_type_cd,
                    MIN(cm_list.code_value),
                    {PROGRAM_SUBQUERY}
             {LISTED_PARTY_FROM}
             WHERE {}
             GROUP BY p.party_id
             ORDER BY entity_name, p.party_id
             LIMIT {}",
            conditions.join(" AND "),
            query.limit
        );

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(PartySummary {
                    party_id: row.get(0)?,
                    entity_name: text_or_empty(row, 1)?,
                    party_type: text_or_empty(row, 2)?,
                    list: text_or_empty(row, 3)?,
                    program: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn text_or_empty(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

/// `expr LIKE LOWER(?)` for every pattern, ANDed together. Pushes one arg
/// per pattern. `expr` must already be wrapped in `LOWER()`.
fn all_patterns_match(expr: &str, patterns: &[String], args: &mut Vec<String>) -> String {
    let parts: Vec<String> = patterns
        .iter()
        .map(|pattern| {
            args.push(pattern.clone());
            format!("{} LIKE LOWER(?) ESCAPE '\\'", expr)
        })
        .collect();
    format!("({})", parts.join(" AND "))
}

fn match_clause(scope: SearchScope, patterns: &[String], args: &mut Vec<String>) -> String {
    match scope {
        SearchScope::Name => all_patterns_match("LOWER(n.name_text)", patterns, args),
        SearchScope::Alias => format!(
            "EXISTS (SELECT 1 FROM ofac_party_name a
                      WHERE a.party_id = p.party_id
                        AND REPLACE(LOWER(a.name_type_cd), '.', '') = 'aka'
                        AND {})",
            all_patterns_match("LOWER(a.name_text)", patterns, args)
        ),
        SearchScope::Address => {
            // Each field is matched on its own; a pattern never spans two fields.
            let line = all_patterns_match("LOWER(COALESCE(ad.address_line, ''))", patterns, args);
            let city = all_patterns_match("LOWER(COALESCE(ad.city, ''))", patterns, args);
            let country = all_patterns_match("LOWER(COALESCE(cm.code_value, ''))", patterns, args);
            format!(
                "EXISTS (SELECT 1 FROM ofac_party_address ad
                           LEFT JOIN ofac_code_master cm ON ad.country_cd = cm.code_id
                          WHERE ad.party_id = p.party_id
                            AND ({} OR {} OR {}))",
                line, city, country
            )
        }
        SearchScope::All => {
            let name = match_clause(SearchScope::Name, patterns, args);
            let alias = match_clause(SearchScope::Alias, patterns, args);
            let address = match_clause(SearchScope::Address, patterns, args);
            format!("({} OR {} OR {})", name, alias, address)
        }
    }
}

/// Restrict to parties with one address matching both country and city filters.
fn location_filter(query: &SearchQuery, args: &mut Vec<String>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(country) = non_blank(query.country.as_deref()) {
        args.push(like_contains(country));
        parts.push("LOWER(COALESCE(cm.code_value, '')) LIKE LOWER(?) ESCAPE '\\'");
    }
    if let Some(city) = non_blank(query.city.as_deref()) {
        args.push(like_contains(city));
        parts.push("LOWER(COALESCE(ad.city, '')) LIKE LOWER(?) ESCAPE '\\'");
    }
    if parts.is_empty() {
        return None;
    }
    Some(format!(
        "EXISTS (SELECT 1 FROM ofac_party_address ad
                   LEFT JOIN ofac_code_master cm ON ad.country_cd = cm.code_id
                  WHERE ad.party_id = p.party_id
                    AND {})",
        parts.join(" AND ")
    ))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn like_contains(value: &str) -> String {
    format!("%{}%", crate::ofac::model::escape_like(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ofac::fixtures;

    #[test]
    fn missing_database_is_reported() {
        let store = PartyStore::new("/nonexistent/ofac_demo.db");
        let err = store.get_party(4639).unwrap_err();
        assert!(matches!(err, StoreError::DatabaseMissing(_)));
        assert!(err.to_string().contains("ofac_demo.db"));

        let err = store.search(&SearchQuery::by_name("bank")).unwrap_err();
        assert!(matches!(err, StoreError::DatabaseMissing(_)));
    }

    #[test]
    fn full_party_record_is_assembled() {
        let (_dir, store) = fixtures::seeded_store();
        let record = store.get_party(4639).unwrap().unwrap();

        assert_eq!(record.details.party_type, "Entity");
        assert_eq!(record.details.entity_name, "BANCO NACIONAL DE CUBA");
        assert_eq!(record.details.list, "SDN");
        assert_eq!(record.details.program.as_deref(), Some("CUBA"));
        assert_eq!(record.details.remarks, "Cuban state bank");

        // Only Website and Additional Sanctions Information, ordered by type.
        let types: Vec<&str> = record.identifications.iter().map(|i| i.id_type.as_str()).collect();
        assert_eq!(types, vec!["Additional Sanctions Information -", "Website"]);

        // "a.k.a." and "aka" both count as aliases; "f.k.a." does not.
        let names: Vec<&str> = record.aliases.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["BNC", "NATIONAL BANK OF CUBA"]);
        assert!(record.aliases.iter().all(|a| a.alias_type == "a.k.a." && a.category == "weak"));

        assert_eq!(record.addresses.len(), 2);
        let havana = record
            .addresses
            .iter()
            .find(|a| a.city.as_deref() == Some("Havana"))
            .unwrap();
        assert_eq!(havana.country.as_deref(), Some("Cuba"));
        assert_eq!(havana.postal_code.as_deref(), Some("10100"));
        assert_eq!(havana.state_province, "");
        // Unknown country code still yields the address, without a country.
        assert!(record.addresses.iter().any(|a| a.country.is_none()));
    }

    #[test]
    fn programs_are_joined_and_missing_remarks_are_empty() {
        let (_dir, store) = fixtures::seeded_store();
        let record = store.get_party(7001).unwrap().unwrap();
        let program = record.details.program.unwrap();
        assert!(program.contains("RUSSIA-EO14024"));
        assert!(program.contains("UKRAINE-EO13661"));
        assert!(program.contains("; "));
        assert_eq!(record.details.remarks, "");

        let record = store.get_party(7002).unwrap().unwrap();
        assert_eq!(record.details.program, None);
        assert!(record.identifications.is_empty());
    }

    #[test]
    fn unknown_or_unnamed_party_is_not_found() {
        let (_dir, store) = fixtures::seeded_store();
        assert!(store.get_party(999_999).unwrap().is_none());
        // Party 7003 has no primary formal name.
        assert!(store.get_party(7003).unwrap().is_none());
    }

    #[test]
    fn name_search_is_case_insensitive_substring() {
        let (_dir, store) = fixtures::seeded_store();
        let hits = store.search(&SearchQuery::by_name("nacional")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].party_id, 4639);
        assert_eq!(hits[0].entity_name, "BANCO NACIONAL DE CUBA");
        assert_eq!(hits[0].list, "SDN");

        assert!(store.search(&SearchQuery::by_name("no such party")).unwrap().is_empty());
    }

    #[test]
    fn name_scope_ignores_aliases() {
        let (_dir, store) = fixtures::seeded_store();
        assert!(store.search(&SearchQuery::by_name("global trade")).unwrap().is_empty());

        let mut query = SearchQuery::by_name("global trade");
        query.scope = SearchScope::Alias;
        let hits = store.search(&query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].party_id, 7002);
    }

    #[test]
    fn address_scope_matches_city_and_country() {
        let (_dir, store) = fixtures::seeded_store();
        let mut query = SearchQuery::by_name("dubai");
        query.scope = SearchScope::Address;
        let hits = store.search(&query).unwrap();
        assert_eq!(hits.iter().map(|h| h.party_id).collect::<Vec<_>>(), vec![7002]);

        query.text = "russia".to_string();
        let hits = store.search(&query).unwrap();
        assert_eq!(hits.iter().map(|h| h.party_id).collect::<Vec<_>>(), vec![7001]);
    }

    #[test]
    fn all_scope_returns_each_party_once_in_name_order() {
        let (_dir, store) = fixtures::seeded_store();
        let mut query = SearchQuery::by_name("an");
        query.scope = SearchScope::All;
        let hits = store.search(&query).unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.entity_name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        let mut ids: Vec<i64> = hits.iter().map(|h| h.party_id).collect();
        ids.dedup();
        assert_eq!(ids.len(), hits.len());
    }

    #[test]
    fn fuzzy_search_requires_every_token() {
        let (_dir, store) = fixtures::seeded_store();
        let mut query = SearchQuery::by_name("cuba banco");
        assert!(store.search(&query).unwrap().is_empty());
        query.fuzzy = true;
        let hits = store.search(&query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].party_id, 4639);
    }

    #[test]
    fn location_filters_and_limit_apply() {
        let (_dir, store) = fixtures::seeded_store();
        let mut query = SearchQuery::by_name("an");
        query.scope = SearchScope::All;
        query.country = Some("CUBA".to_string());
        let hits = store.search(&query).unwrap();
        assert_eq!(hits.iter().map(|h| h.party_id).collect::<Vec<_>>(), vec![4639]);

        query.country = None;
        query.city = Some("moscow".to_string());
        let hits = store.search(&query).unwrap();
        assert_eq!(hits.iter().map(|h| h.party_id).collect::<Vec<_>>(), vec![7001]);

        query.city = None;
        query.limit = 1;
        assert_eq!(store.search(&query).unwrap().len(), 1);
    }

    #[test]
    fn non_ascii_names_match_in_their_own_case() {
        let (_dir, store) = fixtures::seeded_store();
        let hits = store.search(&SearchQuery::by_name("SOCIÉTÉ ÉNERGIE")).unwrap();
        assert_eq!(hits.iter().map(|h| h.party_id).collect::<Vec<_>>(), vec![7004]);

        let hits = store.search(&SearchQuery::by_name("soci")).unwrap();
        assert_eq!(hits.iter().map(|h| h.party_id).collect::<Vec<_>>(), vec![7004]);

        let mut query = SearchQuery::by_name("ÉNERGIE société");
        query.fuzzy = true;
        assert!(store.search(&query).unwrap().is_empty());
        query.text = "ÉNERGIE SOCIÉTÉ".to_string();
        assert_eq!(store.search(&query).unwrap().len(), 1);
    }

    #[test]
    fn address_match_stays_within_one_field() {
        let (_dir, store) = fixtures::seeded_store();
        let mut query = SearchQuery::by_name("havana cuba");
        query.scope = SearchScope::Address;
        assert!(store.search(&query).unwrap().is_empty());

        // City and country tokens are in different fields.
        query.fuzzy = true;
        assert!(store.search(&query).unwrap().is_empty());

        query.text = "aguiar calle".to_string();
        let hits = store.search(&query).unwrap();
        assert_eq!(hits.iter().map(|h| h.party_id).collect::<Vec<_>>(), vec![4639]);

        query.text = "arab united".to_string();
        let hits = store.search(&query).unwrap();
        assert_eq!(hits.iter().map(|h| h.party_id).collect::<Vec<_>>(), vec![7002]);
    }

    #[test]
    fn like_wildcards_in_text_match_literally() {
        let (_dir, store) = fixtures::seeded_store();
        assert!(store.search(&SearchQuery::by_name("%%")).unwrap().is_empty());
    }
}

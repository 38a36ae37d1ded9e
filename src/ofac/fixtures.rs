/// Test-only sanctions database with a handful of seeded parties.

use rusqlite::Connection;
use tempfile::TempDir;

use crate::ofac::store::PartyStore;

const SCHEMA: &str = "
    CREATE TABLE ofac_code_master (
        code_id    INTEGER PRIMARY KEY,
        code_value TEXT NOT NULL
    );
    CREATE TABLE ofac_sanctioned_party (
        party_id      INTEGER PRIMARY KEY,
        party_type_cd TEXT,
        remarks       TEXT
    );
    CREATE TABLE ofac_party_name (
        party_id       INTEGER NOT NULL,
        name_text      TEXT NOT NULL,
        name_type_cd   TEXT NOT NULL,
        is_primary_flg INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE ofac_party_list_link (
        party_id INTEGER NOT NULL,
        list_cd  INTEGER NOT NULL
    );
    CREATE TABLE ofac_party_program_link (
        party_id   INTEGER NOT NULL,
        program_cd INTEGER NOT NULL
    );
    CREATE TABLE ofac_party_attribute (
        party_id          INTEGER NOT NULL,
        attribute_type_cd TEXT NOT NULL,
        attribute_value   TEXT
    );
    CREATE TABLE ofac_party_address (
        party_id     INTEGER NOT NULL,
        address_line TEXT,
        city         TEXT,
        postal_code  TEXT,
        country_cd   INTEGER
    );
";

const SEED: &str = "
    INSERT INTO ofac_code_master VALUES
        (1, 'SDN'), (2, 'NS-MBS'),
        (10, 'CUBA'), (11, 'UKRAINE-EO13661'), (12, 'RUSSIA-EO14024'),
        (20, 'Cuba'), (21, 'Russia'), (22, 'United Arab Emirates');

    INSERT INTO ofac_sanctioned_party VALUES
        (4639, 'Entity', 'Cuban state bank'),
        (7001, 'Individual', NULL),
        (7002, 'Entity', 'Trading front company'),
        (7003, 'Entity', 'No primary name on file'),
        (7004, 'Entity', NULL);

    INSERT INTO ofac_party_name VALUES
        (4639, 'BANCO NACIONAL DE CUBA', 'FORMAL', 1),
        (4639, 'NATIONAL BANK OF CUBA', 'a.k.a.', 0),
        (4639, 'BNC', 'aka', 0),
        (4639, 'OLD STATE BANK', 'f.k.a.', 0),
        (7001, 'PETROV, Ivan', 'FORMAL', 1),
        (7002, 'ACME TRADING LLC', 'FORMAL', 1),
        (7002, 'GLOBAL TRADE PARTNERS', 'A.K.A.', 0),
        (7003, 'UNNAMED HOLDINGS', 'FORMAL', 0),
        (7004, 'SOCIÉTÉ ÉNERGIE', 'FORMAL', 1);

    INSERT INTO ofac_party_list_link VALUES
        (4639, 1), (7001, 1), (7002, 2), (7003, 1), (7004, 1);

    INSERT INTO ofac_party_program_link VALUES
        (4639, 10), (7001, 11), (7001, 12);

    INSERT INTO ofac_party_attribute VALUES
        (4639, 'Website', 'www.bnc.cu'),
        (4639, 'Additional Sanctions Information -', 'Subject to Secondary Sanctions'),
        (4639, 'Email Address', 'info@bnc.cu');

    INSERT INTO ofac_party_address VALUES
        (4639, 'Calle Aguiar 456', 'Havana', '10100', 20),
        (4639, 'Branch Office', 'Santiago', NULL, 99),
        (7001, 'Tverskaya 1', 'Moscow', '125009', 21),
        (7002, '1 Trade Center', 'Dubai', NULL, 22);
";

/// Create a seeded database in a fresh temp directory.
///
/// The directory guard must outlive the store.
pub fn seeded_store() -> (TempDir, PartyStore) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ofac_demo.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn.execute_batch(SEED).unwrap();
    drop(conn);
    (dir, PartyStore::new(path))
}

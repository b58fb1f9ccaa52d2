//! Card catalog
//!
//! SQLite-backed card data. Cards are keyed by their OCR slug; the catalog
//! can import card lists and export the slug dictionary used by the matcher.

use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::vision::slugify;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS expansion (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS card (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    ocr_slug TEXT NOT NULL,
    vendor_id TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_card_ocr_slug ON card (ocr_slug);
CREATE TABLE IF NOT EXISTS card_expansion (
    card_id INTEGER NOT NULL REFERENCES card (id),
    expansion_id INTEGER NOT NULL REFERENCES expansion (id),
    PRIMARY KEY (card_id, expansion_id)
);
";

/// Catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to open card database {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("card database query failed")]
    Query(#[from] rusqlite::Error),
    #[error("failed to read card list {path:?}: {reason}")]
    Import { path: PathBuf, reason: String },
    #[error("failed to write dictionary {path:?}")]
    Dictionary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A resolved card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    /// Dictionary/catalog key
    pub slug: String,
    /// Printed card name
    pub name: String,
    /// Expansion (set) name
    pub expansion: String,
    /// Vendor identifier, e.g. a multiverse id
    pub vendor_id: String,
}

/// Card entry as found in an import file
#[derive(Debug, Clone, Deserialize)]
pub struct NewCard {
    pub name: String,
    pub expansion: String,
    #[serde(default)]
    pub vendor_id: String,
}

/// Slug to card lookup
pub trait CardCatalog {
    /// Look up a card, `None` when the slug is unknown
    fn get(&self, slug: &str) -> Option<&CardRecord>;

    /// Whether the slug resolves to a card
    fn exists(&self, slug: &str) -> bool {
        self.get(slug).is_some()
    }
}

impl CardCatalog for HashMap<String, CardRecord> {
    fn get(&self, slug: &str) -> Option<&CardRecord> {
        HashMap::get(self, slug)
    }
}

/// SQLite card database with an in-memory slug index
pub struct SqliteCatalog {
    conn: Connection,
    expansions: Vec<String>,
    cards: HashMap<String, CardRecord>,
}

impl SqliteCatalog {
    /// Open (creating if needed) the database at `path`.
    ///
    /// Only cards printed in `expansions` are loaded; an empty list loads all.
    pub fn open(path: &Path, expansions: &[String]) -> Result<Self, CatalogError> {
        let conn = Connection::open(path).map_err(|source| CatalogError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn, expansions)
    }

    /// Open a throwaway in-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::with_connection(Connection::open_in_memory()?, &[])
    }

    fn with_connection(conn: Connection, expansions: &[String]) -> Result<Self, CatalogError> {
        conn.execute_batch(SCHEMA)?;

        let mut catalog = Self {
            conn,
            expansions: expansions.to_vec(),
            cards: HashMap::new(),
        };
        catalog.reload()?;
        Ok(catalog)
    }

    /// Rebuild the in-memory index from the database
    pub fn reload(&mut self) -> Result<(), CatalogError> {
        let filter = if self.expansions.is_empty() {
            String::new()
        } else {
            format!(
                "WHERE e.name IN ({})",
                vec!["?"; self.expansions.len()].join(", ")
            )
        };
        let sql = format!(
            "SELECT c.ocr_slug, MIN(c.name), MIN(e.name), MIN(c.vendor_id) \
             FROM card c \
             INNER JOIN card_expansion ce ON c.id = ce.card_id \
             INNER JOIN expansion e ON ce.expansion_id = e.id \
             {filter} \
             GROUP BY c.ocr_slug \
             ORDER BY c.ocr_slug"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(self.expansions.iter()), |row| {
            Ok(CardRecord {
                slug: row.get(0)?,
                name: row.get(1)?,
                expansion: row.get(2)?,
                vendor_id: row.get(3)?,
            })
        })?;

        let mut cards = HashMap::new();
        for record in rows {
            let record = record?;
            cards.insert(record.slug.clone(), record);
        }
        drop(stmt);

        if self.expansions.is_empty() {
            info!("Card catalog loaded: {} cards", cards.len());
        } else {
            info!(
                "Card catalog loaded: {} cards limited to {:?}",
                cards.len(),
                self.expansions
            );
        }
        self.cards = cards;
        Ok(())
    }

    /// Insert cards, ignoring ones already present. Returns the number of new cards.
    pub fn import_cards(&mut self, cards: &[NewCard]) -> Result<usize, CatalogError> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;

        for card in cards {
            let slug = slugify(&card.name);
            if slug.is_empty() {
                debug!("Skipping card without letters: {:?}", card.name);
                continue;
            }

            tx.execute(
                "INSERT OR IGNORE INTO expansion (name) VALUES (?1)",
                params![card.expansion],
            )?;
            inserted += tx.execute(
                "INSERT OR IGNORE INTO card (name, ocr_slug, vendor_id) VALUES (?1, ?2, ?3)",
                params![card.name, slug, card.vendor_id],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO card_expansion (card_id, expansion_id) \
                 SELECT card.id, expansion.id FROM card, expansion \
                 WHERE card.name = ?1 AND expansion.name = ?2",
                params![card.name, card.expansion],
            )?;
        }

        tx.commit()?;
        info!("Imported {} new cards ({} entries read)", inserted, cards.len());

        self.reload()?;
        Ok(inserted)
    }

    /// Import a JSON array of `{name, expansion, vendor_id}` objects
    pub fn import_json(&mut self, path: &Path) -> Result<usize, CatalogError> {
        let import_error = |reason: String| CatalogError::Import {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|err| import_error(err.to_string()))?;
        let cards: Vec<NewCard> =
            serde_json::from_str(&content).map_err(|err| import_error(err.to_string()))?;

        self.import_cards(&cards)
    }

    /// Write the loaded slugs as a hunspell `.dic` (plus an empty `.aff`)
    pub fn write_dictionary(&self, dic_path: &Path) -> Result<usize, CatalogError> {
        let write = |path: &Path, content: String| {
            std::fs::write(path, content).map_err(|source| CatalogError::Dictionary {
                path: path.to_path_buf(),
                source,
            })
        };

        let mut slugs: Vec<&str> = self.cards.keys().map(String::as_str).collect();
        slugs.sort_unstable();

        write(dic_path, format!("{}\n{}\n", slugs.len(), slugs.join("\n")))?;
        write(&dic_path.with_extension("aff"), String::new())?;

        info!("Wrote {} dictionary words to {:?}", slugs.len(), dic_path);
        Ok(slugs.len())
    }

    /// Number of loaded cards
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

impl CardCatalog for SqliteCatalog {
    fn get(&self, slug: &str) -> Option<&CardRecord> {
        self.cards.get(slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn card(name: &str, expansion: &str) -> NewCard {
        NewCard {
            name: name.to_string(),
            expansion: expansion.to_string(),
            vendor_id: String::new(),
        }
    }

    #[test]
    fn test_import_and_lookup() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();
        assert!(catalog.is_empty());

        let inserted = catalog
            .import_cards(&[
                card("Gitaxian Probe", "New Phyrexia"),
                card("Lightning Bolt", "Magic 2010"),
                card("Lightning Bolt", "Magic 2010"),
                card("???", "Magic 2010"),
            ])
            .unwrap();

        assert_eq!(inserted, 2);
        assert!(catalog.exists("GitaxianProbe"));
        assert!(!catalog.exists("Counterspell"));

        let bolt = catalog.get("LightningBolt").unwrap();
        assert_eq!(bolt.name, "Lightning Bolt");
        assert_eq!(bolt.expansion, "Magic 2010");
    }

    #[test]
    fn test_expansion_whitelist() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("cards.sqlite");

        {
            let mut catalog = SqliteCatalog::open(&db, &[]).unwrap();
            catalog
                .import_cards(&[card("Shock", "Stronghold"), card("Counterspell", "Tempest")])
                .unwrap();
        }

        let limited = SqliteCatalog::open(&db, &["Tempest".to_string()]).unwrap();
        assert_eq!(limited.len(), 1);
        assert!(limited.exists("Counterspell"));
        assert!(!limited.exists("Shock"));
    }

    #[test]
    fn test_import_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cards.json");
        std::fs::write(
            &path,
            r#"[{"name": "Shock", "expansion": "Stronghold", "vendor_id": "4691"}]"#,
        )
        .unwrap();

        let mut catalog = SqliteCatalog::open_in_memory().unwrap();
        assert_eq!(catalog.import_json(&path).unwrap(), 1);
        assert_eq!(catalog.get("Shock").unwrap().vendor_id, "4691");

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            catalog.import_json(&path),
            Err(CatalogError::Import { .. })
        ));
    }

    #[test]
    fn test_write_dictionary() {
        let dir = TempDir::new().unwrap();
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .import_cards(&[card("Shock", "Stronghold"), card("Counterspell", "Tempest")])
            .unwrap();

        let dic = dir.path().join("cards.dic");
        assert_eq!(catalog.write_dictionary(&dic).unwrap(), 2);
        assert_eq!(
            std::fs::read_to_string(&dic).unwrap(),
            "2\nCounterspell\nShock\n"
        );
        assert!(dir.path().join("cards.aff").exists());
    }

    #[test]
    fn test_hashmap_catalog() {
        let mut cards = HashMap::new();
        cards.insert(
            "Shock".to_string(),
            CardRecord {
                slug: "Shock".into(),
                name: "Shock".into(),
                expansion: "Stronghold".into(),
                vendor_id: String::new(),
            },
        );

        assert!(CardCatalog::exists(&cards, "Shock"));
        assert!(!CardCatalog::exists(&cards, "Bolt"));
    }
}

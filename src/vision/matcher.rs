//! Fuzzy vocabulary matching
//!
//! Maps noisy OCR output onto the closest known card slugs. The word list is
//! a hunspell-style `.dic` file, one slug per line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use strsim::normalized_levenshtein;
use thiserror::Error;
use tracing::{info, trace};

/// Noisy string to ranked candidate slugs, best first
pub trait VocabularyMatcher {
    /// Empty when nothing is a confident candidate
    fn suggest(&self, text: &str) -> Vec<String>;
}

/// Dictionary loading errors
#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("failed to read dictionary {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dictionary {0:?} contains no words")]
    Empty(PathBuf),
}

/// Derive the slug of a card name: ASCII letters only, case kept
pub fn slugify(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphabetic()).collect()
}

/// Matching thresholds
#[derive(Debug, Clone, Copy)]
pub struct MatchSettings {
    /// Minimum normalized Levenshtein similarity (0.0 - 1.0) for a candidate
    pub min_similarity: f64,
    /// Maximum number of candidates returned
    pub limit: usize,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            min_similarity: 0.75,
            limit: 10,
        }
    }
}

/// In-memory word list with Levenshtein ranking
#[derive(Debug, Clone)]
pub struct Dictionary {
    /// (slug, lower-cased slug)
    words: Vec<(String, String)>,
    settings: MatchSettings,
}

impl Dictionary {
    /// Build from an iterator of slugs; duplicates and blanks are skipped
    pub fn from_words<I, S>(words: I, settings: MatchSettings) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let words = words
            .into_iter()
            .map(Into::into)
            .filter(|w: &String| !w.is_empty() && seen.insert(w.clone()))
            .map(|w| {
                let lower = w.to_lowercase();
                (w, lower)
            })
            .collect();

        Self { words, settings }
    }

    /// Parse `.dic` content: optional leading word count, `/FLAGS` suffixes ignored
    pub fn parse(content: &str, settings: MatchSettings) -> Self {
        let mut lines = content.lines().map(str::trim).peekable();
        if lines
            .peek()
            .is_some_and(|first| first.chars().all(|c| c.is_ascii_digit()) && !first.is_empty())
        {
            lines.next();
        }

        Self::from_words(
            lines.map(|line| line.split('/').next().unwrap_or("").trim().to_string()),
            settings,
        )
    }

    /// Load a `.dic` file
    pub fn load(path: &Path, settings: MatchSettings) -> Result<Self, DictionaryError> {
        let content = std::fs::read_to_string(path).map_err(|source| DictionaryError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let dictionary = Self::parse(&content, settings);
        if dictionary.is_empty() {
            return Err(DictionaryError::Empty(path.to_path_buf()));
        }

        info!("Loaded {} dictionary words from {:?}", dictionary.len(), path);
        Ok(dictionary)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl VocabularyMatcher for Dictionary {
    fn suggest(&self, text: &str) -> Vec<String> {
        let query = slugify(text).to_lowercase();
        if query.is_empty() {
            return vec![];
        }

        let mut scored: Vec<(f64, &str)> = self
            .words
            .iter()
            .filter_map(|(word, lower)| {
                // Exact hits always outrank fuzzy ones
                let score = if *lower == query {
                    2.0
                } else {
                    normalized_levenshtein(lower, &query)
                };
                (score >= self.settings.min_similarity).then_some((score, word.as_str()))
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.truncate(self.settings.limit);

        trace!("Suggestions for {:?}: {:?}", query, scored);
        scored.into_iter().map(|(_, word)| word.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn dictionary() -> Dictionary {
        Dictionary::from_words(
            ["GitaxianProbe", "LightningBolt", "LightningBlast", "Counterspell"],
            MatchSettings::default(),
        )
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Gitaxian Probe"), "GitaxianProbe");
        assert_eq!(slugify("Æther Vial, 2nd"), "therVialnd");
        assert_eq!(slugify("  "), "");
    }

    #[test]
    fn test_exact_match_ranks_first() {
        let suggestions = dictionary().suggest("Lightning Bolt");
        assert_eq!(suggestions.first().map(String::as_str), Some("LightningBolt"));
    }

    #[test]
    fn test_noisy_match() {
        let suggestions = dictionary().suggest("Gitax1an Prohe");
        assert_eq!(suggestions, vec!["GitaxianProbe".to_string()]);
    }

    #[test]
    fn test_no_confident_candidate() {
        assert!(dictionary().suggest("zzzz").is_empty());
        assert!(dictionary().suggest("1234 !!").is_empty());
    }

    #[test]
    fn test_limit() {
        let settings = MatchSettings {
            min_similarity: 0.0,
            limit: 2,
        };
        let dict = Dictionary::from_words(["aaa", "aab", "abb", "bbb"], settings);
        assert_eq!(dict.suggest("aaa"), vec!["aaa".to_string(), "aab".to_string()]);
    }

    #[test]
    fn test_parse_hunspell_format() {
        let dict = Dictionary::parse("3\nCounterspell\nShock/AB\n\nShock\n", MatchSettings::default());
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.suggest("shock"), vec!["Shock".to_string()]);
    }

    #[test]
    fn test_load_empty_file_fails() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "0\n").unwrap();

        let result = Dictionary::load(file.path(), MatchSettings::default());
        assert!(matches!(result, Err(DictionaryError::Empty(_))));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = Dictionary::load(Path::new("/nonexistent/cards.dic"), MatchSettings::default());
        assert!(matches!(result, Err(DictionaryError::Read { .. })));
    }
}

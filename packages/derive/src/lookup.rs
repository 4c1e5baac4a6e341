//! GDCode to curve number lookup table.

use std::{collections::BTreeMap, io::Read, path::Path};

use crate::LookupError;

/// Default table, embedded at compile time.
pub const DEFAULT_LOOKUP_CSV: &str = include_str!("../CN_Lookup.csv");

const KEY_COLUMN: &str = "GDCode";
const VALUE_COLUMN: &str = "CN_Join";

/// Map from GDCode (land use code followed by HSG letter) to curve number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CnLookupTable {
    entries: BTreeMap<String, f64>,
}

impl CnLookupTable {
    /// Loads the embedded default table.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the embedded CSV is malformed.
    pub fn embedded() -> Result<Self, LookupError> {
        Self::from_reader(DEFAULT_LOOKUP_CSV.as_bytes())
    }

    /// Loads a table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, LookupError> {
        let file = std::fs::File::open(path).map_err(|source| LookupError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_reader(file)?;
        log::info!(
            "Loaded {} curve number lookup entries from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parses a CSV with `GDCode` and `CN_Join` columns.
    ///
    /// Header names match case-insensitively and extra columns are
    /// ignored. Rows with a blank `CN_Join` are skipped; when a key repeats,
    /// the first row wins.
    ///
    /// # Errors
    ///
    /// * [`LookupError::Csv`] for malformed CSV
    /// * [`LookupError::MissingColumn`] if a required header is absent
    /// * [`LookupError::InvalidNumber`] for a non-numeric `CN_Join`
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LookupError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
                .ok_or_else(|| LookupError::MissingColumn {
                    column: name.to_string(),
                })
        };
        let key_idx = column(KEY_COLUMN)?;
        let value_idx = column(VALUE_COLUMN)?;

        let mut entries = BTreeMap::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let key = record.get(key_idx).unwrap_or_default();
            let value = record.get(value_idx).unwrap_or_default();
            if key.is_empty() || value.is_empty() {
                continue;
            }

            let number: f64 = value.parse().map_err(|_| LookupError::InvalidNumber {
                row: row + 2,
                value: value.to_string(),
            })?;

            if entries.contains_key(key) {
                log::debug!("Ignoring duplicate lookup key {key} on row {}", row + 2);
                continue;
            }
            entries.insert(key.to_string(), number);
        }

        Ok(Self { entries })
    }

    /// Curve number for a GDCode.
    #[must_use]
    pub fn get(&self, gdcode: &str) -> Option<f64> {
        self.entries.get(gdcode).copied()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

use crate::error::IntegrityError;
use connectors::source::csv::normalize_col_name;
use std::path::Path;
use tracing::debug;

/// Checks a finished transfer before it is declared successful.
pub struct IntegrityChecker;

impl IntegrityChecker {
    /// Verifies the on-disk length of `path` against `expected_len` and, when
    /// `required` is non-empty, that the file's CSV header carries every
    /// required column. Returns the verified length.
    pub async fn verify(
        expected_len: u64,
        path: &Path,
        required: &[String],
    ) -> Result<u64, IntegrityError> {
        let shown = path.display().to_string();
        let actual = tokio::fs::metadata(path)
            .await
            .map_err(|source| IntegrityError::Io {
                path: shown.clone(),
                source,
            })?
            .len();

        Self::verify_length(&shown, expected_len, actual)?;

        if !required.is_empty() {
            let owned = path.to_path_buf();
            let required = required.to_vec();
            tokio::task::spawn_blocking(move || Self::verify_header(&owned, &required))
                .await
                .map_err(|e| IntegrityError::Io {
                    path: shown.clone(),
                    source: std::io::Error::other(e),
                })??;
        }

        debug!(path = %shown, bytes = actual, "Transfer verified");
        Ok(actual)
    }

    pub fn verify_length(path: &str, expected: u64, actual: u64) -> Result<(), IntegrityError> {
        if expected == actual {
            Ok(())
        } else {
            Err(IntegrityError::Incomplete {
                path: path.to_string(),
                expected,
                actual,
            })
        }
    }

    /// Reads only the first CSV record.
    fn verify_header(path: &Path, required: &[String]) -> Result<(), IntegrityError> {
        let shown = path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|source| IntegrityError::Header {
                path: shown.clone(),
                source,
            })?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| IntegrityError::Header {
                path: shown.clone(),
                source,
            })?
            .iter()
            .map(normalize_col_name)
            .collect();

        let missing: Vec<String> = required
            .iter()
            .filter(|col| {
                let want = normalize_col_name(col);
                !headers.iter().any(|h| h.eq_ignore_ascii_case(&want))
            })
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(IntegrityError::SchemaMismatch {
                path: shown,
                missing,
            })
        }
    }
}

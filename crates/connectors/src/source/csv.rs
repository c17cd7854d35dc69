use crate::{
    error::SourceError,
    source::{BatchSource, KeyFilter, UnitStream, filtered},
};
use async_trait::async_trait;
use model::records::unit::{UnitKey, UnitPayload, WorkUnit};
use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    fs::File,
    path::PathBuf,
};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct CsvSourceConfig {
    pub path: PathBuf,
    /// Column holding the unit key. Rows are keyed by 1-based row number otherwise.
    pub key_column: Option<String>,
    /// When set, units carry these columns joined as text instead of all fields.
    pub text_columns: Vec<String>,
    pub delimiter: u8,
    /// Records read from the file per page.
    pub fetch_size: usize,
}

impl CsvSourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvSourceConfig {
            path: path.into(),
            key_column: None,
            text_columns: Vec::new(),
            delimiter: b',',
            fetch_size: 1000,
        }
    }
}

/// Rows of a CSV file, in file order.
pub struct CsvSource {
    name: String,
    config: CsvSourceConfig,
}

/// Header positions resolved against the configured column names.
#[derive(Debug, Clone)]
struct Layout {
    headers: Vec<String>,
    key_idx: Option<usize>,
    text_idx: Vec<usize>,
}

impl CsvSource {
    pub fn new(name: impl Into<String>, config: CsvSourceConfig) -> Self {
        CsvSource {
            name: name.into(),
            config,
        }
    }

    fn open(&self) -> Result<(::csv::Reader<File>, Layout), SourceError> {
        let file = File::open(&self.config.path).map_err(|e| {
            SourceError::Unavailable(format!("{}: {e}", self.config.path.display()))
        })?;
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(true)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| normalize_col_name(h))
            .collect();
        let layout = self.resolve_layout(headers)?;
        Ok((reader, layout))
    }

    fn resolve_layout(&self, headers: Vec<String>) -> Result<Layout, SourceError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(&normalize_col_name(name)))
        };

        let key_idx = match &self.config.key_column {
            Some(col) => Some(find(col).ok_or_else(|| {
                SourceError::InvalidConfig(format!(
                    "key column '{col}' not found in {}",
                    self.config.path.display()
                ))
            })?),
            None => None,
        };

        let text_idx: Vec<usize> = self
            .config
            .text_columns
            .iter()
            .filter_map(|c| find(c))
            .collect();
        if !self.config.text_columns.is_empty() && text_idx.is_empty() {
            return Err(SourceError::InvalidConfig(format!(
                "none of the text columns {:?} exist in {}",
                self.config.text_columns,
                self.config.path.display()
            )));
        }

        Ok(Layout {
            headers,
            key_idx,
            text_idx,
        })
    }
}

#[async_trait]
impl BatchSource for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        filter: KeyFilter,
        limit: Option<usize>,
    ) -> Result<UnitStream, SourceError> {
        let (reader, layout) = self.open()?;
        info!(
            source = %self.name,
            path = %self.config.path.display(),
            columns = layout.headers.len(),
            "Opened CSV source"
        );

        let pager = CsvPager {
            records: reader.into_records(),
            layout,
            row_no: 0,
            page: VecDeque::new(),
            fetch_size: self.config.fetch_size.max(1),
            seen: HashSet::new(),
            done: false,
        };

        let raw = futures_util::stream::unfold(Some(pager), |state| async move {
            let mut pager = state?;
            if pager.page.is_empty() && !pager.done {
                pager = match tokio::task::spawn_blocking(move || {
                    pager.fill_page();
                    pager
                })
                .await
                {
                    Ok(pager) => pager,
                    Err(e) => {
                        return Some((
                            Err(SourceError::Read(format!("page read task failed: {e}"))),
                            None,
                        ));
                    }
                };
            }
            pager.page.pop_front().map(|item| (item, Some(pager)))
        });

        Ok(filtered(raw, filter, limit))
    }

    async fn remaining(&self, filter: &HashSet<UnitKey>) -> Result<Option<u64>, SourceError> {
        let (reader, layout) = self.open()?;
        let filter = filter.clone();

        let count = tokio::task::spawn_blocking(move || -> Result<u64, SourceError> {
            let mut count = 0u64;
            for (idx, record) in reader.into_records().enumerate() {
                let record = record?;
                let key = layout.key_for(&record, idx as u64 + 1)?;
                if !filter.contains(&key) {
                    count += 1;
                }
            }
            Ok(count)
        })
        .await
        .map_err(|e| SourceError::Read(format!("row count task failed: {e}")))??;

        Ok(Some(count))
    }
}

struct CsvPager {
    records: ::csv::StringRecordsIntoIter<File>,
    layout: Layout,
    row_no: u64,
    page: VecDeque<Result<WorkUnit, SourceError>>,
    fetch_size: usize,
    seen: HashSet<UnitKey>,
    done: bool,
}

impl CsvPager {
    /// Reads up to `fetch_size` records. An error ends the stream after it is yielded.
    fn fill_page(&mut self) {
        for _ in 0..self.fetch_size {
            match self.records.next() {
                Some(Ok(record)) => {
                    self.row_no += 1;
                    match self.to_unit(&record) {
                        Ok(unit) => self.page.push_back(Ok(unit)),
                        Err(e) => {
                            self.page.push_back(Err(e));
                            self.done = true;
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    self.page.push_back(Err(SourceError::Read(format!(
                        "row {}: {e}",
                        self.row_no + 1
                    ))));
                    self.done = true;
                    break;
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        debug!(rows = self.row_no, buffered = self.page.len(), "Fetched CSV page");
    }

    fn to_unit(&mut self, record: &::csv::StringRecord) -> Result<WorkUnit, SourceError> {
        let key = self.layout.key_for(record, self.row_no)?;
        if !self.seen.insert(key.clone()) {
            return Err(SourceError::Read(format!(
                "duplicate key '{key}' at row {}",
                self.row_no
            )));
        }

        let payload = if self.layout.text_idx.is_empty() {
            let fields: BTreeMap<String, String> = self
                .layout
                .headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").to_string()))
                .collect();
            UnitPayload::Fields { fields }
        } else {
            let text = self
                .layout
                .text_idx
                .iter()
                .filter_map(|&i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" | ");
            UnitPayload::Text { text }
        };

        Ok(WorkUnit::new(key, payload))
    }
}

impl Layout {
    fn key_for(&self, record: &::csv::StringRecord, row_no: u64) -> Result<UnitKey, SourceError> {
        match self.key_idx {
            Some(idx) => {
                let raw = record.get(idx).map(str::trim).unwrap_or("");
                if raw.is_empty() {
                    return Err(SourceError::Read(format!("row {row_no} has an empty key")));
                }
                Ok(UnitKey::new(raw))
            }
            None => Ok(UnitKey::seq(row_no)),
        }
    }
}

pub fn normalize_col_name(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_string()
}

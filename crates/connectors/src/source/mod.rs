use crate::error::SourceError;
use async_trait::async_trait;
use futures_util::{
    Stream, StreamExt, TryStreamExt,
    future::ready,
    stream::BoxStream,
};
use model::records::unit::{UnitKey, WorkUnit};
use std::{collections::HashSet, sync::Arc};

pub mod chunk;
pub mod csv;
pub mod manifest;

/// Lazy sequence of work units produced by a [`BatchSource`].
pub type UnitStream = BoxStream<'static, Result<WorkUnit, SourceError>>;

/// Keys a source must not yield again.
pub type KeyFilter = Arc<HashSet<UnitKey>>;

/// Enumerates work units from an upstream provider.
///
/// Sources are not internally resumable: every call to `stream` starts from
/// the beginning of the upstream and relies on `filter` to skip units that
/// earlier runs already completed. Order must be deterministic for an
/// unchanged upstream.
#[async_trait]
pub trait BatchSource: Send + Sync {
    fn name(&self) -> &str;

    /// Opens the upstream and returns the remaining units in source order.
    /// Fails with [`SourceError::Unavailable`] when the upstream cannot be reached.
    async fn stream(&self, filter: KeyFilter, limit: Option<usize>)
    -> Result<UnitStream, SourceError>;

    /// Number of units `stream` would yield for `filter`, when cheaply known.
    async fn remaining(&self, _filter: &HashSet<UnitKey>) -> Result<Option<u64>, SourceError> {
        Ok(None)
    }
}

/// Drops units whose key is in `filter` and stops after `limit` yielded units.
pub fn filtered<S>(raw: S, filter: KeyFilter, limit: Option<usize>) -> UnitStream
where
    S: Stream<Item = Result<WorkUnit, SourceError>> + Send + 'static,
{
    let stream = raw.try_filter(move |unit| ready(!filter.contains(&unit.key)));
    match limit {
        Some(n) => stream.take(n).boxed(),
        None => stream.boxed(),
    }
}

/// Source over a fixed list of units, used for tests and programmatic targets.
pub struct StaticSource {
    name: String,
    units: Vec<WorkUnit>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, units: Vec<WorkUnit>) -> Self {
        StaticSource {
            name: name.into(),
            units,
        }
    }
}

#[async_trait]
impl BatchSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        filter: KeyFilter,
        limit: Option<usize>,
    ) -> Result<UnitStream, SourceError> {
        let units = self.units.clone();
        Ok(filtered(
            futures_util::stream::iter(units.into_iter().map(Ok)),
            filter,
            limit,
        ))
    }

    async fn remaining(&self, filter: &HashSet<UnitKey>) -> Result<Option<u64>, SourceError> {
        let n = self.units.iter().filter(|u| !filter.contains(&u.key)).count();
        Ok(Some(n as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(n: usize) -> Vec<WorkUnit> {
        (0..n)
            .map(|i| WorkUnit::text(format!("k{i}"), format!("text {i}")))
            .collect()
    }

    #[tokio::test]
    async fn never_yields_filtered_keys() {
        let source = StaticSource::new("static", units(5));
        let filter: HashSet<UnitKey> = ["k1", "k3"].into_iter().map(UnitKey::from).collect();

        let keys: Vec<String> = source
            .stream(Arc::new(filter.clone()), None)
            .await
            .unwrap()
            .map_ok(|u| u.key.to_string())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(keys, vec!["k0", "k2", "k4"]);
        assert_eq!(source.remaining(&filter).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn limit_counts_only_yielded_units() {
        let source = StaticSource::new("static", units(5));
        let filter: HashSet<UnitKey> = ["k0"].into_iter().map(UnitKey::from).collect();

        let got: Vec<WorkUnit> = source
            .stream(Arc::new(filter), Some(2))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].key.as_str(), "k1");
    }
}

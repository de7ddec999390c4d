//! Metadata-history store and merge engine (§3.6, §3.7, §4.3): the
//! append-only per-resource delta log and the deterministic merged view
//! connectors read before resolving/observing a resource again.

mod delta;
mod field;

pub use delta::{MetadataDelta, ObservedDelta, ResourceDelta};
pub use field::FieldDelta;

use crate::connector::Locator;
use crate::errors::{GatewayError, GatewayResult};
use crate::relation::Relation;
use crate::strings::ValidatedStr;
use crate::uri::ExternalUri;
use std::collections::{BTreeSet, HashMap};

/// The deterministic left-fold of a `ResourceHistory` (§3.7): `locator` is
/// the latest value set, `expired` is the set union minus anything
/// reported observed in a later delta, `labels` is reset-then-accumulated,
/// `metadata` is the non-None-wins merge of every delta's `MetadataDelta`,
/// and `observed` is the per-affordance-suffix merge of every delta's
/// `ObservedDelta`s.
#[derive(Debug, Clone, Default)]
pub struct ResourceView {
    pub locator: Option<Locator>,
    pub expired: BTreeSet<String>,
    pub labels: Vec<String>,
    pub metadata: MetadataDelta,
    pub observed: HashMap<String, ObservedDelta>,
}

impl ResourceView {
    fn apply(&mut self, delta: &ResourceDelta) {
        if let Some(locator) = &delta.locator {
            self.locator = Some(locator.clone());
        }

        for suffix in &delta.expired {
            self.expired.insert(suffix.clone());
        }
        for observed in &delta.observed {
            self.expired.remove(&observed.suffix);
        }

        if delta.reset_labels {
            self.labels.clear();
        }
        for label in &delta.labels {
            if !self.labels.contains(label) {
                self.labels.push(label.clone());
            }
        }
        self.labels.sort();

        self.metadata.fold_onto(&delta.metadata);

        for observed in &delta.observed {
            self.observed
                .entry(observed.suffix.clone())
                .and_modify(|existing| *existing = existing.with_update(observed))
                .or_insert_with(|| observed.clone());
        }
    }

    /// All alias `ExternalUri`s ever reported for this resource (§4.3
    /// `all_aliases()`).
    pub fn all_aliases(&self) -> Vec<ExternalUri> {
        self.metadata.aliases.clone().unwrap_or_default()
    }

    /// The scalar attributes of the merged view: name, MIME type,
    /// description, citation URL, and timestamps (§4.3 `all_attributes()`).
    pub fn all_attributes(&self) -> MergedAttributes {
        MergedAttributes {
            name: self.metadata.name.as_option().cloned(),
            mime_type: self.metadata.mime_type.as_option().cloned(),
            description: self.metadata.description.as_option().cloned(),
            citation_url: self.metadata.citation_url.as_option().cloned(),
            created_at: self.metadata.created_at.as_option().cloned(),
            updated_at: self.metadata.updated_at.as_option().cloned(),
        }
    }

    /// The merged label list, sorted (§4.3).
    pub fn all_labels(&self) -> &[String] {
        &self.labels
    }

    /// Every relation proposed anywhere in the history — in the top-level
    /// metadata delta or in any per-affordance observation — deduplicated
    /// by `unique_id()` and sorted by `RelationId`'s string form (§4.3
    /// `all_relations()`, §8 "Relation dedup invariant").
    pub fn all_relations(&self) -> Vec<Relation> {
        let mut all: Vec<Relation> = self.metadata.relations.clone().unwrap_or_default();
        for observed in self.observed.values() {
            if let Some(relations) = &observed.relations {
                all.extend(relations.clone());
            }
        }
        let mut seen = std::collections::HashSet::new();
        all.retain(|r| seen.insert(r.unique_id()));
        all.sort_by_key(|r| r.unique_id().into_string());
        all
    }
}

/// The scalar fields of a merged `ResourceView`, pulled out for callers
/// that want plain `Option<T>`s rather than `FieldDelta`s.
#[derive(Debug, Clone, Default)]
pub struct MergedAttributes {
    pub name: Option<String>,
    pub mime_type: Option<crate::strings::MimeType>,
    pub description: Option<String>,
    pub citation_url: Option<crate::uri::WebUrl>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The append-only per-resource delta log (§3.7). Owned by the storage
/// component; all mutation goes through `update`, never direct `Vec`
/// access, so the first-delta-sets-a-locator invariant cannot be bypassed.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ResourceHistory {
    history: Vec<ResourceDelta>,
}

impl ResourceHistory {
    /// Start a new history. `first` MUST set a locator (§3.7 invariant);
    /// violating this raises `IngestionError` rather than silently
    /// accepting an unanchored history.
    pub fn new(first: ResourceDelta) -> GatewayResult<Self> {
        if first.locator.is_none() {
            return Err(GatewayError::ingestion(
                "first delta in a resource history must set a locator",
            ));
        }
        Ok(ResourceHistory { history: vec![first] })
    }

    pub fn from_existing(history: Vec<ResourceDelta>) -> GatewayResult<Self> {
        match history.first() {
            Some(first) if first.locator.is_some() => Ok(ResourceHistory { history }),
            Some(_) => Err(GatewayError::ingestion(
                "first delta in a resource history must set a locator",
            )),
            None => Err(GatewayError::ingestion("resource history must not be empty")),
        }
    }

    pub fn entries(&self) -> &[ResourceDelta] {
        &self.history
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// The deterministic fold of every delta in order (§3.7). Panics are
    /// impossible here: an empty history (only reachable via
    /// `Default::default()`, never via the constructors above) folds to an
    /// empty view with `locator: None`.
    pub fn merged(&self) -> ResourceView {
        let mut view = ResourceView::default();
        for delta in &self.history {
            view.apply(delta);
        }
        view
    }

    /// Append `delta` after eliding any fields that already agree with the
    /// current merged view (§3.7 `ResourceHistory.update`). Returns
    /// whether anything was actually appended — repeating the same
    /// `update` call is a no-op after the first (§8 "Merge idempotence").
    pub fn update(&mut self, delta: ResourceDelta) -> GatewayResult<bool> {
        if self.history.is_empty() {
            if delta.locator.is_none() {
                return Err(GatewayError::ingestion(
                    "first delta in a resource history must set a locator",
                ));
            }
            self.history.push(delta);
            return Ok(true);
        }

        let merged = self.merged();
        let diffed = delta.diff(&merged);
        if diffed.is_empty() {
            return Ok(false);
        }
        self.history.push(diffed);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ArXivPaperLocator, Locator};
    use crate::metadata::delta::{MetadataDelta as MD, ResourceDelta as RD};
    use chrono::TimeZone;

    fn locator() -> Locator {
        Locator::ArXivPaper(ArXivPaperLocator { paper_id: "1234.5678".into() })
    }

    fn ts(secs: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn empty_history_requires_first_delta_locator() {
        let delta = RD { refreshed_at: ts(0), locator: None, ..Default::default() };
        assert!(ResourceHistory::new(delta).is_err());
    }

    #[test]
    fn merged_locator_is_never_null_once_persisted() {
        let delta = RD { refreshed_at: ts(0), locator: Some(locator()), ..Default::default() };
        let history = ResourceHistory::new(delta).unwrap();
        assert!(history.merged().locator.is_some());
    }

    #[test]
    fn update_is_idempotent() {
        let first = RD { refreshed_at: ts(0), locator: Some(locator()), ..Default::default() };
        let mut history = ResourceHistory::new(first).unwrap();

        let mut metadata = MD::default();
        metadata.name = FieldDelta::Set("A Paper".to_string());
        let delta = RD { refreshed_at: ts(1), metadata, ..Default::default() };

        assert!(history.update(delta.clone()).unwrap());
        assert_eq!(history.entries().len(), 2);
        assert!(!history.update(delta).unwrap());
        assert_eq!(history.entries().len(), 2);
    }

    #[test]
    fn reset_labels_clears_before_applying() {
        let mut first = RD { refreshed_at: ts(0), locator: Some(locator()), ..Default::default() };
        first.labels = vec!["old".to_string()];
        let mut history = ResourceHistory::new(first).unwrap();

        let second = RD {
            refreshed_at: ts(1),
            reset_labels: true,
            labels: vec!["new".to_string()],
            ..Default::default()
        };
        history.update(second).unwrap();
        assert_eq!(history.merged().labels, vec!["new".to_string()]);
    }

    #[test]
    fn expired_cleared_by_later_observation() {
        let mut first = RD { refreshed_at: ts(0), locator: Some(locator()), ..Default::default() };
        first.expired = vec!["body".to_string()];
        let mut history = ResourceHistory::new(first).unwrap();
        assert!(history.merged().expired.contains("body"));

        let observed = crate::metadata::delta::ObservedDelta {
            suffix: "body".to_string(),
            ..Default::default()
        };
        let second = RD { refreshed_at: ts(1), observed: vec![observed], ..Default::default() };
        history.update(second).unwrap();
        assert!(!history.merged().expired.contains("body"));
    }
}

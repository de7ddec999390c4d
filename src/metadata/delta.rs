//! The three delta shapes appended to a `ResourceHistory`: a full-view
//! `MetadataDelta`, an affordance-scoped `ObservedDelta`, and the envelope
//! `ResourceDelta` that carries both plus locator/label/expiry changes.
//!
//! Grounded field-for-field on `knowledge/models/storage_metadata.py`.

use crate::content::AffordanceInfo;
use crate::metadata::field::FieldDelta;
use crate::relation::Relation;
use crate::uri::{Affordance, ExternalUri};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A change to a resource's connector-reported metadata. Scalar fields use
/// the three-state `FieldDelta`; `aliases`/`affordances`/`relations` are
/// whole-collection replacements recorded only when the new list differs
/// from the merged view's current one.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MetadataDelta {
    #[serde(default, skip_serializing_if = "FieldDelta::is_empty")]
    pub name: FieldDelta<String>,
    #[serde(default, skip_serializing_if = "FieldDelta::is_empty")]
    pub mime_type: FieldDelta<crate::strings::MimeType>,
    #[serde(default, skip_serializing_if = "FieldDelta::is_empty")]
    pub description: FieldDelta<String>,
    #[serde(default, skip_serializing_if = "FieldDelta::is_empty")]
    pub citation_url: FieldDelta<crate::uri::WebUrl>,
    #[serde(default, skip_serializing_if = "FieldDelta::is_empty")]
    pub created_at: FieldDelta<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "FieldDelta::is_empty")]
    pub updated_at: FieldDelta<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "FieldDelta::is_empty")]
    pub revision_data: FieldDelta<String>,
    #[serde(default, skip_serializing_if = "FieldDelta::is_empty")]
    pub revision_meta: FieldDelta<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<ExternalUri>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affordances: Option<HashMap<Affordance, AffordanceInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relations: Option<Vec<Relation>>,
}

impl MetadataDelta {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.mime_type.is_empty()
            && self.description.is_empty()
            && self.citation_url.is_empty()
            && self.created_at.is_empty()
            && self.updated_at.is_empty()
            && self.revision_data.is_empty()
            && self.revision_meta.is_empty()
            && self.aliases.is_none()
            && self.affordances.is_none()
            && self.relations.is_none()
    }

    /// Layer `update` on top of `self`, with `update`'s non-unset fields
    /// winning. Used when a connector batches several partial updates
    /// before appending a single delta to history.
    pub fn with_update(&self, update: &MetadataDelta) -> MetadataDelta {
        MetadataDelta {
            name: pick(&self.name, &update.name),
            mime_type: pick(&self.mime_type, &update.mime_type),
            description: pick(&self.description, &update.description),
            citation_url: pick(&self.citation_url, &update.citation_url),
            created_at: pick(&self.created_at, &update.created_at),
            updated_at: pick(&self.updated_at, &update.updated_at),
            revision_data: pick(&self.revision_data, &update.revision_data),
            revision_meta: pick(&self.revision_meta, &update.revision_meta),
            aliases: update.aliases.clone().or_else(|| self.aliases.clone()),
            affordances: update.affordances.clone().or_else(|| self.affordances.clone()),
            relations: update.relations.clone().or_else(|| self.relations.clone()),
        }
    }

    /// Fold `update` onto `self` in place, the way `ResourceView` folds a
    /// history (§3.7, §4.3): scalars are non-unset-wins as in
    /// `with_update`, but `aliases`/`relations` accumulate (deduplicated)
    /// rather than replace wholesale, and `affordances` merges key-by-key
    /// with later occurrences winning field-by-field within a key.
    pub fn fold_onto(&mut self, update: &MetadataDelta) {
        self.name = pick(&self.name, &update.name);
        self.mime_type = pick(&self.mime_type, &update.mime_type);
        self.description = pick(&self.description, &update.description);
        self.citation_url = pick(&self.citation_url, &update.citation_url);
        self.created_at = pick(&self.created_at, &update.created_at);
        self.updated_at = pick(&self.updated_at, &update.updated_at);
        self.revision_data = pick(&self.revision_data, &update.revision_data);
        self.revision_meta = pick(&self.revision_meta, &update.revision_meta);

        if let Some(new_aliases) = &update.aliases {
            let existing = self.aliases.get_or_insert_with(Vec::new);
            for alias in new_aliases {
                if !existing.contains(alias) {
                    existing.push(alias.clone());
                }
            }
        }

        if let Some(new_affordances) = &update.affordances {
            let existing = self.affordances.get_or_insert_with(HashMap::new);
            for (suffix, info) in new_affordances {
                existing
                    .entry(suffix.clone())
                    .and_modify(|current| *current = current.merge(info))
                    .or_insert_with(|| info.clone());
            }
        }

        if let Some(new_relations) = &update.relations {
            let existing = self.relations.get_or_insert_with(Vec::new);
            for relation in new_relations {
                let id = relation.unique_id();
                if !existing.iter().any(|r: &Relation| r.unique_id() == id) {
                    existing.push(relation.clone());
                }
            }
        }
    }

    /// The delta that, applied on top of `merged` (the view already
    /// persisted), would reproduce `self`'s intended state — eliding any
    /// field that already agrees (§3.7 `ResourceHistory.update`). `self`
    /// is treated as the connector's full current knowledge, not a
    /// pre-computed diff: every `Set`/`Clear` field is compared against
    /// the merged value and downgraded to `Unset` when unchanged.
    pub fn diff(&self, merged: &MetadataDelta) -> MetadataDelta {
        MetadataDelta {
            name: diff_field(&self.name, merged.name.as_option()),
            mime_type: diff_field(&self.mime_type, merged.mime_type.as_option()),
            description: diff_field(&self.description, merged.description.as_option()),
            citation_url: diff_field(&self.citation_url, merged.citation_url.as_option()),
            created_at: diff_field(&self.created_at, merged.created_at.as_option()),
            updated_at: diff_field(&self.updated_at, merged.updated_at.as_option()),
            revision_data: diff_field(&self.revision_data, merged.revision_data.as_option()),
            revision_meta: diff_field(&self.revision_meta, merged.revision_meta.as_option()),
            aliases: diff_collection(&self.aliases, &merged.aliases),
            affordances: diff_collection(&self.affordances, &merged.affordances),
            relations: diff_collection(&self.relations, &merged.relations),
        }
    }
}

fn pick<T: Clone>(base: &FieldDelta<T>, update: &FieldDelta<T>) -> FieldDelta<T> {
    if update.is_unset() {
        base.clone()
    } else {
        update.clone()
    }
}

/// Downgrade `candidate` to `Unset` when it already agrees with
/// `merged_current` (`None` here covers both "never set" and "explicitly
/// cleared" — both read back as no value).
fn diff_field<T: Clone + PartialEq>(candidate: &FieldDelta<T>, merged_current: Option<&T>) -> FieldDelta<T> {
    match candidate {
        FieldDelta::Unset => FieldDelta::Unset,
        FieldDelta::Clear => {
            if merged_current.is_none() {
                FieldDelta::Unset
            } else {
                FieldDelta::Clear
            }
        }
        FieldDelta::Set(v) => {
            if merged_current == Some(v) {
                FieldDelta::Unset
            } else {
                FieldDelta::Set(v.clone())
            }
        }
    }
}

fn diff_collection<T: Clone + PartialEq>(candidate: &Option<T>, merged: &Option<T>) -> Option<T> {
    match candidate {
        None => None,
        Some(v) if Some(v) == merged.as_ref() => None,
        Some(v) => Some(v.clone()),
    }
}

/// A change scoped to one affordance section of an observed resource (e.g.
/// one page of a paginated `$collection`, identified by `suffix`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ObservedDelta {
    pub suffix: String,
    #[serde(default, skip_serializing_if = "FieldDelta::is_empty")]
    pub info_mime_type: FieldDelta<crate::strings::MimeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_observations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_sections: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relations: Option<Vec<Relation>>,
}

impl ObservedDelta {
    pub fn is_empty(&self) -> bool {
        self.info_mime_type.is_empty()
            && self.info_observations.is_none()
            && self.info_sections.is_none()
            && self.relations.is_none()
    }

    pub fn with_update(&self, update: &ObservedDelta) -> ObservedDelta {
        ObservedDelta {
            suffix: self.suffix.clone(),
            info_mime_type: pick(&self.info_mime_type, &update.info_mime_type),
            info_observations: update
                .info_observations
                .clone()
                .or_else(|| self.info_observations.clone()),
            info_sections: update.info_sections.clone().or_else(|| self.info_sections.clone()),
            relations: update.relations.clone().or_else(|| self.relations.clone()),
        }
    }

    /// Elide fields that already agree with the persisted `merged` section
    /// for this suffix, the same way `MetadataDelta::diff` does.
    pub fn diff(&self, merged: &ObservedDelta) -> ObservedDelta {
        ObservedDelta {
            suffix: self.suffix.clone(),
            info_mime_type: diff_field(&self.info_mime_type, merged.info_mime_type.as_option()),
            info_observations: diff_collection(&self.info_observations, &merged.info_observations),
            info_sections: diff_collection(&self.info_sections, &merged.info_sections),
            relations: diff_collection(&self.relations, &merged.relations),
        }
    }
}

/// One entry in a `ResourceHistory`. The first delta appended for a
/// resource must set `locator` (enforced by `ResourceHistory::update`,
/// §4.6); subsequent deltas may omit it to mean "unchanged".
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ResourceDelta {
    pub refreshed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<crate::connector::Locator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expired: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub metadata: MetadataDelta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observed: Vec<ObservedDelta>,
    #[serde(default)]
    pub reset_labels: bool,
}

impl ResourceDelta {
    pub fn is_empty(&self) -> bool {
        self.locator.is_none()
            && self.expired.is_empty()
            && self.labels.is_empty()
            && self.metadata.is_empty()
            && self.observed.is_empty()
            && !self.reset_labels
    }

    /// Elide everything that already agrees with `merged`, the persisted
    /// view this delta would be appended after (§3.7
    /// `ResourceHistory.update`).
    pub fn diff(&self, merged: &crate::metadata::ResourceView) -> ResourceDelta {
        let locator = match &self.locator {
            Some(l) if merged.locator.as_ref() == Some(l) => None,
            other => other.clone(),
        };
        let expired: Vec<String> = self
            .expired
            .iter()
            .filter(|suffix| !merged.expired.contains(*suffix))
            .cloned()
            .collect();
        let labels: Vec<String> = if self.reset_labels {
            self.labels.clone()
        } else {
            self.labels
                .iter()
                .filter(|label| !merged.labels.contains(label))
                .cloned()
                .collect()
        };
        let metadata = self.metadata.diff(&merged.metadata);
        let observed: Vec<ObservedDelta> = self
            .observed
            .iter()
            .filter_map(|section| {
                let diffed = match merged.observed.get(&section.suffix) {
                    Some(current) => section.diff(current),
                    None => section.clone(),
                };
                if diffed.is_empty() {
                    None
                } else {
                    Some(diffed)
                }
            })
            .collect();

        ResourceDelta {
            refreshed_at: self.refreshed_at,
            locator,
            expired,
            labels,
            metadata,
            observed,
            reset_labels: self.reset_labels,
        }
    }
}

//! The current filter selection, shared by every view.
//!
//! [FilterContext] is the single owner of the selection. Views read it with
//! [FilterContext::current], react to changes through
//! [FilterContext::subscribe], and change it only through
//! [FilterContext::update], which also writes the new selection to disk.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use time::Date;
use tokio::sync::watch;

use crate::{Error, filter::FilterSelection};

/// The key the selection is stored under in the persisted JSON document.
pub const FILTER_STATE_KEY: &str = "finboard.filters";

#[derive(Serialize, Deserialize)]
struct PersistedFilters {
    #[serde(rename = "finboard.filters")]
    filters: FilterSelection,
}

/// Reads and writes the filter selection as a JSON file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPersistence {
    path: PathBuf,
}

impl FilterPersistence {
    /// Persist to the file at `path`. The file does not need to exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path of the JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted selection.
    ///
    /// # Returns
    /// `None` if the file does not exist.
    ///
    /// # Errors
    /// Returns [Error::FilterPersistence] if the file cannot be read or does
    /// not hold a selection.
    pub fn load(&self) -> Result<Option<FilterSelection>, Error> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let persisted: PersistedFilters = serde_json::from_str(&text)?;
        Ok(Some(persisted.filters))
    }

    /// Write `selection` to the file, replacing its contents.
    ///
    /// # Errors
    /// Returns [Error::FilterPersistence] if the file cannot be written.
    pub fn save(&self, selection: &FilterSelection) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(&PersistedFilters {
            filters: selection.clone(),
        })?;

        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Owns the current [FilterSelection] and notifies subscribers of changes.
#[derive(Debug, Clone)]
pub struct FilterContext {
    sender: Arc<watch::Sender<FilterSelection>>,
    persistence: Option<FilterPersistence>,
}

impl FilterContext {
    /// Create a context holding `selection` that is never written to disk.
    pub fn new(selection: FilterSelection) -> Self {
        let (sender, _) = watch::channel(selection);

        Self {
            sender: Arc::new(sender),
            persistence: None,
        }
    }

    /// Create a context from the selection persisted by `persistence`.
    ///
    /// A missing, unreadable or invalid file falls back to
    /// [FilterSelection::default_for] `today`.
    pub fn load(persistence: FilterPersistence, today: Date) -> Self {
        let selection = match persistence.load() {
            Ok(Some(selection)) => match selection.validate() {
                Ok(()) => selection,
                Err(error) => {
                    tracing::warn!(
                        "ignoring the saved filters in {}: {error}",
                        persistence.path().display()
                    );
                    FilterSelection::default_for(today)
                }
            },
            Ok(None) => {
                tracing::info!(
                    "no saved filters at {}, using the defaults",
                    persistence.path().display()
                );
                FilterSelection::default_for(today)
            }
            Err(error) => {
                tracing::warn!(
                    "could not load the saved filters from {}: {error}",
                    persistence.path().display()
                );
                FilterSelection::default_for(today)
            }
        };

        let (sender, _) = watch::channel(selection);

        Self {
            sender: Arc::new(sender),
            persistence: Some(persistence),
        }
    }

    /// A copy of the current selection.
    pub fn current(&self) -> FilterSelection {
        self.sender.borrow().clone()
    }

    /// A receiver that is notified every time the selection changes.
    pub fn subscribe(&self) -> watch::Receiver<FilterSelection> {
        self.sender.subscribe()
    }

    /// Change the selection with `change` and persist the result.
    ///
    /// A failure to persist is logged and the in-memory change still stands.
    ///
    /// # Errors
    /// Returns [Error::InvalidFilter] if the changed selection is invalid, in
    /// which case the current selection is left as it was.
    pub fn update(
        &self,
        change: impl FnOnce(&mut FilterSelection),
    ) -> Result<FilterSelection, Error> {
        let mut selection = self.current();
        change(&mut selection);
        selection.validate()?;

        self.sender.send_replace(selection.clone());

        if let Some(persistence) = &self.persistence {
            if let Err(error) = persistence.save(&selection) {
                tracing::error!(
                    "could not save the filters to {}: {error}",
                    persistence.path().display()
                );
            }
        }

        Ok(selection)
    }

    /// Replace the whole selection. See [FilterContext::update].
    ///
    /// # Errors
    /// Returns [Error::InvalidFilter] if `selection` is invalid.
    pub fn replace(&self, selection: FilterSelection) -> Result<FilterSelection, Error> {
        self.update(|current| *current = selection)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::Value;
    use time::macros::date;

    use super::{FILTER_STATE_KEY, FilterContext, FilterPersistence};
    use crate::{
        aggregation::GroupBy,
        comparison::ComparisonMode,
        filter::{DateFilter, FilterSelection},
    };

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilterPersistence::new(dir.path().join("filters.json"));

        let context = FilterContext::load(persistence, date!(2024 - 05 - 20));

        assert_eq!(
            context.current(),
            FilterSelection::default_for(date!(2024 - 05 - 20))
        );
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        std::fs::write(&path, "{ not json").unwrap();

        let context = FilterContext::load(FilterPersistence::new(path), date!(2024 - 05 - 20));

        assert_eq!(
            context.current(),
            FilterSelection::default_for(date!(2024 - 05 - 20))
        );
    }

    #[test]
    fn update_persists_under_the_fixed_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        let context = FilterContext::load(FilterPersistence::new(&path), date!(2024 - 05 - 20));

        context
            .update(|selection| {
                selection.categories = BTreeSet::from(["201-ALUGUEL".to_owned()]);
                selection.group_by = GroupBy::Quarter;
                selection.comparison = ComparisonMode::SamePeriodLastYear;
            })
            .unwrap();

        let document: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let filters = &document[FILTER_STATE_KEY];
        assert_eq!(filters["categories"], serde_json::json!(["201-ALUGUEL"]));
        assert_eq!(filters["dates"]["mode"], "range");
        assert_eq!(filters["dates"]["start"], "2024-01-01");
        assert_eq!(filters["dates"]["end"], "2024-05-20");
        assert_eq!(filters["group_by"], "quarter");
        assert_eq!(filters["comparison"], "same_period_last_year");
    }

    #[test]
    fn reloads_what_was_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        let context = FilterContext::load(FilterPersistence::new(&path), date!(2024 - 05 - 20));
        let saved = context
            .update(|selection| {
                selection.dates = DateFilter::Periods {
                    months: BTreeSet::from([1, 2]),
                    years: BTreeSet::from([2023]),
                };
            })
            .unwrap();

        let reloaded = FilterContext::load(FilterPersistence::new(&path), date!(2025 - 01 - 01));

        assert_eq!(reloaded.current(), saved);
    }

    #[test]
    fn rejects_invalid_updates_without_changing_the_selection() {
        let context = FilterContext::new(FilterSelection::default_for(date!(2024 - 05 - 20)));
        let before = context.current();

        let result = context.update(|selection| {
            selection.dates = DateFilter::Range {
                start: Some(date!(2024 - 06 - 01)),
                end: Some(date!(2024 - 01 - 01)),
            };
        });

        assert!(result.is_err());
        assert_eq!(context.current(), before);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let context = FilterContext::new(FilterSelection::default_for(date!(2024 - 05 - 20)));
        let mut receiver = context.subscribe();

        context
            .update(|selection| selection.group_by = GroupBy::Year)
            .unwrap();

        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow_and_update().group_by, GroupBy::Year);
    }

    #[test]
    fn unwritable_file_keeps_the_in_memory_change() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilterPersistence::new(dir.path().join("missing-dir").join("f.json"));
        let context = FilterContext::load(persistence, date!(2024 - 05 - 20));

        let result = context.update(|selection| selection.group_by = GroupBy::Year);

        assert!(result.is_ok());
        assert_eq!(context.current().group_by, GroupBy::Year);
    }
}

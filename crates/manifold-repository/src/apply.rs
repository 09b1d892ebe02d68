//! Apply engine: transactional application of transformers.
//!
//! `Repository::apply` runs a batch, committing each transformer (state
//! change plus event row) before starting the next. The internal entry point
//! runs one transformer inside a transaction owned by the caller.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use manifold_state::{EslEventRow, StateRead, StateStore, StateWriter};

use crate::error::{RepoResult, RepositoryError};
use crate::esl;
use crate::release_train::{self, TrainReport};
use crate::transform::{self, StateChange};
use crate::transformer::{EventType, ReleaseTrain, Transformer};

/// Result of applying one transformer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// State written by this transformer.
    pub changes: Vec<StateChange>,
    /// Human-readable change description.
    pub description: String,
    /// The event row appended for this transformer.
    pub event: EslEventRow,
    /// Per-application outcome, for release trains.
    pub train: Option<TrainReport>,
}

/// Run one transformer and append its event row, all inside `writer`.
pub(crate) fn apply_in(writer: &mut StateWriter, transformer: &Transformer) -> RepoResult<Applied> {
    let outcome = transform::execute(writer, transformer)?;
    let event = append(writer, transformer)?;
    Ok(Applied {
        changes: outcome.changes,
        description: outcome.description,
        event,
        train: outcome.train,
    })
}

fn append(writer: &mut StateWriter, transformer: &Transformer) -> RepoResult<EslEventRow> {
    let (event_type, json) = esl::encode(transformer)?;
    Ok(writer.append_event(event_type.as_str(), json)?)
}

/// The manifest repository: the single logical writer over a [`StateStore`].
pub struct Repository {
    store: StateStore,
    /// Serializes batches. redb already admits one writer; this keeps a
    /// whole batch (and a whole train) together.
    writer: Mutex<()>,
}

impl Repository {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            writer: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Apply transformers in order, each in its own committed transaction.
    ///
    /// On failure the transformers before the failing one stay committed,
    /// the failing one leaves no trace, and the rest are not attempted.
    pub fn apply(&self, transformers: Vec<Transformer>) -> RepoResult<Vec<Applied>> {
        self.apply_until(None, transformers)
    }

    /// Like [`apply`](Self::apply), but stop before starting a transformer
    /// once `deadline` has passed.
    pub fn apply_until(
        &self,
        deadline: Option<Instant>,
        transformers: Vec<Transformer>,
    ) -> RepoResult<Vec<Applied>> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut results = Vec::with_capacity(transformers.len());

        for (index, transformer) in transformers.iter().enumerate() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(applied = index, remaining = transformers.len() - index, "apply deadline exceeded");
                return Err(RepositoryError::DeadlineExceeded { applied: index });
            }

            let event_type = transformer.event_type();
            let applied = match transformer {
                Transformer::ReleaseTrain(train) => self.run_train(train),
                other => self.apply_one(other),
            }
            .map_err(|e| {
                warn!(index, %event_type, error = %e, "transformer failed");
                RepositoryError::Transformer {
                    index,
                    event_type,
                    source: Box::new(e),
                }
            })?;

            info!(
                sequence = applied.event.sequence,
                %event_type,
                changes = applied.changes.len(),
                "{}",
                applied.description
            );
            results.push(applied);
        }

        Ok(results)
    }

    /// Apply exactly one transformer inside `writer`.
    ///
    /// Runs lock checks, validation, the mutation and the event append; the
    /// caller commits or aborts. A release train deploys every application
    /// inside the same transaction and appends its own row last.
    pub fn apply_transformers_internal(
        &self,
        writer: &mut StateWriter,
        transformer: &Transformer,
    ) -> RepoResult<Applied> {
        apply_in(writer, transformer)
    }

    fn apply_one(&self, transformer: &Transformer) -> RepoResult<Applied> {
        let mut writer = self.store.begin_write()?;
        match apply_in(&mut writer, transformer) {
            Ok(applied) => {
                writer.commit()?;
                Ok(applied)
            }
            Err(e) => {
                // Nothing of this transformer may become visible.
                if let Err(abort) = writer.abort() {
                    warn!(error = %abort, "failed to abort transaction");
                }
                Err(e)
            }
        }
    }

    /// Batch path for a train: one transaction per application deploy, then
    /// one for the train's own event row.
    fn run_train(&self, train: &ReleaseTrain) -> RepoResult<Applied> {
        let steps = {
            let reader = self.store.begin_read()?;
            release_train::plan(&reader, train)?
        };
        debug!(train = %train.target, legs = steps.len(), "release train planned");

        let mut changes = Vec::new();
        let report = release_train::run(&train.target, steps, |leg| {
            let applied = self.apply_one(&Transformer::from(leg.clone()))?;
            changes.extend(applied.changes);
            Ok(())
        })?;

        let mut writer = self.store.begin_write()?;
        let event = append(&mut writer, &Transformer::from(train.clone()))?;
        writer.commit()?;

        Ok(Applied {
            changes,
            description: report.summary(),
            event,
            train: Some(report),
        })
    }

    /// Re-apply recorded history, in sequence order, to this repository.
    ///
    /// Release train rows are skipped: every deploy a train made is recorded
    /// as its own row. Returns the number of transformers applied.
    pub fn replay(&self, rows: &[EslEventRow]) -> RepoResult<usize> {
        let mut transformers = Vec::with_capacity(rows.len());
        for row in rows {
            let transformer = esl::decode_row(row)?;
            if transformer.event_type() == EventType::ReleaseTrain {
                debug!(sequence = row.sequence, "skipping release train row on replay");
                continue;
            }
            transformers.push(transformer);
        }
        let count = transformers.len();
        self.apply(transformers)?;
        info!(rows = rows.len(), applied = count, "history replayed");
        Ok(count)
    }

    /// Event rows with a sequence greater than `since`.
    pub fn history(&self, since: u64) -> RepoResult<Vec<EslEventRow>> {
        Ok(self.store.begin_read()?.events_after(since)?)
    }

    pub fn latest_event(&self) -> RepoResult<Option<EslEventRow>> {
        Ok(self.store.begin_read()?.latest_event()?)
    }
}

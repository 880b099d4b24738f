/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Deduplicating Event Router
//!
//! Gate deciding whether a watch event starts a pipeline run. Each diagnostic
//! identity moves `Unseen -> Processing -> Done` and never back, so a given
//! identity is processed at most once per process lifetime. The map lives in
//! memory only; a restart may process an identity again.
//!
//! The lock is held for the check-and-set only, never across a pipeline run.

use std::collections::HashMap;
use std::sync::Mutex;

/// Kind of change notification received from the watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Updated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Updated => "updated",
        }
    }
}

/// Processing stage of an identity that has passed the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Processing,
    Done,
}

/// Gate verdict for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The caller owns the pipeline run for this identity
    Admitted,
    /// The identity is already processing or done
    AlreadyHandled(Stage),
    /// Update carrying the resource version already seen
    UnchangedRevision,
    /// The event has no usable identity
    MissingIdentity,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }

    /// Short label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Admission::Admitted => "admitted",
            Admission::AlreadyHandled(Stage::Processing) => "processing",
            Admission::AlreadyHandled(Stage::Done) => "done",
            Admission::UnchangedRevision => "unchanged_revision",
            Admission::MissingIdentity => "missing_identity",
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    stage: Option<Stage>,
    last_version: Option<String>,
}

/// Identity map shared by every event-handling task.
#[derive(Debug, Default)]
pub struct DedupRouter {
    entries: Mutex<HashMap<String, Entry>>,
}

impl DedupRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically checks and, when admissible, marks `identity` as processing.
    ///
    /// Update events must also carry a resource version different from the
    /// last one seen for the identity; the version is recorded either way.
    pub fn admit(
        &self,
        kind: EventKind,
        identity: &str,
        resource_version: Option<&str>,
    ) -> Admission {
        if identity.is_empty() {
            return Admission::MissingIdentity;
        }

        let mut entries = self.lock();
        let entry = entries.entry(identity.to_string()).or_default();

        if kind == EventKind::Updated {
            let unchanged = resource_version.is_some()
                && entry.last_version.as_deref() == resource_version;
            if unchanged {
                return Admission::UnchangedRevision;
            }
        }
        if let Some(version) = resource_version {
            entry.last_version = Some(version.to_string());
        }

        match entry.stage {
            Some(stage) => Admission::AlreadyHandled(stage),
            None => {
                entry.stage = Some(Stage::Processing);
                Admission::Admitted
            }
        }
    }

    /// Records that the pipeline run for `identity` has finished.
    pub fn mark_done(&self, identity: &str) {
        let mut entries = self.lock();
        entries.entry(identity.to_string()).or_default().stage = Some(Stage::Done);
    }

    /// Whether any event for `identity` has been seen.
    pub fn has_seen(&self, identity: &str) -> bool {
        self.lock().contains_key(identity)
    }

    /// Current stage of `identity`; `None` means unseen.
    pub fn stage(&self, identity: &str) -> Option<Stage> {
        self.lock().get(identity).and_then(|e| e.stage)
    }

    /// Number of identities that have passed the gate.
    pub fn handled_count(&self) -> usize {
        self.lock().values().filter(|e| e.stage.is_some()).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // The map holds plain data; a panic elsewhere cannot leave it half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

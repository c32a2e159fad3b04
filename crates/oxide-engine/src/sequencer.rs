//! Composite operation sequencer
//!
//! Resources that own a sub-collection (pool ranges, subnet-pool members,
//! instance attachments) converge it with one add or remove call per
//! element. Additions always run before removals so the parent never
//! observes a transient empty collection. The primary update of the parent
//! is issued by the caller afterwards.

use crate::diff::slice_diff;
use async_trait::async_trait;

/// Additions and removals between two collections
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionChanges<T> {
    pub additions: Vec<T>,
    pub removals: Vec<T>,
}

impl<T: PartialEq + Clone> CollectionChanges<T> {
    /// `additions = planned \ prior`, `removals = prior \ planned`
    pub fn between(prior: &[T], planned: &[T]) -> Self {
        Self {
            additions: slice_diff(planned, prior),
            removals: slice_diff(prior, planned),
        }
    }
}

impl<T> CollectionChanges<T> {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    /// Steps in execution order: every add, then every remove.
    pub fn sequence(self) -> Vec<Step<T>> {
        self.additions
            .into_iter()
            .map(Step::Add)
            .chain(self.removals.into_iter().map(Step::Remove))
            .collect()
    }
}

/// A single sub-resource call
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    Add(T),
    Remove(T),
}

impl<T> Step<T> {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Add(_) => StepKind::Add,
            Step::Remove(_) => StepKind::Remove,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Add,
    Remove,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Add => write!(f, "add"),
            StepKind::Remove => write!(f, "remove"),
        }
    }
}

/// Sub-resource operations of one composite resource.
#[async_trait]
pub trait CompositeOps<T: Send + Sync>: Send + Sync {
    type Error: Send;

    async fn add(&self, item: &T) -> Result<(), Self::Error>;

    async fn remove(&self, item: &T) -> Result<(), Self::Error>;

    /// Whether a removal error means the element is already gone
    fn already_gone(&self, err: &Self::Error) -> bool;
}

/// The first failing step; the remote is left partially converged.
#[derive(Debug)]
pub struct StepFailure<E> {
    pub kind: StepKind,
    pub error: E,
}

/// Apply the changes in add-then-remove order.
///
/// The first failing add or remove aborts the sequence. Removals that fail
/// because the element is already gone count as success.
pub async fn apply<T, O>(ops: &O, changes: CollectionChanges<T>) -> Result<(), StepFailure<O::Error>>
where
    T: Send + Sync,
    O: CompositeOps<T> + ?Sized,
{
    for step in changes.sequence() {
        match step {
            Step::Add(item) => {
                ops.add(&item).await.map_err(|error| StepFailure {
                    kind: StepKind::Add,
                    error,
                })?;
            }
            Step::Remove(item) => match ops.remove(&item).await {
                Ok(()) => {}
                Err(e) if ops.already_gone(&e) => {
                    tracing::debug!("sub-resource already removed, skipping");
                }
                Err(error) => {
                    return Err(StepFailure {
                        kind: StepKind::Remove,
                        error,
                    });
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        gone: Vec<u32>,
        fail_add: Option<u32>,
    }

    #[async_trait]
    impl CompositeOps<u32> for Recorder {
        type Error = String;

        async fn add(&self, item: &u32) -> Result<(), String> {
            self.calls.lock().unwrap().push(format!("add {}", item));
            if self.fail_add == Some(*item) {
                return Err("boom".to_string());
            }
            Ok(())
        }

        async fn remove(&self, item: &u32) -> Result<(), String> {
            self.calls.lock().unwrap().push(format!("remove {}", item));
            if self.gone.contains(item) {
                return Err("not found".to_string());
            }
            Ok(())
        }

        fn already_gone(&self, err: &String) -> bool {
            err == "not found"
        }
    }

    #[test]
    fn test_between() {
        let changes = CollectionChanges::between(&[1, 2, 3], &[3, 4]);
        assert_eq!(changes.additions, vec![4]);
        assert_eq!(changes.removals, vec![1, 2]);
        assert!(!changes.is_empty());
        assert!(CollectionChanges::between(&[1, 2], &[2, 1]).is_empty());
    }

    #[test]
    fn test_sequence_adds_first() {
        let steps = CollectionChanges::between(&[1], &[2]).sequence();
        assert_eq!(steps, vec![Step::Add(2), Step::Remove(1)]);
    }

    #[tokio::test]
    async fn test_apply_order() {
        let ops = Recorder::default();
        apply(&ops, CollectionChanges::between(&[1, 2], &[2, 3, 4]))
            .await
            .unwrap();
        assert_eq!(
            *ops.calls.lock().unwrap(),
            vec!["add 3", "add 4", "remove 1"]
        );
    }

    #[tokio::test]
    async fn test_apply_tolerates_already_gone() {
        let ops = Recorder {
            gone: vec![1],
            ..Default::default()
        };
        assert!(
            apply(&ops, CollectionChanges::between(&[1], &[]))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_apply_aborts_on_add_failure() {
        let ops = Recorder {
            fail_add: Some(3),
            ..Default::default()
        };
        let err = apply(&ops, CollectionChanges::between(&[1], &[3, 4]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, StepKind::Add);
        assert_eq!(*ops.calls.lock().unwrap(), vec!["add 3"]);
    }
}

use std::path::Path;

use rand::rngs::StdRng;
use ss_core::LabelRow;

use crate::action::{Action, ActionContext};
use crate::error::PreprocessError;
use crate::sample::Sample;

/// Ordered list of actions applied to one sample at a time.
///
/// Holds only read-only state, so one pipeline can serve several threads.
#[derive(Default)]
pub struct Pipeline {
    actions: Vec<Box<dyn Action>>,
}

impl Pipeline {
    /// Empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action.
    pub fn push(&mut self, action: impl Action + 'static) {
        self.actions.push(Box::new(action));
    }

    /// Builder-style [`Pipeline::push`].
    #[must_use]
    pub fn with(mut self, action: impl Action + 'static) -> Self {
        self.push(action);
        self
    }

    /// Action names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    /// Number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True if the pipeline has no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action on `sample`.
    ///
    /// Label-aware actions receive the current labels and their output
    /// replaces them for the following actions.
    ///
    /// # Errors
    /// Returns `PreprocessError::Action` naming `path` and the failing action.
    pub fn run(
        &self,
        mut sample: Sample,
        mut labels: LabelRow,
        path: &Path,
        rng: &mut StdRng,
    ) -> Result<(Sample, LabelRow), PreprocessError> {
        let mut ctx = ActionContext { path, rng };
        for action in &self.actions {
            let result = if action.needs_labels() {
                action.apply_with_labels(sample, labels, &mut ctx)
            } else {
                action.apply(sample, &mut ctx).map(|s| (s, labels))
            };
            (sample, labels) = result.map_err(|e| PreprocessError::Action {
                path: path.to_path_buf(),
                action: action.name(),
                reason: format!("{e:#}"),
            })?;
        }
        Ok((sample, labels))
    }
}

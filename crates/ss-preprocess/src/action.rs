use std::path::Path;

use anyhow::Result;
use rand::rngs::StdRng;
use ss_core::LabelRow;

use crate::sample::Sample;

/// Per-sample state handed to every action.
pub struct ActionContext<'a> {
    /// File the sample was loaded from.
    pub path: &'a Path,
    /// Randomness source for augmentations.
    pub rng: &'a mut StdRng,
}

/// Une étape du pipeline.
///
/// Une action qui a besoin du vecteur de labels le déclare via
/// [`Action::needs_labels`] ; le pipeline appelle alors
/// [`Action::apply_with_labels`] et propage les labels retournés.
///
/// # Example
/// ```
/// use anyhow::Result;
/// use ss_preprocess::action::{Action, ActionContext};
/// use ss_preprocess::sample::Sample;
///
/// struct Identity;
/// impl Action for Identity {
///     fn name(&self) -> &'static str {
///         "identity"
///     }
///     fn apply(&self, sample: Sample, _ctx: &mut ActionContext<'_>) -> Result<Sample> {
///         Ok(sample)
///     }
/// }
/// assert!(!Identity.needs_labels());
/// ```
pub trait Action: Send + Sync {
    /// Stable name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Whether the pipeline must route the label row through this action.
    fn needs_labels(&self) -> bool {
        false
    }

    /// Transform one sample.
    ///
    /// # Errors
    /// Returns an error if the sample has the wrong kind or cannot be
    /// transformed.
    fn apply(&self, sample: Sample, ctx: &mut ActionContext<'_>) -> Result<Sample>;

    /// Transform one sample and its labels. The returned labels replace the
    /// current ones downstream.
    ///
    /// # Errors
    /// As [`Action::apply`].
    fn apply_with_labels(
        &self,
        sample: Sample,
        labels: LabelRow,
        ctx: &mut ActionContext<'_>,
    ) -> Result<(Sample, LabelRow)> {
        Ok((self.apply(sample, ctx)?, labels))
    }
}

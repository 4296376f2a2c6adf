use anyhow::Result;

use crate::record::FileStatsRecord;
use crate::spectrogram::{BoxTable, Spectrogram};

/// Fournit la table de boîtes et le spectrogramme d'un label.
///
/// Implémenté par : `SpectrogramStore` (lecture d'un cache persistant) et
/// `ComputedSpectrograms` (calcul à la demande depuis l'audio). Les deux
/// sont indiscernables pour le moteur de statistiques.
///
/// # Example
/// ```
/// use ndarray::Array2;
/// use ss_core::spectrogram::{BoxTable, Spectrogram};
/// use ss_core::traits::SpectrogramSource;
///
/// struct Flat;
/// impl SpectrogramSource for Flat {
///     fn load(&self, _label: &str) -> anyhow::Result<(BoxTable, Spectrogram)> {
///         Ok((Vec::new(), Spectrogram::new(Array2::zeros((4, 4)), 1.0)?))
///     }
/// }
/// let (boxes, spec) = Flat.load("x.wav").unwrap();
/// assert!(boxes.is_empty());
/// assert_eq!(spec.width(), 4);
/// ```
pub trait SpectrogramSource: Send + Sync {
    /// Load one label.
    ///
    /// # Errors
    /// Returns an error naming the label if it cannot be produced.
    fn load(&self, label: &str) -> Result<(BoxTable, Spectrogram)>;

    /// Iterate over `labels`, yielding each label's position in the slice
    /// together with its data.
    ///
    /// Stores backed by a batch query may yield in any order; consumers must
    /// place results by the yielded position. The default calls
    /// [`SpectrogramSource::load`] per label, in order.
    fn cursor<'a>(
        &'a self,
        labels: &'a [String],
    ) -> Box<dyn Iterator<Item = (usize, Result<(BoxTable, Spectrogram)>)> + 'a> {
        Box::new(
            labels
                .iter()
                .enumerate()
                .map(move |(idx, label)| (idx, self.load(label))),
        )
    }
}

/// Destination des résultats par label.
///
/// CONTRAT : les écritures de labels différents sont indépendantes et
/// peuvent arriver concurremment depuis plusieurs workers.
pub trait StatsSink: Send + Sync {
    /// Durably store one label's record, replacing any previous one.
    ///
    /// # Errors
    /// Returns an error if the record cannot be stored.
    fn write(&self, record: FileStatsRecord) -> Result<()>;
}

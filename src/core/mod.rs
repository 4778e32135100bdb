//! Data model and snapshot I/O.

pub mod loaders;
pub mod sounding;
pub mod transforms;
pub mod writers;

pub use loaders::{load_snapshot, load_snapshot_with, LoaderError};
pub use sounding::{Channel, ReturnKind, SoundingPoint, SurveySnapshot, Waveform};
pub use transforms::{EquirectangularProjector, PlanarProjector};
pub use writers::{write_decisions_csv, write_excluded_ids, WriteError};

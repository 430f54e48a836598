pub mod events;
pub mod mask;
pub mod sample_set;

pub use events::{ChannelMeta, EventTable, EventView, TableError};
pub use mask::Mask;
pub use sample_set::{
    ExcludedSample, ExclusionKind, HarmonizePolicy, SampleMeta, SampleSet, SampleSetError,
};

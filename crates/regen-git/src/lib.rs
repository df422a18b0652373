#![doc = include_str!("../README.md")]

pub mod engine;
pub mod store;
pub mod sync;

mod error;

pub use engine::{
    FileOutcome, Generator, RegenJob, RegenOptions, StagedOutput, TargetReport,
    read_staged_tree, regenerate_all, regenerate_target, regenerate_with_generator,
    regenerate_with_store,
};
pub use error::{EngineError, StoreError};
pub use store::{
    GEN_REF_PREFIX, PristineEntry, PristineFile, PristineIndex, ProvenanceStore, RefInfo, gen_ref,
};
pub use sync::{
    PushOutcome, RefAvailability, SyncOptions, SyncState, ensure_ref_available, probe_state,
    publish_ref,
};

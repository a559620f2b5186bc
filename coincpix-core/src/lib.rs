//! coincpix-core: Core types for photon-coincidence analysis.
//!
//! This crate provides the coincidence event array model, the dataset cell
//! and update bus used by a session, beam regions, the versioned session
//! configuration and the interface to the external detector toolkit.
//!

pub mod beam;
pub mod config;
pub mod dataset;
pub mod error;
pub mod event;
pub mod toolkit;

pub use beam::{Beam, BeamSelection};
pub use config::{
    LegacyRecall, ProcessingSettings, ReferenceParams, SessionConfig, SourceFiles, TimeWindow,
    CONFIG_VERSION, LEGACY_RECALL_VERSION,
};
pub use dataset::{
    DatasetCell, DatasetChanged, DatasetKind, DatasetListener, ListenerId, ObservedDataset,
    UpdateBus,
};
pub use error::{Error, Result};
pub use event::{Channel, CoincidenceEvents, CoincidenceRecord, Field, Hit, SpatialAxis};
pub use toolkit::{DetectorToolkit, PixelHit, ProcessRequest, RawCapture, TdcRecord};

//! Deciding when to stop looking and committing to one crop

pub mod controller;
pub mod policy;

pub use controller::{CaptureController, CaptureEvent};
pub use policy::{
    CandidateSet, CaptureAction, CapturePolicyConfig, CapturePreset, CaptureSession,
    CaptureState, SelectionRule,
};

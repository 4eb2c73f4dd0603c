//! # Chaos Controller
//!
//! A Kubernetes controller that injects faults into the pods selected by
//! chaos experiments and guarantees their recovery.
//!
//! ## Overview
//!
//! For every `HTTPChaos`, `NetworkChaos` and `PodChaos` object the controller:
//!
//! 1. **Selects targets** - resolves the experiment's pod selectors under the
//!    controller's namespace policy
//! 2. **Tracks targets** - records every target as a finalizer key on the
//!    experiment before touching it
//! 3. **Injects concurrently** - dispatches the fault to every target with a
//!    bounded, cancel-on-first-error batch
//! 4. **Recovers** - reverses the fault on every tracked target when the
//!    experiment is paused or deleted, releasing keys as targets recover
//!
//! The finalizer set on the experiment is the source of truth for what still
//! needs recovery, so a partially applied experiment can always be cleaned up.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod injector;
pub mod observability;
pub mod runtime;
pub mod store;

pub use crd::{
    ChaosPhase, ChaosStatus, Experiment, ExperimentKind, HTTPChaos, NetworkChaos, PodChaos,
    PodSelectorSpec,
};

//! # Experiment
//!
//! Tagged union over every experiment kind the controller understands.
//!
//! The store hands the reconciler concrete CRD objects; converting them into an
//! [`Experiment`] once at the edge lets the rest of the controller dispatch on
//! [`ExperimentKind`] with exhaustive matches instead of runtime downcasts.

use super::{ChaosStatus, HTTPChaos, NetworkChaos, PodChaos};
use crate::constants::PAUSE_ANNOTATION;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Registered experiment kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ExperimentKind {
    Http,
    Network,
    Pod,
}

impl ExperimentKind {
    pub const ALL: [ExperimentKind; 3] = [
        ExperimentKind::Http,
        ExperimentKind::Network,
        ExperimentKind::Pod,
    ];

    /// Kubernetes kind name
    pub fn as_str(self) -> &'static str {
        match self {
            ExperimentKind::Http => "HTTPChaos",
            ExperimentKind::Network => "NetworkChaos",
            ExperimentKind::Pod => "PodChaos",
        }
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExperimentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown experiment kind '{s}'"))
    }
}

/// A chaos experiment of any registered kind
#[derive(Debug, Clone, PartialEq)]
pub enum Experiment {
    Http(HTTPChaos),
    Network(NetworkChaos),
    Pod(PodChaos),
}

/// Applies the same expression to whichever concrete object is held
macro_rules! on_each {
    ($self:expr, $obj:ident => $body:expr) => {
        match $self {
            Experiment::Http($obj) => $body,
            Experiment::Network($obj) => $body,
            Experiment::Pod($obj) => $body,
        }
    };
}

impl Experiment {
    pub fn kind(&self) -> ExperimentKind {
        match self {
            Experiment::Http(_) => ExperimentKind::Http,
            Experiment::Network(_) => ExperimentKind::Network,
            Experiment::Pod(_) => ExperimentKind::Pod,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        on_each!(self, obj => &obj.metadata)
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        on_each!(self, obj => &mut obj.metadata)
    }

    pub fn status(&self) -> Option<&ChaosStatus> {
        on_each!(self, obj => obj.status.as_ref())
    }

    pub fn status_mut(&mut self) -> &mut Option<ChaosStatus> {
        on_each!(self, obj => &mut obj.status)
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or("unknown")
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or("default")
    }

    /// `namespace/name` of the experiment object itself
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }

    pub fn finalizers(&self) -> &[String] {
        self.meta().finalizers.as_deref().unwrap_or_default()
    }

    pub fn set_finalizers(&mut self, finalizers: Vec<String>) {
        self.meta_mut().finalizers = if finalizers.is_empty() {
            None
        } else {
            Some(finalizers)
        };
    }

    /// Deletion has been requested and is waiting on finalizers
    pub fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    /// The pause annotation ends the experiment without deleting it
    pub fn is_paused(&self) -> bool {
        self.meta()
            .annotations
            .as_ref()
            .and_then(|ann| ann.get(PAUSE_ANNOTATION))
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn object_ref(&self) -> ObjectReference {
        on_each!(self, obj => obj.object_ref(&()))
    }

    /// Identity handed to injectors so faults can be tagged and cleared per experiment
    pub fn reference(&self) -> ExperimentRef {
        ExperimentRef {
            kind: self.kind(),
            namespace: self.namespace().to_string(),
            name: self.name().to_string(),
            uid: self.meta().uid.clone(),
        }
    }

    pub fn as_http(&self) -> Option<&HTTPChaos> {
        match self {
            Experiment::Http(chaos) => Some(chaos),
            _ => None,
        }
    }

    pub fn as_network(&self) -> Option<&NetworkChaos> {
        match self {
            Experiment::Network(chaos) => Some(chaos),
            _ => None,
        }
    }

    pub fn as_pod(&self) -> Option<&PodChaos> {
        match self {
            Experiment::Pod(chaos) => Some(chaos),
            _ => None,
        }
    }
}

impl From<HTTPChaos> for Experiment {
    fn from(chaos: HTTPChaos) -> Self {
        Experiment::Http(chaos)
    }
}

impl From<NetworkChaos> for Experiment {
    fn from(chaos: NetworkChaos) -> Self {
        Experiment::Network(chaos)
    }
}

impl From<PodChaos> for Experiment {
    fn from(chaos: PodChaos) -> Self {
        Experiment::Pod(chaos)
    }
}

/// Serializable identity of an experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRef {
    pub kind: ExperimentKind,
    pub namespace: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl fmt::Display for ExperimentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind, self.namespace, self.name)
    }
}

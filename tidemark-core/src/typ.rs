//! Type configuration trait bundling the collaborator implementations a
//! [`crate::pipeline::PipelineOrchestrator`] is wired with, so one generic
//! parameter carries the whole set.

use crate::job::{InMemoryJobStore, JobStore};
use crate::quarantine::{LogQuarantine, Quarantine};
use crate::sink::{Destination, StreamPublisher};

pub trait TidemarkTypeConfig: Send + Sync + 'static {
    type JobStore: JobStore + Send + Sync + 'static;
    type Destination: Destination + Send + Sync + 'static;
    type StreamPublisher: StreamPublisher + Send + Sync + 'static;
    type Quarantine: Quarantine + Send + Sync + 'static;
}

/// Convenience config for a fully in-process deployment: volatile job
/// history and log-only quarantine, generic over the delivery collaborators.
pub struct InProcess<D, P> {
    _marker: std::marker::PhantomData<(D, P)>,
}

impl<D, P> TidemarkTypeConfig for InProcess<D, P>
where
    D: Destination + Send + Sync + 'static,
    P: StreamPublisher + Send + Sync + 'static,
{
    type JobStore = InMemoryJobStore;
    type Destination = D;
    type StreamPublisher = P;
    type Quarantine = LogQuarantine;
}

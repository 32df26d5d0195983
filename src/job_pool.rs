//! The executor workers are submitted to.
//!
//! The pool belongs to the surrounding runtime and is shared with other
//! destinations; a destination only submits jobs to it.

use futures::future::BoxFuture;

/// A shared pool that runs submitted jobs concurrently.
///
/// Submission is fire-and-forget: there is no handle to await a job or observe
/// its failure.
pub trait JobPool: Send + Sync {
    fn submit(&self, job: BoxFuture<'static, ()>);
}

impl JobPool for tokio::runtime::Handle {
    fn submit(&self, job: BoxFuture<'static, ()>) {
        self.spawn(job);
    }
}

//! Collective operations across a group of cooperating processes.
//!
//! The transport is somebody else's problem; this crate only needs the
//! capability set in [`ProcessGroup`]. Payloads are `serde_json::Value`s so
//! the trait stays object safe; [`broadcast_as`], [`gather_as`] and
//! [`scatter_as`] add typed views on top.
//!
//! A collective that is interrupted because a peer called
//! [`ProcessGroup::barrier_abort`] fails with
//! [`ErrorKind::GroupAbortRequested`](crate::error::ErrorKind::GroupAbortRequested).

mod local;

pub use local::LocalGroup;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ErrorKind, ErrorRecord, LiveResult};

/// Rank of the coordinating process.
pub const COORDINATOR: usize = 0;

/// Capability set of a process group.
pub trait ProcessGroup: Send + Sync {
    /// This process's rank, `0..group_size()`.
    fn rank(&self) -> usize;

    fn group_size(&self) -> usize;

    fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR
    }

    /// True when more than one process takes part.
    fn is_parallel(&self) -> bool {
        self.group_size() > 1
    }

    /// Every rank receives the coordinator's `value`.
    fn broadcast(&self, value: Value) -> LiveResult<Value>;

    /// The coordinator receives one value per rank, in rank order; the other
    /// ranks receive an empty list.
    fn gather(&self, value: Value) -> LiveResult<Vec<Value>>;

    /// The coordinator supplies one value per rank; each rank receives its own.
    fn scatter(&self, values: Vec<Value>) -> LiveResult<Value>;

    /// Ask every process in the group to stop. Never blocks.
    fn barrier_abort(&self, code: i32);
}

/// The group of a process running on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct Standalone;

impl ProcessGroup for Standalone {
    fn rank(&self) -> usize {
        COORDINATOR
    }

    fn group_size(&self) -> usize {
        1
    }

    fn broadcast(&self, value: Value) -> LiveResult<Value> {
        Ok(value)
    }

    fn gather(&self, value: Value) -> LiveResult<Vec<Value>> {
        Ok(vec![value])
    }

    fn scatter(&self, values: Vec<Value>) -> LiveResult<Value> {
        values.into_iter().next().ok_or_else(|| {
            ErrorRecord::fatal(ErrorKind::Collective, "scatter needs one value per rank")
                .in_function("Standalone::scatter")
        })
    }

    fn barrier_abort(&self, code: i32) {
        tracing::debug!("[group] abort({code}) requested on a standalone process");
    }
}

fn encode<T: Serialize>(value: &T) -> LiveResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        ErrorRecord::fatal(ErrorKind::Collective, format!("cannot encode payload: {e}"))
    })
}

fn decode<T: DeserializeOwned>(value: Value) -> LiveResult<T> {
    serde_json::from_value(value).map_err(|e| {
        ErrorRecord::fatal(ErrorKind::Collective, format!("cannot decode payload: {e}"))
    })
}

/// Typed [`ProcessGroup::broadcast`].
pub fn broadcast_as<T>(group: &dyn ProcessGroup, value: &T) -> LiveResult<T>
where
    T: Serialize + DeserializeOwned,
{
    decode(group.broadcast(encode(value)?)?)
}

/// Typed [`ProcessGroup::gather`].
pub fn gather_as<T>(group: &dyn ProcessGroup, value: &T) -> LiveResult<Vec<T>>
where
    T: Serialize + DeserializeOwned,
{
    group.gather(encode(value)?)?.into_iter().map(decode).collect()
}

/// Typed [`ProcessGroup::scatter`]. Non-coordinators may pass an empty slice.
pub fn scatter_as<T>(group: &dyn ProcessGroup, values: &[T]) -> LiveResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let encoded = values.iter().map(encode).collect::<LiveResult<Vec<_>>>()?;
    decode(group.scatter(encoded)?)
}

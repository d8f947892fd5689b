//! In-process process group: one endpoint per thread.
//!
//! Used to exercise collective code paths, including group abort, without a
//! real multi-process transport.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde_json::Value;

use super::{COORDINATOR, ProcessGroup};
use crate::error::{ErrorKind, ErrorRecord, LiveResult};

#[derive(Debug)]
enum Message {
    Data { from: usize, payload: Value },
    Abort { from: usize, code: i32 },
}

/// First abort issued in the group: `(origin rank, code)`.
#[derive(Debug, Default)]
struct AbortFlag(Mutex<Option<(usize, i32)>>);

/// One rank's endpoint of a simulated group.
pub struct LocalGroup {
    rank: usize,
    size: usize,
    inbox: Receiver<Message>,
    /// Senders to every other rank; `None` at our own rank.
    peers: Vec<Option<Sender<Message>>>,
    /// Messages that arrived from a rank we were not waiting on yet.
    pending: Mutex<VecDeque<(usize, Value)>>,
    abort: Arc<AbortFlag>,
}

impl std::fmt::Debug for LocalGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalGroup")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl LocalGroup {
    /// Endpoints for a group of `size` ranks, index = rank.
    pub fn create(size: usize) -> Vec<LocalGroup> {
        let size = size.max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        let abort = Arc::new(AbortFlag::default());

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalGroup {
                rank,
                size,
                inbox,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, tx)| (peer != rank).then(|| tx.clone()))
                    .collect(),
                pending: Mutex::new(VecDeque::new()),
                abort: abort.clone(),
            })
            .collect()
    }

    fn abort_error(&self, origin_rank: usize, code: i32) -> ErrorRecord {
        ErrorRecord::fatal(
            ErrorKind::GroupAbortRequested { origin_rank, code },
            format!("rank {origin_rank} aborted the group with code {code}"),
        )
    }

    fn check_abort(&self) -> LiveResult<()> {
        match *self.abort.0.lock() {
            Some((origin, code)) => Err(self.abort_error(origin, code)),
            None => Ok(()),
        }
    }

    fn send(&self, to: usize, payload: Value) -> LiveResult<()> {
        self.check_abort()?;
        let Some(Some(tx)) = self.peers.get(to) else {
            return Err(ErrorRecord::fatal(
                ErrorKind::Collective,
                format!("rank {} cannot send to rank {to}", self.rank),
            ));
        };
        tx.send(Message::Data {
            from: self.rank,
            payload,
        })
        .map_err(|_| {
            ErrorRecord::fatal(
                ErrorKind::Collective,
                format!("rank {to} left the group"),
            )
        })
    }

    fn recv_from(&self, from: usize) -> LiveResult<Value> {
        loop {
            self.check_abort()?;

            {
                let mut pending = self.pending.lock();
                if let Some(pos) = pending.iter().position(|(src, _)| *src == from) {
                    if let Some((_, payload)) = pending.remove(pos) {
                        return Ok(payload);
                    }
                }
            }

            match self.inbox.recv() {
                Ok(Message::Data { from: src, payload }) if src == from => return Ok(payload),
                Ok(Message::Data { from: src, payload }) => {
                    self.pending.lock().push_back((src, payload));
                }
                Ok(Message::Abort { from: origin, code }) => {
                    return Err(self.abort_error(origin, code));
                }
                Err(_) => {
                    return Err(ErrorRecord::fatal(
                        ErrorKind::Collective,
                        format!("rank {} lost every peer while waiting on rank {from}", self.rank),
                    ));
                }
            }
        }
    }
}

impl ProcessGroup for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn group_size(&self) -> usize {
        self.size
    }

    fn broadcast(&self, value: Value) -> LiveResult<Value> {
        if self.is_coordinator() {
            for rank in 1..self.size {
                self.send(rank, value.clone())?;
            }
            Ok(value)
        } else {
            self.recv_from(COORDINATOR)
        }
    }

    fn gather(&self, value: Value) -> LiveResult<Vec<Value>> {
        if self.is_coordinator() {
            let mut values = Vec::with_capacity(self.size);
            values.push(value);
            for rank in 1..self.size {
                values.push(self.recv_from(rank)?);
            }
            Ok(values)
        } else {
            self.send(COORDINATOR, value)?;
            Ok(Vec::new())
        }
    }

    fn scatter(&self, values: Vec<Value>) -> LiveResult<Value> {
        if self.is_coordinator() {
            if values.len() != self.size {
                return Err(ErrorRecord::fatal(
                    ErrorKind::Collective,
                    format!(
                        "scatter needs {} values, got {}",
                        self.size,
                        values.len()
                    ),
                )
                .in_function("LocalGroup::scatter"));
            }
            let mut values = values.into_iter();
            let own = values.next().unwrap_or(Value::Null);
            for (offset, value) in values.enumerate() {
                self.send(offset + 1, value)?;
            }
            Ok(own)
        } else {
            self.recv_from(COORDINATOR)
        }
    }

    fn barrier_abort(&self, code: i32) {
        {
            let mut flag = self.abort.0.lock();
            if flag.is_none() {
                *flag = Some((self.rank, code));
            }
        }
        for tx in self.peers.iter().flatten() {
            // Peers that already left need no wake-up.
            let _ = tx.send(Message::Abort {
                from: self.rank,
                code,
            });
        }
        crate::debug_event!("group", "abort", "rank {} code {code}", self.rank);
    }
}

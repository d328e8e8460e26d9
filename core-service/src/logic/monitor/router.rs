//! Session routing table.
//!
//! At most one worker exists per session id. A worker may only retire while
//! holding the table lock with an empty queue, so a command is never handed
//! to a worker that is about to exit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use super::worker::{self, Command};
use super::Shared;

struct Route {
    generation: u64,
    tx: UnboundedSender<Command>,
}

pub(crate) struct Router {
    shared: Arc<Shared>,
    routes: Mutex<HashMap<Uuid, Route>>,
    generations: AtomicU64,
}

impl Router {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            routes: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn len(&self) -> usize {
        self.routes.lock().len()
    }

    /// Queue a command, spawning the session's worker if none is live
    pub fn send(self: &Arc<Self>, session_id: Uuid, command: Command) {
        let mut routes = self.routes.lock();

        let command = match routes.get(&session_id) {
            Some(route) => match route.tx.send(command) {
                Ok(()) => return,
                // worker died without retiring
                Err(mpsc::error::SendError(command)) => command,
            },
            None => command,
        };

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        // cannot fail: the receiver is held below
        let _ = tx.send(command);
        routes.insert(session_id, Route { generation, tx });
        drop(routes);

        log::debug!("Spawning worker for session {} (generation {})", session_id, generation);
        tokio::spawn(worker::run(session_id, generation, rx, self.clone()));
    }

    /// Retire an idle worker. Fails if anything is queued.
    pub fn retire(&self, session_id: Uuid, generation: u64, rx: &mut UnboundedReceiver<Command>) -> bool {
        let mut routes = self.routes.lock();
        if !rx.is_empty() {
            return false;
        }
        if routes.get(&session_id).map(|r| r.generation) == Some(generation) {
            routes.remove(&session_id);
        }
        rx.close();
        true
    }

    /// Unconditionally drop a worker's route; queued commands stay in `rx`
    pub fn detach(&self, session_id: Uuid, generation: u64, rx: &mut UnboundedReceiver<Command>) {
        let mut routes = self.routes.lock();
        if routes.get(&session_id).map(|r| r.generation) == Some(generation) {
            routes.remove(&session_id);
        }
        rx.close();
    }
}

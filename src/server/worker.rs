//! # Workers
//! src/server/worker.rs
//!
//! Cada worker saca conexiones de la cola y las atiende hasta que se
//! cierran. El contador de workers vivos permite que el aceptador espere
//! a que todos terminen antes de marcar el contexto como detenido.

use super::connection::{Accepted, Connection};
use super::context::Shared;
use log::debug;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Cantidad de workers vivos
#[derive(Debug, Default)]
pub struct WorkerCount {
    alive: Mutex<usize>,
    done: Condvar,
}

impl WorkerCount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un worker antes de crear su thread
    pub fn register(&self) {
        *self.alive.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    /// Un worker terminó (o su thread no se pudo crear)
    pub fn exited(&self) {
        let mut alive = self.alive.lock().unwrap_or_else(PoisonError::into_inner);
        *alive = alive.saturating_sub(1);
        if *alive == 0 {
            self.done.notify_all();
        }
    }

    pub fn alive(&self) -> usize {
        *self.alive.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bloquea hasta que no quede ningún worker
    pub fn wait_all(&self) {
        let mut alive = self.alive.lock().unwrap_or_else(PoisonError::into_inner);
        while *alive > 0 {
            alive = self.done.wait(alive).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Descuenta el worker aunque el thread termine con panic
struct ExitGuard<'a>(&'a WorkerCount);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.exited();
    }
}

/// Cuerpo de cada thread worker
pub(crate) fn worker_loop(shared: Arc<Shared>) {
    let _guard = ExitGuard(&shared.workers);
    while let Some(accepted) = shared.queue.pop() {
        serve(&shared, accepted);
    }
    debug!("Worker {:?} terminado", std::thread::current().name());
}

fn serve(shared: &Arc<Shared>, accepted: Accepted) {
    if let Some(mut conn) = Connection::establish(Arc::clone(shared), accepted) {
        conn.process();
        conn.close();
    }
}

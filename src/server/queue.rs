//! # Cola de Conexiones
//! src/server/queue.rs
//!
//! Cola FIFO acotada entre el thread aceptador (productor) y los workers
//! (consumidores). Un solo mutex protege los slots, los contadores y el
//! flag de parada; dos condvars despiertan a cada lado.
//!
//! `head` y `tail` cuentan elementos consumidos y producidos desde el
//! inicio; el slot de cada uno es `contador % capacidad`.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Capacidad por defecto de la cola
pub const QUEUE_CAPACITY: usize = 20;

struct QueueState<T> {
    slots: Vec<Option<T>>,
    head: u64,
    tail: u64,
    stopped: bool,
}

impl<T> QueueState<T> {
    fn len(&self) -> usize {
        (self.tail - self.head) as usize
    }
}

/// Cola acotada thread-safe
pub struct ConnectionQueue<T> {
    state: Mutex<QueueState<T>>,

    /// Se señala al producir un elemento
    item_ready: Condvar,

    /// Se señala al liberar un slot
    slot_free: Condvar,

    capacity: usize,
}

impl<T> ConnectionQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                stopped: false,
            }),
            item_ready: Condvar::new(),
            slot_free: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encola un elemento, bloqueando mientras la cola esté llena.
    ///
    /// Si la cola se detiene antes de poder encolar, retorna el elemento
    /// para que el llamador lo descarte.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        while state.len() == self.capacity && !state.stopped {
            state = self
                .slot_free
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.stopped {
            return Err(item);
        }

        let index = (state.tail % self.capacity as u64) as usize;
        state.slots[index] = Some(item);
        state.tail += 1;
        self.item_ready.notify_one();
        Ok(())
    }

    /// Desencola el elemento más antiguo, bloqueando mientras esté vacía.
    ///
    /// Retorna `None` cuando la cola fue detenida.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        while state.len() == 0 && !state.stopped {
            state = self
                .item_ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.stopped {
            return None;
        }

        let index = (state.head % self.capacity as u64) as usize;
        let item = state.slots[index].take();
        state.head += 1;
        self.slot_free.notify_one();
        item
    }

    /// Detiene la cola, despierta a todos los que esperan y retorna los
    /// elementos que no llegaron a consumirse.
    pub fn shutdown(&self) -> Vec<T> {
        let mut state = self.lock();
        state.stopped = true;

        let mut pending = Vec::with_capacity(state.len());
        while state.head < state.tail {
            let index = (state.head % self.capacity as u64) as usize;
            if let Some(item) = state.slots[index].take() {
                pending.push(item);
            }
            state.head += 1;
        }

        self.item_ready.notify_all();
        self.slot_free.notify_all();
        pending
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

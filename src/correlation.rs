//! Pairing of asynchronous replies with the connection that issued the
//! request.
//!
//! When a connection opens an application-facing stream it records a
//! [`Correlation`] under a fresh [`CorrelationId`]. The application's reply
//! carries that id back; the reply stream removes the entry and drives the
//! connection's engine. Each entry is consumed at most once.

use std::{
    cell::RefCell,
    collections::{HashMap, hash_map::Entry},
    fmt,
    rc::Rc,
};

use thiserror::Error;

use crate::{
    engine::EngineHandle,
    frame::{CorrelationId, StreamId},
};

/// Errors raised by [`CorrelationTable`] operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationError {
    /// An entry for this id is already outstanding.
    #[error("correlation {0} is already outstanding")]
    Duplicate(CorrelationId),
}

/// Outstanding request awaiting its reply.
pub struct Correlation<E> {
    id: CorrelationId,
    request_id: StreamId,
    engine: EngineHandle<E>,
}

impl<E> Correlation<E> {
    /// Create a correlation for the request stream `request_id`.
    #[must_use]
    pub fn new(id: CorrelationId, request_id: StreamId, engine: EngineHandle<E>) -> Self {
        Self {
            id,
            request_id,
            engine,
        }
    }

    /// Identifier the reply will carry.
    #[must_use]
    pub const fn id(&self) -> CorrelationId { self.id }

    /// Stream on which the request was sent.
    #[must_use]
    pub const fn request_id(&self) -> StreamId { self.request_id }

    /// Engine of the connection that issued the request.
    #[must_use]
    pub fn engine(&self) -> &EngineHandle<E> { &self.engine }
}

impl<E> fmt::Debug for Correlation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlation")
            .field("id", &self.id)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

/// Outstanding correlations keyed by [`CorrelationId`].
///
/// Clones share the same entries.
pub struct CorrelationTable<E>(Rc<RefCell<HashMap<CorrelationId, Correlation<E>>>>);

impl<E> Default for CorrelationTable<E> {
    fn default() -> Self { Self(Rc::new(RefCell::new(HashMap::new()))) }
}

impl<E> Clone for CorrelationTable<E> {
    fn clone(&self) -> Self { Self(Rc::clone(&self.0)) }
}

impl<E> fmt::Debug for CorrelationTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CorrelationTable").field(&self.len()).finish()
    }
}

impl<E> CorrelationTable<E> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Record an outstanding request.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Duplicate`] and keeps the existing entry
    /// when the id is already outstanding.
    pub fn insert(&self, correlation: Correlation<E>) -> Result<(), CorrelationError> {
        match self.0.borrow_mut().entry(correlation.id) {
            Entry::Occupied(occupied) => Err(CorrelationError::Duplicate(*occupied.key())),
            Entry::Vacant(vacant) => {
                vacant.insert(correlation);
                Ok(())
            }
        }
    }

    /// Consume the entry for `id`, if still outstanding.
    pub fn remove(&self, id: CorrelationId) -> Option<Correlation<E>> {
        self.0.borrow_mut().remove(&id)
    }

    /// Whether an entry for `id` is outstanding.
    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool { self.0.borrow().contains_key(&id) }

    /// Number of outstanding entries.
    #[must_use]
    pub fn len(&self) -> usize { self.0.borrow().len() }

    /// Whether no entries are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.borrow().is_empty() }
}

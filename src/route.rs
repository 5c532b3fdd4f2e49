//! Routing collaborator consulted by the stream factory.
//!
//! [`Router`] is the narrow surface the bridge needs: resolve a route for an
//! inbound begin, supply the target a named component reads from, and
//! register throttle handlers for the streams the bridge writes to.
//! [`RouteTable`] is a plain in-memory implementation.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use log::warn;
use thiserror::Error;

use crate::{
    frame::{Message, StreamId},
    stream::{MessageConsumer, Target, ThrottleHandler},
};

/// Binding of an inbound `(source, source_ref)` to an application target.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    /// Component the inbound streams come from.
    pub source: String,
    /// Routing reference carried by inbound begins.
    pub source_ref: u64,
    /// Component application streams are opened on.
    pub target: String,
    /// Routing reference for the application side.
    pub target_ref: u64,
}

impl Route {
    /// Create a route.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        source_ref: u64,
        target: impl Into<String>,
        target_ref: u64,
    ) -> Self {
        Self {
            source: source.into(),
            source_ref,
            target: target.into(),
            target_ref,
        }
    }
}

/// Errors raised while editing a [`RouteTable`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// A route for this source and reference already exists.
    #[error("route for {component} with reference {source_ref} already exists")]
    Duplicate {
        /// Route source.
        component: String,
        /// Route reference.
        source_ref: u64,
    },
}

/// Routing surface used by the bridge.
pub trait Router {
    /// Return the first route accepted by `filter`.
    fn resolve(&self, filter: &dyn Fn(&Route) -> bool) -> Option<Route>;

    /// Return the target that delivers messages to the component `name`.
    fn supply_target(&self, name: &str) -> Target;

    /// Register `handler` for credit and resets on `stream_id`, written to
    /// the component `name`.
    fn set_throttle(&self, name: &str, stream_id: StreamId, handler: Rc<dyn ThrottleHandler>);

    /// Drop the throttle registration for `stream_id`.
    fn clear_throttle(&self, name: &str, stream_id: StreamId);

    /// Look up the throttle handler registered for `stream_id`.
    fn throttle(&self, stream_id: StreamId) -> Option<Rc<dyn ThrottleHandler>>;
}

struct Discard(String);

impl MessageConsumer for Discard {
    fn accept(&self, message: Message) {
        warn!(
            "discarding {} for {}: no target named {}",
            message.kind(),
            message.stream_id(),
            self.0
        );
    }
}

/// In-memory [`Router`].
///
/// Routes are matched in insertion order. Unknown target names resolve to a
/// target that drops messages with a warning.
#[derive(Default)]
pub struct RouteTable {
    routes: RefCell<Vec<Route>>,
    targets: RefCell<HashMap<String, Target>>,
    throttles: RefCell<HashMap<StreamId, Rc<dyn ThrottleHandler>>>,
}

impl RouteTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Add a route.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Duplicate`] when a route with the same source
    /// and reference exists.
    pub fn add_route(&self, route: Route) -> Result<(), RouteError> {
        let mut routes = self.routes.borrow_mut();
        let duplicate = routes
            .iter()
            .any(|r| r.source == route.source && r.source_ref == route.source_ref);
        if duplicate {
            return Err(RouteError::Duplicate {
                component: route.source,
                source_ref: route.source_ref,
            });
        }
        routes.push(route);
        Ok(())
    }

    /// Remove the route for `source` and `source_ref`, returning it.
    pub fn remove_route(&self, source: &str, source_ref: u64) -> Option<Route> {
        let mut routes = self.routes.borrow_mut();
        let index = routes
            .iter()
            .position(|r| r.source == source && r.source_ref == source_ref)?;
        Some(routes.remove(index))
    }

    /// Register the target for component `name`, replacing any previous one.
    pub fn register_target(&self, name: impl Into<String>, target: Target) {
        self.targets.borrow_mut().insert(name.into(), target);
    }

    /// Number of registered throttle handlers.
    #[must_use]
    pub fn throttle_count(&self) -> usize { self.throttles.borrow().len() }
}

impl Router for RouteTable {
    fn resolve(&self, filter: &dyn Fn(&Route) -> bool) -> Option<Route> {
        self.routes.borrow().iter().find(|route| filter(route)).cloned()
    }

    fn supply_target(&self, name: &str) -> Target {
        match self.targets.borrow().get(name) {
            Some(target) => Rc::clone(target),
            None => Rc::new(Discard(name.to_owned())),
        }
    }

    fn set_throttle(&self, _name: &str, stream_id: StreamId, handler: Rc<dyn ThrottleHandler>) {
        self.throttles.borrow_mut().insert(stream_id, handler);
    }

    fn clear_throttle(&self, _name: &str, stream_id: StreamId) {
        self.throttles.borrow_mut().remove(&stream_id);
    }

    fn throttle(&self, stream_id: StreamId) -> Option<Rc<dyn ThrottleHandler>> {
        self.throttles.borrow().get(&stream_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rstest::{fixture, rstest};

    use super::*;
    use crate::frame::Reset;

    #[fixture]
    fn table() -> RouteTable {
        let table = RouteTable::new();
        table
            .add_route(Route::new("tcp", 7, "app", 1))
            .expect("fresh route");
        table
            .add_route(Route::new("tls", 7, "secure-app", 1))
            .expect("fresh route");
        table
    }

    #[rstest]
    fn resolve_matches_source_and_reference(table: RouteTable) {
        let route = table
            .resolve(&|r: &Route| r.source == "tls" && r.source_ref == 7)
            .expect("route");
        assert_eq!(route.target, "secure-app");
        assert!(table.resolve(&|r: &Route| r.source_ref == 8).is_none());
    }

    #[rstest]
    fn duplicate_routes_are_rejected(table: RouteTable) {
        assert_eq!(
            table.add_route(Route::new("tcp", 7, "other", 2)),
            Err(RouteError::Duplicate {
                component: "tcp".to_owned(),
                source_ref: 7,
            })
        );
        assert!(table.remove_route("tcp", 7).is_some());
        assert!(table.add_route(Route::new("tcp", 7, "other", 2)).is_ok());
    }

    struct CountingThrottle(Cell<usize>);

    impl ThrottleHandler for CountingThrottle {
        fn handle_throttle(&self, _message: Message) { self.0.set(self.0.get() + 1); }
    }

    #[rstest]
    fn throttles_register_and_clear(table: RouteTable) {
        let handler = Rc::new(CountingThrottle(Cell::new(0)));
        table.set_throttle("app", StreamId::new(3), handler.clone());
        let found = table.throttle(StreamId::new(3)).expect("registered");
        found.handle_throttle(Message::Reset(Reset::new(StreamId::new(3))));
        assert_eq!(handler.0.get(), 1);

        table.clear_throttle("app", StreamId::new(3));
        assert!(table.throttle(StreamId::new(3)).is_none());
        assert_eq!(table.throttle_count(), 0);
    }

    #[rstest]
    fn unknown_target_discards(table: RouteTable) {
        let target = table.supply_target("missing");
        target.accept(Message::Reset(Reset::new(StreamId::new(1))));
    }
}

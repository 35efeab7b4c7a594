//! # Routers
//!
//! Message routes and query routes of one protocol version. Both are built
//! once through a builder and frozen before the protocol is activated, so
//! a route table can never change while blocks execute.

use hub_02_modules::{Handler, Querier};
use shared_types::FatalError;
use std::collections::HashMap;
use std::sync::Arc;

/// Route name to message handler.
#[derive(Default)]
pub struct RouterBuilder {
    order: Vec<&'static str>,
    routes: HashMap<&'static str, Arc<dyn Handler>>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`. A name can be registered once.
    pub fn add_route(mut self, name: &'static str, handler: Arc<dyn Handler>) -> Result<Self, FatalError> {
        if self.routes.contains_key(name) {
            return Err(FatalError::DuplicateRoute(name.to_string()));
        }
        self.order.push(name);
        self.routes.insert(name, handler);
        Ok(self)
    }

    pub fn freeze(self) -> Router {
        Router {
            order: self.order,
            routes: self.routes,
        }
    }
}

pub struct Router {
    order: Vec<&'static str>,
    routes: HashMap<&'static str, Arc<dyn Handler>>,
}

impl Router {
    pub fn route(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.routes.get(name)
    }

    /// Route names in registration order.
    pub fn names(&self) -> &[&'static str] {
        &self.order
    }
}

/// Query route name to querier.
#[derive(Default)]
pub struct QueryRouterBuilder {
    order: Vec<&'static str>,
    routes: HashMap<&'static str, Arc<dyn Querier>>,
}

impl QueryRouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(mut self, name: &'static str, querier: Arc<dyn Querier>) -> Result<Self, FatalError> {
        if self.routes.contains_key(name) {
            return Err(FatalError::DuplicateQueryRoute(name.to_string()));
        }
        self.order.push(name);
        self.routes.insert(name, querier);
        Ok(self)
    }

    pub fn freeze(self) -> QueryRouter {
        QueryRouter {
            order: self.order,
            routes: self.routes,
        }
    }
}

pub struct QueryRouter {
    order: Vec<&'static str>,
    routes: HashMap<&'static str, Arc<dyn Querier>>,
}

impl QueryRouter {
    pub fn route(&self, name: &str) -> Option<&Arc<dyn Querier>> {
        self.routes.get(name)
    }

    pub fn names(&self) -> &[&'static str] {
        &self.order
    }
}

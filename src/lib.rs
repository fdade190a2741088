//! Admin session registry: lists, searches, inspects and expires the
//! ephemeral `session:<id>` records kept in Redis.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;

pub mod models {
    pub mod audit;
    pub mod session;
}

pub mod services {
    pub mod audit;
    pub mod extract;
    pub mod index;
    pub mod sessions;
}

pub mod handlers {
    pub mod health;
    pub mod sessions;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod session;
}

// Configuration
pub mod config;

// Document shapes shared across the event store, projector, and read models
pub mod model;

// Partitioned document store abstraction (Component A)
pub mod store;

// Per-stream append with optimistic concurrency (Component B)
pub mod eventstore;

// Change-feed consumer building read models (Component C)
pub mod projector;

// Query-side API over projected read models (Component D)
pub mod readmodel;

// External feed polling worker (Component E)
pub mod ingestion;

// Push hub over WebSocket (Component F)
pub mod hub;

// HTTP and WebSocket APIs
pub mod api;

// Authentication and authorization
pub mod auth;

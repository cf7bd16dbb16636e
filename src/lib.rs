//! Predicts cascading effects of an event as a tree of first, second and
//! higher order consequences, generated by a language model.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod session;
pub mod storage;

//! Extensions bundled with the manager binary

pub mod env;

pub use env::EnvInjector;

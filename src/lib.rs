pub mod algebra;
pub mod api;
pub mod app;
pub mod bookkeeping;
pub mod cmd;
pub mod error;
pub mod fx;
pub mod log;
pub mod model;
pub mod orchestrator;
pub mod persistence;
pub mod tracing;
pub mod util;

#[cfg(any(test, feature = "testlib"))]
pub mod testlib;

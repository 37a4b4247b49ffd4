pub mod arbiter;
pub mod clock;
pub mod config;
pub mod demo;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod feed;
pub mod io;
pub mod ledger;
pub mod protocol;
pub mod schedule;
pub mod scheduler;
pub mod sensor;
pub mod status;
pub mod stock;
pub mod store;
pub mod transport;
pub mod types;
pub mod window;

pub use engine::{Engine, EngineSettings};
pub use error::{AquariumError, DispatchError, Result};
pub use store::Store;

//! Port traits at every external seam.

pub mod clock_port;
pub mod config_port;
pub mod forecaster_port;
pub mod market_data_port;
pub mod store_port;

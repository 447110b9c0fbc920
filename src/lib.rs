pub mod calibration;
pub mod config;
pub mod context;
pub mod cube;
pub mod cuts;
pub mod error;
pub mod instance;
pub mod milp;
pub mod output;
pub mod search;

//! Device drivers

pub mod asv;

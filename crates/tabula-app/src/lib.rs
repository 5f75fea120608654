// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod buffer;
pub mod bulk;
pub mod controller;
pub mod error;
pub mod faker;
pub mod gateway;
pub mod ids;
pub mod model;
pub mod navigation;
pub mod optimistic;
pub mod query;
pub mod store;
pub mod values;
pub mod viewport;
pub mod worker;

pub use buffer::*;
pub use bulk::*;
pub use controller::*;
pub use error::*;
pub use faker::GridFaker;
pub use gateway::*;
pub use ids::*;
pub use model::*;
pub use navigation::*;
pub use optimistic::*;
pub use store::*;
pub use viewport::*;
pub use worker::*;

#![allow(dead_code)]

mod circuit;
mod error;
mod framer;
mod gateway;
mod manager;

pub use error::GatewayError;
pub use gateway::{Gateway, RequestPolicy};
pub use manager::{GatewayStatus, ModbusManager};

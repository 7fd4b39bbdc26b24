//! Stateless repositories; every method takes a `&Connection`.

pub mod devices;
pub mod readings;

pub use devices::DeviceRepo;
pub use readings::ReadingRepo;

pub mod descriptor;
pub mod link;
pub mod px4;
pub mod tune;
pub mod wire;

pub use descriptor::Descriptor;
pub use link::{MavConfig, MavVehicle};

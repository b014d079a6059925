pub mod descriptor;
pub mod principal;
pub mod target;

pub use descriptor::ConnectionDescriptor;
pub use principal::{DatabaseHandle, Outcome, Principal, database_name_for};
pub use target::TargetConfig;

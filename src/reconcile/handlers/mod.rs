//! Field handlers for the four shadow document fields

mod creds;
mod flows;
mod packages;
mod power;

pub use creds::handle_creds;
pub use flows::handle_flows;
pub use packages::handle_packages;
pub use power::handle_power;

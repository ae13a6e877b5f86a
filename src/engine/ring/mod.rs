pub mod modular;
pub mod rns;

pub use rns::{RnsBasis, RnsPoly};

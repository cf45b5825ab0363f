mod audit;
mod certificate;
mod credit;
mod makeup;
mod registration;
mod seminar;
mod user;

pub use audit::*;
pub use certificate::*;
pub use credit::*;
pub use makeup::*;
pub use registration::*;
pub use seminar::*;
pub use user::*;

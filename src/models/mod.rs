pub mod alert;
pub mod enums;
pub mod grant;
pub mod invitation;
pub mod party;
pub mod prescription;
pub mod record;
pub mod relationship;

pub use alert::*;
pub use enums::*;
pub use grant::*;
pub use invitation::*;
pub use party::*;
pub use prescription::*;
pub use record::*;
pub use relationship::*;

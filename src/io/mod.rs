//! Input/output helpers.
//!
//! - model card loading (`card`)
//! - raw CSV/JSON tables (`table`)
//! - model artifact read/write with backup (`artifact`)
//! - cross-process writer locks (`lock`)

pub mod artifact;
pub mod card;
pub mod lock;
pub mod table;

pub use artifact::*;
pub use card::*;
pub use lock::*;
pub use table::*;

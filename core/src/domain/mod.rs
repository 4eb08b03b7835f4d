pub mod checksum;
pub mod error;
pub mod script;
pub mod version;

pub use checksum::sha224_hex;
pub use error::DomainError;
pub use script::{Script, ScriptFormat, ScriptKind};

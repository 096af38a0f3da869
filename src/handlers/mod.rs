pub mod config;
pub mod planets;
pub mod scan;
pub mod voice;

pub use self::config::*;
pub use self::planets::*;
pub use self::scan::*;
pub use self::voice::*;

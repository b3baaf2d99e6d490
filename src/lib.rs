pub mod devices;
pub mod err;
pub mod monitor;
pub mod regs;
pub mod script;
pub mod subsystem;

pub use devices::*;
pub use err::*;
pub use regs::*;
pub use subsystem::*;

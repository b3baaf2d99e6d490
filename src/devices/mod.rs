pub mod block;
pub mod console;
pub mod keyboard;
pub mod mmio;
pub mod register;
pub mod store;

pub use block::BlockDeviceController;
pub use console::ConsoleDevice;
pub use keyboard::KeyboardQueue;
pub use mmio::*;
pub use store::{BackingStore, SECTOR_SIZE, Sector, SectorStore};

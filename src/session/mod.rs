pub mod chrome;
pub mod driver;
pub mod tabs;

pub use chrome::ChromeDriver;
pub use driver::Driver;
pub use tabs::TabTracker;

//! 页面自动化层：驱动抽象、静态夹具、Headless Chrome 实现与机票页面对象

pub mod driver;
pub mod fixture;
pub mod flights;

#[cfg(feature = "browser")]
pub mod chrome;

#[cfg(feature = "browser")]
pub use chrome::ChromeDriver;
pub use driver::{DriverError, ElementHandle, PageDriver, WaitCondition};
pub use fixture::{DriverCall, FixtureDocument, FixtureElement, FixturePage};
pub use flights::{FlightPage, FlightSelectors, Selection};

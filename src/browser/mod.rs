pub mod backend;
pub mod chrome;
pub mod connection;
pub mod headless;
pub mod session;

pub use backend::{BrowserBackend, LookupPage, RawBlock};
pub use chrome::{ChromeBackend, ChromeOptions};
pub use session::SharedSession;

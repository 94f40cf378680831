pub mod answers;
pub mod backend;
pub mod candidate;
pub mod fake_backend;
pub mod http_backend;
pub mod questions;
pub mod timer;

pub use answers::*;
pub use backend::*;
pub use candidate::*;
pub use fake_backend::FakeBackend;
pub use http_backend::HttpBackend;
pub use questions::*;
pub use timer::*;

//! Wire-level request and result models.

pub mod request;
pub mod result;

pub use request::{Request, RunArgs};
pub use result::{SkillResult, StageField};

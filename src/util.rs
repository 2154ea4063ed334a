pub mod retry;
pub(crate) mod spacing;

pub mod retry;
pub(crate) mod statement;

pub use retry::{Exhausted, Retry, RetryBudget, RetryPolicy};
pub(crate) use statement::StatementExecutor;

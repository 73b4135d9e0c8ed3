pub mod amount;
pub mod block;
pub mod order;
pub mod pair;
pub mod pool;
pub mod token_account;
pub mod trade;

pub use block::{BlockRecord, BlockStatus};
pub use pair::Pair;
pub use trade::{SwapName, Trade, TradeType};
